use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use codedb::{
    build_database, find, init_workspace, locate_workspace, CodeDbError, FindOptions, Workspace,
};
use colored::Colorize;
use std::io::{self, BufWriter, ErrorKind};
use std::num::NonZeroUsize;
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    author,
    version,
    about = "Index a source tree and search it in parallel",
    long_about = None
)]
struct Cli {
    /// Log level or filter directive (overridden by RUST_LOG)
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Use this .codedb directory instead of searching upward for one
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a .codedb directory with a default configuration
    Init {
        /// Project root to index
        #[arg(default_value = ".")]
        dir: PathBuf,
    },

    /// Build or rebuild the database from the project tree
    Build,

    /// Search the database, one pass per pattern
    Find {
        /// Search the whole database, not just the current directory
        #[arg(short = 'a', long = "all")]
        all_paths: bool,

        /// Case-insensitive match
        #[arg(short = 'i', long)]
        ignore_case: bool,

        /// Treat patterns as literal strings
        #[arg(short = 'v', long = "literal")]
        literal: bool,

        /// Worker threads (default: find-threads from the configuration)
        #[arg(short = 'j', long)]
        threads: Option<NonZeroUsize>,

        /// Patterns to search for
        #[arg(required = true)]
        patterns: Vec<String>,
    },
}

fn main() {
    let cli = Cli::parse();
    setup_logging(&cli.log_level);

    if let Err(e) = run(cli) {
        if is_broken_pipe(&e) {
            return;
        }
        eprintln!("{} {:#}", "error:".red().bold(), e);
        if is_corruption(&e) {
            eprintln!("{} run `codedb-cli build` to rebuild the database", "hint:".yellow());
        }
        std::process::exit(1);
    }
}

fn setup_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

/// Output closed early, e.g. piped into `head`
fn is_broken_pipe(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<CodeDbError>(),
        Some(CodeDbError::Io(io)) if io.kind() == ErrorKind::BrokenPipe
    )
}

fn is_corruption(e: &anyhow::Error) -> bool {
    e.downcast_ref::<CodeDbError>()
        .is_some_and(CodeDbError::is_corruption)
}

fn workspace(db: Option<PathBuf>) -> Result<Workspace> {
    let workspace = match db {
        Some(dir) => Workspace::from_db_dir(&dir)?,
        None => {
            let cwd = std::env::current_dir().context("cannot read current directory")?;
            locate_workspace(&cwd)?
        }
    };
    debug!("Using database in {}", workspace.db_dir.display());
    Ok(workspace)
}

fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Init { dir } => {
            let workspace = init_workspace(&dir)?;
            println!("Initialized {}", workspace.db_dir.display());
        }
        Commands::Build => {
            let workspace = workspace(cli.db)?;
            let stats = build_database(&workspace)?;
            println!(
                "Indexed {} files into {} chunks ({} bytes, {} compressed)",
                stats.files, stats.chunks, stats.raw_bytes, stats.compressed_bytes
            );
        }
        Commands::Find {
            all_paths,
            ignore_case,
            literal,
            threads,
            patterns,
        } => {
            let workspace = workspace(cli.db)?;
            let options = FindOptions {
                patterns,
                search_root: std::env::current_dir().context("cannot read current directory")?,
                all_paths,
                ignore_case,
                literal,
                threads: threads.map(NonZeroUsize::get),
            };

            let mut out = BufWriter::new(io::stdout());
            let stats = find(&workspace, &options, &mut out)?;
            debug!("Completed {} passes", stats.len());
        }
    }

    Ok(())
}
