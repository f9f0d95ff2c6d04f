use std::io::Write;
use std::path::PathBuf;
use std::thread;
use tracing::{debug, info, warn};

use super::matcher::{FileFilter, PatternOptions, PatternPair};
use super::pool::Sequencer;
use super::worker::{run_worker, ChunkScanner, PatternScanner};
use crate::config::buffer_count;
use crate::database::{ChunkSource, Database};
use crate::errors::CodeDbResult;
use crate::lock::DbLock;
use crate::metrics::PassStats;
use crate::workspace::Workspace;

/// Options for a multi-pattern find
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    /// One full pass is run per pattern, in order
    pub patterns: Vec<String>,
    /// Directory find runs from; results are limited to it unless `all_paths`
    pub search_root: PathBuf,
    /// Search the whole database, not just `search_root` (`-a`)
    pub all_paths: bool,
    /// Case-insensitive content match (`-i`)
    pub ignore_case: bool,
    /// Treat patterns as literal strings (`-v`)
    pub literal: bool,
    /// Overrides `find-threads` from the configuration
    pub threads: Option<usize>,
}

/// Runs one pass over `source` with `thread_count` workers.
///
/// `thread_count - 1` workers run on scoped threads and one on the calling
/// thread. Output reaches `sink` in source order. If a worker thread cannot
/// be spawned the pass continues with the threads it has.
pub fn run_pass<'a, S, W, C>(
    source: S,
    sink: W,
    thread_count: usize,
    buffer_count: usize,
    scanner: &C,
) -> CodeDbResult<(W, PassStats)>
where
    S: ChunkSource<'a> + Send,
    W: Write + Send,
    C: ChunkScanner + ?Sized,
{
    let thread_count = thread_count.max(1);
    let sequencer = Sequencer::new(source, sink, buffer_count);
    debug!(
        "Starting pass with {} threads and {} buffers",
        thread_count,
        sequencer.buffer_count()
    );

    thread::scope(|scope| {
        let mut handles = Vec::with_capacity(thread_count - 1);
        for i in 1..thread_count {
            let spawned = thread::Builder::new()
                .name(format!("codedb-find-{}", i))
                .spawn_scoped(scope, || run_worker(&sequencer, scanner));
            match spawned {
                Ok(handle) => handles.push(handle),
                Err(e) => {
                    warn!(
                        "Could only spawn {} of {} worker threads: {}",
                        i - 1,
                        thread_count - 1,
                        e
                    );
                    break;
                }
            }
        }

        run_worker(&sequencer, scanner);

        for handle in handles {
            // A panicking worker has already failed the pass.
            let _ = handle.join();
        }
    });

    sequencer.finish()
}

/// Searches the database of `workspace` once per pattern, writing matches to `sink`.
///
/// The shared database lock is held for the whole run. Each pass opens its own
/// database handle. Configuration, lock and pattern errors surface before any
/// worker starts; a failure inside a pass stops the run, leaving what was
/// already written in `sink`.
pub fn find<W>(
    workspace: &Workspace,
    options: &FindOptions,
    sink: &mut W,
) -> CodeDbResult<Vec<PassStats>>
where
    W: Write + Send,
{
    let config = workspace.config()?;
    let thread_count = match options.threads {
        Some(threads) => threads.max(1),
        None => config.thread_count()?,
    };
    let buffers = buffer_count(thread_count);

    let filter =
        FileFilter::for_search_root(&options.search_root, &workspace.root, options.all_paths)?;
    let pattern_options = PatternOptions {
        literal: options.literal,
        ignore_case: options.ignore_case,
        nocase_file: config.nocase_file_match(),
    };

    let _lock = DbLock::shared(&workspace.lock_file())?;

    let mut all_stats = Vec::with_capacity(options.patterns.len());
    for pattern in &options.patterns {
        let db = Database::open(&workspace.db_file())?;
        info!(
            "Searching {} ({} bytes) for '{}' with {} threads",
            db.path().display(),
            db.len(),
            pattern,
            thread_count
        );
        let patterns = PatternPair::compile(pattern, &filter, pattern_options)?;
        let scanner = PatternScanner::new(patterns, config.trim_whitespace());

        let (_, stats) = run_pass(db.chunks(), &mut *sink, thread_count, buffers, &scanner)?;
        info!(
            "Pass for '{}' complete: {} matches in {} chunks",
            pattern, stats.matches_emitted, stats.chunks_flushed
        );
        all_stats.push(stats);
    }

    Ok(all_stats)
}
