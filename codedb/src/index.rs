use glob::Pattern;
use ignore::WalkBuilder;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info, warn};

use crate::database::{DatabaseWriter, WriteStats};
use crate::errors::{CodeDbError, CodeDbResult};
use crate::lock::DbLock;
use crate::workspace::{Workspace, WORKSPACE_DIR};

/// Compiled `ignore-patterns`, matched against '/'-separated relative paths
#[derive(Debug, Clone, Default)]
pub struct IgnoreSet {
    patterns: Vec<Pattern>,
}

impl IgnoreSet {
    pub fn new(patterns: &[String]) -> CodeDbResult<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| {
                    CodeDbError::config_error(format!("invalid ignore pattern '{}': {}", p, e))
                })
            })
            .collect::<CodeDbResult<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    pub fn is_ignored(&self, relative: &str) -> bool {
        relative == WORKSPACE_DIR
            || relative.starts_with(&format!("{}/", WORKSPACE_DIR))
            || self.patterns.iter().any(|p| p.matches(relative))
    }
}

/// Path of `path` relative to `root` with '/' separators, if it is below it
pub fn relative_path(path: &Path, root: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| match c {
            Component::Normal(part) => part.to_str(),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()?;
    if parts.is_empty() {
        return None;
    }
    Some(parts.join("/"))
}

/// What the builder found in a candidate file
#[derive(Debug, PartialEq, Eq)]
enum FileText {
    Text(String),
    /// Contains a NUL byte
    Binary,
    /// No NUL bytes, but not valid UTF-8 (e.g. Latin-1)
    NotUtf8,
}

fn classify(bytes: Vec<u8>) -> FileText {
    if bytes.contains(&0) {
        return FileText::Binary;
    }
    match String::from_utf8(bytes) {
        Ok(text) => FileText::Text(text),
        Err(_) => FileText::NotUtf8,
    }
}

/// Every indexable file under `root`, sorted by relative path
pub fn collect_files(root: &Path, ignore: &IgnoreSet) -> Vec<(String, PathBuf)> {
    let mut walker = WalkBuilder::new(root);
    walker
        .hidden(true)
        .ignore(true)
        .git_ignore(true)
        .git_global(true)
        .git_exclude(true)
        .require_git(false);

    let mut files: Vec<(String, PathBuf)> = walker
        .build()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_some_and(|ft| ft.is_file()))
        .filter_map(|entry| {
            let relative = relative_path(entry.path(), root)?;
            if ignore.is_ignored(&relative) {
                return None;
            }
            Some((relative, entry.into_path()))
        })
        .collect();

    files.sort_by(|a, b| a.0.cmp(&b.0));
    files
}

/// (Re)builds the database of `workspace` from its project tree.
///
/// Holds the exclusive lock while writing, so a concurrent find fails with a
/// lock error rather than reading a half-written database.
pub fn build_database(workspace: &Workspace) -> CodeDbResult<WriteStats> {
    let config = workspace.config()?;
    let ignore = IgnoreSet::new(&config.ignore_patterns)?;
    let _lock = DbLock::exclusive(&workspace.lock_file())?;

    info!("Indexing {}", workspace.root.display());
    let files = collect_files(&workspace.root, &ignore);
    debug!("Found {} candidate files", files.len());

    let mut writer = DatabaseWriter::new(config.build_chunk_size);
    let mut binary = 0;
    let mut not_utf8 = 0;
    for (relative, path) in &files {
        match classify(fs::read(path)?) {
            FileText::Text(content) => writer.add_file(relative, &content)?,
            FileText::Binary => {
                debug!("Skipping binary file {}", relative);
                binary += 1;
            }
            FileText::NotUtf8 => {
                warn!("Skipping {}: not valid UTF-8", relative);
                not_utf8 += 1;
            }
        }
    }

    let stats = writer.finish(&workspace.db_file())?;
    info!(
        "Indexed {} files into {} chunks ({} skipped as binary, {} as non-UTF-8)",
        stats.files, stats.chunks, binary, not_utf8
    );
    Ok(stats)
}
