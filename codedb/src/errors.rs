/// Error types for codedb.
///
/// Every fatal condition of a find pass maps onto one variant here. Nothing in
/// the search pipeline retries: an error aborts the current pattern's pass and
/// whatever output was already flushed stays on the stream.
///
/// # Error Handling
///
/// ```rust,ignore
/// match find(&workspace, &options, &mut io::stdout()) {
///     Ok(stats) => {}
///     Err(CodeDbError::Lock(msg)) => // a rebuild holds the database
///     Err(CodeDbError::InvalidPattern(msg)) => // bad regex
///     Err(e) => // everything else is fatal too
/// }
/// ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for codedb operations
pub type CodeDbResult<T> = Result<T, CodeDbError>;

/// Errors that can occur while building or searching a database
#[derive(Error, Debug)]
pub enum CodeDbError {
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Lock error: {0}")]
    Lock(String),
    #[error("Database error: {0}")]
    Database(String),
    #[error("Corrupt chunk: {0}")]
    CorruptChunk(String),
    #[error("Worker thread panicked")]
    WorkerPanicked,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl CodeDbError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn lock_error(path: &Path, msg: impl std::fmt::Display) -> Self {
        Self::Lock(format!("{}: {}", path.display(), msg))
    }

    pub fn database_error(msg: impl Into<String>) -> Self {
        Self::Database(msg.into())
    }

    pub fn corrupt_chunk(msg: impl Into<String>) -> Self {
        Self::CorruptChunk(msg.into())
    }

    /// Whether this error comes from the data itself rather than the environment.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::CorruptChunk(_) | Self::Database(_))
    }
}

/// Canonicalize the path and strip UNC prefixes so that
/// comparisons on Windows are consistent.
pub fn unify_path(original: &Path) -> PathBuf {
    let canonical = original
        .canonicalize()
        .unwrap_or_else(|_| original.to_path_buf());
    strip_unc_prefix(&canonical)
}

/// Strips the Windows UNC prefix (\\?\) from a path if present
fn strip_unc_prefix(p: &Path) -> PathBuf {
    let s = p.display().to_string();
    if let Some(stripped) = s.strip_prefix(r"\\?\") {
        PathBuf::from(stripped)
    } else {
        p.to_path_buf()
    }
}
