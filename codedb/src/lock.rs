use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::errors::{CodeDbError, CodeDbResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    /// Any number of readers (find passes)
    Shared,
    /// A single writer (database rebuild)
    Exclusive,
}

/// Advisory lock on a database's lock file, released on drop.
///
/// Acquisition never blocks: if another process holds the lock in an
/// incompatible mode the call fails with [`CodeDbError::Lock`].
#[derive(Debug)]
pub struct DbLock {
    file: File,
    path: PathBuf,
    mode: LockMode,
}

impl DbLock {
    pub fn shared(path: &Path) -> CodeDbResult<Self> {
        Self::acquire(path, LockMode::Shared)
    }

    pub fn exclusive(path: &Path) -> CodeDbResult<Self> {
        Self::acquire(path, LockMode::Exclusive)
    }

    fn acquire(path: &Path, mode: LockMode) -> CodeDbResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(|e| CodeDbError::lock_error(path, e))?;

        let locked = match mode {
            LockMode::Shared => FileExt::try_lock_shared(&file),
            LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
        };
        locked.map_err(|e| {
            CodeDbError::lock_error(
                path,
                format!("cannot take {:?} lock, database is busy: {}", mode, e),
            )
        })?;

        debug!("Acquired {:?} lock on {}", mode, path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            mode,
        })
    }
}

impl Drop for DbLock {
    fn drop(&mut self) {
        match FileExt::unlock(&self.file) {
            Ok(()) => debug!("Released {:?} lock on {}", self.mode, self.path.display()),
            Err(e) => warn!("Failed to release lock on {}: {}", self.path.display(), e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_shared_locks_coexist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let first = DbLock::shared(&path).unwrap();
        let second = DbLock::shared(&path).unwrap();
        assert_eq!(first.mode, LockMode::Shared);
        assert_eq!(second.mode, LockMode::Shared);
    }

    #[test]
    fn test_exclusive_blocks_shared() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let writer = DbLock::exclusive(&path).unwrap();
        let err = DbLock::shared(&path).unwrap_err();
        assert!(matches!(err, CodeDbError::Lock(_)));

        drop(writer);
        assert!(DbLock::shared(&path).is_ok());
    }

    #[test]
    fn test_shared_blocks_exclusive() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("lock");

        let _reader = DbLock::shared(&path).unwrap();
        assert!(matches!(
            DbLock::exclusive(&path),
            Err(CodeDbError::Lock(_))
        ));
    }
}
