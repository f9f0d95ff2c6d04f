use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::config::{DbConfig, CONFIG_FILE};
use crate::errors::{unify_path, CodeDbError, CodeDbResult};

pub const WORKSPACE_DIR: &str = ".codedb";
pub const DB_FILE: &str = "db";
pub const LOCK_FILE: &str = "lock";
const MAX_UPWARD_STEPS: usize = 64;

/// A located `.codedb` directory and the project root it indexes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// The directory containing `.codedb`; stored paths are relative to it
    pub root: PathBuf,
    /// The `.codedb` directory itself
    pub db_dir: PathBuf,
}

impl Workspace {
    /// Wraps an existing `.codedb` directory
    pub fn from_db_dir(db_dir: &Path) -> CodeDbResult<Self> {
        let db_dir = unify_path(db_dir);
        if !db_dir.is_dir() {
            return Err(CodeDbError::database_error(format!(
                "{} is not a codedb directory",
                db_dir.display()
            )));
        }
        let root = db_dir
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| CodeDbError::database_error("database directory has no parent"))?;
        Ok(Self { root, db_dir })
    }

    pub fn db_file(&self) -> PathBuf {
        self.db_dir.join(DB_FILE)
    }

    pub fn lock_file(&self) -> PathBuf {
        self.db_dir.join(LOCK_FILE)
    }

    pub fn config_file(&self) -> PathBuf {
        self.db_dir.join(CONFIG_FILE)
    }

    /// Loads the layered configuration for this database
    pub fn config(&self) -> CodeDbResult<DbConfig> {
        DbConfig::load(&self.db_dir)
    }
}

/// Initialize a new database directory under `root`.
///
/// An existing configuration is left untouched so re-running init is harmless.
pub fn init_workspace(root: &Path) -> CodeDbResult<Workspace> {
    let root = root.canonicalize()?;
    let db_dir = root.join(WORKSPACE_DIR);
    fs::create_dir_all(&db_dir)?;

    let workspace = Workspace::from_db_dir(&db_dir)?;
    if !workspace.config_file().exists() {
        DbConfig::default().save(&workspace.config_file())?;
    }
    if !workspace.lock_file().exists() {
        fs::File::create(workspace.lock_file())?;
    }

    info!("Initialized codedb in {}", workspace.db_dir.display());
    Ok(workspace)
}

/// Find the nearest `.codedb` by walking upward from `starting_dir`
pub fn locate_workspace(starting_dir: &Path) -> CodeDbResult<Workspace> {
    let mut current = unify_path(starting_dir);

    for _ in 0..MAX_UPWARD_STEPS {
        let marker = current.join(WORKSPACE_DIR);
        if marker.is_dir() {
            debug!("Found database at {}", marker.display());
            return Workspace::from_db_dir(&marker);
        }
        if !current.pop() {
            break;
        }
    }

    Err(CodeDbError::database_error(format!(
        "no {} directory found in {} or its parents",
        WORKSPACE_DIR,
        starting_dir.display()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_workspace_detection() -> CodeDbResult<()> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let nested = root.join("a").join("b").join("c");
        fs::create_dir_all(&nested).unwrap();

        assert!(locate_workspace(&nested).is_err());

        let workspace_root = root.join("a");
        init_workspace(&workspace_root)?;

        let found = locate_workspace(&nested)?;
        assert_eq!(found.root, unify_path(&workspace_root));
        assert_eq!(found.db_dir, unify_path(&workspace_root.join(WORKSPACE_DIR)));

        Ok(())
    }

    #[test]
    fn test_workspace_initialization() -> CodeDbResult<()> {
        let temp = TempDir::new().unwrap();
        let root = temp.path();

        let workspace = init_workspace(root)?;
        assert_eq!(workspace.root, unify_path(root));
        assert!(workspace.config_file().exists());
        assert!(workspace.lock_file().exists());
        assert!(!workspace.db_file().exists());
        assert_eq!(workspace.config()?.find_threads, "default");

        Ok(())
    }

    #[test]
    fn test_init_keeps_existing_config() -> CodeDbResult<()> {
        let temp = TempDir::new().unwrap();
        let workspace = init_workspace(temp.path())?;
        fs::write(workspace.config_file(), "find-threads: \"3\"\n")?;

        let again = init_workspace(temp.path())?;
        assert_eq!(again.config()?.thread_count()?, 3);

        Ok(())
    }
}
