use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::{CodeDbError, CodeDbResult};

/// Value of `find-threads` that selects the hardware concurrency.
pub const DEFAULT_SENTINEL: &str = "default";

/// File name of the per-database configuration inside `.codedb`.
pub const CONFIG_FILE: &str = "config.yaml";

const SWITCH_ON: &str = "on";
const SWITCH_OFF: &str = "off";
const DEFAULT_CHUNK_SIZE: usize = 512 * 1024;

/// Configuration of a codedb database.
///
/// # Configuration Locations
///
/// Sources are layered in order of precedence (later wins):
/// 1. Global `$HOME/.config/codedb/config.yaml`
/// 2. The database's own `.codedb/config.yaml`
///
/// Missing files are skipped; every key has a default.
///
/// # Configuration Format
///
/// ```yaml
/// # Worker threads for find: "default" or a positive integer
/// find-threads: "default"
///
/// # Strip leading spaces/tabs from printed lines ("on" / "off")
/// find-trim-ws: "off"
///
/// # Case-insensitive file path filter ("on" / "off")
/// nocase-file-match: "off"
///
/// # Raw bytes packed into one chunk before compression
/// build-chunk-size: 524288
///
/// # Paths skipped by the builder (glob syntax)
/// ignore-patterns:
///   - "target/**"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct DbConfig {
    /// Thread count for find; validated lazily by [`DbConfig::thread_count`]
    #[serde(default = "default_find_threads")]
    pub find_threads: String,

    #[serde(default = "default_switch")]
    pub find_trim_ws: String,

    #[serde(default = "default_switch")]
    pub nocase_file_match: String,

    #[serde(default = "default_chunk_size")]
    pub build_chunk_size: usize,

    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

fn default_find_threads() -> String {
    DEFAULT_SENTINEL.to_string()
}

fn default_switch() -> String {
    SWITCH_OFF.to_string()
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            find_threads: default_find_threads(),
            find_trim_ws: default_switch(),
            nocase_file_match: default_switch(),
            build_chunk_size: default_chunk_size(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl DbConfig {
    /// Loads the global config layered under the one in `db_dir`
    pub fn load(db_dir: &Path) -> CodeDbResult<Self> {
        let global = dirs::config_dir().map(|p| p.join("codedb").join(CONFIG_FILE));
        let local = Some(db_dir.join(CONFIG_FILE));
        let files: Vec<PathBuf> = [global, local].into_iter().flatten().collect();
        Self::load_from(&files)
    }

    /// Loads configuration from the given files, later files taking precedence
    pub fn load_from(files: &[PathBuf]) -> CodeDbResult<Self> {
        let mut builder = ConfigBuilder::builder();

        for path in files {
            if path.exists() {
                debug!("Loading config from {}", path.display());
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Writes this configuration as YAML
    pub fn save(&self, path: &Path) -> CodeDbResult<()> {
        let yaml = serde_yaml::to_string(self)?;
        fs::write(path, yaml)?;
        Ok(())
    }

    /// Resolves `find-threads` into a concrete worker count
    pub fn thread_count(&self) -> CodeDbResult<usize> {
        resolve_thread_count(&self.find_threads)
    }

    pub fn trim_whitespace(&self) -> bool {
        self.find_trim_ws == SWITCH_ON
    }

    pub fn nocase_file_match(&self) -> bool {
        self.nocase_file_match == SWITCH_ON
    }
}

/// `"default"` means one thread per hardware execution unit; anything else
/// must parse as an unsigned integer. The result is never below 1.
pub fn resolve_thread_count(value: &str) -> CodeDbResult<usize> {
    let threads = if value == DEFAULT_SENTINEL {
        num_cpus::get()
    } else {
        value.parse::<usize>().map_err(|e| {
            CodeDbError::config_error(format!(
                "find-threads must be '{}' or a positive integer, got '{}': {}",
                DEFAULT_SENTINEL, value, e
            ))
        })?
    };

    Ok(threads.max(1))
}

/// Size of the reorder buffer pool for a given thread count.
///
/// A single thread needs exactly one slot. Otherwise the pool holds
/// `floor(2.5 * threads)` slots so one slow chunk does not stall every
/// other worker at once.
pub fn buffer_count(thread_count: usize) -> usize {
    if thread_count <= 1 {
        1
    } else {
        thread_count.saturating_mul(5) / 2
    }
}
