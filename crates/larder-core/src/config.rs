use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE_NAME: &str = "larder.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LarderConfig {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_store_path")]
    pub path: PathBuf,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_store_path(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_dir")]
    pub dir: PathBuf,
    #[serde(default = "default_months_to_keep")]
    pub months_to_keep: u32,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            dir: default_archive_dir(),
            months_to_keep: default_months_to_keep(),
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl ArchiveConfig {
    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

impl LarderConfig {
    /// Resolve relative store and archive paths against `base`.
    #[must_use]
    pub fn resolved_against(mut self, base: &Path) -> Self {
        if self.store.path.is_relative() {
            self.store.path = base.join(&self.store.path);
        }
        if self.archive.dir.is_relative() {
            self.archive.dir = base.join(&self.archive.dir);
        }
        self
    }
}

/// Load configuration from an explicit path.
///
/// Relative paths inside the file are resolved against the file's directory.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not valid TOML.
pub fn load_config_file(path: &Path) -> Result<LarderConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let config = toml::from_str::<LarderConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let base = path.parent().unwrap_or_else(|| Path::new("."));
    Ok(config.resolved_against(base))
}

/// Resolve the effective configuration for a run.
///
/// Precedence: `explicit` path, then `larder.toml` in `working_dir`, then
/// built-in defaults resolved against `working_dir`.
///
/// # Errors
///
/// Returns an error if a config file exists but cannot be parsed. An explicit
/// path that does not exist is also an error.
pub fn resolve_config(explicit: Option<&Path>, working_dir: &Path) -> Result<LarderConfig> {
    if let Some(path) = explicit {
        let path = if path.is_relative() {
            working_dir.join(path)
        } else {
            path.to_path_buf()
        };
        return load_config_file(&path);
    }

    let default_path = working_dir.join(CONFIG_FILE_NAME);
    if default_path.exists() {
        return load_config_file(&default_path);
    }

    Ok(LarderConfig::default().resolved_against(working_dir))
}

fn default_store_path() -> PathBuf {
    PathBuf::from(".larder/hot.sqlite3")
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from(".larder/archive")
}

const fn default_months_to_keep() -> u32 {
    1
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}
