//! Config schema types.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Root configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrongboxConfig {
    pub storage: StorageConfig,
    pub backup: BackupConfig,
    pub maintenance: MaintenanceConfig,
}

/// Where records and keys live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base directory. Defaults to the platform data directory. The
    /// `--data-dir` flag and `STRONGBOX_DATA_DIR` take precedence.
    pub data_dir: Option<PathBuf>,
    /// SQLite database file, relative to `data_dir` unless absolute.
    pub database_file: PathBuf,
    /// Directory of per-record key files, relative to `data_dir` unless
    /// absolute.
    pub keys_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            database_file: PathBuf::from("records.db"),
            keys_dir: PathBuf::from("keys"),
        }
    }
}

/// Daily backup written after the first changing commit of each day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    pub enabled: bool,
    /// Relative to `data_dir` unless absolute. Defaults to `backups`.
    pub dir: Option<PathBuf>,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Remove orphan key files when the vault is opened.
    pub sweep_on_open: bool,
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            sweep_on_open: true,
        }
    }
}

/// Resolved on-disk locations for one vault.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VaultPaths {
    pub data_dir: PathBuf,
    pub database: PathBuf,
    pub keys_dir: PathBuf,
    /// `None` when backups are disabled.
    pub backup_dir: Option<PathBuf>,
}

impl VaultPaths {
    /// Resolve every location in `config` against `data_dir`.
    pub fn resolve(config: &StrongboxConfig, data_dir: &Path) -> Self {
        let backup_dir = config.backup.enabled.then(|| {
            data_dir.join(
                config
                    .backup
                    .dir
                    .as_deref()
                    .unwrap_or_else(|| Path::new("backups")),
            )
        });

        Self {
            data_dir: data_dir.to_path_buf(),
            database: data_dir.join(&config.storage.database_file),
            keys_dir: data_dir.join(&config.storage.keys_dir),
            backup_dir,
        }
    }

    /// Resolve against the effective data directory: the override from
    /// [`set_data_dir`](crate::set_data_dir), then `storage.data_dir`, then
    /// the platform default.
    pub fn from_config(config: &StrongboxConfig) -> Self {
        let base = crate::loader::data_dir_override()
            .or_else(|| config.storage.data_dir.clone())
            .unwrap_or_else(crate::data_dir);
        Self::resolve(config, &base)
    }
}
