//! Configuration loading and data directory resolution.
//!
//! Config files: `strongbox.toml`, `strongbox.yaml`, `strongbox.yml` or
//! `strongbox.json`, searched in `./` then the user config directory.

pub mod loader;
pub mod schema;

pub use {
    loader::{
        clear_data_dir, config_dir, data_dir, discover_and_load, find_config_file, load_config,
        set_data_dir,
    },
    schema::{BackupConfig, MaintenanceConfig, StorageConfig, StrongboxConfig, VaultPaths},
};
