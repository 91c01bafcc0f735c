use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use tracing::{debug, warn};

use crate::schema::StrongboxConfig;

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "strongbox.toml",
    "strongbox.yaml",
    "strongbox.yml",
    "strongbox.json",
];

static DATA_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "strongbox")
}

/// Load config from the given path (any supported format).
pub fn load_config(path: &Path) -> anyhow::Result<StrongboxConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&raw, path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./strongbox.{toml,yaml,yml,json}` (project-local)
/// 2. `<user config dir>/strongbox.{toml,yaml,yml,json}` (user-global)
///
/// Returns `StrongboxConfig::default()` if no config file is found or the one
/// found does not parse.
pub fn discover_and_load() -> StrongboxConfig {
    if let Some(path) = find_config_file() {
        debug!(path = %path.display(), "loading config");
        match load_config(&path) {
            Ok(cfg) => return cfg,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
            },
        }
    } else {
        debug!("no config file found, using defaults");
    }
    StrongboxConfig::default()
}

/// Find the first config file in standard locations.
pub fn find_config_file() -> Option<PathBuf> {
    let local = CONFIG_FILENAMES.iter().map(PathBuf::from);
    let global = config_dir()
        .into_iter()
        .flat_map(|dir| CONFIG_FILENAMES.iter().map(move |name| dir.join(name)));
    local.chain(global).find(|p| p.exists())
}

/// Returns the user-global config directory (`~/.config/strongbox/` on Linux).
pub fn config_dir() -> Option<PathBuf> {
    project_dirs().map(|d| d.config_dir().to_path_buf())
}

/// Override the data directory for this process.
pub fn set_data_dir(path: impl Into<PathBuf>) {
    *DATA_DIR_OVERRIDE.lock().unwrap_or_else(|e| e.into_inner()) = Some(path.into());
}

pub fn clear_data_dir() {
    *DATA_DIR_OVERRIDE.lock().unwrap_or_else(|e| e.into_inner()) = None;
}

pub(crate) fn data_dir_override() -> Option<PathBuf> {
    DATA_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// Returns the data directory: the override if set, else the platform data
/// directory (`~/.local/share/strongbox/` on Linux), else `./.strongbox`.
pub fn data_dir() -> PathBuf {
    data_dir_override()
        .or_else(|| project_dirs().map(|d| d.data_dir().to_path_buf()))
        .unwrap_or_else(|| PathBuf::from(".strongbox"))
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<StrongboxConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, crate::schema::VaultPaths};

    fn write(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn loads_each_format() {
        let tmp = tempfile::tempdir().unwrap();
        let toml = write(
            tmp.path(),
            "strongbox.toml",
            "[backup]\nenabled = false\n[storage]\nkeys_dir = \"k\"\n",
        );
        let yaml = write(
            tmp.path(),
            "strongbox.yaml",
            "backup:\n  enabled: false\nstorage:\n  keys_dir: k\n",
        );
        let json = write(
            tmp.path(),
            "strongbox.json",
            r#"{"backup": {"enabled": false}, "storage": {"keys_dir": "k"}}"#,
        );

        for path in [toml, yaml, json] {
            let cfg = load_config(&path).unwrap();
            assert!(!cfg.backup.enabled, "{}", path.display());
            assert_eq!(cfg.storage.keys_dir, PathBuf::from("k"));
            // Untouched sections keep their defaults.
            assert_eq!(cfg.storage.database_file, PathBuf::from("records.db"));
            assert!(cfg.maintenance.sweep_on_open);
        }
    }

    #[test]
    fn rejects_unknown_extension_and_bad_syntax() {
        let tmp = tempfile::tempdir().unwrap();
        let ini = write(tmp.path(), "strongbox.ini", "x=1");
        assert!(load_config(&ini).is_err());

        let broken = write(tmp.path(), "strongbox.toml", "[backup\nenabled = ");
        assert!(load_config(&broken).is_err());

        assert!(load_config(&tmp.path().join("missing.toml")).is_err());
    }

    #[test]
    fn data_dir_override_wins() {
        let mut cfg = StrongboxConfig::default();
        cfg.storage.data_dir = Some(PathBuf::from("/from/config"));

        set_data_dir("/from/flag");
        assert_eq!(data_dir(), PathBuf::from("/from/flag"));
        assert_eq!(
            VaultPaths::from_config(&cfg).database,
            PathBuf::from("/from/flag/records.db")
        );

        clear_data_dir();
        assert_eq!(
            VaultPaths::from_config(&cfg).database,
            PathBuf::from("/from/config/records.db")
        );
    }
}
