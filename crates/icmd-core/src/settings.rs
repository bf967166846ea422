use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::{icmd_home, Result, Store};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub bind_address: String,
    pub port: u16,
    /// Directory holding the project documents. Defaults to `<ICMD home>/projects`.
    pub data_dir: Option<PathBuf>,
    /// `tracing` filter used when `RUST_LOG` is not set.
    pub log_filter: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind_address: "127.0.0.1".to_string(),
            port: 5080,
            data_dir: None,
            log_filter: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn store(&self) -> Store {
        match &self.data_dir {
            Some(dir) => Store::new(dir.clone()),
            None => Store::open_default(),
        }
    }
}

pub fn settings_path() -> PathBuf {
    icmd_home().join("settings.json")
}

pub fn read_settings() -> Settings {
    read_settings_from(&settings_path())
}

/// Missing or unreadable settings fall back to defaults.
pub fn read_settings_from(path: &Path) -> Settings {
    if !path.exists() {
        return Settings::default();
    }
    fs::read_to_string(path)
        .ok()
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default()
}

pub fn write_settings(settings: &Settings) -> Result<()> {
    write_settings_to(&settings_path(), settings)
}

pub fn write_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)?;
    }
    let json = serde_json::to_string_pretty(settings)?;
    fs::write(path, json)?;
    Ok(())
}
