//! Server configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/dockhand/server.toml`
//! - Windows: `%APPDATA%/dockhand/server.toml`

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use dockhand_settings::UploadSettings;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Address to listen on.
    #[serde(default = "default_bind")]
    pub bind: String,

    /// Root of the (single-user mode) storage tree.
    #[serde(default = "default_root")]
    pub root: String,

    /// Resumable upload settings.
    #[serde(default)]
    pub uploads: UploadSettings,
}

fn default_bind() -> String {
    "127.0.0.1:8570".into()
}

fn default_root() -> String {
    "./files".into()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            root: default_root(),
            uploads: UploadSettings::default(),
        }
    }
}

impl Config {
    /// Loads configuration from disk, or creates a default if not found.
    pub fn load() -> anyhow::Result<Self> {
        let path = config_path()?;

        if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    /// Saves the current configuration to disk.
    pub fn save(&self) -> anyhow::Result<()> {
        let path = config_path()?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }
}

/// Returns the platform-specific configuration file path.
fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("dockhand")
            .join("server.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("dockhand").join("server.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/dockhand/server.toml"))
    }
}
