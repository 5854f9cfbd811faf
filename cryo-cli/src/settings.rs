//! Persisted CLI settings

use std::path::{Path, PathBuf};

use cryo_session::{AutoRange, TransportConfig};
use cryo_sim::VirtualControllerConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors writing the settings file
#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Failed to create config dir {path}: {source}")]
    CreateDir {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize settings: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to write settings to {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

/// Settings loaded at startup; command-line flags override them
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Settings {
    /// Serial connection to the controller
    #[serde(default)]
    pub transport: TransportConfig,
    /// Heater range thresholds
    #[serde(default)]
    pub auto_range: AutoRange,
    /// Seconds between auto-range passes
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: f64,
    /// State of the simulated controller used with `--simulate`
    #[serde(default)]
    pub simulator: VirtualControllerConfig,
}

fn default_poll_interval() -> f64 {
    5.0
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            transport: TransportConfig::default(),
            auto_range: AutoRange::default(),
            poll_interval_secs: default_poll_interval(),
            simulator: VirtualControllerConfig::default(),
        }
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        // Use XDG_CONFIG_HOME if set, otherwise ~/.config
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            Some(PathBuf::from(xdg).join("cryocon"))
        } else {
            dirs::home_dir().map(|h| h.join(".config").join("cryocon"))
        }
    }

    /// Default settings file location
    pub fn default_path() -> Option<PathBuf> {
        Self::config_dir().map(|d| d.join("settings.json"))
    }

    /// Load from `path`, or the default location when `None`.
    ///
    /// A missing or unreadable file yields the defaults.
    pub fn load(path: Option<&Path>) -> Self {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => match Self::default_path() {
                Some(p) => p,
                None => return Self::default(),
            },
        };
        Self::load_from(&path)
    }

    /// Load from an explicit file
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    tracing::warn!("Ignoring invalid settings file {}: {}", path.display(), e);
                    Self::default()
                }
            },
            Err(_) => Self::default(),
        }
    }

    /// Save to `path`, creating parent directories as needed
    pub fn save_to(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|source| SettingsError::CreateDir {
                    path: dir.to_path_buf(),
                    source,
                })?;
            }
        }

        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(path, contents).map_err(|source| SettingsError::Write {
            path: path.to_path_buf(),
            source,
        })
    }
}
