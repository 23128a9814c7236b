//! Settings persistence
//!
//! Network and fallback preferences stored as pretty-printed JSON in the
//! platform config directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::api::DEFAULT_BITRATE;
use crate::fallback::SourceName;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub network: NetworkSettings,
    #[serde(default)]
    pub fallback: FallbackSettings,
}

/// Network settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// `scheme://[user[:pass]@]host:port`; the environment proxy when unset
    pub proxy_url: Option<String>,
    /// Skip TLS certificate checks
    pub insecure_tls: bool,
    /// Per-request timeout against the primary catalog
    pub timeout_secs: u64,
}

impl NetworkSettings {
    /// Explicit proxy, else whatever the environment advertises
    pub fn proxy(&self) -> Option<String> {
        self.proxy_url
            .clone()
            .filter(|p| !p.is_empty())
            .or_else(|| {
                std::env::var("HTTP_PROXY")
                    .or_else(|_| std::env::var("http_proxy"))
                    .or_else(|_| std::env::var("HTTPS_PROXY"))
                    .or_else(|_| std::env::var("https_proxy"))
                    .ok()
            })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FallbackSettings {
    /// Upper bound on one fan-out; 0 waits for every source
    pub deadline_secs: u64,
    /// Bitrate requested from the primary catalog
    pub bitrate: u32,
    /// Enabled sources; ranking ignores the order given here
    pub sources: Vec<SourceName>,
}

/// Longest deadline honoured; larger values are clamped to it
const MAX_DEADLINE_SECS: u64 = 3600;

impl FallbackSettings {
    pub fn deadline(&self) -> Option<Duration> {
        (self.deadline_secs > 0)
            .then(|| Duration::from_secs(self.deadline_secs.min(MAX_DEADLINE_SECS)))
    }

    /// Configured sources, or all of them when the list is empty
    pub fn enabled_sources(&self) -> Vec<SourceName> {
        if self.sources.is_empty() {
            SourceName::ALL.to_vec()
        } else {
            self.sources.clone()
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            proxy_url: None,
            insecure_tls: false,
            timeout_secs: 10,
        }
    }
}

impl Default for FallbackSettings {
    fn default() -> Self {
        Self {
            deadline_secs: 15,
            bitrate: DEFAULT_BITRATE,
            sources: SourceName::ALL.to_vec(),
        }
    }
}

impl Settings {
    /// Get the settings file path
    pub fn file_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "ncm-unblock", "NcmUnblock")
            .map(|dirs| dirs.config_dir().join("settings.json"))
    }

    /// Load settings from file, or return defaults if not found
    pub fn load() -> Self {
        Self::file_path()
            .and_then(|path| Self::load_from_file(&path).ok())
            .unwrap_or_default()
    }

    pub fn load_from_file(path: &Path) -> Result<Self, SettingsError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| SettingsError::Io(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| SettingsError::Parse(e.to_string()))
    }

    pub fn save(&self) -> Result<(), SettingsError> {
        if let Some(path) = Self::file_path() {
            self.save_to_file(&path)
        } else {
            Err(SettingsError::Io(
                "Could not determine config directory".to_string(),
            ))
        }
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), SettingsError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SettingsError::Io(e.to_string()))?;
        }

        let content =
            serde_json::to_string_pretty(self).map_err(|e| SettingsError::Parse(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| SettingsError::Io(e.to_string()))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SettingsError {
    #[error("IO error: {0}")]
    Io(String),
    #[error("Parse error: {0}")]
    Parse(String),
}
