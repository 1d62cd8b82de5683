//! TOML configuration file loading
//!
//! Supports `~/.config/agentmarket/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct AssistantConfigFile {
    /// Backend connection settings
    #[serde(default)]
    pub api: ApiFileConfig,

    /// Local storage settings
    #[serde(default)]
    pub storage: StorageFileConfig,

    /// Realtime channel settings
    #[serde(default)]
    pub realtime: RealtimeFileConfig,
}

/// Backend connection configuration
#[derive(Debug, Default, Deserialize)]
pub struct ApiFileConfig {
    /// Base URL of the assistant API (e.g. "https://shop.example.com")
    pub url: Option<String>,

    /// Per-request timeout in seconds
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageFileConfig {
    /// Directory holding the durable state file
    pub data_dir: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RealtimeFileConfig {
    /// Use the realtime channel for chat instead of request/response
    pub enabled: Option<bool>,
}

/// Load the TOML config file from the standard path
///
/// Returns `AssistantConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> AssistantConfigFile {
    config_file_path().map_or_else(AssistantConfigFile::default, |path| load_from(&path))
}

/// Load a TOML config file from `path`, falling back to defaults
pub fn load_from(path: &Path) -> AssistantConfigFile {
    if !path.exists() {
        return AssistantConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                AssistantConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            AssistantConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/agentmarket/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("agentmarket").join("config.toml"))
}
