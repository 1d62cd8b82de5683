//! Configuration management for the shopping assistant client

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};

/// API base URL used when nothing else is configured
pub const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Per-request timeout used when nothing else is configured
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Name of the durable state file inside the data directory
const STATE_FILE: &str = "state.json";

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the assistant API
    pub api_url: String,

    /// Directory holding durable client state (session id, credential)
    pub data_dir: PathBuf,

    /// Per-request timeout for HTTP calls
    pub request_timeout_secs: u64,

    /// Use the realtime channel for chat
    pub realtime_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            data_dir: default_data_dir(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            realtime_enabled: false,
        }
    }
}

/// Default data directory (`~/.local/share/agentmarket` on Linux)
fn default_data_dir() -> PathBuf {
    directories::BaseDirs::new().map_or_else(
        || PathBuf::from(".agentmarket"),
        |d| d.data_dir().join("agentmarket"),
    )
}

impl Config {
    /// Load configuration (env > toml > default)
    ///
    /// # Errors
    ///
    /// Returns error if an environment override is malformed
    pub fn load() -> Result<Self> {
        Self::resolve(file::load_config_file(), |key| std::env::var(key).ok())
    }

    /// Merge a config file and an environment lookup over the defaults
    ///
    /// # Errors
    ///
    /// Returns error if a numeric or boolean override cannot be parsed
    pub fn resolve(
        fc: file::AssistantConfigFile,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let defaults = Self::default();

        let api_url = env("AGENTMARKET_API_URL")
            .or(fc.api.url)
            .unwrap_or(defaults.api_url);

        let data_dir = env("AGENTMARKET_DATA_DIR")
            .or(fc.storage.data_dir)
            .map_or(defaults.data_dir, PathBuf::from);

        let request_timeout_secs = match env("AGENTMARKET_REQUEST_TIMEOUT_SECS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                Error::Config(format!("AGENTMARKET_REQUEST_TIMEOUT_SECS is not a number: {raw}"))
            })?,
            None => fc.api.timeout_secs.unwrap_or(defaults.request_timeout_secs),
        };
        if request_timeout_secs == 0 {
            return Err(Error::Config("request timeout must be positive".to_string()));
        }

        let realtime_enabled = match env("AGENTMARKET_REALTIME") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| {
                Error::Config(format!("AGENTMARKET_REALTIME is not a boolean: {raw}"))
            })?,
            None => fc.realtime.enabled.unwrap_or(defaults.realtime_enabled),
        };

        Ok(Self {
            api_url,
            data_dir,
            request_timeout_secs,
            realtime_enabled,
        })
    }

    /// Path of the durable state file
    #[must_use]
    pub fn state_file(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use file::{ApiFileConfig, AssistantConfigFile};

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::resolve(AssistantConfigFile::default(), env(&[])).unwrap();
        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.request_timeout_secs, DEFAULT_REQUEST_TIMEOUT_SECS);
        assert!(!config.realtime_enabled);
        assert!(config.state_file().ends_with("state.json"));
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = AssistantConfigFile {
            api: ApiFileConfig {
                url: Some("https://file.example.com".to_string()),
                timeout_secs: Some(5),
            },
            ..AssistantConfigFile::default()
        };

        let config = Config::resolve(
            fc,
            env(&[
                ("AGENTMARKET_API_URL", "https://env.example.com"),
                ("AGENTMARKET_REALTIME", "yes"),
                ("AGENTMARKET_DATA_DIR", "/tmp/agentmarket"),
            ]),
        )
        .unwrap();

        assert_eq!(config.api_url, "https://env.example.com");
        assert_eq!(config.request_timeout_secs, 5);
        assert!(config.realtime_enabled);
        assert_eq!(config.state_file(), PathBuf::from("/tmp/agentmarket/state.json"));
    }

    #[test]
    fn test_malformed_env_rejected() {
        let err = Config::resolve(
            AssistantConfigFile::default(),
            env(&[("AGENTMARKET_REQUEST_TIMEOUT_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        let err = Config::resolve(
            AssistantConfigFile::default(),
            env(&[("AGENTMARKET_REQUEST_TIMEOUT_SECS", "0")]),
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));

        assert!(
            Config::resolve(
                AssistantConfigFile::default(),
                env(&[("AGENTMARKET_REALTIME", "maybe")]),
            )
            .is_err()
        );
    }
}
