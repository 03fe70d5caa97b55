//! Configuration types for the research hub client.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::BASIC_COLLECTION;

/// Environment variable overriding `server.base_url`.
pub const BASE_URL_ENV: &str = "HUB_BASE_URL";

/// Main configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HubConfig {
    /// Backend server configuration.
    #[serde(default)]
    pub server: ServerConfig,

    /// Search configuration.
    #[serde(default)]
    pub search: SearchConfig,

    /// Local durable state configuration.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Backend server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base address of the notebook service.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            timeout_secs: 30,
        }
    }
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Default number of passages.
    #[serde(default = "default_top_k")]
    pub default_top_k: u32,

    /// Upper bound for `top_k`; larger requests are clamped.
    #[serde(default = "default_max_top_k")]
    pub max_top_k: u32,

    /// Collection used for global search when none is given.
    #[serde(default = "default_collection")]
    pub default_collection: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 50,
            default_collection: default_collection(),
        }
    }
}

impl SearchConfig {
    /// Clamp a requested `top_k` to the configured maximum.
    pub fn clamp_top_k(&self, top_k: u32) -> u32 {
        top_k.min(self.max_top_k)
    }
}

/// Local state configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path to the SQLite file holding durable slots.
    #[serde(default = "default_state_path")]
    pub state_path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_path: default_state_path(),
        }
    }
}

// Default value functions

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_top_k() -> u32 {
    5
}

fn default_max_top_k() -> u32 {
    50
}

fn default_collection() -> String {
    BASIC_COLLECTION.to_string()
}

fn default_state_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("research-hub")
        .join("state.db")
}

impl HubConfig {
    /// Load configuration from file.
    pub fn load(path: &std::path::Path) -> crate::error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> crate::error::Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| crate::error::HubError::Config {
            message: format!("Failed to parse config: {}", e),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from default paths, then apply environment overrides.
    pub fn load_default() -> crate::error::Result<Self> {
        let mut config = Self::load_from_default_paths()?;
        if let Ok(url) = std::env::var(BASE_URL_ENV) {
            if !url.trim().is_empty() {
                config.server.base_url = url.trim().to_string();
            }
        }
        Ok(config)
    }

    fn load_from_default_paths() -> crate::error::Result<Self> {
        // Try user config first
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("research-hub").join("config.toml");
            if user_config.exists() {
                return Self::load(&user_config);
            }
        }

        // Try local config
        let local_config = PathBuf::from("research-hub.toml");
        if local_config.exists() {
            return Self::load(&local_config);
        }

        Ok(Self::default())
    }

    /// Check invariants that serde cannot express.
    pub fn validate(&self) -> crate::error::Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(crate::error::HubError::Config {
                message: "server.base_url must not be empty".to_string(),
            });
        }
        if self.server.timeout_secs == 0 {
            return Err(crate::error::HubError::Config {
                message: "server.timeout_secs must be at least 1".to_string(),
            });
        }
        if self.search.default_top_k == 0 || self.search.max_top_k < self.search.default_top_k {
            return Err(crate::error::HubError::Config {
                message: format!(
                    "search.default_top_k ({}) must be between 1 and search.max_top_k ({})",
                    self.search.default_top_k, self.search.max_top_k
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HubConfig::default();
        assert_eq!(config.server.base_url, "http://localhost:8000");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.search.default_top_k, 5);
        assert_eq!(config.search.default_collection, BASIC_COLLECTION);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_partial_config() {
        let config = HubConfig::parse(
            r#"
            [server]
            base_url = "http://10.0.0.5:9000"

            [search]
            max_top_k = 20
            "#,
        )
        .unwrap();

        assert_eq!(config.server.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.server.timeout_secs, 30);
        assert_eq!(config.search.max_top_k, 20);
        assert_eq!(config.search.clamp_top_k(100), 20);
        assert_eq!(config.search.clamp_top_k(3), 3);
    }

    #[test]
    fn test_parse_rejects_bad_values() {
        let err = HubConfig::parse("[server]\ntimeout_secs = 0\n").unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");

        assert!(HubConfig::parse("[search]\ndefault_top_k = 10\nmax_top_k = 5\n").is_err());
        assert!(HubConfig::parse("server = 3").is_err());
    }
}
