//! Server configuration.
//!
//! Loaded from an optional JSON file with environment overrides on top:
//! `HERMOD_HOST`, `HERMOD_PORT`, and `HERMOD_ADDRESS` win over the file,
//! which wins over the compiled defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// A configured login.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UserConfig {
    /// Stable user id.
    pub id: String,
    /// Login name.
    pub name: String,
    /// Password.
    pub password: String,
}

/// Configuration for the broker server.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// Host to bind (default `"127.0.0.1"`).
    pub host: String,
    /// Port to bind (default `8638`, `0` for auto-assign).
    pub port: u16,
    /// The broker's own peer address. A broker cannot run without one.
    pub address: String,
    /// Path to the `SQLite` database; in-memory when absent.
    pub db_path: Option<PathBuf>,
    /// Logins accepted at registration.
    pub users: Vec<UserConfig>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 8638,
            address: "broker".into(),
            db_path: None,
            users: Vec::new(),
        }
    }
}

/// Configuration load failure.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not valid JSON for this shape.
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
    /// An environment override did not parse.
    #[error("invalid value in {var}: {value}")]
    InvalidOverride {
        /// The environment variable.
        var: &'static str,
        /// Its offending value.
        value: String,
    },
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist, then apply environment overrides.
pub fn load_config(path: &Path) -> Result<BrokerConfig, ConfigError> {
    let mut config = if path.exists() {
        tracing::debug!(?path, "loading config from file");
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)?
    } else {
        tracing::debug!(?path, "config file not found, using defaults");
        BrokerConfig::default()
    };
    apply_env_overrides(&mut config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut BrokerConfig) -> Result<(), ConfigError> {
    if let Ok(host) = std::env::var("HERMOD_HOST") {
        config.host = host;
    }
    if let Ok(port) = std::env::var("HERMOD_PORT") {
        config.port = port
            .parse()
            .map_err(|_| ConfigError::InvalidOverride {
                var: "HERMOD_PORT",
                value: port,
            })?;
    }
    if let Ok(address) = std::env::var("HERMOD_ADDRESS") {
        config.address = address;
    }
    Ok(())
}
