//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;
use spindeck_core::{ApiConfig, EngineConfig, OwnershipPolicy};

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP/WS server to (0 = auto-allocate).
    /// Override: `SPINDECK_BIND_PORT`
    pub bind_port: u16,

    /// Allowed CORS origins (each also accepted with/without `www.`).
    /// Empty means any origin.
    /// Override: `SPINDECK_CORS_ORIGINS` (comma-separated)
    pub cors_origins: Vec<String>,

    /// Directory for room snapshots. No persistence when unset.
    /// Override: `SPINDECK_DATA_DIR`
    pub data_dir: Option<PathBuf>,

    /// Seconds an empty room survives before destruction.
    pub empty_room_grace_secs: u64,

    /// Contested-control policy: `strict` or `permissive`.
    pub ownership_policy: OwnershipPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        let engine = EngineConfig::default();
        Self {
            bind_port: 49420,
            cors_origins: Vec::new(),
            data_dir: None,
            empty_room_grace_secs: engine.empty_room_grace_ms / 1000,
            ownership_policy: engine.ownership_policy,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("SPINDECK_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        if let Ok(val) = std::env::var("SPINDECK_CORS_ORIGINS") {
            self.cors_origins = val
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }

        // SPINDECK_DATA_DIR is handled by clap via #[arg(env = ...)] in main.rs
    }

    /// Converts to spindeck-core's engine configuration.
    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            empty_room_grace_ms: self.empty_room_grace_secs * 1000,
            ownership_policy: self.ownership_policy,
            ..Default::default()
        }
    }

    /// Converts to the API layer's transport configuration.
    pub fn to_api_config(&self) -> ApiConfig {
        ApiConfig {
            preferred_port: self.bind_port,
            cors_origins: self.cors_origins.clone(),
        }
    }
}
