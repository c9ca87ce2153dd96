//! Configuration for the escrow node
//!
//! Layered with the `config` crate: built-in defaults, then an optional TOML
//! file, then `ASSET_ESCROW__*` environment variables
//! (e.g. `ASSET_ESCROW__ENGINE__CUSTODY_PARTY=vault`).

use crate::{error::EscrowError, models::PartyId, EscrowResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Configuration for the escrow engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowEngineConfig {
    /// Identity under which the engine holds custody of deposited assets
    pub custody_party: PartyId,
}

impl Default for EscrowEngineConfig {
    fn default() -> Self {
        Self {
            custody_party: PartyId::from("asset-escrow"),
        }
    }
}

/// Configuration for tracing output
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Configuration for the escrow node
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EscrowNodeConfig {
    /// Escrow engine configuration
    pub engine: EscrowEngineConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl EscrowNodeConfig {
    /// Prefix for environment overrides
    pub const ENV_PREFIX: &'static str = "ASSET_ESCROW";

    /// Load configuration from an optional TOML file and the environment
    pub fn load(path: Option<&Path>) -> EscrowResult<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(
                ::config::File::new(&path.to_string_lossy(), ::config::FileFormat::Toml).required(true),
            );
        }

        builder = builder.add_source(::config::Environment::with_prefix(Self::ENV_PREFIX).separator("__"));

        let loaded: Self = builder
            .build()
            .and_then(|settings| settings.try_deserialize())
            .map_err(|e| EscrowError::config(e.to_string()))?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Reject values the node cannot start with
    pub fn validate(&self) -> EscrowResult<()> {
        if self.engine.custody_party.as_str().trim().is_empty() {
            return Err(EscrowError::config("Custody party cannot be empty"));
        }

        if self.logging.level.trim().is_empty() {
            return Err(EscrowError::config("Log level cannot be empty"));
        }

        Ok(())
    }
}
