//! Ledger configuration with layered loading.
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: the `Default` implementations below
//! 2. **Config file**: TOML file named by `SURETY_CONFIG`, default `config/surety.toml`
//! 3. **Environment variables**: `SURETY__*`, nested with `__`
//!    (e.g. `SURETY__DRIVER__ORACLE_COUNT=30`)
//!
//! Amounts are configured in whole currency units and converted to the
//! smallest unit by the accessor methods.
//!
//! ```toml
//! funding_threshold_units = 10
//! registration_fee_units = 1
//! oracle_index_range = 10
//! min_responses = 3
//!
//! [driver]
//! oracle_count = 20
//! seed = 42
//! ```

use crate::types::{
    units, INDEXES_PER_ORACLE, MIN_RESPONSES, ORACLE_INDEX_RANGE,
};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const CONFIG_PATH_ENV: &str = "SURETY_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "config/surety.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Parameters of the ledger state machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Cumulative airline contribution (whole units) before it counts as funded
    pub funding_threshold_units: u64,
    /// Oracle registration fee (whole units)
    pub registration_fee_units: u64,
    /// Size of the index space oracles and requests are drawn from
    pub oracle_index_range: u8,
    /// Matching responses needed to finalize a flight status
    pub min_responses: usize,
    /// Off-chain oracle driver settings
    pub driver: DriverConfig,
    /// Log filter used by binaries when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        LedgerConfig {
            funding_threshold_units: 10,
            registration_fee_units: 1,
            oracle_index_range: ORACLE_INDEX_RANGE,
            min_responses: MIN_RESPONSES,
            driver: DriverConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

/// Simulated oracle fleet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Number of oracle accounts registered at startup
    pub oracle_count: usize,
    /// Seed for block entropy and status-code selection
    pub seed: u64,
    /// Address seed of the first oracle account; later accounts follow sequentially
    pub first_account: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        DriverConfig {
            oracle_count: 20,
            seed: 42,
            first_account: 1_000,
        }
    }
}

impl LedgerConfig {
    pub fn funding_threshold(&self) -> u128 {
        units(self.funding_threshold_units as u128)
    }

    pub fn registration_fee(&self) -> u128 {
        units(self.registration_fee_units as u128)
    }

    /// Reject settings the state machine cannot honour
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.funding_threshold_units == 0 {
            return Err(ConfigError::Invalid(
                "funding_threshold_units must be greater than 0".to_string(),
            ));
        }
        if self.registration_fee_units == 0 {
            return Err(ConfigError::Invalid(
                "registration_fee_units must be greater than 0".to_string(),
            ));
        }
        // each oracle needs INDEXES_PER_ORACLE distinct values
        if (self.oracle_index_range as usize) < INDEXES_PER_ORACLE {
            return Err(ConfigError::Invalid(format!(
                "oracle_index_range must be at least {}",
                INDEXES_PER_ORACLE
            )));
        }
        if self.min_responses == 0 {
            return Err(ConfigError::Invalid(
                "min_responses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Load defaults, then the given file if it exists, then `SURETY__*` overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let settings = Config::builder()
            .add_source(File::from(path.as_ref()).required(false))
            .add_source(
                Environment::with_prefix("SURETY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: LedgerConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// File `load` reads: `SURETY_CONFIG` if set, else `config/surety.toml`
    pub fn source_path() -> PathBuf {
        std::env::var_os(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load from `source_path()`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_file(Self::source_path())
    }
}
