// === Shared primitives ===
pub mod types;
pub mod error;
pub mod events;

// === Configuration ===
pub mod config;

pub use types::{
    units, Address, AddressParseError, FlightKey, StatusCode, FUNDING_THRESHOLD,
    GOVERNANCE_VOTING_THRESHOLD, INDEXES_PER_ORACLE, MIN_RESPONSES, ORACLE_INDEX_RANGE,
    REGISTRATION_FEE, UNIT,
};
pub use error::{LedgerError, LedgerResult};
pub use events::LedgerEvent;
pub use crate::config::{ConfigError, DriverConfig, LedgerConfig};
