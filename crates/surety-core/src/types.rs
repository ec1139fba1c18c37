/// LEDGER PRIMITIVES
///
/// Addresses, flight identities, status codes and the currency constants
/// shared by every component of the ledger. Amounts are expressed in the
/// smallest currency unit (wei), timestamps in seconds.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Smallest units per whole currency unit (18 decimals)
pub const UNIT: u128 = 1_000_000_000_000_000_000;

/// Cumulative airline contribution required before an airline may act
pub const FUNDING_THRESHOLD: u128 = 10 * UNIT;

/// Fee an oracle pays to register
pub const REGISTRATION_FEE: u128 = UNIT;

/// Number of index buckets oracles and requests are drawn from
pub const ORACLE_INDEX_RANGE: u8 = 10;

/// Matching responses required to finalize a flight status
pub const MIN_RESPONSES: usize = 3;

/// Registered-airline count at which admission switches to voting
pub const GOVERNANCE_VOTING_THRESHOLD: usize = 4;

/// Indexes held by every registered oracle
pub const INDEXES_PER_ORACLE: usize = 3;

/// Convert whole currency units into the smallest unit.
pub const fn units(whole: u128) -> u128 {
    whole * UNIT
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressParseError {
    #[error("Address must be 20 bytes, got {0}")]
    InvalidLength(usize),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
}

/// 20-byte account identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub const ZERO: Address = Address([0u8; 20]);

    /// Deterministic address whose trailing bytes encode `seed`.
    /// Used by simulations and tests to mint distinct accounts.
    pub fn from_seed(seed: u64) -> Self {
        let mut bytes = [0u8; 20];
        bytes[12..].copy_from_slice(&seed.to_be_bytes());
        Address(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({})", self)
    }
}

impl FromStr for Address {
    type Err = AddressParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(trimmed).map_err(|e| AddressParseError::InvalidHex(e.to_string()))?;
        let array: [u8; 20] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| AddressParseError::InvalidLength(bytes.len()))?;
        Ok(Address(array))
    }
}

/// Identity of a flight: (airline, designator, departure timestamp)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FlightKey {
    pub airline: Address,
    pub flight: String,
    pub timestamp: u64,
}

impl FlightKey {
    pub fn new(airline: Address, flight: impl Into<String>, timestamp: u64) -> Self {
        FlightKey {
            airline,
            flight: flight.into(),
            timestamp,
        }
    }
}

impl fmt::Display for FlightKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{} ({})", self.flight, self.timestamp, self.airline)
    }
}

/// Flight status reported by oracles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StatusCode {
    Unknown = 0,
    OnTime = 10,
    LateAirline = 20,
    LateWeather = 30,
    LateTechnical = 40,
    LateOther = 50,
}

impl StatusCode {
    /// Every code an oracle may report, in ascending order
    pub const ALL: [StatusCode; 6] = [
        StatusCode::Unknown,
        StatusCode::OnTime,
        StatusCode::LateAirline,
        StatusCode::LateWeather,
        StatusCode::LateTechnical,
        StatusCode::LateOther,
    ];

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Only delays attributed to the airline pay out
    pub fn triggers_payout(self) -> bool {
        matches!(self, StatusCode::LateAirline)
    }
}

impl TryFrom<u8> for StatusCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(StatusCode::Unknown),
            10 => Ok(StatusCode::OnTime),
            20 => Ok(StatusCode::LateAirline),
            30 => Ok(StatusCode::LateWeather),
            40 => Ok(StatusCode::LateTechnical),
            50 => Ok(StatusCode::LateOther),
            other => Err(other),
        }
    }
}

impl From<StatusCode> for u8 {
    fn from(code: StatusCode) -> u8 {
        code.code()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::OnTime => "ON_TIME",
            StatusCode::LateAirline => "LATE_AIRLINE",
            StatusCode::LateWeather => "LATE_WEATHER",
            StatusCode::LateTechnical => "LATE_TECHNICAL",
            StatusCode::LateOther => "LATE_OTHER",
        };
        write!(f, "{}({})", label, self.code())
    }
}
