// LEDGER ERROR TAXONOMY
//
// Every variant is a synchronous rejection of the triggering call.
// A call that returns one of these has left the ledger untouched.

use crate::types::{Address, FlightKey};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("Insufficient funds: need {required}, available {available}")]
    InsufficientFunds { required: u128, available: u128 },

    #[error("Address {0} is not a funded airline")]
    NotFunded(Address),

    #[error("Address {0} is not a registered airline")]
    NotAirline(Address),

    #[error("{voter} already voted for candidate {candidate}")]
    DuplicateVote { candidate: Address, voter: Address },

    #[error("Address {0} is already registered")]
    AlreadyRegistered(Address),

    #[error("Flight {0} is already registered")]
    DuplicateFlight(FlightKey),

    #[error("Flight {0} is not registered")]
    UnknownFlight(FlightKey),

    #[error("Registration fee too low: paid {paid}, required {required}")]
    InsufficientFee { paid: u128, required: u128 },

    #[error("Oracle {oracle} does not hold index {index}")]
    NotEligible { oracle: Address, index: u8 },

    #[error("No open status request for index {index} on flight {key}")]
    RequestClosed { index: u8, key: FlightKey },

    #[error("Oracle {oracle} already responded with index {index} on flight {key}")]
    DuplicateResponse {
        oracle: Address,
        index: u8,
        key: FlightKey,
    },

    #[error("Passenger {passenger} already insured flight {key}")]
    DuplicatePolicy { passenger: Address, key: FlightKey },

    #[error("Insurance premium must be greater than zero")]
    ZeroPremium,

    #[error("No pending payment for {0}")]
    NoFunds(Address),

    #[error("Status code {0} is not a recognised flight status")]
    InvalidStatusCode(u8),

    #[error("Ledger is not operational")]
    NotOperational,

    #[error("Caller {0} is not authorized")]
    Unauthorized(Address),

    #[error("Payout transfer to {to} failed: {reason}")]
    PayoutFailed { to: Address, reason: String },

    #[error("Invalid consensus parameters: {0}")]
    InvalidParams(String),

    #[error("Arithmetic overflow")]
    Overflow,
}

pub type LedgerResult<T> = Result<T, LedgerError>;
