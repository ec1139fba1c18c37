/// PAYOUT TRANSFER SEAM
///
/// `withdraw` hands the amount to a `PayoutSink` after the passenger's
/// balance has been zeroed. The sink receives the ledger itself so a
/// hostile recipient can call back in; such a call sees the zeroed balance.

use crate::flight_surety::FlightSurety;
use surety_core::Address;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PayoutError {
    #[error("Transfer rejected: {0}")]
    Rejected(String),
}

/// External fund-transfer collaborator
pub trait PayoutSink {
    fn send_payout(
        &mut self,
        ledger: &mut FlightSurety,
        to: Address,
        amount: u128,
    ) -> Result<(), PayoutError>;
}

/// Accepts every transfer and keeps a record of it
#[derive(Debug, Clone, Default)]
pub struct RecordingPayoutSink {
    pub transfers: Vec<(Address, u128)>,
}

impl RecordingPayoutSink {
    pub fn new() -> Self {
        RecordingPayoutSink {
            transfers: Vec::new(),
        }
    }

    pub fn total_paid(&self) -> u128 {
        self.transfers.iter().map(|(_, amount)| amount).sum()
    }
}

impl PayoutSink for RecordingPayoutSink {
    fn send_payout(
        &mut self,
        _ledger: &mut FlightSurety,
        to: Address,
        amount: u128,
    ) -> Result<(), PayoutError> {
        self.transfers.push((to, amount));
        Ok(())
    }
}
