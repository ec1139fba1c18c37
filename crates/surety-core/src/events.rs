/// LEDGER EVENTS
///
/// Facts emitted by successful mutations. External collaborators (the
/// oracle driver, UI refreshers) observe the ledger only through these
/// and the read-only queries.

use crate::types::{Address, FlightKey, StatusCode};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LedgerEvent {
    AirlineAdmitted {
        airline: Address,
        name: String,
    },
    AirlineVoted {
        candidate: Address,
        voter: Address,
        votes: usize,
        quorum: usize,
    },
    AirlineFunded {
        airline: Address,
        amount: u128,
        total: u128,
        funded: bool,
    },
    FlightRegistered {
        key: FlightKey,
    },
    InsurancePurchased {
        passenger: Address,
        key: FlightKey,
        premium: u128,
    },
    OracleRegistered {
        oracle: Address,
        indexes: [u8; 3],
    },
    /// Open request an oracle holding `index` may answer
    OracleRequest {
        index: u8,
        key: FlightKey,
    },
    OracleReport {
        oracle: Address,
        index: u8,
        key: FlightKey,
        status: StatusCode,
    },
    FlightStatusInfo {
        key: FlightKey,
        status: StatusCode,
    },
    InsureeCredited {
        passenger: Address,
        key: FlightKey,
        amount: u128,
    },
    PaymentWithdrawn {
        passenger: Address,
        amount: u128,
    },
    OperatingStatusChanged {
        operational: bool,
    },
}

impl LedgerEvent {
    /// Short name used in log lines
    pub fn name(&self) -> &'static str {
        match self {
            LedgerEvent::AirlineAdmitted { .. } => "airline_admitted",
            LedgerEvent::AirlineVoted { .. } => "airline_voted",
            LedgerEvent::AirlineFunded { .. } => "airline_funded",
            LedgerEvent::FlightRegistered { .. } => "flight_registered",
            LedgerEvent::InsurancePurchased { .. } => "insurance_purchased",
            LedgerEvent::OracleRegistered { .. } => "oracle_registered",
            LedgerEvent::OracleRequest { .. } => "oracle_request",
            LedgerEvent::OracleReport { .. } => "oracle_report",
            LedgerEvent::FlightStatusInfo { .. } => "flight_status_info",
            LedgerEvent::InsureeCredited { .. } => "insuree_credited",
            LedgerEvent::PaymentWithdrawn { .. } => "payment_withdrawn",
            LedgerEvent::OperatingStatusChanged { .. } => "operating_status_changed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_tag() {
        let event = LedgerEvent::OracleRequest {
            index: 7,
            key: FlightKey::new(Address::from_seed(1), "5J 814", 1_700_000_000),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "oracle_request");
        assert_eq!(json["index"], 7);
        assert_eq!(json["key"]["flight"], "5J 814");

        let back: LedgerEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_event_name_matches_tag() {
        let event = LedgerEvent::OperatingStatusChanged { operational: false };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
    }
}
