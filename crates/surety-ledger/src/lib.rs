/// SURETY LEDGER
///
/// The flight-delay insurance state machine:
/// - Airline admission with a quorum that tightens as the population grows
/// - Oracle index assignment and first-to-quorum status finalization
/// - Exactly-once crediting and checks-effects-interactions withdrawals
///
/// `FlightSurety` owns every component and is the only mutation surface.

pub mod address_registry;
pub mod airline_governance;
pub mod flight_registry;
pub mod index_source;
pub mod oracle_consensus;
pub mod insurance_ledger;
pub mod payout;
pub mod flight_surety;

pub use address_registry::{AddressRegistry, Airline, FundingReceipt, Oracle};
pub use airline_governance::{admission_quorum, AdmissionOutcome, AirlineGovernance, PendingAdmission};
pub use flight_registry::{Flight, FlightRegistry};
pub use index_source::{draw_distinct_indexes, IndexSource, KeccakIndexSource, ScriptedIndexSource};
pub use oracle_consensus::{
    ConsensusParams, OracleConsensus, RequestState, RequestTicket, ResponseOutcome, StatusRequest,
};
pub use insurance_ledger::{payout_for, Credit, InsuranceLedger, InsurancePolicy};
pub use payout::{PayoutError, PayoutSink, RecordingPayoutSink};
pub use flight_surety::FlightSurety;

pub use surety_core::{
    units, Address, FlightKey, LedgerConfig, LedgerError, LedgerEvent, LedgerResult, StatusCode,
};
