// FLIGHT SURETY LEDGER
// Single state machine over airlines, flights, oracles and pending payouts
//
// SAFETY INVARIANTS:
// 1. Every mutating call validates fully before its first write; a rejected
//    call leaves state and the event log untouched
// 2. Components only touch each other through the calls made here
// 3. Withdrawals zero the balance before the external transfer; a failed
//    transfer restores the whole ledger, including anything the sink did
// 4. While not operational, every mutation except the owner's switch is refused

use crate::address_registry::{AddressRegistry, FundingReceipt};
use crate::airline_governance::{admission_quorum, AdmissionOutcome, AirlineGovernance};
use crate::flight_registry::FlightRegistry;
use crate::index_source::{IndexSource, KeccakIndexSource};
use crate::insurance_ledger::InsuranceLedger;
use crate::oracle_consensus::{
    ConsensusParams, OracleConsensus, RequestTicket, ResponseOutcome, StatusRequest,
};
use crate::payout::PayoutSink;
use log::{debug, info, warn};
use surety_core::{
    Address, FlightKey, LedgerConfig, LedgerError, LedgerEvent, LedgerResult, StatusCode,
    INDEXES_PER_ORACLE,
};

pub struct FlightSurety {
    owner: Address,
    operational: bool,
    config: LedgerConfig,
    registry: AddressRegistry,
    governance: AirlineGovernance,
    flights: FlightRegistry,
    consensus: OracleConsensus,
    insurance: InsuranceLedger,
    /// Value held by the ledger: funding, premiums and fees minus payouts
    treasury: u128,
    index_source: Box<dyn IndexSource>,
    events: Vec<LedgerEvent>,
}

/// Ledger state captured before an external call
struct Checkpoint {
    operational: bool,
    registry: AddressRegistry,
    governance: AirlineGovernance,
    flights: FlightRegistry,
    consensus: OracleConsensus,
    insurance: InsuranceLedger,
    treasury: u128,
    index_source: Box<dyn IndexSource>,
    events: Vec<LedgerEvent>,
}

impl std::fmt::Debug for FlightSurety {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightSurety")
            .field("owner", &self.owner)
            .field("operational", &self.operational)
            .field("airlines", &self.registry.registered_airline_count())
            .field("oracles", &self.registry.oracle_count())
            .field("flights", &self.flights.len())
            .field("treasury", &self.treasury)
            .finish()
    }
}

impl FlightSurety {
    /// Deploy a ledger. `first_airline` is registered (unfunded) immediately.
    pub fn new(
        config: LedgerConfig,
        owner: Address,
        first_airline: Address,
        first_airline_name: &str,
        index_source: Box<dyn IndexSource>,
    ) -> Self {
        let mut registry = AddressRegistry::new(config.funding_threshold());
        let mut events = Vec::new();
        if registry
            .admit_airline(first_airline, first_airline_name.to_string())
            .is_ok()
        {
            events.push(LedgerEvent::AirlineAdmitted {
                airline: first_airline,
                name: first_airline_name.to_string(),
            });
        }

        info!(
            "Ledger deployed by {} with first airline {} ({})",
            owner, first_airline_name, first_airline
        );

        FlightSurety {
            owner,
            operational: true,
            consensus: OracleConsensus::new(ConsensusParams::from(&config)),
            config,
            registry,
            governance: AirlineGovernance::new(),
            flights: FlightRegistry::new(),
            insurance: InsuranceLedger::new(),
            treasury: 0,
            index_source,
            events,
        }
    }

    /// Deploy with the Keccak index source seeded from `config.driver.seed`
    pub fn with_config(
        config: LedgerConfig,
        owner: Address,
        first_airline: Address,
        first_airline_name: &str,
    ) -> Self {
        let source = KeccakIndexSource::from_seed(config.driver.seed);
        Self::new(config, owner, first_airline, first_airline_name, Box::new(source))
    }

    fn emit(&mut self, event: LedgerEvent) {
        self.events.push(event);
    }

    fn ensure_operational(&self) -> LedgerResult<()> {
        if self.operational {
            Ok(())
        } else {
            Err(LedgerError::NotOperational)
        }
    }

    fn credit_treasury(&self, amount: u128) -> LedgerResult<u128> {
        self.treasury.checked_add(amount).ok_or(LedgerError::Overflow)
    }

    fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            operational: self.operational,
            registry: self.registry.clone(),
            governance: self.governance.clone(),
            flights: self.flights.clone(),
            consensus: self.consensus.clone(),
            insurance: self.insurance.clone(),
            treasury: self.treasury,
            index_source: self.index_source.box_clone(),
            events: self.events.clone(),
        }
    }

    fn restore(&mut self, checkpoint: Checkpoint) {
        self.operational = checkpoint.operational;
        self.registry = checkpoint.registry;
        self.governance = checkpoint.governance;
        self.flights = checkpoint.flights;
        self.consensus = checkpoint.consensus;
        self.insurance = checkpoint.insurance;
        self.treasury = checkpoint.treasury;
        self.index_source = checkpoint.index_source;
        self.events = checkpoint.events;
    }

    // --- Operations ---

    /// Feed the entropy of a newly observed block to the index source.
    pub fn advance_block(&mut self, entropy: [u8; 32]) {
        debug!("Observed block entropy 0x{}", hex::encode(entropy));
        self.index_source.observe_block(entropy);
    }

    pub fn set_operating_status(&mut self, caller: Address, operational: bool) -> LedgerResult<()> {
        if caller != self.owner {
            return Err(LedgerError::Unauthorized(caller));
        }
        if self.operational != operational {
            self.operational = operational;
            warn!("Operating status set to {}", operational);
            self.emit(LedgerEvent::OperatingStatusChanged { operational });
        }
        Ok(())
    }

    /// Contribute `amount` to `caller`'s airline funding.
    pub fn fund(&mut self, caller: Address, amount: u128) -> LedgerResult<FundingReceipt> {
        self.ensure_operational()?;
        self.registry.preview_fund(&caller, amount)?;
        let treasury = self.credit_treasury(amount)?;

        let receipt = self.registry.fund(&caller, amount)?;
        self.treasury = treasury;
        self.emit(LedgerEvent::AirlineFunded {
            airline: caller,
            amount,
            total: receipt.total,
            funded: receipt.funded,
        });
        Ok(receipt)
    }

    pub fn propose_or_vote(
        &mut self,
        proposer: Address,
        candidate: Address,
        name: &str,
    ) -> LedgerResult<AdmissionOutcome> {
        self.ensure_operational()?;

        let outcome = self
            .governance
            .propose_or_vote(&mut self.registry, candidate, name, proposer)?;

        let (votes, quorum) = match outcome {
            AdmissionOutcome::Admitted { votes, quorum } | AdmissionOutcome::Pending { votes, quorum } => {
                (votes, quorum)
            }
        };
        self.emit(LedgerEvent::AirlineVoted {
            candidate,
            voter: proposer,
            votes,
            quorum,
        });
        if outcome.is_admitted() {
            let name = self
                .registry
                .airline_name(&candidate)
                .unwrap_or(name)
                .to_string();
            self.emit(LedgerEvent::AirlineAdmitted {
                airline: candidate,
                name,
            });
        }
        Ok(outcome)
    }

    pub fn register_flight(&mut self, caller: Address, key: FlightKey) -> LedgerResult<()> {
        self.ensure_operational()?;
        self.flights
            .register_flight(&self.registry, key.clone(), &caller)?;
        self.emit(LedgerEvent::FlightRegistered { key });
        Ok(())
    }

    pub fn buy_insurance(&mut self, passenger: Address, key: FlightKey, premium: u128) -> LedgerResult<()> {
        self.ensure_operational()?;
        self.insurance
            .preview_purchase(&self.flights, &passenger, &key, premium)?;
        let treasury = self.credit_treasury(premium)?;

        self.insurance
            .buy_insurance(&self.flights, passenger, key.clone(), premium)?;
        self.treasury = treasury;
        self.emit(LedgerEvent::InsurancePurchased {
            passenger,
            key,
            premium,
        });
        Ok(())
    }

    /// Register `caller` as an oracle, paying `fee`. Returns its indexes.
    pub fn register_oracle(&mut self, caller: Address, fee: u128) -> LedgerResult<[u8; INDEXES_PER_ORACLE]> {
        self.ensure_operational()?;
        self.consensus
            .preview_registration(&self.registry, &caller, fee)?;
        let treasury = self.credit_treasury(fee)?;

        let indexes = self.consensus.register_oracle(
            &mut self.registry,
            self.index_source.as_mut(),
            caller,
            fee,
        )?;
        self.treasury = treasury;
        self.emit(LedgerEvent::OracleRegistered {
            oracle: caller,
            indexes,
        });
        Ok(indexes)
    }

    /// Ask the oracle network for a flight's status.
    pub fn fetch_status(&mut self, caller: Address, key: FlightKey) -> LedgerResult<RequestTicket> {
        self.ensure_operational()?;
        let ticket = self.consensus.open_request(
            &self.flights,
            self.index_source.as_mut(),
            caller,
            key.clone(),
        )?;
        if ticket.newly_opened {
            self.emit(LedgerEvent::OracleRequest {
                index: ticket.index,
                key,
            });
        }
        Ok(ticket)
    }

    /// Record an oracle's report. The report that completes the quorum also
    /// resolves the flight and credits its insured passengers.
    pub fn submit_response(
        &mut self,
        oracle: Address,
        index: u8,
        key: FlightKey,
        status: u8,
    ) -> LedgerResult<ResponseOutcome> {
        self.ensure_operational()?;
        let status = StatusCode::try_from(status).map_err(LedgerError::InvalidStatusCode)?;

        let outcome = self
            .consensus
            .preview_response(&self.registry, &oracle, index, &key, status)?;
        if let ResponseOutcome::Finalized(code) = outcome {
            self.flights.ensure_registered(&key)?;
            self.insurance.preview_credit(&key, code)?;
        }

        self.consensus.submit_response(
            &self.registry,
            &mut self.flights,
            oracle,
            index,
            &key,
            status,
        )?;
        self.emit(LedgerEvent::OracleReport {
            oracle,
            index,
            key: key.clone(),
            status,
        });

        if let ResponseOutcome::Finalized(code) = outcome {
            let credits = self.insurance.on_status_finalized(&key, code)?;
            self.emit(LedgerEvent::FlightStatusInfo {
                key: key.clone(),
                status: code,
            });
            for credit in credits {
                self.emit(LedgerEvent::InsureeCredited {
                    passenger: credit.passenger,
                    key: key.clone(),
                    amount: credit.amount,
                });
            }
        }

        Ok(outcome)
    }

    /// Pay out a passenger's pending balance through `sink`.
    ///
    /// The balance is zeroed before `sink` runs. If the sink fails the ledger
    /// returns to its state before the call and the call fails with
    /// `PayoutFailed`.
    pub fn withdraw(&mut self, passenger: Address, sink: &mut dyn PayoutSink) -> LedgerResult<u128> {
        self.ensure_operational()?;

        let balance = self.insurance.pending_payment(&passenger);
        if balance == 0 {
            return Err(LedgerError::NoFunds(passenger));
        }
        if self.treasury < balance {
            return Err(LedgerError::InsufficientFunds {
                required: balance,
                available: self.treasury,
            });
        }

        let checkpoint = self.checkpoint();

        // effects
        let amount = self.insurance.withdraw(&passenger)?;
        self.treasury -= amount;

        // interaction
        if let Err(e) = sink.send_payout(self, passenger, amount) {
            self.restore(checkpoint);
            warn!("Payout of {} to {} failed: {}", amount, passenger, e);
            return Err(LedgerError::PayoutFailed {
                to: passenger,
                reason: e.to_string(),
            });
        }

        info!("Paid {} to {}", amount, passenger);
        self.emit(LedgerEvent::PaymentWithdrawn { passenger, amount });
        Ok(amount)
    }

    // --- Queries ---

    pub fn owner(&self) -> Address {
        self.owner
    }

    pub fn is_operational(&self) -> bool {
        self.operational
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn treasury(&self) -> u128 {
        self.treasury
    }

    pub fn is_airline(&self, address: &Address) -> bool {
        self.registry.is_airline(address)
    }

    pub fn is_funded(&self, address: &Address) -> bool {
        self.registry.is_funded(address)
    }

    pub fn airline_name(&self, address: &Address) -> Option<&str> {
        self.registry.airline_name(address)
    }

    pub fn registered_airline_count(&self) -> usize {
        self.registry.registered_airline_count()
    }

    /// Votes the next admission needs at the current population
    pub fn current_quorum(&self) -> usize {
        admission_quorum(self.registry.registered_airline_count())
    }

    pub fn pending_votes(&self, candidate: &Address) -> usize {
        self.governance.pending_votes(candidate)
    }

    pub fn is_oracle_registered(&self, address: &Address) -> bool {
        self.registry.is_oracle(address)
    }

    pub fn get_oracle_indexes(&self, address: &Address) -> Option<[u8; INDEXES_PER_ORACLE]> {
        self.registry.oracle_indexes(address)
    }

    pub fn is_flight_registered(&self, key: &FlightKey) -> bool {
        self.flights.is_registered(key)
    }

    pub fn get_flight_status(&self, key: &FlightKey) -> Option<StatusCode> {
        self.flights.status(key)
    }

    pub fn status_request(&self, key: &FlightKey) -> Option<&StatusRequest> {
        self.consensus.request(key)
    }

    pub fn open_requests(&self) -> impl Iterator<Item = &StatusRequest> {
        self.consensus.open_requests()
    }

    pub fn is_insured(&self, passenger: &Address, key: &FlightKey) -> bool {
        self.insurance.is_insured(passenger, key)
    }

    pub fn is_credited(&self, passenger: &Address, key: &FlightKey) -> bool {
        self.insurance
            .policy(passenger, key)
            .map(|p| p.is_credited)
            .unwrap_or(false)
    }

    pub fn get_pending_payment(&self, passenger: &Address) -> u128 {
        self.insurance.pending_payment(passenger)
    }

    pub fn events(&self) -> &[LedgerEvent] {
        &self.events
    }

    pub fn drain_events(&mut self) -> Vec<LedgerEvent> {
        std::mem::take(&mut self.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index_source::ScriptedIndexSource;
    use crate::payout::{PayoutError, RecordingPayoutSink};
    use surety_core::{units, UNIT};

    const OWNER: u64 = 0;
    const FIRST_AIRLINE: u64 = 1;

    fn ledger() -> FlightSurety {
        FlightSurety::new(
            LedgerConfig::default(),
            Address::from_seed(OWNER),
            Address::from_seed(FIRST_AIRLINE),
            "Kenya Airways",
            Box::new(ScriptedIndexSource::new(vec![3, 5, 7])),
        )
    }

    #[test]
    fn test_first_airline_registered_at_deploy() {
        let ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        assert!(ledger.is_airline(&first));
        assert!(!ledger.is_funded(&first));
        assert_eq!(ledger.airline_name(&first), Some("Kenya Airways"));
        assert!(ledger.is_operational());
        assert_eq!(
            ledger.events(),
            &[LedgerEvent::AirlineAdmitted { airline: first, name: "Kenya Airways".to_string() }]
        );
    }

    #[test]
    fn test_unfunded_airline_cannot_admit() {
        let mut ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        let candidate = Address::from_seed(2);

        assert_eq!(
            ledger.propose_or_vote(first, candidate, "Ugandan Airways"),
            Err(LedgerError::NotFunded(first))
        );

        ledger.fund(first, units(10)).unwrap();
        assert!(ledger
            .propose_or_vote(first, candidate, "Ugandan Airways")
            .unwrap()
            .is_admitted());
        assert!(ledger.is_airline(&candidate));
        assert_eq!(ledger.treasury(), units(10));
    }

    #[test]
    fn test_operating_status_gate() {
        let mut ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        let stranger = Address::from_seed(77);

        assert_eq!(
            ledger.set_operating_status(stranger, false),
            Err(LedgerError::Unauthorized(stranger))
        );
        assert!(ledger.is_operational());

        ledger.set_operating_status(Address::from_seed(OWNER), false).unwrap();
        assert_eq!(ledger.fund(first, units(10)), Err(LedgerError::NotOperational));
        assert_eq!(ledger.register_oracle(stranger, UNIT), Err(LedgerError::NotOperational));
        assert!(!ledger.is_funded(&first));

        ledger.set_operating_status(Address::from_seed(OWNER), true).unwrap();
        assert!(ledger.fund(first, units(10)).is_ok());
    }

    #[test]
    fn test_rejected_call_emits_nothing() {
        let mut ledger = ledger();
        ledger.drain_events();
        let first = Address::from_seed(FIRST_AIRLINE);
        let key = FlightKey::new(first, "5J 814", 1);

        assert!(ledger.register_flight(first, key.clone()).is_err());
        assert!(ledger.buy_insurance(Address::from_seed(9), key.clone(), UNIT).is_err());
        assert!(ledger.register_oracle(Address::from_seed(9), UNIT / 2).is_err());
        assert!(ledger.fetch_status(Address::from_seed(9), key).is_err());
        assert!(ledger.events().is_empty());
        assert_eq!(ledger.treasury(), 0);
    }

    #[test]
    fn test_invalid_status_code() {
        let mut ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        let key = FlightKey::new(first, "5J 814", 1);
        assert_eq!(
            ledger.submit_response(Address::from_seed(9), 3, key, 25),
            Err(LedgerError::InvalidStatusCode(25))
        );
    }

    struct FailingSink;

    impl PayoutSink for FailingSink {
        fn send_payout(&mut self, _ledger: &mut FlightSurety, _to: Address, _amount: u128) -> Result<(), PayoutError> {
            Err(PayoutError::Rejected("recipient refused".to_string()))
        }
    }

    /// Mutates the ledger through the handle, then refuses the transfer
    struct MeddlingSink {
        flight: FlightKey,
    }

    impl PayoutSink for MeddlingSink {
        fn send_payout(&mut self, ledger: &mut FlightSurety, _to: Address, _amount: u128) -> Result<(), PayoutError> {
            let newcomer = Address::from_seed(900);
            let _ = ledger.buy_insurance(newcomer, self.flight.clone(), UNIT);
            let _ = ledger.register_oracle(Address::from_seed(901), UNIT);
            let _ = ledger.fund(Address::from_seed(FIRST_AIRLINE), UNIT);
            ledger.drain_events();
            Err(PayoutError::Rejected("refused after meddling".to_string()))
        }
    }

    fn ledger_with_credit(passenger: Address) -> (FlightSurety, FlightKey) {
        let mut ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        let key = FlightKey::new(first, "5J 814", 1);

        ledger.fund(first, units(10)).unwrap();
        ledger.register_flight(first, key.clone()).unwrap();
        ledger.buy_insurance(passenger, key.clone(), UNIT).unwrap();
        for i in 0..3 {
            ledger.register_oracle(Address::from_seed(100 + i), UNIT).unwrap();
        }
        let ticket = ledger.fetch_status(passenger, key.clone()).unwrap();
        for i in 0..3 {
            ledger
                .submit_response(Address::from_seed(100 + i), ticket.index, key.clone(), StatusCode::LateAirline.code())
                .unwrap();
        }
        (ledger, key)
    }

    #[test]
    fn test_failed_payout_undoes_sink_side_effects() {
        let passenger = Address::from_seed(200);
        let (mut ledger, key) = ledger_with_credit(passenger);
        let treasury = ledger.treasury();
        let events = ledger.events().to_vec();
        let funding = ledger.registry.funding_amount(&Address::from_seed(FIRST_AIRLINE));

        let mut sink = MeddlingSink { flight: key.clone() };
        assert!(matches!(
            ledger.withdraw(passenger, &mut sink),
            Err(LedgerError::PayoutFailed { .. })
        ));

        assert!(!ledger.is_insured(&Address::from_seed(900), &key));
        assert!(!ledger.is_oracle_registered(&Address::from_seed(901)));
        assert_eq!(ledger.registry.funding_amount(&Address::from_seed(FIRST_AIRLINE)), funding);
        assert_eq!(ledger.treasury(), treasury);
        assert_eq!(ledger.events(), events.as_slice());
        assert_eq!(ledger.get_pending_payment(&passenger), UNIT * 3 / 2);
    }

    #[test]
    fn test_block_entropy_reaches_index_source() {
        let config = LedgerConfig::default();
        let first = Address::from_seed(FIRST_AIRLINE);
        let mut steady = FlightSurety::with_config(config.clone(), Address::from_seed(OWNER), first, "Kenya Airways");
        let mut moved = FlightSurety::with_config(config, Address::from_seed(OWNER), first, "Kenya Airways");
        moved.advance_block([7u8; 32]);

        let drawn = |ledger: &mut FlightSurety| -> Vec<[u8; 3]> {
            (0..8)
                .map(|i| ledger.register_oracle(Address::from_seed(300 + i), UNIT).unwrap())
                .collect()
        };
        assert_ne!(drawn(&mut steady), drawn(&mut moved));
    }

    #[test]
    fn test_failed_payout_restores_balance() {
        let mut ledger = ledger();
        let first = Address::from_seed(FIRST_AIRLINE);
        let passenger = Address::from_seed(200);
        let key = FlightKey::new(first, "5J 814", 1);

        ledger.fund(first, units(10)).unwrap();
        ledger.register_flight(first, key.clone()).unwrap();
        ledger.buy_insurance(passenger, key.clone(), UNIT).unwrap();
        let oracles: Vec<Address> = (0..3).map(|i| Address::from_seed(100 + i)).collect();
        for oracle in &oracles {
            ledger.register_oracle(*oracle, UNIT).unwrap();
        }
        let ticket = ledger.fetch_status(passenger, key.clone()).unwrap();
        for oracle in &oracles {
            ledger
                .submit_response(*oracle, ticket.index, key.clone(), StatusCode::LateAirline.code())
                .unwrap();
        }
        let treasury = ledger.treasury();

        assert!(matches!(
            ledger.withdraw(passenger, &mut FailingSink),
            Err(LedgerError::PayoutFailed { .. })
        ));
        assert_eq!(ledger.get_pending_payment(&passenger), UNIT * 3 / 2);
        assert_eq!(ledger.treasury(), treasury);

        let mut sink = RecordingPayoutSink::new();
        assert_eq!(ledger.withdraw(passenger, &mut sink), Ok(UNIT * 3 / 2));
        assert_eq!(sink.transfers, vec![(passenger, UNIT * 3 / 2)]);
        assert_eq!(ledger.treasury(), treasury - UNIT * 3 / 2);
    }
}
