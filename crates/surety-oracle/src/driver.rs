// ORACLE DRIVER
// Off-chain fleet that registers oracle accounts and answers status requests
//
// SAFETY INVARIANTS:
// 1. Only oracles holding a request's index respond to it
// 2. Each oracle responds at most once per request handled
// 3. A RequestClosed rejection ends submissions for that request
// 4. The driver never mutates the ledger except through its public operations

use crate::policy::StatusPolicy;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use surety_core::{
    Address, DriverConfig, FlightKey, LedgerError, LedgerEvent, StatusCode, INDEXES_PER_ORACLE,
};
use surety_ledger::{FlightSurety, ResponseOutcome};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DriverError {
    #[error("Oracle {oracle} could not register: {source}")]
    Registration {
        oracle: Address,
        #[source]
        source: LedgerError,
    },
}

pub type DriverResult<T> = Result<T, DriverError>;

/// What one pass over the requests achieved
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriverReport {
    /// Requests handled
    pub requests_seen: usize,
    /// Responses the ledger accepted
    pub responses_accepted: usize,
    /// Responses rejected for reasons other than a closed request
    pub responses_rejected: usize,
    /// Flights whose status was finalized during this pass
    pub finalized: Vec<(FlightKey, StatusCode)>,
}

pub struct OracleDriver {
    policy: Box<dyn StatusPolicy>,
    oracles: BTreeMap<Address, [u8; INDEXES_PER_ORACLE]>,
}

impl std::fmt::Debug for OracleDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OracleDriver")
            .field("oracles", &self.oracles.len())
            .finish()
    }
}

impl OracleDriver {
    pub fn new(policy: Box<dyn StatusPolicy>) -> Self {
        OracleDriver {
            policy,
            oracles: BTreeMap::new(),
        }
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.len()
    }

    pub fn indexes_of(&self, oracle: &Address) -> Option<[u8; INDEXES_PER_ORACLE]> {
        self.oracles.get(oracle).copied()
    }

    /// Oracles in the fleet holding `index`, in address order
    pub fn holders_of(&self, index: u8) -> Vec<Address> {
        self.oracles
            .iter()
            .filter(|(_, indexes)| indexes.contains(&index))
            .map(|(oracle, _)| *oracle)
            .collect()
    }

    /// Register `config.oracle_count` accounts starting at `config.first_account`,
    /// each paying `fee`. Accounts the ledger already knows are adopted with
    /// their existing indexes.
    pub fn register_fleet(
        &mut self,
        ledger: &mut FlightSurety,
        config: &DriverConfig,
        fee: u128,
    ) -> DriverResult<usize> {
        for offset in 0..config.oracle_count as u64 {
            let oracle = Address::from_seed(config.first_account + offset);
            match ledger.register_oracle(oracle, fee) {
                Ok(indexes) => {
                    debug!("Fleet oracle {} holds {:?}", oracle, indexes);
                    self.oracles.insert(oracle, indexes);
                }
                Err(LedgerError::AlreadyRegistered(_)) => {
                    if let Some(indexes) = ledger.get_oracle_indexes(&oracle) {
                        self.oracles.insert(oracle, indexes);
                    }
                }
                Err(source) => return Err(DriverError::Registration { oracle, source }),
            }
        }

        info!("Oracle fleet ready with {} oracles", self.oracles.len());
        Ok(self.oracles.len())
    }

    /// Answer every OracleRequest in `events`.
    pub fn respond_to(&mut self, ledger: &mut FlightSurety, events: &[LedgerEvent]) -> DriverReport {
        let mut report = DriverReport::default();

        for event in events {
            if let LedgerEvent::OracleRequest { index, key } = event {
                report.requests_seen += 1;
                self.answer(ledger, *index, key, &mut report);
            }
        }

        report
    }

    /// Drain the ledger's events, answer the requests among them and return
    /// the drained events alongside the report.
    pub fn poll(&mut self, ledger: &mut FlightSurety) -> (Vec<LedgerEvent>, DriverReport) {
        let events = ledger.drain_events();
        let report = self.respond_to(ledger, &events);
        (events, report)
    }

    /// Answer every request the ledger still has open, whether or not its
    /// OracleRequest event was seen.
    pub fn sweep(&mut self, ledger: &mut FlightSurety) -> DriverReport {
        let open: Vec<(u8, FlightKey)> = ledger
            .open_requests()
            .map(|request| (request.index, request.key.clone()))
            .collect();

        let mut report = DriverReport::default();
        for (index, key) in open {
            report.requests_seen += 1;
            self.answer(ledger, index, &key, &mut report);
        }
        report
    }

    fn answer(&mut self, ledger: &mut FlightSurety, index: u8, key: &FlightKey, report: &mut DriverReport) {
        let holders = self.holders_of(index);
        if holders.is_empty() {
            warn!("No fleet oracle holds index {} requested for {}", index, key);
            return;
        }

        for oracle in holders {
            let status = self.policy.choose(&oracle, key);
            match ledger.submit_response(oracle, index, key.clone(), status.code()) {
                Ok(ResponseOutcome::Finalized(code)) => {
                    report.responses_accepted += 1;
                    report.finalized.push((key.clone(), code));
                    info!("Fleet finalized {} as {}", key, code);
                }
                Ok(ResponseOutcome::Recorded { .. }) => {
                    report.responses_accepted += 1;
                }
                Err(LedgerError::RequestClosed { .. }) => {
                    debug!("Request for {} on index {} is closed", key, index);
                    break;
                }
                Err(e) => {
                    report.responses_rejected += 1;
                    warn!("Response from {} for {} rejected: {}", oracle, key, e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::{FixedPolicy, UniformRandomPolicy};
    use surety_core::{units, LedgerConfig};
    use surety_ledger::ScriptedIndexSource;

    fn ledger_with_flight() -> (FlightSurety, FlightKey) {
        let airline = Address::from_seed(1);
        let mut ledger = FlightSurety::new(
            LedgerConfig::default(),
            Address::from_seed(0),
            airline,
            "Kenya Airways",
            Box::new(ScriptedIndexSource::new(vec![3, 5, 7])),
        );
        ledger.fund(airline, units(10)).unwrap();
        let key = FlightKey::new(airline, "5J 814", 1_700_000_000);
        ledger.register_flight(airline, key.clone()).unwrap();
        (ledger, key)
    }

    fn fleet(count: usize) -> DriverConfig {
        DriverConfig {
            oracle_count: count,
            seed: 42,
            first_account: 1_000,
        }
    }

    #[test]
    fn test_register_fleet() {
        let (mut ledger, _) = ledger_with_flight();
        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::OnTime)));

        assert_eq!(driver.register_fleet(&mut ledger, &fleet(5), units(1)), Ok(5));
        assert_eq!(driver.indexes_of(&Address::from_seed(1_000)), Some([3, 5, 7]));
        assert_eq!(driver.holders_of(3).len(), 5);
        assert!(driver.holders_of(4).is_empty());

        // rerun adopts the existing registrations
        let mut again = OracleDriver::new(Box::new(FixedPolicy(StatusCode::OnTime)));
        assert_eq!(again.register_fleet(&mut ledger, &fleet(5), units(1)), Ok(5));
    }

    #[test]
    fn test_register_fleet_underpaid() {
        let (mut ledger, _) = ledger_with_flight();
        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::OnTime)));

        let err = driver
            .register_fleet(&mut ledger, &fleet(2), units(1) / 2)
            .unwrap_err();
        assert!(matches!(
            err,
            DriverError::Registration { source: LedgerError::InsufficientFee { .. }, .. }
        ));
        assert_eq!(driver.oracle_count(), 0);
    }

    #[test]
    fn test_fixed_policy_finalizes_and_stops() {
        let (mut ledger, key) = ledger_with_flight();
        let passenger = Address::from_seed(500);
        ledger.buy_insurance(passenger, key.clone(), units(1)).unwrap();

        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::LateAirline)));
        driver.register_fleet(&mut ledger, &fleet(6), units(1)).unwrap();
        ledger.fetch_status(passenger, key.clone()).unwrap();

        let (events, report) = driver.poll(&mut ledger);
        assert!(events
            .iter()
            .any(|e| matches!(e, LedgerEvent::OracleRequest { index: 3, .. })));

        assert_eq!(report.requests_seen, 1);
        // the fourth holder hits a closed request and the rest are skipped
        assert_eq!(report.responses_accepted, 3);
        assert_eq!(report.responses_rejected, 0);
        assert_eq!(report.finalized, vec![(key.clone(), StatusCode::LateAirline)]);

        assert_eq!(ledger.get_flight_status(&key), Some(StatusCode::LateAirline));
        assert_eq!(ledger.get_pending_payment(&passenger), units(3) / 2);
    }

    #[test]
    fn test_replayed_request_is_closed() {
        let (mut ledger, key) = ledger_with_flight();
        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::OnTime)));
        driver.register_fleet(&mut ledger, &fleet(3), units(1)).unwrap();
        ledger.fetch_status(Address::from_seed(9), key.clone()).unwrap();

        let (events, first) = driver.poll(&mut ledger);
        assert_eq!(first.finalized.len(), 1);

        let replay = driver.respond_to(&mut ledger, &events);
        assert_eq!(replay.requests_seen, 1);
        assert_eq!(replay.responses_accepted, 0);
        assert!(replay.finalized.is_empty());
    }

    #[test]
    fn test_sweep_answers_requests_whose_events_were_drained() {
        let (mut ledger, key) = ledger_with_flight();
        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::LateWeather)));
        driver.register_fleet(&mut ledger, &fleet(3), units(1)).unwrap();
        ledger.fetch_status(Address::from_seed(9), key.clone()).unwrap();
        ledger.drain_events();

        let (_, missed) = driver.poll(&mut ledger);
        assert_eq!(missed.requests_seen, 0);
        assert!(ledger.status_request(&key).unwrap().is_open());

        let report = driver.sweep(&mut ledger);
        assert_eq!(report.requests_seen, 1);
        assert_eq!(report.finalized, vec![(key.clone(), StatusCode::LateWeather)]);
        assert_eq!(ledger.open_requests().count(), 0);
        assert_eq!(driver.sweep(&mut ledger), DriverReport::default());
    }

    #[test]
    fn test_random_policy_never_double_counts() {
        let (mut ledger, key) = ledger_with_flight();
        let mut driver = OracleDriver::new(Box::new(UniformRandomPolicy::from_seed(42)));
        driver.register_fleet(&mut ledger, &fleet(20), units(1)).unwrap();
        ledger.fetch_status(Address::from_seed(9), key.clone()).unwrap();

        let (_, report) = driver.poll(&mut ledger);
        assert!(report.responses_accepted <= 20);
        assert!(report.finalized.len() <= 1);

        let request = ledger.status_request(&key).unwrap();
        let recorded: usize = StatusCode::ALL.iter().map(|c| request.votes_for(*c)).sum();
        assert_eq!(recorded, report.responses_accepted);
        if let Some((_, code)) = report.finalized.first() {
            assert_eq!(request.votes_for(*code), 3);
            assert_eq!(ledger.get_flight_status(&key), Some(*code));
        }
    }
}
