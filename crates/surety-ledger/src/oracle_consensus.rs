// ORACLE CONSENSUS
// Aggregates independent oracle reports into one finalized flight status
//
// SAFETY INVARIANTS:
// 1. Every oracle holds three pairwise-distinct indexes, assigned once
// 2. One request per flight key: NoRequest -> Open -> Finalized
// 3. Only oracles holding the request's index may answer it
// 4. An oracle answers a given (index, flight) lookup key at most once
// 5. The first status code to collect `min_responses` reports wins
// 6. A finalized request rejects every further report
//
// Index collisions across oracles are expected: redundancy among the holders
// of a bucket is what produces agreement.

use crate::address_registry::AddressRegistry;
use crate::flight_registry::FlightRegistry;
use crate::index_source::{draw_distinct_indexes, IndexSource};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use surety_core::{
    Address, FlightKey, LedgerConfig, LedgerError, LedgerResult, StatusCode, INDEXES_PER_ORACLE,
};

/// Tunables of the consensus round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusParams {
    pub registration_fee: u128,
    pub index_range: u8,
    pub min_responses: usize,
}

impl From<&LedgerConfig> for ConsensusParams {
    fn from(config: &LedgerConfig) -> Self {
        ConsensusParams {
            registration_fee: config.registration_fee(),
            index_range: config.oracle_index_range,
            min_responses: config.min_responses,
        }
    }
}

impl ConsensusParams {
    /// Reject parameters no request could be served under
    pub fn validate(&self) -> LedgerResult<()> {
        if (self.index_range as usize) < INDEXES_PER_ORACLE {
            return Err(LedgerError::InvalidParams(format!(
                "index range {} cannot hold {} distinct indexes",
                self.index_range, INDEXES_PER_ORACLE
            )));
        }
        if self.min_responses == 0 {
            return Err(LedgerError::InvalidParams(
                "min_responses must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ConsensusParams {
    fn default() -> Self {
        ConsensusParams::from(&LedgerConfig::default())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestState {
    Open,
    Finalized(StatusCode),
}

/// Status request for one flight
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusRequest {
    pub key: FlightKey,
    /// Bucket whose holders may answer
    pub index: u8,
    pub requester: Address,
    pub state: RequestState,
    /// Status code -> oracles that reported it
    pub responses: BTreeMap<StatusCode, BTreeSet<Address>>,
    /// (oracle, index) pairs that already answered
    responders: BTreeSet<(Address, u8)>,
}

impl StatusRequest {
    pub fn is_open(&self) -> bool {
        matches!(self.state, RequestState::Open)
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.state, RequestState::Finalized(_))
    }

    pub fn finalized_status(&self) -> Option<StatusCode> {
        match self.state {
            RequestState::Finalized(code) => Some(code),
            RequestState::Open => None,
        }
    }

    pub fn votes_for(&self, code: StatusCode) -> usize {
        self.responses.get(&code).map(|s| s.len()).unwrap_or(0)
    }

    pub fn has_responded(&self, oracle: &Address, index: u8) -> bool {
        self.responders.contains(&(*oracle, index))
    }
}

/// Handle returned by `open_request`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestTicket {
    pub index: u8,
    /// False when the call joined an already open request
    pub newly_opened: bool,
}

/// Effect of an accepted oracle report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseOutcome {
    /// Report counted, quorum not reached
    Recorded { status: StatusCode, votes: usize },
    /// This report made `status` the flight's final status
    Finalized(StatusCode),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConsensus {
    params: ConsensusParams,
    requests: BTreeMap<FlightKey, StatusRequest>,
}

impl OracleConsensus {
    pub fn new(params: ConsensusParams) -> Self {
        OracleConsensus {
            params,
            requests: BTreeMap::new(),
        }
    }

    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    pub fn request(&self, key: &FlightKey) -> Option<&StatusRequest> {
        self.requests.get(key)
    }

    pub fn open_requests(&self) -> impl Iterator<Item = &StatusRequest> {
        self.requests.values().filter(|r| r.is_open())
    }

    // --- Registration ---

    pub fn preview_registration(
        &self,
        registry: &AddressRegistry,
        caller: &Address,
        fee: u128,
    ) -> LedgerResult<()> {
        self.params.validate()?;
        if fee < self.params.registration_fee {
            return Err(LedgerError::InsufficientFee {
                paid: fee,
                required: self.params.registration_fee,
            });
        }
        if registry.is_oracle(caller) {
            return Err(LedgerError::AlreadyRegistered(*caller));
        }
        Ok(())
    }

    /// Register `caller` as an oracle and assign its indexes.
    pub fn register_oracle(
        &self,
        registry: &mut AddressRegistry,
        source: &mut dyn IndexSource,
        caller: Address,
        fee: u128,
    ) -> LedgerResult<[u8; INDEXES_PER_ORACLE]> {
        self.preview_registration(registry, &caller, fee)?;

        let indexes = draw_distinct_indexes(source, &caller, self.params.index_range)
            .ok_or_else(|| LedgerError::InvalidParams(format!("index range {}", self.params.index_range)))?;
        registry.enroll_oracle(caller, indexes)?;

        info!("Oracle {} registered with indexes {:?}", caller, indexes);
        Ok(indexes)
    }

    // --- Requests ---

    pub fn preview_open(&self, flights: &FlightRegistry, key: &FlightKey) -> LedgerResult<Option<u8>> {
        self.params.validate()?;
        flights.ensure_registered(key)?;

        match self.requests.get(key) {
            Some(request) if request.is_open() => Ok(Some(request.index)),
            Some(request) => Err(LedgerError::RequestClosed {
                index: request.index,
                key: key.clone(),
            }),
            None => Ok(None),
        }
    }

    /// Open a status request for a registered flight.
    ///
    /// Joining an open request returns its existing index; a finalized
    /// flight cannot be asked again.
    pub fn open_request(
        &mut self,
        flights: &FlightRegistry,
        source: &mut dyn IndexSource,
        caller: Address,
        key: FlightKey,
    ) -> LedgerResult<RequestTicket> {
        if let Some(index) = self.preview_open(flights, &key)? {
            return Ok(RequestTicket {
                index,
                newly_opened: false,
            });
        }

        let index = source.next_index(&caller, self.params.index_range);
        info!("Status request opened for {} on index {}", key, index);

        self.requests.insert(
            key.clone(),
            StatusRequest {
                key,
                index,
                requester: caller,
                state: RequestState::Open,
                responses: BTreeMap::new(),
                responders: BTreeSet::new(),
            },
        );

        Ok(RequestTicket {
            index,
            newly_opened: true,
        })
    }

    // --- Responses ---

    /// Validate a report and compute its effect without recording it.
    pub fn preview_response(
        &self,
        registry: &AddressRegistry,
        oracle: &Address,
        index: u8,
        key: &FlightKey,
        status: StatusCode,
    ) -> LedgerResult<ResponseOutcome> {
        let eligible = registry
            .oracle(oracle)
            .map(|o| o.holds_index(index))
            .unwrap_or(false);
        if !eligible {
            return Err(LedgerError::NotEligible {
                oracle: *oracle,
                index,
            });
        }

        // lookup key is (index, flight): a report on another bucket finds nothing open
        let request = self
            .requests
            .get(key)
            .filter(|r| r.index == index && r.is_open())
            .ok_or_else(|| LedgerError::RequestClosed {
                index,
                key: key.clone(),
            })?;

        if request.has_responded(oracle, index) {
            return Err(LedgerError::DuplicateResponse {
                oracle: *oracle,
                index,
                key: key.clone(),
            });
        }

        let votes = request.votes_for(status) + 1;
        if votes >= self.params.min_responses {
            Ok(ResponseOutcome::Finalized(status))
        } else {
            Ok(ResponseOutcome::Recorded { status, votes })
        }
    }

    /// Record an oracle report; finalizes the flight status when the
    /// reported code reaches quorum.
    pub fn submit_response(
        &mut self,
        registry: &AddressRegistry,
        flights: &mut FlightRegistry,
        oracle: Address,
        index: u8,
        key: &FlightKey,
        status: StatusCode,
    ) -> LedgerResult<ResponseOutcome> {
        let outcome = self.preview_response(registry, &oracle, index, key, status)?;
        if outcome.is_finalized() {
            flights.ensure_registered(key)?;
        }

        let request = self
            .requests
            .get_mut(key)
            .ok_or_else(|| LedgerError::RequestClosed {
                index,
                key: key.clone(),
            })?;

        request.responders.insert((oracle, index));
        request.responses.entry(status).or_default().insert(oracle);
        debug!("Oracle {} reported {} for {}", oracle, status, key);

        if let ResponseOutcome::Finalized(code) = outcome {
            request.state = RequestState::Finalized(code);
            flights.finalize_status(key, code)?;
            info!(
                "Consensus reached for {}: {} with {} reports",
                key,
                code,
                request.votes_for(code)
            );
        }

        Ok(outcome)
    }
}

impl ResponseOutcome {
    pub fn is_finalized(&self) -> bool {
        matches!(self, ResponseOutcome::Finalized(_))
    }
}
