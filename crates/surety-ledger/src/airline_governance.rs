// AIRLINE GOVERNANCE
// Admission of new airlines into the registry
//
// SAFETY INVARIANTS:
// 1. Only registered, funded airlines may propose or vote
// 2. Below GOVERNANCE_VOTING_THRESHOLD registered airlines a single funded airline admits
// 3. At or above it, admission needs ceil(registered / 2) distinct votes
// 4. A voter counts at most once per candidate
// 5. Pending votes are discarded once the candidate is admitted

use crate::address_registry::AddressRegistry;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use surety_core::{Address, LedgerError, LedgerResult, GOVERNANCE_VOTING_THRESHOLD};

/// Votes accumulated for a candidate that is not yet an airline
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAdmission {
    /// Name given by the first proposer
    pub name: String,
    pub voters: BTreeSet<Address>,
}

/// Result of a successful `propose_or_vote`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmissionOutcome {
    /// Candidate is now a registered airline
    Admitted { votes: usize, quorum: usize },
    /// Vote recorded, quorum not yet met
    Pending { votes: usize, quorum: usize },
}

impl AdmissionOutcome {
    pub fn is_admitted(&self) -> bool {
        matches!(self, AdmissionOutcome::Admitted { .. })
    }
}

/// Distinct votes needed to admit a candidate given the current registered count.
///
/// Below the voting threshold a single signature suffices.
pub fn admission_quorum(registered_count: usize) -> usize {
    if registered_count < GOVERNANCE_VOTING_THRESHOLD {
        1
    } else {
        (registered_count + 1) / 2
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirlineGovernance {
    pending: BTreeMap<Address, PendingAdmission>,
}

impl AirlineGovernance {
    pub fn new() -> Self {
        AirlineGovernance {
            pending: BTreeMap::new(),
        }
    }

    pub fn pending(&self, candidate: &Address) -> Option<&PendingAdmission> {
        self.pending.get(candidate)
    }

    pub fn pending_votes(&self, candidate: &Address) -> usize {
        self.pending
            .get(candidate)
            .map(|p| p.voters.len())
            .unwrap_or(0)
    }

    /// Check a proposal or vote and report what it would do, without mutating.
    pub fn preview(
        &self,
        registry: &AddressRegistry,
        candidate: &Address,
        proposer: &Address,
    ) -> LedgerResult<AdmissionOutcome> {
        registry.ensure_funded(proposer)?;

        if registry.is_airline(candidate) {
            return Err(LedgerError::AlreadyRegistered(*candidate));
        }

        let existing = self.pending.get(candidate);
        if existing.map(|p| p.voters.contains(proposer)).unwrap_or(false) {
            return Err(LedgerError::DuplicateVote {
                candidate: *candidate,
                voter: *proposer,
            });
        }

        let quorum = admission_quorum(registry.registered_airline_count());
        let votes = existing.map(|p| p.voters.len()).unwrap_or(0) + 1;

        if votes >= quorum {
            Ok(AdmissionOutcome::Admitted { votes, quorum })
        } else {
            Ok(AdmissionOutcome::Pending { votes, quorum })
        }
    }

    /// Propose a candidate or add a vote for it.
    ///
    /// Registers the candidate in `registry` as soon as the vote count meets
    /// the quorum computed from the registered count at vote time.
    pub fn propose_or_vote(
        &mut self,
        registry: &mut AddressRegistry,
        candidate: Address,
        name: &str,
        proposer: Address,
    ) -> LedgerResult<AdmissionOutcome> {
        let outcome = self.preview(registry, &candidate, &proposer)?;

        match outcome {
            AdmissionOutcome::Admitted { votes, quorum } => {
                let admitted_name = self
                    .pending
                    .remove(&candidate)
                    .map(|p| p.name)
                    .unwrap_or_else(|| name.to_string());
                registry.admit_airline(candidate, admitted_name)?;
                info!(
                    "Candidate {} admitted with {}/{} votes",
                    candidate, votes, quorum
                );
            }
            AdmissionOutcome::Pending { votes, quorum } => {
                self.pending
                    .entry(candidate)
                    .or_insert_with(|| PendingAdmission {
                        name: name.to_string(),
                        voters: BTreeSet::new(),
                    })
                    .voters
                    .insert(proposer);
                debug!(
                    "Vote from {} for {} recorded ({}/{})",
                    proposer, candidate, votes, quorum
                );
            }
        }

        Ok(outcome)
    }
}
