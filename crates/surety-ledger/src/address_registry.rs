/// ADDRESS REGISTRY
///
/// Tracks which addresses are airlines (and their funding state) and which
/// are oracles (and their assigned indexes). Pure data plus invariant
/// enforcement; admission and oracle enrollment are driven by the
/// governance and consensus components.

use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use surety_core::{Address, LedgerError, LedgerResult, INDEXES_PER_ORACLE};

/// Airline account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Airline {
    pub address: Address,
    /// Fixed at admission
    pub name: String,
    pub is_registered: bool,
    pub is_funded: bool,
    /// Cumulative contribution, never decreases
    pub funding_amount: u128,
}

/// Oracle account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Oracle {
    pub address: Address,
    pub is_registered: bool,
    /// Assigned once at registration, pairwise distinct
    pub indexes: [u8; INDEXES_PER_ORACLE],
}

impl Oracle {
    pub fn holds_index(&self, index: u8) -> bool {
        self.indexes.contains(&index)
    }
}

/// Outcome of a funding contribution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FundingReceipt {
    /// Cumulative funding after this contribution
    pub total: u128,
    /// Whether the airline is funded after this contribution
    pub funded: bool,
    /// True only on the contribution that crossed the threshold
    pub newly_funded: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressRegistry {
    airlines: BTreeMap<Address, Airline>,
    oracles: BTreeMap<Address, Oracle>,
    funding_threshold: u128,
}

impl AddressRegistry {
    pub fn new(funding_threshold: u128) -> Self {
        AddressRegistry {
            airlines: BTreeMap::new(),
            oracles: BTreeMap::new(),
            funding_threshold,
        }
    }

    pub fn funding_threshold(&self) -> u128 {
        self.funding_threshold
    }

    // --- Airlines ---

    pub fn is_airline(&self, address: &Address) -> bool {
        self.airlines
            .get(address)
            .map(|a| a.is_registered)
            .unwrap_or(false)
    }

    pub fn is_funded(&self, address: &Address) -> bool {
        self.airlines
            .get(address)
            .map(|a| a.is_registered && a.is_funded)
            .unwrap_or(false)
    }

    pub fn airline(&self, address: &Address) -> Option<&Airline> {
        self.airlines.get(address)
    }

    pub fn airline_name(&self, address: &Address) -> Option<&str> {
        self.airlines.get(address).map(|a| a.name.as_str())
    }

    pub fn funding_amount(&self, address: &Address) -> u128 {
        self.airlines
            .get(address)
            .map(|a| a.funding_amount)
            .unwrap_or(0)
    }

    pub fn registered_airline_count(&self) -> usize {
        self.airlines.values().filter(|a| a.is_registered).count()
    }

    /// Reject callers that are not registered, funded airlines
    pub fn ensure_funded(&self, address: &Address) -> LedgerResult<()> {
        if self.is_funded(address) {
            Ok(())
        } else {
            Err(LedgerError::NotFunded(*address))
        }
    }

    /// Validate a contribution without applying it
    pub fn preview_fund(&self, address: &Address, amount: u128) -> LedgerResult<FundingReceipt> {
        let airline = self
            .airlines
            .get(address)
            .filter(|a| a.is_registered)
            .ok_or(LedgerError::NotAirline(*address))?;

        if amount == 0 {
            return Err(LedgerError::InsufficientFunds {
                required: 1,
                available: 0,
            });
        }

        let total = airline
            .funding_amount
            .checked_add(amount)
            .ok_or(LedgerError::Overflow)?;
        let funded = airline.is_funded || total >= self.funding_threshold;

        Ok(FundingReceipt {
            total,
            funded,
            newly_funded: funded && !airline.is_funded,
        })
    }

    /// Add to an airline's cumulative funding.
    ///
    /// The airline flips to funded exactly once, on the contribution that
    /// reaches the threshold; later contributions only grow the total.
    pub fn fund(&mut self, address: &Address, amount: u128) -> LedgerResult<FundingReceipt> {
        let receipt = self.preview_fund(address, amount)?;

        if let Some(airline) = self.airlines.get_mut(address) {
            airline.funding_amount = receipt.total;
            airline.is_funded = receipt.funded;
        }

        if receipt.newly_funded {
            info!("Airline {} funded with {} total", address, receipt.total);
        }

        Ok(receipt)
    }

    /// Insert a newly admitted airline (unfunded)
    pub(crate) fn admit_airline(&mut self, address: Address, name: String) -> LedgerResult<()> {
        if self.is_airline(&address) {
            return Err(LedgerError::AlreadyRegistered(address));
        }

        info!("Airline {} ({}) admitted", name, address);
        self.airlines.insert(
            address,
            Airline {
                address,
                name,
                is_registered: true,
                is_funded: false,
                funding_amount: 0,
            },
        );
        Ok(())
    }

    // --- Oracles ---

    pub fn is_oracle(&self, address: &Address) -> bool {
        self.oracles
            .get(address)
            .map(|o| o.is_registered)
            .unwrap_or(false)
    }

    pub fn oracle(&self, address: &Address) -> Option<&Oracle> {
        self.oracles.get(address).filter(|o| o.is_registered)
    }

    pub fn oracle_indexes(&self, address: &Address) -> Option<[u8; INDEXES_PER_ORACLE]> {
        self.oracle(address).map(|o| o.indexes)
    }

    pub fn oracle_count(&self) -> usize {
        self.oracles.values().filter(|o| o.is_registered).count()
    }

    pub(crate) fn enroll_oracle(
        &mut self,
        address: Address,
        indexes: [u8; INDEXES_PER_ORACLE],
    ) -> LedgerResult<()> {
        if self.is_oracle(&address) {
            return Err(LedgerError::AlreadyRegistered(address));
        }

        self.oracles.insert(
            address,
            Oracle {
                address,
                is_registered: true,
                indexes,
            },
        );
        Ok(())
    }
}
