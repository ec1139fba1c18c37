/// INSURANCE LEDGER
///
/// Policies are unique per (passenger, flight). When a flight resolves as
/// LATE_AIRLINE every uncredited policy on it is credited with 1.5x its
/// premium, once. Withdrawals zero the balance before any transfer is
/// requested.

use crate::flight_registry::FlightRegistry;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use surety_core::{Address, FlightKey, LedgerError, LedgerResult, StatusCode};

/// Payout multiplier as a fraction: 3/2
pub const PAYOUT_NUMERATOR: u128 = 3;
pub const PAYOUT_DENOMINATOR: u128 = 2;

/// Integer-exact `premium * 3 / 2`, rounding down, without intermediate overflow
pub fn payout_for(premium: u128) -> LedgerResult<u128> {
    let whole = premium / PAYOUT_DENOMINATOR;
    let remainder = premium % PAYOUT_DENOMINATOR;
    whole
        .checked_mul(PAYOUT_NUMERATOR)
        .and_then(|w| w.checked_add(remainder * PAYOUT_NUMERATOR / PAYOUT_DENOMINATOR))
        .ok_or(LedgerError::Overflow)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsurancePolicy {
    pub passenger: Address,
    pub key: FlightKey,
    pub premium: u128,
    pub is_credited: bool,
}

/// One credit applied by `credit_flight`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credit {
    pub passenger: Address,
    pub amount: u128,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsuranceLedger {
    /// Keyed by flight first so a flight's policies are contiguous
    policies: BTreeMap<(FlightKey, Address), InsurancePolicy>,
    pending: BTreeMap<Address, u128>,
}

impl InsuranceLedger {
    pub fn new() -> Self {
        InsuranceLedger {
            policies: BTreeMap::new(),
            pending: BTreeMap::new(),
        }
    }

    pub fn is_insured(&self, passenger: &Address, key: &FlightKey) -> bool {
        self.policies.contains_key(&(key.clone(), *passenger))
    }

    pub fn policy(&self, passenger: &Address, key: &FlightKey) -> Option<&InsurancePolicy> {
        self.policies.get(&(key.clone(), *passenger))
    }

    pub fn policies_for<'a>(&'a self, key: &'a FlightKey) -> impl Iterator<Item = &'a InsurancePolicy> + 'a {
        self.policies
            .values()
            .filter(move |p| &p.key == key)
    }

    pub fn pending_payment(&self, passenger: &Address) -> u128 {
        self.pending.get(passenger).copied().unwrap_or(0)
    }

    pub fn preview_purchase(
        &self,
        flights: &FlightRegistry,
        passenger: &Address,
        key: &FlightKey,
        premium: u128,
    ) -> LedgerResult<()> {
        flights.ensure_registered(key)?;

        if self.is_insured(passenger, key) {
            return Err(LedgerError::DuplicatePolicy {
                passenger: *passenger,
                key: key.clone(),
            });
        }
        if premium == 0 {
            return Err(LedgerError::ZeroPremium);
        }
        Ok(())
    }

    pub fn buy_insurance(
        &mut self,
        flights: &FlightRegistry,
        passenger: Address,
        key: FlightKey,
        premium: u128,
    ) -> LedgerResult<()> {
        self.preview_purchase(flights, &passenger, &key, premium)?;

        info!("Passenger {} insured {} for {}", passenger, key, premium);
        self.policies.insert(
            (key.clone(), passenger),
            InsurancePolicy {
                passenger,
                key,
                premium,
                is_credited: false,
            },
        );
        Ok(())
    }

    /// Credits a finalized status would produce; nothing is applied.
    pub fn preview_credit(&self, key: &FlightKey, status: StatusCode) -> LedgerResult<Vec<Credit>> {
        if !status.triggers_payout() {
            return Ok(Vec::new());
        }

        let mut credits = Vec::new();
        let mut projected: BTreeMap<Address, u128> = BTreeMap::new();
        for policy in self.policies_for(key).filter(|p| !p.is_credited) {
            let amount = payout_for(policy.premium)?;
            let balance = projected
                .entry(policy.passenger)
                .or_insert_with(|| self.pending_payment(&policy.passenger));
            *balance = balance.checked_add(amount).ok_or(LedgerError::Overflow)?;
            credits.push(Credit {
                passenger: policy.passenger,
                amount,
            });
        }
        Ok(credits)
    }

    /// React to a finalized flight status.
    pub fn on_status_finalized(&mut self, key: &FlightKey, status: StatusCode) -> LedgerResult<Vec<Credit>> {
        let credits = self.preview_credit(key, status)?;

        for credit in &credits {
            if let Some(policy) = self.policies.get_mut(&(key.clone(), credit.passenger)) {
                policy.is_credited = true;
            }
            *self.pending.entry(credit.passenger).or_insert(0) += credit.amount;
            info!("Credited {} to {} for {}", credit.amount, credit.passenger, key);
        }

        Ok(credits)
    }

    /// Zero the passenger's balance and return it. The caller performs the
    /// transfer afterwards.
    pub fn withdraw(&mut self, passenger: &Address) -> LedgerResult<u128> {
        let balance = self.pending_payment(passenger);
        if balance == 0 {
            return Err(LedgerError::NoFunds(*passenger));
        }

        self.pending.insert(*passenger, 0);
        Ok(balance)
    }
}
