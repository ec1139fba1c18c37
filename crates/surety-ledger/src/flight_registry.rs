/// FLIGHT REGISTRY
///
/// Flights are (airline, designator, departure time) triples registered at
/// most once by their own funded airline. The status is written exactly once,
/// by the consensus finalization path.

use crate::address_registry::AddressRegistry;
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use surety_core::{Address, FlightKey, LedgerError, LedgerResult, StatusCode};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flight {
    pub key: FlightKey,
    pub is_registered: bool,
    pub status_code: StatusCode,
    /// Set once consensus has finalized a status (which may itself be UNKNOWN)
    pub resolved: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlightRegistry {
    flights: BTreeMap<FlightKey, Flight>,
}

impl FlightRegistry {
    pub fn new() -> Self {
        FlightRegistry {
            flights: BTreeMap::new(),
        }
    }

    pub fn is_registered(&self, key: &FlightKey) -> bool {
        self.flights
            .get(key)
            .map(|f| f.is_registered)
            .unwrap_or(false)
    }

    pub fn flight(&self, key: &FlightKey) -> Option<&Flight> {
        self.flights.get(key)
    }

    /// Current status, `None` for unregistered flights
    pub fn status(&self, key: &FlightKey) -> Option<StatusCode> {
        self.flights.get(key).map(|f| f.status_code)
    }

    pub fn ensure_registered(&self, key: &FlightKey) -> LedgerResult<&Flight> {
        self.flights
            .get(key)
            .filter(|f| f.is_registered)
            .ok_or_else(|| LedgerError::UnknownFlight(key.clone()))
    }

    /// Flights registered by `airline`, ordered by designator then time
    pub fn flights_of<'a>(&'a self, airline: &'a Address) -> impl Iterator<Item = &'a Flight> + 'a {
        self.flights.values().filter(move |f| &f.key.airline == airline)
    }

    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }

    pub fn preview_register(
        &self,
        registry: &AddressRegistry,
        key: &FlightKey,
        caller: &Address,
    ) -> LedgerResult<()> {
        if caller != &key.airline {
            return Err(LedgerError::NotFunded(*caller));
        }
        registry.ensure_funded(caller)?;

        if self.flights.contains_key(key) {
            return Err(LedgerError::DuplicateFlight(key.clone()));
        }
        Ok(())
    }

    /// Register a flight on behalf of its airline.
    pub fn register_flight(
        &mut self,
        registry: &AddressRegistry,
        key: FlightKey,
        caller: &Address,
    ) -> LedgerResult<()> {
        self.preview_register(registry, &key, caller)?;

        info!("Flight {} registered", key);
        self.flights.insert(
            key.clone(),
            Flight {
                key,
                is_registered: true,
                status_code: StatusCode::Unknown,
                resolved: false,
            },
        );
        Ok(())
    }

    /// Write the finalized status. Returns `false` without touching the
    /// flight if it was already resolved.
    pub(crate) fn finalize_status(&mut self, key: &FlightKey, code: StatusCode) -> LedgerResult<bool> {
        let flight = self
            .flights
            .get_mut(key)
            .filter(|f| f.is_registered)
            .ok_or_else(|| LedgerError::UnknownFlight(key.clone()))?;

        if flight.resolved {
            return Ok(false);
        }

        flight.status_code = code;
        flight.resolved = true;
        info!("Flight {} resolved as {}", key, code);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use surety_core::{units, FUNDING_THRESHOLD};

    fn setup() -> (AddressRegistry, FlightRegistry, Address) {
        let mut registry = AddressRegistry::new(FUNDING_THRESHOLD);
        let airline = Address::from_seed(1);
        registry.admit_airline(airline, "Kenya Airways".to_string()).unwrap();
        registry.fund(&airline, units(10)).unwrap();
        (registry, FlightRegistry::new(), airline)
    }

    #[test]
    fn test_register_flight() {
        let (registry, mut flights, airline) = setup();
        let key = FlightKey::new(airline, "5J 814", 1_700_000_000);

        flights.register_flight(&registry, key.clone(), &airline).unwrap();
        assert!(flights.is_registered(&key));
        assert_eq!(flights.status(&key), Some(StatusCode::Unknown));
        assert_eq!(flights.flights_of(&airline).count(), 1);
    }

    #[test]
    fn test_duplicate_flight_rejected() {
        let (registry, mut flights, airline) = setup();
        let key = FlightKey::new(airline, "5J 814", 1_700_000_000);

        flights.register_flight(&registry, key.clone(), &airline).unwrap();
        assert_eq!(
            flights.register_flight(&registry, key.clone(), &airline),
            Err(LedgerError::DuplicateFlight(key.clone()))
        );
        assert_eq!(flights.len(), 1);

        // a different departure time is a different flight
        let later = FlightKey::new(airline, "5J 814", 1_700_003_600);
        assert!(flights.register_flight(&registry, later, &airline).is_ok());
    }

    #[test]
    fn test_only_own_funded_airline_registers() {
        let (mut registry, mut flights, airline) = setup();
        let other = Address::from_seed(2);
        registry.admit_airline(other, "Other".to_string()).unwrap();
        let key = FlightKey::new(airline, "5J 814", 1);

        // funded airline registering someone else's flight
        assert_eq!(
            flights.register_flight(&registry, key.clone(), &other),
            Err(LedgerError::NotFunded(other))
        );

        // unfunded airline registering its own flight
        let own = FlightKey::new(other, "UG 100", 1);
        assert_eq!(
            flights.register_flight(&registry, own, &other),
            Err(LedgerError::NotFunded(other))
        );
        assert!(flights.is_empty());
    }

    #[test]
    fn test_finalize_status_once() {
        let (registry, mut flights, airline) = setup();
        let key = FlightKey::new(airline, "5J 814", 1);
        flights.register_flight(&registry, key.clone(), &airline).unwrap();

        assert_eq!(flights.finalize_status(&key, StatusCode::LateAirline), Ok(true));
        assert_eq!(flights.finalize_status(&key, StatusCode::OnTime), Ok(false));
        assert_eq!(flights.status(&key), Some(StatusCode::LateAirline));
    }

    #[test]
    fn test_finalize_unknown_flight() {
        let (_, mut flights, airline) = setup();
        let key = FlightKey::new(airline, "XX 1", 1);
        assert_eq!(
            flights.finalize_status(&key, StatusCode::OnTime),
            Err(LedgerError::UnknownFlight(key))
        );
    }
}
