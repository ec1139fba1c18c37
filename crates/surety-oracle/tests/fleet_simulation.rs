// FLEET SIMULATION TESTS
// Driver against a ledger using the Keccak index source

#[cfg(test)]
mod fleet_simulation_tests {
    use surety_core::{units, Address, FlightKey, LedgerConfig, LedgerEvent, StatusCode};
    use surety_ledger::{FlightSurety, RecordingPayoutSink};
    use surety_oracle::{FixedPolicy, OracleDriver};

    fn init_logger() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    #[test]
    fn test_default_fleet_resolves_seeded_request() {
        init_logger();
        let config = LedgerConfig::default();
        let airline = Address::from_seed(1);
        let passenger = Address::from_seed(500);
        let mut ledger = FlightSurety::with_config(config.clone(), Address::from_seed(0), airline, "Kenya Airways");

        ledger.fund(airline, config.funding_threshold()).unwrap();
        let key = FlightKey::new(airline, "5J 814", 1_700_000_000);
        ledger.register_flight(airline, key.clone()).unwrap();
        ledger.buy_insurance(passenger, key.clone(), units(1)).unwrap();

        let mut driver = OracleDriver::new(Box::new(FixedPolicy(StatusCode::LateAirline)));
        let registered = driver
            .register_fleet(&mut ledger, &config.driver, config.registration_fee())
            .unwrap();
        assert_eq!(registered, config.driver.oracle_count);

        // seed 42 puts the request on index 9, held by six of the twenty oracles
        let ticket = ledger.fetch_status(passenger, key.clone()).unwrap();
        assert_eq!(ticket.index, 9);
        assert_eq!(driver.holders_of(ticket.index).len(), 6);

        let (events, report) = driver.poll(&mut ledger);
        assert!(events.contains(&LedgerEvent::OracleRequest { index: ticket.index, key: key.clone() }));
        assert_eq!(report.responses_accepted, config.min_responses);
        assert_eq!(report.finalized, vec![(key.clone(), StatusCode::LateAirline)]);
        assert_eq!(ledger.get_flight_status(&key), Some(StatusCode::LateAirline));

        let mut sink = RecordingPayoutSink::new();
        assert_eq!(ledger.withdraw(passenger, &mut sink), Ok(units(3) / 2));
    }
}
