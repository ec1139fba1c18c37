use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use surety_core::{units, Address, FlightKey, LedgerConfig, LedgerEvent, StatusCode};
use surety_ledger::{FlightSurety, RecordingPayoutSink};
use surety_oracle::{BlockClock, FixedPolicy, OracleDriver, StatusPolicy, UniformRandomPolicy};

const OWNER_SEED: u64 = 0;
const FIRST_AIRLINE_SEED: u64 = 1;
const PASSENGER_SEED: u64 = 500;

#[derive(Parser)]
#[command(name = "surety")]
#[command(about = "Surety flight-delay insurance simulator", long_about = None)]
struct Cli {
    /// Configuration file (overrides SURETY_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one insure, resolve, withdraw cycle and print the event log as JSON lines
    Simulate {
        /// Number of oracle accounts to register
        #[arg(long)]
        oracles: Option<usize>,

        /// Seed for index draws and random status reports
        #[arg(long)]
        seed: Option<u64>,

        /// Premium paid by the passenger, in whole units
        #[arg(long, default_value_t = 1)]
        premium: u64,

        /// Status code every oracle reports (0, 10, 20, 30, 40, 50); random when absent
        #[arg(long)]
        status: Option<u8>,

        /// Flight code to insure
        #[arg(long, default_value = "5J 814")]
        flight: String,

        /// Scheduled departure (unix seconds)
        #[arg(long, default_value_t = 1_700_000_000)]
        departure: u64,
    },

    /// Print the effective configuration as JSON
    ShowConfig,
}

fn load_config(path: Option<&PathBuf>) -> Result<(LedgerConfig, PathBuf)> {
    let path = path.cloned().unwrap_or_else(LedgerConfig::source_path);
    let config = LedgerConfig::from_file(&path)?;
    Ok((config, path))
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_events(events: &[LedgerEvent]) -> Result<()> {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}

fn simulate(
    config: LedgerConfig,
    premium: u64,
    status: Option<StatusCode>,
    flight: String,
    departure: u64,
) -> Result<()> {
    let owner = Address::from_seed(OWNER_SEED);
    let airline = Address::from_seed(FIRST_AIRLINE_SEED);
    let passenger = Address::from_seed(PASSENGER_SEED);
    config.validate()?;

    let mut ledger = FlightSurety::with_config(config.clone(), owner, airline, "Kenya Airways");
    let mut clock = BlockClock::from_seed(config.driver.seed);
    clock.tick(&mut ledger);

    ledger.fund(airline, config.funding_threshold())?;
    let key = FlightKey::new(airline, flight, departure);
    ledger.register_flight(airline, key.clone())?;
    ledger.buy_insurance(passenger, key.clone(), units(premium as u128))?;

    let policy: Box<dyn StatusPolicy> = match status {
        Some(code) => Box::new(FixedPolicy(code)),
        None => Box::new(UniformRandomPolicy::from_seed(config.driver.seed)),
    };
    let mut driver = OracleDriver::new(policy);
    driver.register_fleet(&mut ledger, &config.driver, config.registration_fee())?;

    clock.tick(&mut ledger);
    let ticket = ledger.fetch_status(passenger, key.clone())?;
    info!("Requested status of {} on index {}", key, ticket.index);

    let (events, report) = driver.poll(&mut ledger);
    print_events(&events)?;
    info!(
        "Driver handled {} request(s): {} accepted, {} rejected",
        report.requests_seen, report.responses_accepted, report.responses_rejected
    );

    match ledger.get_flight_status(&key) {
        Some(code) if ledger.status_request(&key).map(|r| r.is_finalized()).unwrap_or(false) => {
            info!("Flight {} resolved as {}", key, code);
        }
        _ => warn!("Flight {} is unresolved; too few oracles agreed", key),
    }

    if ledger.get_pending_payment(&passenger) > 0 {
        let mut sink = RecordingPayoutSink::new();
        let paid = ledger.withdraw(passenger, &mut sink)?;
        info!("Passenger {} withdrew {}", passenger, paid);
    }

    print_events(&ledger.drain_events())?;
    info!("Treasury holds {} at block {}", ledger.treasury(), clock.height());
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let (mut config, config_path) = load_config(cli.config.as_ref())?;
    init_tracing(&config.log_level);
    info!("Loaded configuration from {}", config_path.display());

    match cli.command {
        Commands::Simulate {
            oracles,
            seed,
            premium,
            status,
            flight,
            departure,
        } => {
            if let Some(count) = oracles {
                config.driver.oracle_count = count;
            }
            if let Some(seed) = seed {
                config.driver.seed = seed;
            }
            let status = status
                .map(|code| StatusCode::try_from(code).map_err(|code| anyhow!("unknown status code {}", code)))
                .transpose()?;
            simulate(config, premium, status, flight, departure)?;
        }
        Commands::ShowConfig => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
