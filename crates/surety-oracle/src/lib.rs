/// SURETY ORACLE FLEET
///
/// Simulates the off-chain oracle backend: registers accounts with the
/// ledger, watches for status requests and reports flight statuses.

pub mod policy;
pub mod chain;
pub mod driver;

pub use policy::{FixedPolicy, StatusPolicy, UniformRandomPolicy};
pub use chain::BlockClock;
pub use driver::{DriverError, DriverReport, DriverResult, OracleDriver};
