/// STATUS SELECTION
///
/// How a simulated oracle decides which status code to report.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use surety_core::{Address, FlightKey, StatusCode};

pub trait StatusPolicy: Send {
    fn choose(&mut self, oracle: &Address, key: &FlightKey) -> StatusCode;
}

/// Uniform over the six status codes, reproducible from a seed
#[derive(Debug, Clone)]
pub struct UniformRandomPolicy {
    rng: StdRng,
}

impl UniformRandomPolicy {
    pub fn from_seed(seed: u64) -> Self {
        UniformRandomPolicy {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl StatusPolicy for UniformRandomPolicy {
    fn choose(&mut self, _oracle: &Address, _key: &FlightKey) -> StatusCode {
        StatusCode::ALL[self.rng.gen_range(0..StatusCode::ALL.len())]
    }
}

/// Every oracle reports the same code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedPolicy(pub StatusCode);

impl StatusPolicy for FixedPolicy {
    fn choose(&mut self, _oracle: &Address, _key: &FlightKey) -> StatusCode {
        self.0
    }
}
