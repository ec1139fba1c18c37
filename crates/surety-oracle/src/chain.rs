/// SIMULATED CHAIN CLOCK
///
/// Produces a block per tick and hands its entropy to the ledger, so index
/// draws move with the chain instead of staying on the deploy-time seed.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use surety_ledger::FlightSurety;

#[derive(Debug, Clone)]
pub struct BlockClock {
    rng: StdRng,
    height: u64,
}

impl BlockClock {
    pub fn from_seed(seed: u64) -> Self {
        BlockClock {
            rng: StdRng::seed_from_u64(seed),
            height: 0,
        }
    }

    pub fn height(&self) -> u64 {
        self.height
    }

    /// Mine the next block and report its entropy to `ledger`
    pub fn tick(&mut self, ledger: &mut FlightSurety) -> u64 {
        let mut entropy = [0u8; 32];
        self.rng.fill(&mut entropy);
        self.height += 1;
        ledger.advance_block(entropy);
        debug!("Block {} observed", self.height);
        self.height
    }
}
