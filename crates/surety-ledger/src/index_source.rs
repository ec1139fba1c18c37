/// INDEX SOURCE
///
/// Pseudo-random draws for oracle index assignment and request bucketing.
/// The default source is deterministic given public inputs (block entropy,
/// a nonce and the caller address). It is not a secure randomness beacon;
/// anything stronger can be plugged in through the `IndexSource` trait
/// without touching consensus logic.

use sha3::{Digest, Keccak256};
use surety_core::{Address, INDEXES_PER_ORACLE};

/// Source of indexes in `[0, range)`
pub trait IndexSource: Send {
    fn next_index(&mut self, account: &Address, range: u8) -> u8;

    /// Fresh chain entropy; sources that ignore it keep the default.
    fn observe_block(&mut self, _entropy: [u8; 32]) {}

    /// Copy of the current draw state, used to roll a call back
    fn box_clone(&self) -> Box<dyn IndexSource>;
}

/// Nonce wraps back to zero after this value
pub const NONCE_WRAP: u64 = 250;

/// Keccak-256 over (block entropy, nonce, account), reduced modulo the range
#[derive(Debug, Clone)]
pub struct KeccakIndexSource {
    entropy: [u8; 32],
    nonce: u64,
}

impl KeccakIndexSource {
    pub fn new(entropy: [u8; 32]) -> Self {
        KeccakIndexSource { entropy, nonce: 0 }
    }

    /// Derive the initial block entropy from a numeric seed
    pub fn from_seed(seed: u64) -> Self {
        let entropy: [u8; 32] = Keccak256::digest(seed.to_be_bytes()).into();
        Self::new(entropy)
    }

    /// Feed fresh chain entropy (e.g. the latest block hash)
    pub fn set_block_entropy(&mut self, entropy: [u8; 32]) {
        self.entropy = entropy;
    }

    pub fn nonce(&self) -> u64 {
        self.nonce
    }
}

impl IndexSource for KeccakIndexSource {
    fn next_index(&mut self, account: &Address, range: u8) -> u8 {
        let mut hasher = Keccak256::new();
        hasher.update(self.entropy);
        hasher.update(self.nonce.to_be_bytes());
        hasher.update(account.as_bytes());
        let digest = hasher.finalize();

        self.nonce += 1;
        if self.nonce > NONCE_WRAP {
            self.nonce = 0;
        }

        reduce_digest(&digest, range)
    }

    fn observe_block(&mut self, entropy: [u8; 32]) {
        self.set_block_entropy(entropy);
    }

    fn box_clone(&self) -> Box<dyn IndexSource> {
        Box::new(self.clone())
    }
}

/// Big-endian 256-bit digest modulo `range`
fn reduce_digest(digest: &[u8], range: u8) -> u8 {
    let range = range.max(1) as u32;
    digest
        .iter()
        .fold(0u32, |rem, byte| (rem * 256 + *byte as u32) % range) as u8
}

/// Replays a fixed cycle of indexes; used by tests and reproducible simulations
#[derive(Debug, Clone)]
pub struct ScriptedIndexSource {
    values: Vec<u8>,
    cursor: usize,
}

impl ScriptedIndexSource {
    pub fn new(values: Vec<u8>) -> Self {
        ScriptedIndexSource { values, cursor: 0 }
    }
}

impl IndexSource for ScriptedIndexSource {
    fn next_index(&mut self, _account: &Address, range: u8) -> u8 {
        if self.values.is_empty() {
            return 0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor += 1;
        value % range.max(1)
    }

    fn box_clone(&self) -> Box<dyn IndexSource> {
        Box::new(self.clone())
    }
}

/// Draw INDEXES_PER_ORACLE pairwise-distinct indexes, redrawing on repeats.
///
/// A source that keeps repeating itself is cut off after a bounded number of
/// draws; the remaining slots are then filled with the lowest unused indexes.
/// Returns `None` when `range` is too small to hold that many distinct values.
pub fn draw_distinct_indexes(
    source: &mut dyn IndexSource,
    account: &Address,
    range: u8,
) -> Option<[u8; INDEXES_PER_ORACLE]> {
    if (range as usize) < INDEXES_PER_ORACLE {
        return None;
    }

    let mut indexes = [0u8; INDEXES_PER_ORACLE];
    let mut filled = 0;
    let mut attempts = 0usize;
    let max_attempts = range as usize * 64;

    while filled < INDEXES_PER_ORACLE && attempts < max_attempts {
        let candidate = source.next_index(account, range);
        attempts += 1;
        if !indexes[..filled].contains(&candidate) {
            indexes[filled] = candidate;
            filled += 1;
        }
    }

    let mut fallback = 0u8;
    while filled < INDEXES_PER_ORACLE {
        if !indexes[..filled].contains(&fallback) {
            indexes[filled] = fallback;
            filled += 1;
        }
        fallback += 1;
    }

    Some(indexes)
}
