use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::hash::calculate_block_hash;
use super::{GENESIS_DATA, GENESIS_PREVIOUS_HASH};
use crate::mining::{MineProgress, meets_difficulty};

/// A single block in the chain holding an arbitrary string payload.
///
/// `index`, `timestamp` and `previous_hash` are fixed at creation; `data`,
/// `nonce` and the cached `hash` change during mining and user edits. The
/// timestamp is kept as a string-encoded millisecond epoch so it feeds the
/// hash preimage exactly as displayed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp: String,
    pub data: String,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String, // Cached hash of the block
    pub mining_duration_ms: u64,
}

impl Block {
    /// Create the genesis block (first block in the chain).
    pub fn genesis() -> Self {
        let mut block = Self {
            index: 0,
            timestamp: Utc::now().timestamp_millis().to_string(),
            data: GENESIS_DATA.to_string(),
            previous_hash: GENESIS_PREVIOUS_HASH.to_string(),
            nonce: 0,
            hash: String::new(),
            mining_duration_ms: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Create a new block (not mined yet). Call `mine()` or run the
    /// cooperative search to find its nonce.
    pub fn new(index: u64, data: String, previous_hash: String) -> Self {
        Self::new_with_timestamp(
            index,
            data,
            previous_hash,
            Utc::now().timestamp_millis().to_string(),
        )
    }

    /// Create a new block with a caller-supplied timestamp.
    pub fn new_with_timestamp(
        index: u64,
        data: String,
        previous_hash: String,
        timestamp: String,
    ) -> Self {
        let mut block = Self {
            index,
            timestamp,
            data,
            previous_hash,
            nonce: 0,
            hash: String::new(),
            mining_duration_ms: 0,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Compute the SHA-256 hash of this block from its current fields
    /// (excluding the cached `hash` itself).
    pub fn compute_hash(&self) -> String {
        calculate_block_hash(
            self.index,
            &self.timestamp,
            &self.data,
            &self.previous_hash,
            self.nonce,
        )
    }

    /// Blocking Proof-of-Work: increment the nonce and rehash until the
    /// hash starts with `difficulty` leading zeros (in hex). Runs to
    /// completion without yielding and records the elapsed mining time.
    /// The nonce is incremented before every attempt, so a mined block
    /// always ends up with `nonce >= 1`.
    pub fn mine(&mut self, difficulty: u32) -> MineProgress {
        let started = Instant::now();
        loop {
            self.nonce = self.nonce.wrapping_add(1);
            self.hash = self.compute_hash();
            if meets_difficulty(&self.hash, difficulty) {
                break;
            }
        }
        let elapsed_ms = started.elapsed().as_millis() as u64;
        self.mining_duration_ms = elapsed_ms;
        MineProgress {
            nonce: self.nonce,
            hash: self.hash.clone(),
            elapsed_ms,
        }
    }
}
