use std::time::Duration;

use super::Block;
use crate::error::{ChainError, Result};
use crate::mining::{self, MINE_TICK_MS, MineProgress};

/// Simple in-memory blockchain with Proof-of-Work.
///
/// Owns every block exclusively; blocks are only appended by a successful
/// search or mutated in place by the edit operations. There is no
/// persistence, the chain lives and dies with its session.
#[derive(Debug)]
pub struct Blockchain {
    pub chain: Vec<Block>,
    pub difficulty: u32,
    /// Pacing of the cooperative search between hash batches.
    pub mine_tick: Duration,
}

impl Blockchain {
    /// Initialize a new blockchain with a genesis block.
    pub fn new(difficulty: u32) -> Self {
        let mut bc = Self {
            chain: Vec::new(),
            difficulty,
            mine_tick: Duration::from_millis(MINE_TICK_MS),
        };
        bc.chain.push(Block::genesis());
        bc
    }

    /// Return the last block in the chain.
    pub fn last_block(&self) -> Result<&Block> {
        self.chain.last().ok_or(ChainError::EmptyChain)
    }

    /// Read-only view of the committed blocks.
    pub fn blocks(&self) -> &[Block] {
        &self.chain
    }

    /// Mine a new block with the provided `data` and append it.
    ///
    /// The block is built from the current tip (fresh timestamp,
    /// `previous_hash` taken from the latest block, nonce 0) and searched
    /// cooperatively at the current difficulty. Progress is reported after
    /// every hash batch; the block is appended only once its hash meets
    /// the target, so the committed sequence never holds an unmined block.
    pub async fn add_block(
        &mut self,
        data: impl Into<String>,
        on_progress: impl FnMut(&MineProgress),
    ) -> Result<&Block> {
        let index = self.chain.len() as u64;
        let previous_hash = self.last_block()?.hash.clone();

        let mut block = Block::new(index, data.into(), previous_hash);
        mining::search(&mut block, self.difficulty, self.mine_tick, on_progress).await;

        self.chain.push(block);
        self.last_block()
    }

    /// Validate the entire chain: every block's cached hash must match a
    /// fresh recomputation over its current fields, and its previous-hash
    /// must match the predecessor's current hash. The genesis block is
    /// valid by definition.
    pub fn is_valid_chain(&self) -> bool {
        for i in 1..self.chain.len() {
            let current = &self.chain[i];
            let prev = &self.chain[i - 1];

            if current.hash != current.compute_hash() {
                return false;
            }
            if current.previous_hash != prev.hash {
                return false;
            }
        }
        true
    }

    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn difficulty(&self) -> u32 {
        self.difficulty
    }

    pub fn set_difficulty(&mut self, difficulty: u32) {
        // NOTE: Changing difficulty affects future blocks only.
        self.difficulty = difficulty;
    }

    /// Replace the payload of the block at `index` and re-mine it in place:
    /// nonce reset to 0, then the blocking search runs at the current
    /// difficulty. One progress report is emitted with the sealed values.
    ///
    /// The block ends up locally valid for its new data; linkage from any
    /// later block is left untouched and may now be broken.
    pub fn update_block_data(
        &mut self,
        index: usize,
        new_data: impl Into<String>,
        mut on_progress: impl FnMut(&MineProgress),
    ) -> Result<&Block> {
        let len = self.chain.len();
        let difficulty = self.difficulty;
        let block = self
            .chain
            .get_mut(index)
            .ok_or(ChainError::IndexOutOfRange { index, len })?;

        block.data = new_data.into();
        block.nonce = 0;
        let sealed = block.mine(difficulty);
        on_progress(&sealed);

        Ok(&self.chain[index])
    }
}
