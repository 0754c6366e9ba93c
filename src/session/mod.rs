use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::blockchain::{Block, Blockchain, DEFAULT_DIFFICULTY, DIFF_MAX, DIFF_MIN};
use crate::error::{ChainError, Result};
use crate::mining::{MINE_TICK_MS, MineProgress};

/// Pristine `(data, hash, nonce)` of a block as it was originally mined.
#[derive(Debug, Clone)]
struct Original {
    data: String,
    hash: String,
    nonce: u64,
}

/// Per-block validation badge for the visualizer.
///
/// `is_valid` is the canonical recomputation-based verdict (hash integrity
/// plus linkage); `is_modified` reports separately whether the payload
/// currently differs from the one the block was mined with.
#[derive(Debug, Clone, Serialize)]
pub struct BlockStatus {
    pub is_valid: bool,
    pub is_modified: bool,
    pub hash_valid: bool,
    pub previous_hash_valid: bool,
}

/// Shared visualizer state: one long-lived chain, the pristine record of
/// every mined block, and a guard keeping at most one mining operation in
/// flight.
pub struct Session {
    chain: AsyncMutex<Blockchain>,
    originals: Mutex<HashMap<usize, Original>>,
    mining: AtomicBool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(DEFAULT_DIFFICULTY)
    }
}

impl Session {
    /// Create a session with the default search pacing.
    pub fn new(difficulty: u32) -> Self {
        Self::with_mine_tick(difficulty, Duration::from_millis(MINE_TICK_MS))
    }

    /// Create a session with an explicit delay between hash batches (zero
    /// keeps the yield points but skips the delay).
    pub fn with_mine_tick(difficulty: u32, tick: Duration) -> Self {
        let mut chain = Blockchain::new(difficulty);
        chain.mine_tick = tick;

        let mut originals = HashMap::new();
        for (index, block) in chain.blocks().iter().enumerate() {
            originals.insert(
                index,
                Original {
                    data: block.data.clone(),
                    hash: block.hash.clone(),
                    nonce: block.nonce,
                },
            );
        }

        Self {
            chain: AsyncMutex::new(chain),
            originals: Mutex::new(originals),
            mining: AtomicBool::new(false),
        }
    }

    /// Mine a block with `data` and append it to the chain.
    ///
    /// At most one mining call may be outstanding; a second call while one
    /// is in flight is rejected with `MiningInProgress` and has no effect
    /// (rejected requests are dropped, never queued).
    pub async fn mine(
        &self,
        data: &str,
        on_progress: impl FnMut(&MineProgress),
    ) -> Result<Block> {
        if self.mining.swap(true, Ordering::SeqCst) {
            warn!("mining request ignored: another search is in flight");
            return Err(ChainError::MiningInProgress);
        }

        let result = self.mine_inner(data, on_progress).await;
        self.mining.store(false, Ordering::SeqCst);
        result
    }

    async fn mine_inner(
        &self,
        data: &str,
        on_progress: impl FnMut(&MineProgress),
    ) -> Result<Block> {
        let mut chain = self.chain.lock().await;
        let block = chain.add_block(data.trim(), on_progress).await?.clone();

        self.originals.lock().expect("mutex poisoned").insert(
            block.index as usize,
            Original {
                data: block.data.clone(),
                hash: block.hash.clone(),
                nonce: block.nonce,
            },
        );

        info!(
            "sealed block #{} (hash={}, nonce={}, {}ms)",
            block.index, block.hash, block.nonce, block.mining_duration_ms
        );
        Ok(block)
    }

    /// Apply a user edit to the block at `index`.
    ///
    /// An edit that restores the block's original payload also restores
    /// its originally mined hash and nonce, skipping a re-mine. Any other
    /// value overwrites the payload and leaves the cached hash untouched,
    /// which breaks hash integrity until the block is honestly re-mined
    /// (the tampering the visualizer demonstrates).
    ///
    /// Returns the chain validity after the edit; an out-of-range index is
    /// ignored.
    pub async fn save_edit(&self, index: usize, new_data: &str) -> bool {
        let mut chain = self.chain.lock().await;
        let len = chain.len();
        match chain.chain.get_mut(index) {
            None => {
                warn!("edit ignored: block index {index} out of range (chain length {len})");
            }
            Some(block) => {
                let originals = self.originals.lock().expect("mutex poisoned");
                match originals.get(&index) {
                    Some(original) if original.data == new_data => {
                        block.data = original.data.clone();
                        block.hash = original.hash.clone();
                        block.nonce = original.nonce;
                        debug!("block #{index} reverted to its original payload");
                    }
                    _ => {
                        block.data = new_data.to_string();
                        debug!("block #{index} payload edited without re-mining");
                    }
                }
            }
        }
        chain.is_valid_chain()
    }

    /// Replace a block's payload and honestly re-mine it in place. The
    /// blocking search runs to completion within this call. An
    /// out-of-range index is recovered as a logged no-op.
    pub async fn update_block_data(
        &self,
        index: usize,
        new_data: &str,
        on_progress: impl FnMut(&MineProgress),
    ) -> Option<Block> {
        let mut chain = self.chain.lock().await;
        match chain.update_block_data(index, new_data, on_progress) {
            Ok(block) => {
                let block = block.clone();
                info!(
                    "re-mined block #{} (hash={}, nonce={})",
                    block.index, block.hash, block.nonce
                );
                Some(block)
            }
            Err(err) => {
                warn!("block update ignored: {err}");
                None
            }
        }
    }

    /// Per-block validation badge; `None` when `index` is out of range.
    /// The genesis block is always valid.
    pub async fn block_status(&self, index: usize) -> Option<BlockStatus> {
        let chain = self.chain.lock().await;
        let block = chain.blocks().get(index)?;

        let is_modified = {
            let originals = self.originals.lock().expect("mutex poisoned");
            originals
                .get(&index)
                .is_some_and(|original| original.data != block.data)
        };

        if index == 0 {
            return Some(BlockStatus {
                is_valid: true,
                is_modified,
                hash_valid: true,
                previous_hash_valid: true,
            });
        }

        let hash_valid = block.hash == block.compute_hash();
        let previous_hash_valid = block.previous_hash == chain.blocks()[index - 1].hash;

        Some(BlockStatus {
            is_valid: hash_valid && previous_hash_valid,
            is_modified,
            hash_valid,
            previous_hash_valid,
        })
    }

    /// Cloned snapshot of the committed chain for rendering.
    pub async fn blocks(&self) -> Vec<Block> {
        self.chain.lock().await.chain.clone()
    }

    pub async fn is_chain_valid(&self) -> bool {
        self.chain.lock().await.is_valid_chain()
    }

    pub async fn difficulty(&self) -> u32 {
        self.chain.lock().await.difficulty()
    }

    /// Set the difficulty for future blocks, clamped to the supported
    /// range.
    pub async fn set_difficulty(&self, level: u32) {
        let level = level.clamp(DIFF_MIN, DIFF_MAX);
        self.chain.lock().await.set_difficulty(level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_session(difficulty: u32) -> Session {
        let _ = env_logger::builder().is_test(true).try_init();
        Session::with_mine_tick(difficulty, Duration::ZERO)
    }

    #[tokio::test]
    async fn default_session_has_genesis() {
        let session = Session::default();
        let blocks = session.blocks().await;
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].data, "Genesis Block");
        assert_eq!(session.difficulty().await, DEFAULT_DIFFICULTY);
        assert!(session.is_chain_valid().await);

        let status = session.block_status(0).await.unwrap();
        assert!(status.is_valid);
        assert!(!status.is_modified);
    }

    #[tokio::test]
    async fn mine_appends_and_reports_progress() {
        let session = test_session(1);
        let mut reports: Vec<MineProgress> = Vec::new();

        let block = session
            .mine("Alice pays Bob 10", |p| reports.push(p.clone()))
            .await
            .unwrap();

        assert_eq!(block.index, 1);
        assert!(block.hash.starts_with('0'));
        assert!(reports.windows(2).all(|w| w[0].nonce <= w[1].nonce));
        assert_eq!(reports.last().unwrap().hash, block.hash);
        assert_eq!(session.blocks().await.len(), 2);
        assert!(session.is_chain_valid().await);
    }

    #[tokio::test]
    async fn mine_trims_the_payload() {
        let session = test_session(1);
        let block = session.mine("  padded  ", |_| {}).await.unwrap();
        assert_eq!(block.data, "padded");
    }

    #[tokio::test]
    async fn concurrent_mining_is_rejected() {
        let session = test_session(4);
        let (first, second) = tokio::join!(
            session.mine("first", |_| {}),
            session.mine("second", |_| {})
        );

        // The call that got in first completes; the other is dropped.
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err(), ChainError::MiningInProgress);
        assert_eq!(session.blocks().await.len(), 2);

        // The guard clears once the search resolves.
        assert!(session.mine("third", |_| {}).await.is_ok());
    }

    #[tokio::test]
    async fn edit_and_exact_revert_restore_validity() {
        let session = test_session(2);
        let mined = session.mine("A pays B 5", |_| {}).await.unwrap();

        assert!(!session.save_edit(1, "A pays B 50").await);
        assert!(!session.is_chain_valid().await);

        let status = session.block_status(1).await.unwrap();
        assert!(!status.is_valid);
        assert!(status.is_modified);
        assert!(!status.hash_valid);
        assert!(status.previous_hash_valid);

        assert!(session.save_edit(1, "A pays B 5").await);
        assert!(session.is_chain_valid().await);

        let blocks = session.blocks().await;
        assert_eq!(blocks[1].hash, mined.hash);
        assert_eq!(blocks[1].nonce, mined.nonce);
    }

    #[tokio::test]
    async fn tampering_leaves_later_linkage_intact() {
        let session = test_session(1);
        session.mine("a", |_| {}).await.unwrap();
        session.mine("b", |_| {}).await.unwrap();

        session.save_edit(1, "forged").await;

        // The tampered block fails hash integrity; its successor still
        // points at the stored (stale) hash, so linkage alone holds there.
        let tampered = session.block_status(1).await.unwrap();
        assert!(!tampered.hash_valid);
        assert!(!tampered.is_valid);

        let successor = session.block_status(2).await.unwrap();
        assert!(successor.hash_valid);
        assert!(successor.previous_hash_valid);
        assert!(successor.is_valid);

        assert!(!session.is_chain_valid().await);
    }

    #[tokio::test]
    async fn out_of_range_edit_is_a_noop() {
        let session = test_session(1);
        assert!(session.save_edit(9, "nothing").await);
        assert!(session.update_block_data(9, "nothing", |_| {}).await.is_none());
        assert_eq!(session.blocks().await.len(), 1);
    }

    #[tokio::test]
    async fn update_block_data_remines_honestly() {
        let session = test_session(2);
        session.mine("a", |_| {}).await.unwrap();
        session.mine("b", |_| {}).await.unwrap();

        let block = session
            .update_block_data(1, "rewritten", |_| {})
            .await
            .unwrap();
        assert!(block.hash.starts_with("00"));
        assert_eq!(block.hash, block.compute_hash());

        // Locally valid, but block 2 still links to the old hash.
        let status = session.block_status(1).await.unwrap();
        assert!(status.hash_valid);
        assert!(!session.is_chain_valid().await);
    }

    #[tokio::test]
    async fn difficulty_is_clamped_to_the_ui_range() {
        let session = test_session(2);
        session.set_difficulty(0).await;
        assert_eq!(session.difficulty().await, DIFF_MIN);
        session.set_difficulty(9).await;
        assert_eq!(session.difficulty().await, DIFF_MAX);
        session.set_difficulty(3).await;
        assert_eq!(session.difficulty().await, 3);
    }
}
