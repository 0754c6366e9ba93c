use serde::Serialize;
use std::time::{Duration, Instant};

use crate::blockchain::Block;

/// Delay between hash batches of the cooperative search, in milliseconds.
pub const MINE_TICK_MS: u64 = 200;

/// Snapshot of a search in flight: the latest nonce tried, the hash it
/// produced and the time spent so far.
#[derive(Debug, Clone, Serialize)]
pub struct MineProgress {
    pub nonce: u64,
    pub hash: String,
    pub elapsed_ms: u64,
}

/// Hash attempts performed per tick: 3 at difficulty 1, 2 at difficulty 2,
/// otherwise 1.
pub fn hashes_per_tick(difficulty: u32) -> usize {
    match difficulty {
        1 => 3,
        2 => 2,
        _ => 1,
    }
}

/// Target prefix for a difficulty level: that many '0' hex digits.
pub fn target_prefix(difficulty: u32) -> String {
    "0".repeat(difficulty as usize)
}

/// Whether `hash` satisfies the difficulty predicate.
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    hash.chars().take(difficulty as usize).all(|c| c == '0')
}

/// Cooperative Proof-of-Work search. Each tick runs a bounded batch of
/// hash attempts (incrementing the nonce before every attempt), reports
/// `(nonce, hash, elapsed_ms)` through the callback, then suspends until
/// the next tick so the host loop keeps running. A zero `tick` skips the
/// delay but still yields between batches.
///
/// On success the block's `mining_duration_ms` is set and one final
/// progress report is emitted with the winning values; the future then
/// resolves exactly once with those values.
pub async fn search(
    block: &mut Block,
    difficulty: u32,
    tick: Duration,
    mut on_progress: impl FnMut(&MineProgress),
) -> MineProgress {
    let started = Instant::now();
    loop {
        let mut found = false;
        for _ in 0..hashes_per_tick(difficulty) {
            block.nonce = block.nonce.wrapping_add(1);
            block.hash = block.compute_hash();
            if meets_difficulty(&block.hash, difficulty) {
                found = true;
                break;
            }
        }

        let progress = MineProgress {
            nonce: block.nonce,
            hash: block.hash.clone(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        on_progress(&progress);

        if found {
            block.mining_duration_ms = progress.elapsed_ms;
            on_progress(&progress);
            return progress;
        }

        if tick.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(tick).await;
        }
    }
}
