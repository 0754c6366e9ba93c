use chrono::DateTime;
use sha2::{Digest, Sha256};

/// Compute the SHA-256 hash of a block's fields as lowercase hex.
/// The preimage is the plain concatenation, with no separators, of
/// index, previous_hash, timestamp, data and nonce, in that order.
/// Every digest in the crate is derived through this function.
pub fn calculate_block_hash(
    index: u64,
    timestamp: &str,
    data: &str,
    previous_hash: &str,
    nonce: u64,
) -> String {
    let preimage = format!("{index}{previous_hash}{timestamp}{data}{nonce}");
    let mut hasher = Sha256::new();
    hasher.update(preimage.as_bytes());
    hex::encode(hasher.finalize())
}

/// Render a millisecond-epoch timestamp string as a UTC datetime.
/// Input that does not parse is returned unchanged.
pub fn format_timestamp(timestamp: &str) -> String {
    timestamp
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}

/// Shorten a digest for display: first 10 characters plus an ellipsis.
pub fn truncate_hash(hash: &str) -> String {
    if hash.len() > 10 {
        format!("{}...", &hash[..10])
    } else {
        hash.to_string()
    }
}
