// SPDX-License-Identifier: Apache-2.0

//! Content hashes used for position verification and delivery dedup.

use sha2::{Digest, Sha256};

/// Number of digest bytes kept. 128 bits is plenty for collision resistance
/// within one log stream and keeps persisted state compact.
const FINGERPRINT_BYTES: usize = 16;

/// Hash of a single line's content, as hex.
pub fn line_hash(line: &str) -> String {
    let digest = Sha256::digest(line.as_bytes());
    hex::encode(&digest[..FINGERPRINT_BYTES])
}

/// Dedup fingerprint for a parsed line.
///
/// The source timestamp is mixed in so two identical messages sent at
/// different times stay distinct, while a re-read of the same physical line
/// hashes the same.
pub fn event_fingerprint(timestamp: Option<&str>, raw_line: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(timestamp.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(line_hash(raw_line).as_bytes());
    hex::encode(&hasher.finalize()[..FINGERPRINT_BYTES])
}
