//! Deterministic cache keys for to-compress segments.
//!
//! A fingerprint is a SHA-256 hash over the canonical serialization of a
//! contiguous message segment plus the model id and budget parameters. Same
//! inputs always produce the same fingerprint, across processes and over
//! time; that determinism is what makes cross-process summary reuse sound.
//! Collision resistance comes from the hash, not from any bookkeeping.

use sha2::{Digest, Sha256};

use crate::Message;

/// Unit separator between fields of one record.
const FIELD_SEP: u8 = 0x1f;
/// Record separator between messages; makes the serialization unambiguous
/// so ("ab","c") and ("a","bc") cannot collide.
const RECORD_SEP: u8 = 0x1e;

/// Fixed-length, hex-encoded cache key for a message segment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Compute the fingerprint of `segment` under the given model and budget
    /// parameters.
    pub fn compute(
        segment: &[Message],
        model: &str,
        max_tokens: u32,
        reserve_fraction: f64,
    ) -> Self {
        let mut hasher = Sha256::new();
        for msg in segment {
            hasher.update(msg.role.as_str().as_bytes());
            hasher.update([FIELD_SEP]);
            hasher.update(msg.content.as_bytes());
            hasher.update([RECORD_SEP]);
        }
        hasher.update(model.as_bytes());
        hasher.update([FIELD_SEP]);
        hasher.update(max_tokens.to_le_bytes());
        hasher.update(reserve_fraction.to_le_bytes());

        let digest = hasher.finalize();
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        Fingerprint(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
