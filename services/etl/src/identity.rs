//! Deterministic, content-derived surrogate identifiers.
//!
//! Every dimension id and the fact table's `work_tracking_id` come from
//! here. Referential integrity between facts and dimensions depends on this
//! function being a pure function of its input text.

use sha2::{Digest, Sha256};

/// Number of hex characters kept from the SHA-256 digest.
pub const ID_LENGTH: usize = 15;

/// Generate the surrogate id for a natural-key string.
///
/// Same input = same output, across calls and across runs.
pub fn generate_id(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let mut digest = format!("{:x}", hasher.finalize());
    digest.truncate(ID_LENGTH);
    digest
}
