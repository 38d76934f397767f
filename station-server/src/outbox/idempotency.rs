//! Idempotency Key Derivation
//!
//! Deterministic key over the logical intent of an outbox item. Two enqueues
//! of the same intent collapse onto one pending row; a different
//! discriminator (e.g. a re-close of the same business date) yields a
//! distinct key.

use sha2::{Digest, Sha256};
use shared::models::SyncOperation;

/// Derive the idempotency key for an outbox intent.
///
/// Fields are newline-separated before hashing so that no concatenation of
/// adjacent fields can collide with a different split of the same bytes.
pub fn idempotency_key(
    entity_type: &str,
    entity_id: &str,
    operation: SyncOperation,
    discriminator: Option<&str>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.as_bytes());
    hasher.update(b"\n");
    hasher.update(entity_id.as_bytes());
    hasher.update(b"\n");
    hasher.update(operation.as_str().as_bytes());
    hasher.update(b"\n");
    hasher.update(discriminator.unwrap_or("").as_bytes());
    hex::encode(hasher.finalize())
}
