//! Idempotency keys and client randomness
//!
//! Every move sent to the backend carries a fresh operation id so the server can
//! deduplicate retried submissions. Client seeds are the player's contribution to
//! the server's randomness commitment.

use rand::RngCore;
use rand_core::OsRng;
use sha2::{Digest, Sha256};
use uuid::Uuid;

const OPERATION_PREFIX: &str = "op";
const CLIENT_SEED_BYTES: usize = 32;

/// Generator for operation ids, client seeds and device fingerprints
#[derive(Debug, Clone, Copy, Default)]
pub struct IdempotencyKeys;

impl IdempotencyKeys {
    pub fn new() -> Self {
        Self
    }

    /// Fresh operation id; never reused for another request
    pub fn operation_id(&self) -> String {
        format!("{}_{}", OPERATION_PREFIX, Uuid::new_v4().simple())
    }

    /// Hex-encoded 32 random bytes from the OS generator
    pub fn client_seed(&self) -> String {
        let mut bytes = [0u8; CLIENT_SEED_BYTES];
        OsRng.fill_bytes(&mut bytes);
        hex::encode(bytes)
    }

    /// Stable, non-identifying hash of whatever the host environment supplies
    /// as device characteristics.
    pub fn device_fingerprint(&self, raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(b"stakeflow-device:");
        hasher.update(raw.as_bytes());
        hex::encode(hasher.finalize())
    }
}
