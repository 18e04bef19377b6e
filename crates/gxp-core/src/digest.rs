//! SHA-256 digests over canonical JSON
//!
//! `serde_json` maps are ordered, so serializing the same value always yields
//! the same bytes and therefore the same digest.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Raw SHA-256 of a byte slice
#[must_use]
pub fn sha256(bytes: &[u8]) -> [u8; 32] {
    Sha256::digest(bytes).into()
}

/// Hex-encoded SHA-256 of a serializable value
///
/// # Errors
/// Returns the serialization error if `value` cannot be encoded as JSON.
pub fn json_digest<T: Serialize + ?Sized>(value: &T) -> Result<String, serde_json::Error> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hex::encode(sha256(&bytes)))
}
