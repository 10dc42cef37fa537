//! PIN verification hashing
//!
//! The gate check uses a plain SHA-256 of the PIN (fast by design, it only
//! guards page activation); key material always goes through the KDF.

use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

use notelock_core::{NotelockError, NotelockResult};

/// Minimum PIN length, enforced before any hashing or derivation.
pub const MIN_PIN_LEN: usize = 4;

/// Reject PINs shorter than [`MIN_PIN_LEN`] characters.
pub fn validate_pin(pin: &SecretString) -> NotelockResult<()> {
    if pin.expose_secret().chars().count() < MIN_PIN_LEN {
        return Err(NotelockError::validation(format!(
            "PIN must be at least {MIN_PIN_LEN} characters"
        )));
    }
    Ok(())
}

/// Lowercase-hex SHA-256 of the raw PIN. This is what pages persist as
/// `pin_verification_hash`; the raw PIN never leaves the secret cache.
pub fn hash_pin(pin: &SecretString) -> String {
    let digest = Sha256::digest(pin.expose_secret().as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

/// Compare a candidate PIN against a stored verification hash.
pub fn verify_pin(candidate: &SecretString, stored_hash: &str) -> bool {
    !stored_hash.is_empty() && hash_pin(candidate) == stored_hash
}
