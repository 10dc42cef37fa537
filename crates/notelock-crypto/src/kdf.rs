//! Key derivation: PBKDF2-HMAC-SHA256 PIN → note key

use pbkdf2::pbkdf2_hmac;
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::{KEY_SIZE, SALT_SIZE};

/// A 256-bit symmetric key derived from a PIN.
///
/// Never serialized; exists only between derivation and the encrypt/decrypt
/// call that consumes it. Zeroized on drop.
#[derive(Clone)]
pub struct NoteKey {
    bytes: [u8; KEY_SIZE],
}

impl NoteKey {
    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }
}

impl Drop for NoteKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for NoteKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NoteKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Derive a 256-bit note key from a PIN and salt via PBKDF2-HMAC-SHA256.
///
/// Deterministic: the same (PIN, salt, iterations) always yields the same
/// key, which is what allows salt reuse across edits of one page. The
/// iteration count is recorded per envelope for forward compatibility.
/// Minimum-length validation of the PIN is the caller's responsibility.
pub fn derive_note_key(secret: &SecretString, salt: &[u8; SALT_SIZE], iterations: u32) -> NoteKey {
    let mut key = [0u8; KEY_SIZE];
    pbkdf2_hmac::<Sha256>(secret.expose_secret().as_bytes(), salt, iterations, &mut key);
    NoteKey::from_bytes(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    // Fast iteration count for tests; production uses the envelope value.
    const TEST_ITERS: u32 = 1_000;

    #[test]
    fn test_kdf_deterministic() {
        let secret = SecretString::from("1234");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_note_key(&secret, &salt, TEST_ITERS);
        let key2 = derive_note_key(&secret, &salt, TEST_ITERS);

        assert_eq!(key1.as_bytes(), key2.as_bytes(), "KDF must be deterministic");
    }

    #[test]
    fn test_kdf_different_pins() {
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_note_key(&SecretString::from("1234"), &salt, TEST_ITERS);
        let key2 = derive_note_key(&SecretString::from("4321"), &salt, TEST_ITERS);

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different PINs must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_salts() {
        let secret = SecretString::from("same-pin");

        let key1 = derive_note_key(&secret, &[1u8; SALT_SIZE], TEST_ITERS);
        let key2 = derive_note_key(&secret, &[2u8; SALT_SIZE], TEST_ITERS);

        assert_ne!(
            key1.as_bytes(),
            key2.as_bytes(),
            "different salts must produce different keys"
        );
    }

    #[test]
    fn test_kdf_different_iterations() {
        let secret = SecretString::from("same-pin");
        let salt = [1u8; SALT_SIZE];

        let key1 = derive_note_key(&secret, &salt, TEST_ITERS);
        let key2 = derive_note_key(&secret, &salt, TEST_ITERS + 1);

        assert_ne!(key1.as_bytes(), key2.as_bytes());
    }

    #[test]
    fn test_debug_redacts_key() {
        let key = derive_note_key(&SecretString::from("1234"), &[0u8; SALT_SIZE], TEST_ITERS);
        assert!(format!("{key:?}").contains("REDACTED"));
    }
}
