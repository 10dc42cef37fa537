//! Versioned note envelopes: seal/open with AES-256-GCM
//!
//! Envelope rules:
//! - salt: taken from the previous envelope when one exists, otherwise
//!   16 fresh random bytes. A page's salt changes only on first encryption.
//! - iv: 12 fresh random bytes on every encryption, even when the salt and
//!   plaintext are unchanged.
//! - decryption fails closed: any authentication failure is `WrongSecret`,
//!   with no distinction between a wrong PIN, corrupted ciphertext, or a
//!   mismatched iv/salt.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use rand::RngCore;
use secrecy::SecretString;

use notelock_core::types::{
    CipherEnvelope, CipherMode, ALGORITHM_AES_GCM, ENVELOPE_VERSION, KDF_PBKDF2,
};
use notelock_core::{NotelockError, NotelockResult};

use crate::kdf::derive_note_key;
use crate::{IV_SIZE, SALT_SIZE};

/// Encrypt a page's notes into a fresh envelope.
///
/// `previous` is the page's current envelope, if any; its salt is reused so
/// the derived key stays stable across edits. The envelope replaces the old
/// one wholesale.
pub fn seal_notes(
    secret: &SecretString,
    plaintext: &str,
    mode: CipherMode,
    previous: Option<&CipherEnvelope>,
    iterations: u32,
) -> NotelockResult<CipherEnvelope> {
    let salt = match previous.and_then(|p| p.salt.as_deref()) {
        Some(b64) => decode_fixed::<SALT_SIZE>(b64, "salt")?,
        None => {
            let mut salt = [0u8; SALT_SIZE];
            rand::thread_rng().fill_bytes(&mut salt);
            salt
        }
    };

    let mut iv = [0u8; IV_SIZE];
    rand::thread_rng().fill_bytes(&mut iv);

    let key = derive_note_key(secret, &salt, iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("cipher init failed: {e}"))?;
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&iv), plaintext.as_bytes())
        .map_err(|e| anyhow::anyhow!("note encryption failed: {e}"))?;

    Ok(CipherEnvelope {
        version: ENVELOPE_VERSION,
        mode,
        algorithm: ALGORITHM_AES_GCM.into(),
        iv: base64_encode(&iv),
        ciphertext: base64_encode(&ciphertext),
        kdf: KDF_PBKDF2.into(),
        iterations,
        salt: Some(base64_encode(&salt)),
    })
}

/// Decrypt an envelope back to the plaintext notes.
///
/// Structural problems in the stored record are `CorruptEnvelope`; every
/// authentication failure is the single generic `WrongSecret`.
pub fn open_notes(secret: &SecretString, envelope: &CipherEnvelope) -> NotelockResult<String> {
    if envelope.version != ENVELOPE_VERSION {
        return Err(NotelockError::corrupt(format!(
            "unsupported envelope version {}",
            envelope.version
        )));
    }
    if envelope.algorithm != ALGORITHM_AES_GCM {
        return Err(NotelockError::corrupt(format!(
            "unsupported algorithm {:?}",
            envelope.algorithm
        )));
    }
    if envelope.kdf != KDF_PBKDF2 {
        return Err(NotelockError::corrupt(format!(
            "unsupported kdf {:?}",
            envelope.kdf
        )));
    }

    let salt_b64 = envelope
        .salt
        .as_deref()
        .ok_or_else(|| NotelockError::corrupt("missing salt"))?;
    let salt = decode_fixed::<SALT_SIZE>(salt_b64, "salt")?;
    let iv = decode_fixed::<IV_SIZE>(&envelope.iv, "iv")?;
    let ciphertext = base64_decode(&envelope.ciphertext, "ciphertext")?;

    let key = derive_note_key(secret, &salt, envelope.iterations);
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| anyhow::anyhow!("cipher init failed: {e}"))?;
    let plaintext = cipher
        .decrypt(Nonce::from_slice(&iv), ciphertext.as_slice())
        .map_err(|_| NotelockError::WrongSecret)?;

    String::from_utf8(plaintext)
        .map_err(|_| NotelockError::corrupt("decrypted notes are not valid UTF-8"))
}

fn base64_encode(data: &[u8]) -> String {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD.encode(data)
}

fn base64_decode(s: &str, field: &str) -> NotelockResult<Vec<u8>> {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    STANDARD
        .decode(s)
        .map_err(|e| NotelockError::corrupt(format!("{field}: invalid base64: {e}")))
}

fn decode_fixed<const N: usize>(s: &str, field: &str) -> NotelockResult<[u8; N]> {
    let bytes = base64_decode(s, field)?;
    bytes.try_into().map_err(|_| {
        NotelockError::corrupt(format!("{field}: wrong length (expected {N} bytes)"))
    })
}
