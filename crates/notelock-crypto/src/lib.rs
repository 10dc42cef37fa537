//! notelock-crypto: note encryption for PIN-protected pages
//!
//! Two independent secret domains feed the same pipeline:
//!
//! ```text
//! PIN (page or global)
//!   ├── gate check: SHA-256 hex of the raw PIN, compared to the stored
//!   │   verification hash (fast hash, never key material)
//!   └── key material: PBKDF2-HMAC-SHA256(PIN, salt, iterations) → 256-bit key
//!         └── AES-256-GCM(key, fresh 96-bit IV) → versioned envelope
//! ```
//!
//! The salt is reused across edits of the same page (same PIN + salt +
//! iterations derive the same key); the IV is fresh on every encryption.

pub mod envelope;
pub mod kdf;
pub mod pin;

pub use envelope::{open_notes, seal_notes};
pub use kdf::{derive_note_key, NoteKey};
pub use pin::{hash_pin, validate_pin, verify_pin};

/// Size of a derived note key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an envelope salt in bytes
pub const SALT_SIZE: usize = 16;

/// Size of an AES-GCM IV in bytes (96-bit)
pub const IV_SIZE: usize = 12;

/// Size of the GCM authentication tag
pub const TAG_SIZE: usize = 16;
