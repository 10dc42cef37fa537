use serde::{Deserialize, Serialize};

/// Envelope format version understood by this build.
pub const ENVELOPE_VERSION: u32 = 1;

/// Cipher constant recorded in every envelope.
pub const ALGORITHM_AES_GCM: &str = "AES-GCM";

/// KDF constant recorded in every envelope.
pub const KDF_PBKDF2: &str = "PBKDF2";

/// Default PBKDF2 iteration count, also assumed for envelopes that predate
/// the `iterations` field.
pub const DEFAULT_KDF_ITERATIONS: u32 = 200_000;

/// Which secret domain produced an envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherMode {
    /// Encrypted with the page's own PIN.
    Page,
    /// Encrypted with the account-wide global PIN.
    Global,
}

/// Self-describing ciphertext record for a page's notes.
///
/// Wire format (must round-trip exactly):
/// `{version, mode, algorithm, iv, ciphertext, kdf, iterations, salt}` with
/// iv/salt/ciphertext base64-encoded for text-safe persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CipherEnvelope {
    pub version: u32,
    pub mode: CipherMode,
    pub algorithm: String,
    /// Base64, 12 bytes decoded. Fresh on every encryption.
    pub iv: String,
    /// Base64 AES-GCM output (ciphertext + tag).
    pub ciphertext: String,
    pub kdf: String,
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// Base64, 16 bytes decoded. Reused across edits of the same page.
    pub salt: Option<String>,
}

fn default_iterations() -> u32 {
    DEFAULT_KDF_ITERATIONS
}

/// Persistence tier chosen by the user for the global secret.
///
/// Ordering matters: a tier includes every location below it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PersistTier {
    /// Memory only; forgotten when the process exits.
    None,
    /// Memory + session store.
    Session,
    /// Memory + session store + device store.
    Device,
}

/// A page in the tracker, as seen by the encrypted-notes subsystem.
///
/// The item catalog attached to a page is external plain data and not
/// modeled here. `Page` is deliberately not `Serialize`: only the derived
/// [`PageSyncRecord`] ever crosses the backend boundary, so the plaintext
/// notes cache cannot leak into a sync payload.
#[derive(Debug, Clone)]
pub struct Page {
    pub id: String,
    pub name: String,
    /// Sensitivity confirmation overlay on activation.
    pub requires_confirmation: bool,
    /// Page-level PIN gate. Must never be true without a verification hash.
    pub requires_pin: bool,
    /// SHA-256 hex of the page PIN; the raw PIN is never stored here.
    pub pin_verification_hash: Option<String>,
    /// Free-text page (notes) rather than a series list.
    pub is_notes_page: bool,
    /// Plaintext notes cache, only meaningful while unlocked.
    pub notes: String,
    pub notes_envelope: Option<CipherEnvelope>,
}

impl Page {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            requires_confirmation: false,
            requires_pin: false,
            pin_verification_hash: None,
            is_notes_page: false,
            notes: String::new(),
            notes_envelope: None,
        }
    }

    /// True when the page carries a usable page-level PIN gate.
    pub fn has_page_pin(&self) -> bool {
        self.requires_pin
            && self
                .pin_verification_hash
                .as_deref()
                .is_some_and(|h| !h.is_empty())
    }

    /// The record that crosses the backend-store boundary. Plaintext notes
    /// are structurally absent from it.
    pub fn sync_record(&self) -> PageSyncRecord {
        PageSyncRecord {
            id: self.id.clone(),
            pin_verification_hash: self.pin_verification_hash.clone(),
            requires_pin: self.requires_pin,
            is_notes_page: self.is_notes_page,
            notes_envelope: self.notes_envelope.clone(),
        }
    }
}

/// Per-page payload synced to the backend store. Nothing else crosses.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageSyncRecord {
    pub id: String,
    pub pin_verification_hash: Option<String>,
    pub requires_pin: bool,
    pub is_notes_page: bool,
    pub notes_envelope: Option<CipherEnvelope>,
}

/// One entry in the local backup ledger: a prior envelope, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupSnapshot {
    pub page_id: String,
    /// Unix epoch milliseconds.
    pub taken_at: u64,
    pub mode: CipherMode,
    pub payload: CipherEnvelope,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_envelope() -> CipherEnvelope {
        CipherEnvelope {
            version: 1,
            mode: CipherMode::Page,
            algorithm: ALGORITHM_AES_GCM.into(),
            iv: "AAAAAAAAAAAAAAAA".into(),
            ciphertext: "Zm9vYmFy".into(),
            kdf: KDF_PBKDF2.into(),
            iterations: DEFAULT_KDF_ITERATIONS,
            salt: Some("AAAAAAAAAAAAAAAAAAAAAA==".into()),
        }
    }

    #[test]
    fn test_envelope_wire_roundtrip() {
        let env = sample_envelope();
        let json = serde_json::to_string(&env).unwrap();
        let back: CipherEnvelope = serde_json::from_str(&json).unwrap();
        assert_eq!(env, back);
    }

    #[test]
    fn test_envelope_wire_field_names() {
        let json = serde_json::to_value(sample_envelope()).unwrap();
        let obj = json.as_object().unwrap();
        for field in [
            "version",
            "mode",
            "algorithm",
            "iv",
            "ciphertext",
            "kdf",
            "iterations",
            "salt",
        ] {
            assert!(obj.contains_key(field), "missing wire field {field}");
        }
        assert_eq!(json["mode"], "page");
        assert_eq!(json["algorithm"], "AES-GCM");
        assert_eq!(json["kdf"], "PBKDF2");
    }

    #[test]
    fn test_envelope_missing_iterations_defaults() {
        // Envelopes written before the iterations field carry the historic
        // default.
        let json = r#"{
            "version": 1,
            "mode": "global",
            "algorithm": "AES-GCM",
            "iv": "AAAAAAAAAAAAAAAA",
            "ciphertext": "Zm9vYmFy",
            "kdf": "PBKDF2",
            "salt": "AAAAAAAAAAAAAAAAAAAAAA=="
        }"#;
        let env: CipherEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.iterations, DEFAULT_KDF_ITERATIONS);
        assert_eq!(env.mode, CipherMode::Global);
    }

    #[test]
    fn test_tier_ordering() {
        assert!(PersistTier::None < PersistTier::Session);
        assert!(PersistTier::Session < PersistTier::Device);
    }

    #[test]
    fn test_sync_record_excludes_plaintext() {
        let mut page = Page::new("diary");
        page.is_notes_page = true;
        page.notes = "super secret plaintext".into();
        page.notes_envelope = Some(sample_envelope());

        let record = serde_json::to_value(page.sync_record()).unwrap();
        assert!(!record.to_string().contains("super secret plaintext"));
        assert!(record.get("notes").is_none());
        assert!(record.get("notesEnvelope").is_some());
        assert_eq!(record["requiresPin"], false);
        assert_eq!(record["isNotesPage"], true);
    }

    #[test]
    fn test_has_page_pin_requires_hash() {
        let mut page = Page::new("locked");
        page.requires_pin = true;
        assert!(!page.has_page_pin());
        page.pin_verification_hash = Some("abc123".into());
        assert!(page.has_page_pin());
    }
}
