use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level subsystem configuration (loaded from notelock.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultConfig {
    pub crypto: CryptoConfig,
    pub limits: LimitsConfig,
    pub backup: BackupConfig,
    pub secrets: SecretsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CryptoConfig {
    /// PBKDF2-SHA256 iteration count recorded in new envelopes
    /// (default: 200000)
    pub kdf_iterations: u32,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            kdf_iterations: crate::types::DEFAULT_KDF_ITERATIONS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Soft cap on plaintext note size in bytes, rejected pre-encryption
    /// (default: 819200 = 800 KiB, under the backend's 1 MiB document limit)
    pub max_note_bytes: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_note_bytes: 800 * 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackupConfig {
    /// Local-only ledger file, distinct from the main application snapshot
    pub ledger_path: PathBuf,
    /// Snapshots retained per page (default: 3)
    pub keep: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            ledger_path: PathBuf::from("~/.local/share/notelock/backups.json"),
            keep: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecretsConfig {
    /// Device-tier backend: "file" or "keyring"
    pub device_store: String,
    /// Device-tier file path when the file backend is selected
    pub device_store_path: PathBuf,
    /// Keychain service name when the keyring backend is selected
    pub keyring_service: String,
}

impl Default for SecretsConfig {
    fn default() -> Self {
        Self {
            device_store: "file".into(),
            device_store_path: PathBuf::from("~/.local/share/notelock/device-secrets.json"),
            keyring_service: "notelock".into(),
        }
    }
}
