//! Persistence-tier backends for the global secret.
//!
//! Three implementations behind one trait:
//! - `MemoryStore`: process-lifetime, backs the session tier
//! - `FileStore`: JSON file on disk, backs the device tier by default
//! - `KeyringStore`: platform keychain (macOS Keychain Services, Linux
//!   Secret Service, Windows Credential Manager) via the `keyring` crate
//!
//! A secret lands in a store only when the user picked a tier that allows
//! it; the cache is responsible for scrubbing on downgrade.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use secrecy::{ExposeSecret, SecretString};

use notelock_core::NotelockResult;

/// Storage key for the account-wide global secret.
pub const GLOBAL_SECRET_KEY: &str = "global-secret";

/// A key-value slot a secret may be persisted into.
pub trait TierStore: Send + Sync {
    fn get(&self, key: &str) -> NotelockResult<Option<SecretString>>;
    fn set(&mut self, key: &str, secret: &SecretString) -> NotelockResult<()>;
    fn remove(&mut self, key: &str) -> NotelockResult<()>;
}

/// In-memory store; forgotten when the process exits (session tier).
#[derive(Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, SecretString>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TierStore for MemoryStore {
    fn get(&self, key: &str) -> NotelockResult<Option<SecretString>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, secret: &SecretString) -> NotelockResult<()> {
        self.entries.insert(key.to_string(), secret.clone());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> NotelockResult<()> {
        self.entries.remove(key);
        Ok(())
    }
}

/// JSON-file store for the device tier. The file holds only secrets the
/// user explicitly chose to remember on this device.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn load(&self) -> NotelockResult<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("reading device store: {}", self.path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("parsing device store: {}", self.path.display()))
            .map_err(Into::into)
    }

    fn save(&self, entries: &BTreeMap<String, String>) -> NotelockResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating dir: {}", parent.display()))?;
        }
        let json =
            serde_json::to_string_pretty(entries).context("serializing device store")?;
        // Write-then-rename so a crash never leaves a half-written store.
        let tmp = tmp_path(&self.path);
        std::fs::write(&tmp, json)
            .with_context(|| format!("writing device store: {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("replacing device store: {}", self.path.display()))?;
        tracing::debug!(path = %self.path.display(), "device store updated");
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let parent = path.parent().unwrap_or(Path::new("."));
    parent.join(format!(
        ".{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy()
    ))
}

impl TierStore for FileStore {
    fn get(&self, key: &str) -> NotelockResult<Option<SecretString>> {
        Ok(self.load()?.remove(key).map(SecretString::from))
    }

    fn set(&mut self, key: &str, secret: &SecretString) -> NotelockResult<()> {
        let mut entries = self.load()?;
        entries.insert(key.to_string(), secret.expose_secret().to_string());
        self.save(&entries)
    }

    fn remove(&mut self, key: &str) -> NotelockResult<()> {
        let mut entries = self.load()?;
        if entries.remove(key).is_some() {
            self.save(&entries)?;
        }
        Ok(())
    }
}

/// Platform-keychain store for the device tier.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    fn entry(&self, key: &str) -> NotelockResult<keyring::Entry> {
        keyring::Entry::new(&self.service, key)
            .map_err(|e| anyhow::anyhow!("keychain entry creation: {e}").into())
    }
}

impl TierStore for KeyringStore {
    fn get(&self, key: &str) -> NotelockResult<Option<SecretString>> {
        match self.entry(key)?.get_password() {
            Ok(password) => Ok(Some(SecretString::from(password))),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(anyhow::anyhow!("keychain get for '{key}': {e}").into()),
        }
    }

    fn set(&mut self, key: &str, secret: &SecretString) -> NotelockResult<()> {
        self.entry(key)?
            .set_password(secret.expose_secret())
            .map_err(|e| anyhow::anyhow!("keychain store for '{key}': {e}"))?;
        tracing::debug!(key, "secret stored in platform keychain");
        Ok(())
    }

    fn remove(&mut self, key: &str) -> NotelockResult<()> {
        match self.entry(key)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(anyhow::anyhow!("keychain delete for '{key}': {e}").into()),
        }
    }
}
