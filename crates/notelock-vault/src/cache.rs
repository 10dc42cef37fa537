//! Cached secrets: per-page PINs plus the one global slot.
//!
//! This is an explicit context object passed to every operation that needs
//! a secret, not an ambient singleton. Page secrets live in memory only;
//! the global secret additionally occupies whichever persistence tiers the
//! user consented to. Nothing here ever reaches the backend sync snapshot.

use std::collections::HashMap;

use secrecy::SecretString;

use notelock_core::types::PersistTier;
use notelock_core::NotelockResult;

use crate::store::{MemoryStore, TierStore, GLOBAL_SECRET_KEY};

pub struct SecretCache {
    page_secrets: HashMap<String, SecretString>,
    global: Option<SecretString>,
    tier: PersistTier,
    session_store: Box<dyn TierStore>,
    device_store: Box<dyn TierStore>,
}

impl SecretCache {
    pub fn new(session_store: Box<dyn TierStore>, device_store: Box<dyn TierStore>) -> Self {
        Self {
            page_secrets: HashMap::new(),
            global: None,
            tier: PersistTier::None,
            session_store,
            device_store,
        }
    }

    /// Cache with purely in-memory tiers. Used by tests and by hosts that
    /// opt out of persistence entirely.
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStore::new()), Box::new(MemoryStore::new()))
    }

    /// Per-page secret, memory only.
    pub fn get(&self, page_id: &str) -> Option<&SecretString> {
        self.page_secrets.get(page_id)
    }

    /// Cache a page PIN after successful verification.
    pub fn set(&mut self, page_id: &str, secret: SecretString) {
        self.page_secrets.insert(page_id.to_string(), secret);
    }

    pub fn remove(&mut self, page_id: &str) {
        self.page_secrets.remove(page_id);
    }

    /// The global secret: memory first, then the device store, then the
    /// session store. A hit in a persisted tier is pulled into memory and
    /// the remembered tier is restored along with it.
    pub fn global(&mut self) -> NotelockResult<Option<SecretString>> {
        if self.global.is_some() {
            return Ok(self.global.clone());
        }
        if let Some(secret) = self.device_store.get(GLOBAL_SECRET_KEY)? {
            tracing::debug!("global secret rehydrated from device store");
            self.global = Some(secret.clone());
            self.tier = PersistTier::Device;
            return Ok(Some(secret));
        }
        if let Some(secret) = self.session_store.get(GLOBAL_SECRET_KEY)? {
            tracing::debug!("global secret rehydrated from session store");
            self.global = Some(secret.clone());
            if self.tier < PersistTier::Session {
                self.tier = PersistTier::Session;
            }
            return Ok(Some(secret));
        }
        Ok(None)
    }

    /// Set the global secret at the chosen persistence tier. Memory always
    /// holds it; each store holds it only if the tier allows, and a
    /// downgrade scrubs the now-disallowed locations entirely.
    pub fn set_global(&mut self, secret: SecretString, tier: PersistTier) -> NotelockResult<()> {
        if tier >= PersistTier::Session {
            self.session_store.set(GLOBAL_SECRET_KEY, &secret)?;
        } else {
            self.session_store.remove(GLOBAL_SECRET_KEY)?;
        }
        if tier == PersistTier::Device {
            self.device_store.set(GLOBAL_SECRET_KEY, &secret)?;
        } else {
            self.device_store.remove(GLOBAL_SECRET_KEY)?;
        }
        self.global = Some(secret);
        self.tier = tier;
        tracing::debug!(?tier, "global secret cached");
        Ok(())
    }

    /// Remove the global secret from memory and every persistence tier.
    pub fn clear_global(&mut self) -> NotelockResult<()> {
        self.session_store.remove(GLOBAL_SECRET_KEY)?;
        self.device_store.remove(GLOBAL_SECRET_KEY)?;
        self.global = None;
        self.tier = PersistTier::None;
        Ok(())
    }

    /// Logout: drop every in-memory secret. User-consented persisted tiers
    /// survive and rehydrate lazily on the next access.
    pub fn clear_session(&mut self) {
        self.page_secrets.clear();
        self.global = None;
    }

    pub fn tier(&self) -> PersistTier {
        self.tier
    }
}
