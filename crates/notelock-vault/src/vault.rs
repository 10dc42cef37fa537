//! The UI-facing service tying the gate, cache, ledger, and crypto together.
//!
//! `NotesVault` owns the session state; pages are owned by the caller and
//! passed in by mutable slice, which keeps the vault agnostic of how the
//! surrounding app stores its catalog. Every operation takes `&mut self`,
//! so writes against a page are serialized by ownership rather than by an
//! internal queue.

use notelock_core::config::VaultConfig;
use notelock_core::types::{CipherMode, Page, PersistTier};
use notelock_core::{NotelockError, NotelockResult};
use notelock_crypto::envelope::{open_notes, seal_notes};
use notelock_crypto::pin::{hash_pin, validate_pin, verify_pin};
use secrecy::SecretString;
use tracing::{debug, info, warn};

use crate::cache::SecretCache;
use crate::gate::{Continuation, GateController, GateState, GlobalPurpose};
use crate::ledger::BackupLedger;
use crate::rekey::{self, RekeyReport};
use crate::store::{FileStore, KeyringStore, MemoryStore, TierStore};

/// Result of a page activation attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum Activation {
    /// The page is now active. `decrypted` is true when an envelope was
    /// opened into the plaintext cache as part of the switch.
    Activated { page_id: String, decrypted: bool },
    /// A page PIN prompt is open; the previously active page stays visible.
    PinRequired { page_id: String },
    /// The global PIN prompt is open.
    GlobalPinRequired { purpose: GlobalPurpose },
    /// The sensitivity confirmation is open; content stays gated.
    ConfirmationRequired { page_id: String },
}

/// Result of a successful page PIN submission.
#[derive(Debug, PartialEq, Eq)]
pub struct PinUnlock {
    pub activated: bool,
    pub awaiting_confirmation: bool,
    /// The PIN matched but the page's envelope would not open; the ledger
    /// may hold a usable snapshot.
    pub recovery_needed: bool,
}

/// Result of a successful global PIN submission.
#[derive(Debug, PartialEq, Eq)]
pub struct GlobalUnlock {
    /// No global envelope existed anywhere; the candidate became the secret.
    pub first_use: bool,
    /// Pages decrypted while running the queued continuation.
    pub decrypted_pages: Vec<String>,
}

/// Non-mutating global PIN check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalVerdict {
    Accepted,
    Rejected,
    /// No global envelope exists to check against.
    Unknown,
}

/// Result of a note update request.
#[derive(Debug, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// A prompt was opened and the identical update queued behind it.
    SecretNeeded,
}

pub struct NotesVault {
    config: VaultConfig,
    cache: SecretCache,
    gate: GateController,
    ledger: BackupLedger,
}

impl NotesVault {
    /// Build a vault from config: device store backend per `[secrets]`,
    /// ledger at `[backup].ledger_path`.
    pub fn open(config: VaultConfig) -> Self {
        let device_store: Box<dyn TierStore> = match config.secrets.device_store.as_str() {
            "keyring" => Box::new(KeyringStore::new(config.secrets.keyring_service.clone())),
            _ => Box::new(FileStore::new(config.secrets.device_store_path.clone())),
        };
        let cache = SecretCache::new(Box::new(MemoryStore::new()), device_store);
        let ledger = BackupLedger::open(config.backup.ledger_path.clone())
            .with_keep(config.backup.keep);
        Self::with_parts(config, cache, ledger)
    }

    /// Inject pre-built parts (tests, embedders with their own stores).
    pub fn with_parts(config: VaultConfig, cache: SecretCache, ledger: BackupLedger) -> Self {
        Self {
            config,
            cache,
            gate: GateController::new(),
            ledger,
        }
    }

    pub fn gate(&self) -> &GateController {
        &self.gate
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    /// Switch to `page_id`, opening whichever prompt its gates require.
    /// Auto-decrypts silently only when the needed secret is already cached.
    pub async fn activate_page(
        &mut self,
        pages: &mut [Page],
        page_id: &str,
    ) -> NotelockResult<Activation> {
        let idx = find_page(pages, page_id)?;
        let has_page_secret = self.cache.get(page_id).is_some();
        let snapshot = pages[idx].clone();

        match self.gate.activate(&snapshot, has_page_secret).clone() {
            GateState::PinPrompt { page_id, .. } => {
                return Ok(Activation::PinRequired { page_id });
            }
            GateState::ConfirmPrompt { page_id } => {
                return Ok(Activation::ConfirmationRequired { page_id });
            }
            _ => {}
        }

        // Activated. Decrypt the notes envelope if the domain secret is in
        // hand; otherwise raise the global prompt with the decrypt queued.
        let Some(envelope) = pages[idx].notes_envelope.clone() else {
            return Ok(Activation::Activated {
                page_id: page_id.to_string(),
                decrypted: false,
            });
        };
        match envelope.mode {
            CipherMode::Page => {
                let Some(secret) = self.cache.get(page_id).cloned() else {
                    return Ok(Activation::Activated {
                        page_id: page_id.to_string(),
                        decrypted: false,
                    });
                };
                match open_notes(&secret, &envelope) {
                    Ok(plaintext) => {
                        pages[idx].notes = plaintext;
                        Ok(Activation::Activated {
                            page_id: page_id.to_string(),
                            decrypted: true,
                        })
                    }
                    Err(err) => {
                        warn!(page_id, error = %err, "cached page secret no longer opens envelope");
                        Ok(Activation::Activated {
                            page_id: page_id.to_string(),
                            decrypted: false,
                        })
                    }
                }
            }
            CipherMode::Global => match self.cache.global()? {
                Some(secret) => match open_notes(&secret, &envelope) {
                    Ok(plaintext) => {
                        pages[idx].notes = plaintext;
                        Ok(Activation::Activated {
                            page_id: page_id.to_string(),
                            decrypted: true,
                        })
                    }
                    Err(_) => {
                        // Cached secret is stale; re-prompt.
                        self.open_global(pages, Continuation::DecryptPage {
                            page_id: page_id.to_string(),
                        })
                    }
                },
                None => self.open_global(pages, Continuation::DecryptPage {
                    page_id: page_id.to_string(),
                }),
            },
        }
    }

    /// Resolve an open page PIN prompt. A wrong candidate returns
    /// `WrongSecret` and leaves the prompt open.
    pub async fn submit_page_pin(
        &mut self,
        pages: &mut [Page],
        candidate: SecretString,
    ) -> NotelockResult<PinUnlock> {
        let GateState::PinPrompt { page_id, .. } = self.gate.state().clone() else {
            return Err(NotelockError::validation("no page PIN prompt is open"));
        };
        validate_pin(&candidate)?;
        let idx = find_page(pages, &page_id)?;
        let stored = pages[idx].pin_verification_hash.clone().unwrap_or_default();
        if !verify_pin(&candidate, &stored) {
            return Err(NotelockError::WrongSecret);
        }

        self.cache.set(&page_id, candidate.clone());
        let mut recovery_needed = false;
        if let Some(envelope) = pages[idx].notes_envelope.clone() {
            if envelope.mode == CipherMode::Page {
                match open_notes(&candidate, &envelope) {
                    Ok(plaintext) => pages[idx].notes = plaintext,
                    Err(err) => {
                        warn!(%page_id, error = %err, "verified PIN does not open envelope");
                        recovery_needed = true;
                    }
                }
            }
        }

        let snapshot = pages[idx].clone();
        let state = self.gate.pin_verified(&snapshot).clone();

        if let Some(Continuation::EncryptNote { page_id: target, plaintext }) =
            self.gate.take_pending()
        {
            if target == page_id {
                let secret = candidate;
                self.apply_update(&mut pages[idx], &secret, CipherMode::Page, plaintext)
                    .await?;
            }
        }

        let awaiting_confirmation = matches!(state, GateState::ConfirmPrompt { .. });
        Ok(PinUnlock {
            activated: !awaiting_confirmation,
            awaiting_confirmation,
            recovery_needed,
        })
    }

    /// Resolve an open sensitivity confirmation.
    pub fn confirm_page(&mut self) {
        self.gate.confirm();
    }

    /// Abandon whatever prompt is open; the queued continuation is dropped.
    pub fn cancel_prompt(&mut self) {
        self.gate.cancel();
    }

    /// Resolve the global prompt (or adopt a global secret directly from a
    /// settings flow). Unlock requires the candidate to open an existing
    /// global envelope; first use accepts after length validation.
    pub async fn submit_global_pin(
        &mut self,
        pages: &mut [Page],
        candidate: SecretString,
        tier: PersistTier,
    ) -> NotelockResult<GlobalUnlock> {
        validate_pin(&candidate)?;
        let first_use = match global_sample(pages) {
            Some(envelope) => {
                open_notes(&candidate, envelope).map_err(|_| NotelockError::WrongSecret)?;
                false
            }
            None => true,
        };
        self.cache.set_global(candidate.clone(), tier)?;
        self.gate.global_verified();
        info!(first_use, ?tier, "global secret accepted");

        let mut decrypted_pages = Vec::new();
        match self.gate.take_pending() {
            Some(Continuation::DecryptAll) => {
                decrypted_pages = decrypt_globals(pages, &candidate);
            }
            Some(Continuation::DecryptPage { page_id }) => {
                let idx = find_page(pages, &page_id)?;
                if let Some(envelope) = pages[idx].notes_envelope.clone() {
                    match open_notes(&candidate, &envelope) {
                        Ok(plaintext) => {
                            pages[idx].notes = plaintext;
                            decrypted_pages.push(page_id);
                        }
                        Err(err) => warn!(%page_id, error = %err, "queued decrypt failed"),
                    }
                }
            }
            Some(Continuation::EncryptNote { page_id, plaintext }) => {
                let idx = find_page(pages, &page_id)?;
                self.apply_update(&mut pages[idx], &candidate, CipherMode::Global, plaintext)
                    .await?;
            }
            None => {}
        }
        Ok(GlobalUnlock {
            first_use,
            decrypted_pages,
        })
    }

    /// Replace a page's note. The soft size cap is checked before anything
    /// else; on overflow the prior note, envelope, and prompts are untouched.
    pub async fn request_note_update(
        &mut self,
        pages: &mut [Page],
        page_id: &str,
        plaintext: String,
    ) -> NotelockResult<UpdateOutcome> {
        let limit = self.config.limits.max_note_bytes;
        if plaintext.len() > limit {
            return Err(NotelockError::SizeLimitExceeded {
                limit,
                actual: plaintext.len(),
            });
        }
        let idx = find_page(pages, page_id)?;

        if pages[idx].has_page_pin() {
            let Some(secret) = self.cache.get(page_id).cloned() else {
                let snapshot = pages[idx].clone();
                self.gate.activate(&snapshot, false);
                self.gate.queue(Continuation::EncryptNote {
                    page_id: page_id.to_string(),
                    plaintext,
                });
                return Ok(UpdateOutcome::SecretNeeded);
            };
            self.apply_update(&mut pages[idx], &secret, CipherMode::Page, plaintext)
                .await?;
            return Ok(UpdateOutcome::Applied);
        }

        if let Some(secret) = self.cache.global()? {
            self.apply_update(&mut pages[idx], &secret, CipherMode::Global, plaintext)
                .await?;
            return Ok(UpdateOutcome::Applied);
        }

        // A notes page without its own PIN always encrypts under the global
        // domain; with no secret in hand the edit waits behind the global
        // prompt, which doubles as first-use setup when no global envelope
        // exists yet. The note is never stored in the clear.
        let purpose = if global_sample(pages).is_some() {
            GlobalPurpose::Unlock
        } else {
            GlobalPurpose::Setup
        };
        self.gate.open_global_prompt(purpose);
        self.gate.queue(Continuation::EncryptNote {
            page_id: page_id.to_string(),
            plaintext,
        });
        Ok(UpdateOutcome::SecretNeeded)
    }

    /// Hash-compare a candidate against a page's stored verification hash.
    pub fn verify_page_pin(&self, page: &Page, candidate: &SecretString) -> bool {
        page.pin_verification_hash
            .as_deref()
            .is_some_and(|hash| verify_pin(candidate, hash))
    }

    /// Check a candidate against one existing global envelope.
    pub fn verify_global_pin(&self, pages: &[Page], candidate: &SecretString) -> GlobalVerdict {
        match global_sample(pages) {
            Some(envelope) => match open_notes(candidate, envelope) {
                Ok(_) => GlobalVerdict::Accepted,
                Err(_) => GlobalVerdict::Rejected,
            },
            None => GlobalVerdict::Unknown,
        }
    }

    /// Set a page-level PIN: hash and flag are written together, and the raw
    /// PIN is cached so the page stays unlocked for this session.
    pub fn set_page_pin(
        &mut self,
        pages: &mut [Page],
        page_id: &str,
        pin: SecretString,
    ) -> NotelockResult<()> {
        validate_pin(&pin)?;
        let idx = find_page(pages, page_id)?;
        pages[idx].pin_verification_hash = Some(hash_pin(&pin));
        pages[idx].requires_pin = true;
        self.cache.set(page_id, pin);
        Ok(())
    }

    /// Drop a page-level PIN. An existing page-mode envelope is deliberately
    /// left in place; the next note update re-homes the ciphertext.
    pub fn remove_page_pin(&mut self, pages: &mut [Page], page_id: &str) -> NotelockResult<()> {
        let idx = find_page(pages, page_id)?;
        pages[idx].pin_verification_hash = None;
        pages[idx].requires_pin = false;
        self.cache.remove(page_id);
        Ok(())
    }

    /// Reinstall the newest ledger snapshot for a page, clearing the
    /// plaintext cache so the restored envelope is authoritative.
    pub async fn restore_from_backup(
        &mut self,
        pages: &mut [Page],
        page_id: &str,
    ) -> NotelockResult<()> {
        let idx = find_page(pages, page_id)?;
        let snapshot = self
            .ledger
            .pop(page_id)
            .await
            .ok_or(NotelockError::RecoveryUnavailable)?;
        pages[idx].notes_envelope = Some(snapshot.payload);
        pages[idx].notes.clear();
        info!(page_id, taken_at = snapshot.taken_at, "restored envelope from backup ledger");
        Ok(())
    }

    /// True when a notes page has lost both envelope and plaintext but the
    /// ledger still holds a snapshot to fall back on.
    pub fn recovery_available(&self, page: &Page) -> bool {
        page.is_notes_page
            && page.notes_envelope.is_none()
            && page.notes.is_empty()
            && self.ledger.has_snapshot(&page.id)
    }

    /// Change the global PIN for this session: verify the old secret, sweep
    /// every global envelope, adopt the new secret at the remembered tier.
    pub async fn change_global_secret(
        &mut self,
        pages: &mut [Page],
        old: &SecretString,
        new: &SecretString,
    ) -> NotelockResult<RekeyReport> {
        rekey::change_global_secret(
            pages,
            &mut self.cache,
            &mut self.ledger,
            old,
            new,
            self.config.crypto.kdf_iterations,
        )
        .await
    }

    /// Remove the global PIN: decrypt every global envelope, keep the
    /// plaintext, and scrub the secret from every tier.
    pub async fn remove_global_secret(
        &mut self,
        pages: &mut [Page],
        secret: &SecretString,
    ) -> NotelockResult<RekeyReport> {
        rekey::remove_global_secret(pages, &mut self.cache, &mut self.ledger, secret).await
    }

    /// Post-login sweep: decrypt every global-mode notes page. With no
    /// cached global secret this opens the global prompt with the sweep
    /// queued behind it and decrypts nothing yet.
    pub fn decrypt_all_globals(&mut self, pages: &mut [Page]) -> NotelockResult<Vec<String>> {
        match self.cache.global()? {
            Some(secret) => Ok(decrypt_globals(pages, &secret)),
            None => {
                if global_sample(pages).is_some() {
                    self.open_global_with(Continuation::DecryptAll);
                }
                Ok(Vec::new())
            }
        }
    }

    /// Logout: drop all in-memory secrets and reset the gate. Secrets the
    /// user chose to persist at Session or Device tier survive.
    pub fn clear_session(&mut self) {
        self.cache.clear_session();
        self.gate = GateController::new();
        debug!("session secrets and gate state cleared");
    }

    async fn apply_update(
        &mut self,
        page: &mut Page,
        secret: &SecretString,
        mode: CipherMode,
        plaintext: String,
    ) -> NotelockResult<()> {
        let previous = page.notes_envelope.clone();
        let envelope = seal_notes(
            secret,
            &plaintext,
            mode,
            previous.as_ref(),
            self.config.crypto.kdf_iterations,
        )?;
        page.notes = plaintext;
        page.notes_envelope = Some(envelope.clone());
        // The fresh ciphertext goes to the ledger, so the newest version is
        // what a restore recovers if the envelope ever goes missing.
        self.ledger.push(&page.id, envelope).await;
        debug!(page_id = %page.id, ?mode, "note envelope replaced");
        Ok(())
    }

    fn open_global(
        &mut self,
        pages: &[Page],
        continuation: Continuation,
    ) -> NotelockResult<Activation> {
        let purpose = if global_sample(pages).is_some() {
            GlobalPurpose::Unlock
        } else {
            GlobalPurpose::Setup
        };
        self.gate.open_global_prompt(purpose);
        self.gate.queue(continuation);
        Ok(Activation::GlobalPinRequired { purpose })
    }

    fn open_global_with(&mut self, continuation: Continuation) {
        self.gate.open_global_prompt(GlobalPurpose::Unlock);
        self.gate.queue(continuation);
    }
}

fn find_page(pages: &[Page], page_id: &str) -> NotelockResult<usize> {
    pages
        .iter()
        .position(|p| p.id == page_id)
        .ok_or_else(|| NotelockError::validation(format!("unknown page {page_id}")))
}

fn global_sample(pages: &[Page]) -> Option<&notelock_core::types::CipherEnvelope> {
    pages.iter().find_map(|p| {
        p.notes_envelope
            .as_ref()
            .filter(|env| env.mode == CipherMode::Global)
    })
}

fn decrypt_globals(pages: &mut [Page], secret: &SecretString) -> Vec<String> {
    let mut decrypted = Vec::new();
    for page in pages.iter_mut() {
        let Some(envelope) = page.notes_envelope.clone() else {
            continue;
        };
        if envelope.mode != CipherMode::Global {
            continue;
        }
        match open_notes(secret, &envelope) {
            Ok(plaintext) => {
                page.notes = plaintext;
                decrypted.push(page.id.clone());
            }
            Err(err) => warn!(page_id = %page.id, error = %err, "global sweep skipped page"),
        }
    }
    decrypted
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_ITERS: u32 = 1_000;

    fn secret(s: &str) -> SecretString {
        SecretString::from(s.to_string())
    }

    fn test_vault() -> NotesVault {
        let mut config = VaultConfig::default();
        config.crypto.kdf_iterations = TEST_ITERS;
        NotesVault::with_parts(config, SecretCache::in_memory(), BackupLedger::ephemeral())
    }

    fn notes_page(name: &str) -> Page {
        let mut page = Page::new(name);
        page.is_notes_page = true;
        page
    }

    fn pin_notes_page(name: &str, pin: &str, notes: &str) -> Page {
        let mut page = notes_page(name);
        page.requires_pin = true;
        page.pin_verification_hash = Some(hash_pin(&secret(pin)));
        page.notes_envelope =
            Some(seal_notes(&secret(pin), notes, CipherMode::Page, None, TEST_ITERS).unwrap());
        page
    }

    fn global_notes_page(name: &str, pin: &str, notes: &str) -> Page {
        let mut page = notes_page(name);
        page.notes_envelope =
            Some(seal_notes(&secret(pin), notes, CipherMode::Global, None, TEST_ITERS).unwrap());
        page
    }

    #[tokio::test]
    async fn test_pin_gate_wrong_then_right() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("home"), pin_notes_page("diary", "1234", "dear diary")];
        let home_id = pages[0].id.clone();
        let diary_id = pages[1].id.clone();
        vault.activate_page(&mut pages, &home_id).await.unwrap();

        let act = vault.activate_page(&mut pages, &diary_id).await.unwrap();
        assert_eq!(act, Activation::PinRequired { page_id: diary_id.clone() });
        assert_eq!(vault.gate().active_page_id(), Some(home_id.as_str()));

        let err = vault
            .submit_page_pin(&mut pages, secret("0000"))
            .await
            .unwrap_err();
        assert!(matches!(err, NotelockError::WrongSecret));
        // Prompt stays open; nothing decrypted or cached.
        assert!(matches!(vault.gate().state(), GateState::PinPrompt { .. }));
        assert!(pages[1].notes.is_empty());

        let unlock = vault
            .submit_page_pin(&mut pages, secret("1234"))
            .await
            .unwrap();
        assert!(unlock.activated);
        assert!(!unlock.recovery_needed);
        assert_eq!(pages[1].notes, "dear diary");
        assert_eq!(vault.gate().active_page_id(), Some(diary_id.as_str()));
    }

    #[tokio::test]
    async fn test_pin_then_confirmation_chain() {
        let mut vault = test_vault();
        let mut page = pin_notes_page("diary", "1234", "hidden");
        page.requires_confirmation = true;
        let id = page.id.clone();
        let mut pages = vec![page];

        vault.activate_page(&mut pages, &id).await.unwrap();
        let unlock = vault
            .submit_page_pin(&mut pages, secret("1234"))
            .await
            .unwrap();
        assert!(unlock.awaiting_confirmation);
        assert!(!unlock.activated);

        vault.confirm_page();
        assert_eq!(vault.gate().state(), &GateState::Idle);
        assert!(vault.gate().is_confirmed(&id));
    }

    #[tokio::test]
    async fn test_activation_never_exposes_without_secret() {
        let mut vault = test_vault();
        let mut pages = vec![global_notes_page("diary", "1234", "hidden")];
        let id = pages[0].id.clone();

        let act = vault.activate_page(&mut pages, &id).await.unwrap();
        assert_eq!(
            act,
            Activation::GlobalPinRequired {
                purpose: GlobalPurpose::Unlock
            }
        );
        assert!(pages[0].notes.is_empty());
        assert_eq!(
            vault.gate().pending(),
            Some(&Continuation::DecryptPage { page_id: id })
        );
    }

    #[tokio::test]
    async fn test_global_unlock_runs_queued_decrypt() {
        let mut vault = test_vault();
        let mut pages = vec![global_notes_page("diary", "1234", "hidden")];
        let id = pages[0].id.clone();
        vault.activate_page(&mut pages, &id).await.unwrap();

        let err = vault
            .submit_global_pin(&mut pages, secret("0000"), PersistTier::None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotelockError::WrongSecret));
        assert!(pages[0].notes.is_empty());

        let unlock = vault
            .submit_global_pin(&mut pages, secret("1234"), PersistTier::None)
            .await
            .unwrap();
        assert!(!unlock.first_use);
        assert_eq!(unlock.decrypted_pages, vec![id]);
        assert_eq!(pages[0].notes, "hidden");
    }

    #[tokio::test]
    async fn test_first_note_opens_setup_prompt_never_stores_plaintext() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();

        // No global secret anywhere yet: the edit must wait behind the
        // first-use setup prompt instead of landing in the clear.
        let outcome = vault
            .request_note_update(&mut pages, &id, "first note".into())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::SecretNeeded);
        assert_eq!(
            vault.gate().state(),
            &GateState::GlobalPinPrompt {
                purpose: GlobalPurpose::Setup
            }
        );
        assert!(pages[0].notes.is_empty());
        assert!(pages[0].notes_envelope.is_none());

        let unlock = vault
            .submit_global_pin(&mut pages, secret("7777"), PersistTier::Session)
            .await
            .unwrap();
        assert!(unlock.first_use);
        let env = pages[0].notes_envelope.as_ref().unwrap();
        assert_eq!(env.mode, CipherMode::Global);
        assert_eq!(open_notes(&secret("7777"), env).unwrap(), "first note");
        assert_eq!(pages[0].notes, "first note");
    }

    #[tokio::test]
    async fn test_short_global_candidate_rejected_even_first_use() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let err = vault
            .submit_global_pin(&mut pages, secret("12"), PersistTier::None)
            .await
            .unwrap_err();
        assert!(matches!(err, NotelockError::Validation(_)));
    }

    #[tokio::test]
    async fn test_size_cap_inclusive_boundary() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();
        vault
            .submit_global_pin(&mut pages, secret("7777"), PersistTier::None)
            .await
            .unwrap();

        let at_limit = "x".repeat(800 * 1024);
        assert_eq!(
            vault
                .request_note_update(&mut pages, &id, at_limit)
                .await
                .unwrap(),
            UpdateOutcome::Applied
        );

        let over = "x".repeat(800 * 1024 + 1);
        let before = pages[0].notes.clone();
        let err = vault
            .request_note_update(&mut pages, &id, over)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            NotelockError::SizeLimitExceeded { limit, actual }
                if limit == 800 * 1024 && actual == 800 * 1024 + 1
        ));
        assert_eq!(pages[0].notes, before);
        assert_eq!(vault.gate().state(), &GateState::Idle);
    }

    #[tokio::test]
    async fn test_update_without_secret_queues_and_cancel_drops() {
        let mut vault = test_vault();
        let mut pages = vec![pin_notes_page("diary", "1234", "old")];
        let id = pages[0].id.clone();
        let before = pages[0].notes_envelope.clone();

        let outcome = vault
            .request_note_update(&mut pages, &id, "draft".into())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::SecretNeeded);
        assert!(matches!(vault.gate().state(), GateState::PinPrompt { .. }));

        vault.cancel_prompt();
        assert_eq!(vault.gate().state(), &GateState::Idle);
        assert!(vault.gate().pending().is_none());
        // Nothing applied.
        assert_eq!(pages[0].notes_envelope, before);
    }

    #[tokio::test]
    async fn test_queued_update_applies_after_pin_unlock() {
        let mut vault = test_vault();
        let mut pages = vec![pin_notes_page("diary", "1234", "old")];
        let id = pages[0].id.clone();

        vault
            .request_note_update(&mut pages, &id, "new draft".into())
            .await
            .unwrap();
        vault
            .submit_page_pin(&mut pages, secret("1234"))
            .await
            .unwrap();

        assert_eq!(pages[0].notes, "new draft");
        let env = pages[0].notes_envelope.as_ref().unwrap();
        assert_eq!(open_notes(&secret("1234"), env).unwrap(), "new draft");
        // The fresh envelope was snapshotted.
        assert_eq!(vault.ledger.peek(&id).unwrap().payload, *env);
    }

    #[tokio::test]
    async fn test_update_with_cached_page_secret_applies_directly() {
        let mut vault = test_vault();
        let mut pages = vec![pin_notes_page("diary", "1234", "old")];
        let id = pages[0].id.clone();
        vault.cache.set(&id, secret("1234"));

        let outcome = vault
            .request_note_update(&mut pages, &id, "edited".into())
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Applied);
        let env = pages[0].notes_envelope.as_ref().unwrap();
        assert_eq!(env.mode, CipherMode::Page);
        assert_eq!(open_notes(&secret("1234"), env).unwrap(), "edited");
    }

    #[tokio::test]
    async fn test_restore_recovers_newest_envelope() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();
        vault
            .submit_global_pin(&mut pages, secret("7777"), PersistTier::None)
            .await
            .unwrap();
        vault
            .request_note_update(&mut pages, &id, "version one".into())
            .await
            .unwrap();
        vault
            .request_note_update(&mut pages, &id, "version two".into())
            .await
            .unwrap();
        let current = pages[0].notes_envelope.clone().unwrap();

        // Simulate the recoverable-loss condition: envelope and plaintext
        // both gone, snapshots still in the ledger.
        pages[0].notes_envelope = None;
        pages[0].notes.clear();
        assert!(vault.recovery_available(&pages[0]));

        vault.restore_from_backup(&mut pages, &id).await.unwrap();
        assert_eq!(pages[0].notes_envelope.as_ref().unwrap(), &current);
        assert!(pages[0].notes.is_empty());
        assert_eq!(
            open_notes(&secret("7777"), pages[0].notes_envelope.as_ref().unwrap()).unwrap(),
            "version two"
        );

        // Older snapshots sit behind the newest one.
        vault.restore_from_backup(&mut pages, &id).await.unwrap();
        assert_eq!(
            open_notes(&secret("7777"), pages[0].notes_envelope.as_ref().unwrap()).unwrap(),
            "version one"
        );

        let err = vault
            .restore_from_backup(&mut pages, &id)
            .await
            .unwrap_err();
        assert!(matches!(err, NotelockError::RecoveryUnavailable));
    }

    #[tokio::test]
    async fn test_first_encryption_is_backed_up() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();
        vault
            .submit_global_pin(&mut pages, secret("7777"), PersistTier::None)
            .await
            .unwrap();

        vault
            .request_note_update(&mut pages, &id, "only version".into())
            .await
            .unwrap();

        // The very first envelope is already recoverable.
        let env = pages[0].notes_envelope.clone().unwrap();
        assert_eq!(vault.ledger.peek(&id).unwrap().payload, env);
    }

    #[tokio::test]
    async fn test_vault_change_and_remove_global_secret() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();
        vault
            .submit_global_pin(&mut pages, secret("1234"), PersistTier::None)
            .await
            .unwrap();
        vault
            .request_note_update(&mut pages, &id, "kept across rekey".into())
            .await
            .unwrap();

        let report = vault
            .change_global_secret(&mut pages, &secret("1234"), &secret("9999"))
            .await
            .unwrap();
        assert_eq!(report.rekeyed, vec![id.clone()]);
        let env = pages[0].notes_envelope.as_ref().unwrap();
        assert_eq!(open_notes(&secret("9999"), env).unwrap(), "kept across rekey");

        // Subsequent edits run under the adopted secret without a prompt.
        assert_eq!(
            vault
                .request_note_update(&mut pages, &id, "edited".into())
                .await
                .unwrap(),
            UpdateOutcome::Applied
        );

        let report = vault
            .remove_global_secret(&mut pages, &secret("9999"))
            .await
            .unwrap();
        assert_eq!(report.rekeyed, vec![id]);
        assert!(pages[0].notes_envelope.is_none());
        assert_eq!(pages[0].notes, "edited");
        assert!(vault.cache.global().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_recovery_available_condition() {
        let mut vault = test_vault();
        let mut page = notes_page("diary");
        assert!(!vault.recovery_available(&page));

        vault
            .ledger
            .push(
                &page.id,
                seal_notes(&secret("1234"), "lost", CipherMode::Page, None, TEST_ITERS).unwrap(),
            )
            .await;
        assert!(vault.recovery_available(&page));

        page.notes = "still here".into();
        assert!(!vault.recovery_available(&page));
    }

    #[tokio::test]
    async fn test_decrypt_all_globals_prompts_when_locked() {
        let mut vault = test_vault();
        let mut pages = vec![
            global_notes_page("a", "1234", "alpha"),
            global_notes_page("b", "1234", "beta"),
            notes_page("plain"),
        ];

        let decrypted = vault.decrypt_all_globals(&mut pages).unwrap();
        assert!(decrypted.is_empty());
        assert!(matches!(
            vault.gate().state(),
            GateState::GlobalPinPrompt { .. }
        ));

        let unlock = vault
            .submit_global_pin(&mut pages, secret("1234"), PersistTier::None)
            .await
            .unwrap();
        assert_eq!(unlock.decrypted_pages.len(), 2);
        assert_eq!(pages[0].notes, "alpha");
        assert_eq!(pages[1].notes, "beta");
    }

    #[tokio::test]
    async fn test_set_and_remove_page_pin() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("diary")];
        let id = pages[0].id.clone();

        assert!(vault
            .set_page_pin(&mut pages, &id, secret("12"))
            .is_err());
        vault.set_page_pin(&mut pages, &id, secret("4321")).unwrap();
        assert!(pages[0].has_page_pin());
        assert!(vault.verify_page_pin(&pages[0], &secret("4321")));
        assert!(!vault.verify_page_pin(&pages[0], &secret("0000")));
        // Set path caches the raw PIN for the session.
        assert!(vault.cache.get(&id).is_some());

        pages[0].notes_envelope =
            Some(seal_notes(&secret("4321"), "kept", CipherMode::Page, None, TEST_ITERS).unwrap());
        vault.remove_page_pin(&mut pages, &id).unwrap();
        assert!(!pages[0].has_page_pin());
        assert!(vault.cache.get(&id).is_none());
        // Removal leaves the ciphertext in place.
        assert!(pages[0].notes_envelope.is_some());
    }

    #[tokio::test]
    async fn test_verify_global_pin_verdicts() {
        let vault = test_vault();
        let pages = vec![notes_page("plain")];
        assert_eq!(
            vault.verify_global_pin(&pages, &secret("1234")),
            GlobalVerdict::Unknown
        );

        let pages = vec![global_notes_page("g", "1234", "alpha")];
        assert_eq!(
            vault.verify_global_pin(&pages, &secret("1234")),
            GlobalVerdict::Accepted
        );
        assert_eq!(
            vault.verify_global_pin(&pages, &secret("0000")),
            GlobalVerdict::Rejected
        );
    }

    #[tokio::test]
    async fn test_clear_session_drops_memory_secrets() {
        let mut vault = test_vault();
        let mut pages = vec![global_notes_page("g", "1234", "alpha")];
        let id = pages[0].id.clone();
        vault.cache.set(&id, secret("4321"));
        vault
            .submit_global_pin(&mut pages, secret("1234"), PersistTier::None)
            .await
            .unwrap();

        vault.clear_session();
        assert!(vault.cache.get(&id).is_none());
        assert!(vault.cache.global().unwrap().is_none());
        assert_eq!(vault.gate().state(), &GateState::Idle);
        assert_eq!(vault.gate().active_page_id(), None);
    }

    #[tokio::test]
    async fn test_activation_with_cached_global_auto_decrypts() {
        let mut vault = test_vault();
        let mut pages = vec![global_notes_page("g", "1234", "alpha")];
        let id = pages[0].id.clone();
        vault
            .submit_global_pin(&mut pages, secret("1234"), PersistTier::None)
            .await
            .unwrap();
        pages[0].notes.clear();

        let act = vault.activate_page(&mut pages, &id).await.unwrap();
        assert_eq!(
            act,
            Activation::Activated {
                page_id: id,
                decrypted: true
            }
        );
        assert_eq!(pages[0].notes, "alpha");
    }

    #[tokio::test]
    async fn test_unknown_page_is_validation_error() {
        let mut vault = test_vault();
        let mut pages = vec![notes_page("only")];
        let err = vault
            .activate_page(&mut pages, "no-such-id")
            .await
            .unwrap_err();
        assert!(matches!(err, NotelockError::Validation(_)));
    }
}
