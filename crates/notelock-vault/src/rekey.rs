//! Bulk re-encryption of global-mode envelopes.
//!
//! Changing or removing the global PIN must touch every page encrypted under
//! it. The old secret is verified against a sample envelope before anything
//! mutates, so a mistyped old PIN leaves every envelope untouched. After
//! that point the sweep is best effort per page: a page whose envelope no
//! longer opens is salvaged from its plaintext cache when one is available,
//! and each outgoing envelope is snapshotted to the ledger first.

use notelock_core::types::{CipherMode, Page};
use notelock_core::{NotelockError, NotelockResult};
use notelock_crypto::envelope::{open_notes, seal_notes};
use notelock_crypto::pin::validate_pin;
use secrecy::SecretString;
use tracing::{info, warn};

use crate::cache::SecretCache;
use crate::ledger::BackupLedger;

/// Outcome of a global-secret sweep.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct RekeyReport {
    /// Pages whose envelope was rewritten (or cleared) normally.
    pub rekeyed: Vec<String>,
    /// Pages whose old envelope would not open and were recovered from the
    /// in-session plaintext instead.
    pub salvaged: Vec<String>,
}

/// Re-encrypt every global-mode envelope under `new`, then adopt `new` as
/// the cached global secret at the current persistence tier.
pub async fn change_global_secret(
    pages: &mut [Page],
    cache: &mut SecretCache,
    ledger: &mut BackupLedger,
    old: &SecretString,
    new: &SecretString,
    iterations: u32,
) -> NotelockResult<RekeyReport> {
    validate_pin(new)?;
    verify_against_sample(pages, old)?;

    let mut report = RekeyReport::default();
    for page in pages.iter_mut() {
        let Some(envelope) = page.notes_envelope.clone() else {
            continue;
        };
        if envelope.mode != CipherMode::Global {
            continue;
        }
        let plaintext = match open_notes(old, &envelope) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                // Stale or damaged envelope; the live plaintext is the best
                // remaining copy of the note.
                warn!(page_id = %page.id, error = %err, "envelope did not open with old secret, salvaging plaintext");
                report.salvaged.push(page.id.clone());
                page.notes.clone()
            }
        };
        ledger.push(&page.id, envelope.clone()).await;
        let rewritten = seal_notes(
            new,
            &plaintext,
            CipherMode::Global,
            Some(&envelope),
            iterations,
        )?;
        page.notes = plaintext;
        page.notes_envelope = Some(rewritten);
        if !report.salvaged.contains(&page.id) {
            report.rekeyed.push(page.id.clone());
        }
    }

    // A fresh session may not have rehydrated the global slot yet; resolve
    // it so the remembered persistence tier is rewritten, not scrubbed.
    cache.global()?;
    cache.set_global(new.clone(), cache.tier())?;
    info!(
        rekeyed = report.rekeyed.len(),
        salvaged = report.salvaged.len(),
        "global secret changed"
    );
    Ok(report)
}

/// Decrypt every global-mode envelope with `secret` and drop the global
/// domain entirely: notes become plaintext and the cached secret is cleared
/// from every tier.
pub async fn remove_global_secret(
    pages: &mut [Page],
    cache: &mut SecretCache,
    ledger: &mut BackupLedger,
    secret: &SecretString,
) -> NotelockResult<RekeyReport> {
    verify_against_sample(pages, secret)?;

    let mut report = RekeyReport::default();
    for page in pages.iter_mut() {
        let Some(envelope) = page.notes_envelope.clone() else {
            continue;
        };
        if envelope.mode != CipherMode::Global {
            continue;
        }
        let plaintext = match open_notes(secret, &envelope) {
            Ok(plaintext) => plaintext,
            Err(err) => {
                warn!(page_id = %page.id, error = %err, "envelope did not open, keeping plaintext as-is");
                report.salvaged.push(page.id.clone());
                page.notes.clone()
            }
        };
        ledger.push(&page.id, envelope).await;
        page.notes = plaintext;
        page.notes_envelope = None;
        if !report.salvaged.contains(&page.id) {
            report.rekeyed.push(page.id.clone());
        }
    }

    cache.clear_global()?;
    info!(cleared = report.rekeyed.len(), "global secret removed");
    Ok(report)
}

/// Prove `secret` opens at least one existing global envelope before any
/// mutation. A set with no global envelopes accepts unconditionally (there
/// is nothing to contradict the candidate).
fn verify_against_sample(pages: &[Page], secret: &SecretString) -> NotelockResult<()> {
    let sample = pages.iter().find_map(|p| {
        p.notes_envelope
            .as_ref()
            .filter(|env| env.mode == CipherMode::Global)
    });
    match sample {
        Some(envelope) => match open_notes(secret, envelope) {
            Ok(_) => Ok(()),
            Err(NotelockError::WrongSecret) => Err(NotelockError::WrongSecret),
            Err(err) => Err(err),
        },
        None => Ok(()),
    }
}
