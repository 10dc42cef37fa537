//! Local backup ledger: a bounded per-page ring of prior envelopes.
//!
//! Every note edit records its freshly sealed envelope here, and the bulk
//! operations (rekey, secret removal) snapshot the outgoing ciphertext
//! before replacing it, so a lost envelope or a botched sweep is
//! recoverable. The ledger holds ciphertext only and is capped at
//! [`LEDGER_KEEP`] snapshots per page, newest first.
//!
//! Persistence is best effort: a ledger that cannot be read or written is
//! logged and treated as empty rather than failing the operation that
//! triggered the snapshot.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use notelock_core::types::{BackupSnapshot, CipherEnvelope};
use notelock_core::NotelockResult;
use tracing::{debug, warn};

/// Snapshots retained per page; older entries fall off the end.
pub const LEDGER_KEEP: usize = 3;

#[derive(Debug)]
pub struct BackupLedger {
    path: PathBuf,
    keep: usize,
    entries: HashMap<String, Vec<BackupSnapshot>>,
}

impl BackupLedger {
    /// Open the ledger at `path`, loading any existing snapshot file. An
    /// unreadable or corrupt file starts the ledger empty.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match load_entries(&path) {
            Ok(entries) => entries,
            Err(err) => {
                warn!(path = %path.display(), error = %err, "backup ledger unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            path,
            keep: LEDGER_KEEP,
            entries,
        }
    }

    /// Override the per-page retention count (config `[backup].keep`).
    pub fn with_keep(mut self, keep: usize) -> Self {
        self.keep = keep.max(1);
        self
    }

    /// In-memory ledger for tests and ephemeral sessions.
    pub fn ephemeral() -> Self {
        Self {
            path: PathBuf::new(),
            keep: LEDGER_KEEP,
            entries: HashMap::new(),
        }
    }

    /// Record `envelope` as the newest snapshot for `page_id`, dropping the
    /// oldest beyond the retention count. Persist failures are logged, not
    /// fatal.
    pub async fn push(&mut self, page_id: &str, envelope: CipherEnvelope) {
        let snapshot = BackupSnapshot {
            page_id: page_id.to_string(),
            taken_at: epoch_millis(),
            mode: envelope.mode,
            payload: envelope,
        };
        let ring = self.entries.entry(page_id.to_string()).or_default();
        ring.insert(0, snapshot);
        ring.truncate(self.keep);
        debug!(page_id, kept = ring.len(), "backup snapshot recorded");
        self.persist().await;
    }

    /// Newest snapshot for `page_id` without consuming it.
    pub fn peek(&self, page_id: &str) -> Option<&BackupSnapshot> {
        self.entries.get(page_id).and_then(|ring| ring.first())
    }

    /// Remove and return the newest snapshot for `page_id`.
    pub async fn pop(&mut self, page_id: &str) -> Option<BackupSnapshot> {
        let ring = self.entries.get_mut(page_id)?;
        if ring.is_empty() {
            return None;
        }
        let snapshot = ring.remove(0);
        if ring.is_empty() {
            self.entries.remove(page_id);
        }
        self.persist().await;
        Some(snapshot)
    }

    pub fn has_snapshot(&self, page_id: &str) -> bool {
        self.peek(page_id).is_some()
    }

    async fn persist(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(err) = save_entries(&self.path, &self.entries).await {
            warn!(path = %self.path.display(), error = %err, "failed to persist backup ledger");
        }
    }
}

fn load_entries(path: &Path) -> NotelockResult<HashMap<String, Vec<BackupSnapshot>>> {
    if path.as_os_str().is_empty() || !path.exists() {
        return Ok(HashMap::new());
    }
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("reading backup ledger {}", path.display()))?;
    let entries = serde_json::from_str(&data)
        .with_context(|| format!("parsing backup ledger {}", path.display()))?;
    Ok(entries)
}

async fn save_entries(
    path: &Path,
    entries: &HashMap<String, Vec<BackupSnapshot>>,
) -> NotelockResult<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("creating ledger directory {}", parent.display()))?;
        }
    }
    let data = serde_json::to_string_pretty(entries).context("serializing backup ledger")?;
    // Write-then-rename so a crash mid-write never clobbers the old ledger.
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, data)
        .await
        .with_context(|| format!("writing {}", tmp.display()))?;
    tokio::fs::rename(&tmp, path)
        .await
        .with_context(|| format!("renaming {} into place", tmp.display()))?;
    Ok(())
}

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
