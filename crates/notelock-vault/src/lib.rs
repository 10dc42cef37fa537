//! notelock-vault: everything between a raw PIN and visible plaintext
//!
//! - [`store`] / [`cache`]: per-page secrets plus the tiered global slot
//! - [`gate`]: the prompt state machine guarding page activation
//! - [`ledger`]: local-only ring buffer of prior envelopes
//! - [`rekey`]: bulk re-encryption for global PIN change/removal
//! - [`vault`]: the [`NotesVault`] service tying it all together
//!
//! Single-threaded cooperative model: operations take `&mut` and may await
//! (ledger and store I/O); exclusive access is what serializes writes to a
//! page's envelope, so an edit can never race a re-key onto a stale base.

pub mod cache;
pub mod gate;
pub mod ledger;
pub mod rekey;
pub mod store;
pub mod vault;

pub use cache::SecretCache;
pub use gate::{Continuation, GateController, GateState, GlobalPurpose};
pub use ledger::BackupLedger;
pub use rekey::{change_global_secret, remove_global_secret, RekeyReport};
pub use vault::{Activation, GlobalUnlock, GlobalVerdict, NotesVault, PinUnlock, UpdateOutcome};
