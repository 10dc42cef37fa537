//! Activation gating: which prompt, if any, must precede a page switch.
//!
//! Prompt chaining (PIN first, then the sensitivity confirmation) is an
//! explicit state machine with one queued continuation value, so every
//! transition is unit-testable without simulating UI timing. The controller
//! never blocks: it opens a prompt and waits for an external event.

use notelock_core::types::Page;

/// What the gate is currently waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateState {
    Idle,
    /// Page PIN required. The active page does not change until resolved.
    PinPrompt { page_id: String, then_confirm: bool },
    /// Global PIN required (unlock of existing envelopes, or first-use setup).
    GlobalPinPrompt { purpose: GlobalPurpose },
    /// Sensitivity confirmation. The active page pointer may already have
    /// switched; the content view stays gated until confirmed.
    ConfirmPrompt { page_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlobalPurpose {
    /// At least one global-mode envelope exists; the candidate must open one.
    Unlock,
    /// No page uses the global domain yet; the candidate becomes the secret.
    Setup,
}

/// Deferred action to run once the pending prompt resolves. Dropped on
/// cancellation, never retried silently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Continuation {
    /// Bulk-decrypt every global-mode notes page (post-login flow).
    DecryptAll,
    /// Decrypt a single page's envelope.
    DecryptPage { page_id: String },
    /// Re-apply the identical note update that triggered the prompt.
    EncryptNote { page_id: String, plaintext: String },
}

#[derive(Debug)]
pub struct GateController {
    state: GateState,
    pending: Option<Continuation>,
    active_page_id: Option<String>,
    /// Page whose sensitivity confirmation is currently in effect; reset
    /// whenever the active page changes.
    confirmed_page_id: Option<String>,
}

impl Default for GateController {
    fn default() -> Self {
        Self::new()
    }
}

impl GateController {
    pub fn new() -> Self {
        Self {
            state: GateState::Idle,
            pending: None,
            active_page_id: None,
            confirmed_page_id: None,
        }
    }

    pub fn state(&self) -> &GateState {
        &self.state
    }

    pub fn active_page_id(&self) -> Option<&str> {
        self.active_page_id.as_deref()
    }

    pub fn pending(&self) -> Option<&Continuation> {
        self.pending.as_ref()
    }

    pub fn is_confirmed(&self, page_id: &str) -> bool {
        self.confirmed_page_id.as_deref() == Some(page_id)
    }

    /// Evaluate the gates for activating `page`. `has_page_secret` is the
    /// cache lookup result for the page's own PIN.
    pub fn activate(&mut self, page: &Page, has_page_secret: bool) -> &GateState {
        if page.has_page_pin() && !has_page_secret {
            // Do not switch; the current page stays visible behind the prompt.
            self.state = GateState::PinPrompt {
                page_id: page.id.clone(),
                then_confirm: page.requires_confirmation,
            };
        } else if page.requires_confirmation && !self.is_confirmed(&page.id) {
            self.switch_to(&page.id);
            self.state = GateState::ConfirmPrompt {
                page_id: page.id.clone(),
            };
        } else {
            self.switch_to(&page.id);
            self.state = GateState::Idle;
        }
        &self.state
    }

    /// Open the global PIN prompt (page activation stands; the prompt only
    /// gates the encrypted content).
    pub fn open_global_prompt(&mut self, purpose: GlobalPurpose) {
        self.state = GateState::GlobalPinPrompt { purpose };
    }

    /// The page PIN matched: finish the activation, chaining into the
    /// confirmation prompt when the page asks for one.
    pub fn pin_verified(&mut self, page: &Page) -> &GateState {
        let then_confirm = matches!(
            self.state,
            GateState::PinPrompt { then_confirm: true, .. }
        );
        self.switch_to(&page.id);
        if then_confirm && page.requires_confirmation {
            self.state = GateState::ConfirmPrompt {
                page_id: page.id.clone(),
            };
        } else {
            self.state = GateState::Idle;
        }
        &self.state
    }

    /// The user confirmed the sensitivity prompt for the pending page.
    pub fn confirm(&mut self) -> &GateState {
        if let GateState::ConfirmPrompt { page_id } = &self.state {
            self.confirmed_page_id = Some(page_id.clone());
            self.active_page_id = Some(page_id.clone());
            self.state = GateState::Idle;
        }
        &self.state
    }

    /// The global prompt was accepted; the caller runs the continuation.
    pub fn global_verified(&mut self) {
        self.state = GateState::Idle;
    }

    /// Close whatever prompt is open: back to `Idle`, active page unchanged,
    /// nothing cached, the queued continuation dropped.
    pub fn cancel(&mut self) {
        self.state = GateState::Idle;
        self.pending = None;
    }

    pub fn queue(&mut self, continuation: Continuation) {
        self.pending = Some(continuation);
    }

    pub fn take_pending(&mut self) -> Option<Continuation> {
        self.pending.take()
    }

    fn switch_to(&mut self, page_id: &str) {
        if self.active_page_id.as_deref() != Some(page_id) {
            // Confirmation is per-visit; switching away revokes it.
            self.confirmed_page_id = None;
            self.active_page_id = Some(page_id.to_string());
        }
    }
}
