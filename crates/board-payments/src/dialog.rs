//! Payment Dialog State Machine
//!
//! ```text
//!            Pay                 Confirmed
//! Confirm ────────▶ Processing ───────────────▶ Success
//!    ▲                │   ▲  │                     ▲
//!    │ Retry  Rejected│   │  │Unresolved           │ Confirmed /
//!    │                ▼   │  ▼                     │ CheckAgain{true}
//!    └────────────  Failed ◀── Pending ────────────┘
//!                          Rejected  ↺ CheckAgain{false}
//! ```
//!
//! `Close` is accepted everywhere and resets the dialog.

use std::fmt;

use board_core::{Plan, PlanId};
use serde::Serialize;

use crate::error::{PaymentError, Result};

/// Step the payment dialog is showing
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkflowState {
    #[default]
    Confirm,
    Processing,
    Success,
    Failed,
    Pending,
}

impl WorkflowState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Confirm => "confirm",
            Self::Processing => "processing",
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Pending => "pending",
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs to the dialog: user actions and observer reports
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DialogEvent {
    /// User confirmed the purchase
    Pay,
    /// Checkout could not be started
    CheckoutFailed(String),
    /// A completion message arrived and is being confirmed
    Observed,
    /// Payment confirmed and plan registered
    Confirmed(String),
    /// Provider reported failure or cancellation
    Rejected(String),
    /// Outcome could not be established
    Unresolved(String),
    /// Result of a user-triggered re-check
    CheckAgain { confirmed: bool },
    Retry,
    Close,
}

/// What a renderer needs to draw the dialog
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DialogSnapshot {
    pub open: bool,
    pub state: WorkflowState,
    pub message: Option<String>,
    pub plan_id: Option<PlanId>,
}

/// The dialog: one active state, plus the plan it is about
#[derive(Clone, Debug, Default)]
pub struct PaymentDialog {
    open: bool,
    state: WorkflowState,
    message: Option<String>,
    plan: Option<Plan>,
}

impl PaymentDialog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open the dialog for `plan`, discarding whatever was shown before
    pub fn show(&mut self, plan: Plan) {
        *self = Self {
            open: true,
            plan: Some(plan),
            ..Self::default()
        };
    }

    pub const fn state(&self) -> WorkflowState {
        self.state
    }

    pub const fn is_open(&self) -> bool {
        self.open
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub const fn plan(&self) -> Option<&Plan> {
        self.plan.as_ref()
    }

    pub fn snapshot(&self) -> DialogSnapshot {
        DialogSnapshot {
            open: self.open,
            state: self.state,
            message: self.message.clone(),
            plan_id: self.plan.as_ref().and_then(Plan::id),
        }
    }

    /// Apply an event; illegal events leave the dialog untouched
    pub fn apply(&mut self, event: DialogEvent) -> Result<WorkflowState> {
        use DialogEvent as E;
        use WorkflowState as S;

        if matches!(event, E::Close) {
            *self = Self::default();
            return Ok(self.state);
        }
        if !self.open {
            return Err(self.invalid(event));
        }

        let (next, message) = match (self.state, &event) {
            (S::Confirm, E::Pay) => (S::Processing, None),
            (S::Processing, E::CheckoutFailed(msg)) => (S::Failed, Some(msg.clone())),
            (S::Processing | S::Pending, E::Observed) => (S::Processing, None),
            (S::Processing | S::Pending, E::Confirmed(msg)) => (S::Success, Some(msg.clone())),
            (S::Processing | S::Pending, E::Rejected(msg)) => (S::Failed, Some(msg.clone())),
            (S::Processing | S::Pending, E::Unresolved(msg)) => (S::Pending, Some(msg.clone())),
            (S::Pending, E::CheckAgain { confirmed: true }) => (S::Success, None),
            (S::Pending, E::CheckAgain { confirmed: false }) => (S::Pending, self.message.clone()),
            (S::Failed, E::Retry) => (S::Confirm, None),
            _ => return Err(self.invalid(event)),
        };

        tracing::debug!(from = %self.state, to = %next, "Payment dialog transition");
        self.state = next;
        self.message = message;
        Ok(next)
    }

    fn invalid(&self, event: DialogEvent) -> PaymentError {
        PaymentError::InvalidTransition {
            from: self.state,
            event,
        }
    }
}
