//! Application State

use board_payments::MessageHub;

/// Shared application state
#[derive(Clone, Debug, Default)]
pub struct AppState {
    /// Fan-out point for completion messages posted by the checkout page
    pub hub: MessageHub,
}
