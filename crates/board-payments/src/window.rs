//! Checkout Window
//!
//! The hosted checkout page runs in a separate browsing context that this
//! application does not own. The user can close it at any moment, so every
//! write goes through a closed check first.

use std::sync::Arc;

/// A separately opened browsing context showing the hosted checkout page
pub trait CheckoutWindow: Send + Sync {
    /// Whether the user (or we) closed the window
    fn is_closed(&self) -> bool;

    /// Point the window at the checkout page
    fn navigate(&self, url: &str);

    /// Replace the window's content with an error message
    fn show_error(&self, message: &str);

    /// Close the window
    fn close(&self);
}

/// Opens checkout windows
///
/// Opening happens before the create-intent call resolves so the open is
/// still attributed to the user's click.
pub trait WindowOpener: Send + Sync {
    /// Open a window showing a loading placeholder; `None` if popups are blocked
    fn open_placeholder(&self) -> Option<Arc<dyn CheckoutWindow>>;
}

/// Navigate only if the window is still open; returns whether it was
pub fn navigate_if_open(window: &dyn CheckoutWindow, url: &str) -> bool {
    if window.is_closed() {
        tracing::debug!("Checkout window closed before navigation");
        return false;
    }
    window.navigate(url);
    true
}

pub fn show_error_if_open(window: &dyn CheckoutWindow, message: &str) {
    if !window.is_closed() {
        window.show_error(message);
    }
}

pub fn close_if_open(window: &dyn CheckoutWindow) {
    if !window.is_closed() {
        window.close();
    }
}
