//! Console Checkout Window
//!
//! Outside a browser there is no window to open; the checkout URL is
//! printed for the user to follow and the "window" counts as open until
//! the flow closes it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use board_payments::{CheckoutWindow, WindowOpener};

#[derive(Debug, Default)]
pub struct ConsoleWindow {
    closed: AtomicBool,
}

impl CheckoutWindow for ConsoleWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn navigate(&self, url: &str) {
        tracing::info!("Complete the payment at {url}");
    }

    fn show_error(&self, message: &str) {
        tracing::warn!("Checkout could not start: {message}");
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        tracing::info!("Checkout window closed");
    }
}

#[derive(Debug, Default)]
pub struct ConsoleOpener;

impl WindowOpener for ConsoleOpener {
    fn open_placeholder(&self) -> Option<Arc<dyn CheckoutWindow>> {
        tracing::info!("Preparing checkout...");
        Some(Arc::new(ConsoleWindow::default()))
    }
}
