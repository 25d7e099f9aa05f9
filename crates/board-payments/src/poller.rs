//! Status Poller
//!
//! Fallback for when the checkout page never messages back: ask the backend
//! for the payment's status on a fixed interval until it is terminal, the
//! user closes the checkout window, or the attempt budget runs out.

use std::sync::Arc;
use std::time::Duration;

use crate::api::{BillingApi, PaymentId};
use crate::window::CheckoutWindow;

/// Polling schedule
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Wait before each status request
    pub interval: Duration,

    /// Status requests before giving up
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(2000),
            max_attempts: 60,
        }
    }
}

impl PollConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let interval = std::env::var("BOARD_POLL_INTERVAL_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .map_or(defaults.interval, Duration::from_millis);
        let max_attempts = std::env::var("BOARD_POLL_MAX_ATTEMPTS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|n| *n > 0)
            .unwrap_or(defaults.max_attempts);

        Self {
            interval,
            max_attempts,
        }
    }

    /// Hard ceiling on total waiting
    pub fn ceiling(&self) -> Duration {
        self.interval * self.max_attempts
    }
}

/// How a poll run ended; `attempts` counts status requests issued
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PollOutcome {
    Completed { attempts: u32 },
    Failed { attempts: u32 },
    /// Window closed before any terminal status was seen
    WindowClosed { attempts: u32 },
    /// Budget spent without a terminal status
    Exhausted { attempts: u32 },
}

impl PollOutcome {
    pub const fn attempts(self) -> u32 {
        match self {
            Self::Completed { attempts }
            | Self::Failed { attempts }
            | Self::WindowClosed { attempts }
            | Self::Exhausted { attempts } => attempts,
        }
    }

    /// Neither success nor failure could be established
    pub const fn is_ambiguous(self) -> bool {
        matches!(self, Self::WindowClosed { .. } | Self::Exhausted { .. })
    }
}

/// Polls the payment status endpoint
pub struct StatusPoller {
    api: Arc<dyn BillingApi>,
    config: PollConfig,
}

impl StatusPoller {
    pub fn new(api: Arc<dyn BillingApi>, config: PollConfig) -> Self {
        Self { api, config }
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll until a terminal status, a closed window, or the budget runs out
    ///
    /// Transient request errors are logged and the next tick retries; the
    /// failed tick still counts toward the budget so the ceiling holds.
    pub async fn poll(&self, payment_id: &PaymentId, window: &dyn CheckoutWindow) -> PollOutcome {
        let mut attempts = 0;

        while attempts < self.config.max_attempts {
            tokio::time::sleep(self.config.interval).await;

            if window.is_closed() {
                tracing::info!(%payment_id, attempts, "Checkout window closed without a final status");
                return PollOutcome::WindowClosed { attempts };
            }

            attempts += 1;
            match self.api.payment_status(payment_id).await {
                Ok(status) if status.is_success() => {
                    tracing::info!(%payment_id, attempts, "Payment completed");
                    return PollOutcome::Completed { attempts };
                }
                Ok(status) if status.is_failure() => {
                    tracing::info!(%payment_id, attempts, "Payment failed or was cancelled");
                    return PollOutcome::Failed { attempts };
                }
                Ok(status) => {
                    tracing::debug!(%payment_id, attempts, %status, "Payment not final yet");
                }
                Err(e) => {
                    tracing::debug!(%payment_id, attempts, error = %e, "Status poll failed, will retry");
                }
            }
        }

        tracing::warn!(%payment_id, attempts, "Gave up waiting for payment confirmation");
        PollOutcome::Exhausted { attempts }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBillingApi, MockWindow};
    use crate::status::PaymentStatus;

    fn poller(api: &Arc<MockBillingApi>, max_attempts: u32) -> StatusPoller {
        StatusPoller::new(
            api.clone(),
            PollConfig {
                interval: Duration::from_millis(2000),
                max_attempts,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_on_fourth_attempt() {
        let api = Arc::new(MockBillingApi::new());
        api.script_statuses([
            PaymentStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Completed,
        ]);
        let window = MockWindow::new();

        let start = tokio::time::Instant::now();
        let outcome = poller(&api, 60).poll(&PaymentId::new("999"), &window).await;

        assert_eq!(outcome, PollOutcome::Completed { attempts: 4 });
        assert_eq!(api.status_calls(), 4);
        assert_eq!(start.elapsed(), Duration::from_millis(8000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_statuses_stop_polling() {
        let api = Arc::new(MockBillingApi::new());
        api.script_statuses([PaymentStatus::Pending, PaymentStatus::parse("Canceled")]);

        let outcome = poller(&api, 60).poll(&PaymentId::new("1"), &MockWindow::new()).await;
        assert_eq!(outcome, PollOutcome::Failed { attempts: 2 });
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_bounded() {
        let api = Arc::new(MockBillingApi::new());
        let outcome = poller(&api, 5).poll(&PaymentId::new("1"), &MockWindow::new()).await;

        assert_eq!(outcome, PollOutcome::Exhausted { attempts: 5 });
        assert!(outcome.is_ambiguous());
        assert_eq!(api.status_calls(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closed_stops_polling() {
        let api = Arc::new(MockBillingApi::new());
        let probe = api.clone();
        let window = MockWindow::with_closed_probe(move || probe.status_calls() >= 2);

        let outcome = poller(&api, 60).poll(&PaymentId::new("1"), &window).await;

        assert_eq!(outcome, PollOutcome::WindowClosed { attempts: 2 });
        assert_eq!(api.status_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_are_retried() {
        let api = Arc::new(MockBillingApi::new());
        api.fail_status_calls(2);
        api.script_statuses([PaymentStatus::parse("paid")]);

        let outcome = poller(&api, 60).poll(&PaymentId::new("1"), &MockWindow::new()).await;
        assert_eq!(outcome, PollOutcome::Completed { attempts: 3 });
    }

    #[test]
    fn test_default_ceiling_is_two_minutes() {
        assert_eq!(PollConfig::default().ceiling(), Duration::from_secs(120));
    }
}
