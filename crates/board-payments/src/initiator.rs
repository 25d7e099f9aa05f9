//! Checkout Session Initiator
//!
//! Validates the buyer and plan, opens the checkout window while the click
//! is still fresh, then asks the backend for a payment intent and points the
//! window at the hosted checkout page.

use std::sync::Arc;

use board_core::{Plan, PlanId, UserId};

use crate::api::{BillingApi, PaymentIntent, PaymentIntentRequest};
use crate::error::{PaymentError, Result};
use crate::window::{CheckoutWindow, WindowOpener, navigate_if_open, show_error_if_open};

/// A started checkout: the intent plus the window showing it
pub struct CheckoutSession {
    pub intent: PaymentIntent,
    pub window: Arc<dyn CheckoutWindow>,
}

impl std::fmt::Debug for CheckoutSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckoutSession")
            .field("intent", &self.intent)
            .field("window_closed", &self.window.is_closed())
            .finish()
    }
}

/// Starts hosted checkout sessions
pub struct CheckoutInitiator {
    api: Arc<dyn BillingApi>,
    opener: Arc<dyn WindowOpener>,
}

impl CheckoutInitiator {
    pub fn new(api: Arc<dyn BillingApi>, opener: Arc<dyn WindowOpener>) -> Self {
        Self { api, opener }
    }

    /// Start checkout for `plan` on behalf of `user_id`
    ///
    /// Invalid ids and blocked popups fail before any request is sent.
    /// A backend failure is written into the opened window, which is left
    /// for the user to close.
    pub async fn start(&self, user_id: Option<i64>, plan: &Plan) -> Result<CheckoutSession> {
        let user_id = UserId::require(user_id)?;
        let plan_id = PlanId::require(Some(plan.plan_id))?;

        let window = self.opener.open_placeholder().ok_or_else(|| {
            tracing::warn!(%user_id, %plan_id, "Checkout window blocked");
            PaymentError::PopupBlocked
        })?;

        let request = PaymentIntentRequest::for_plan(plan_id, plan);
        match self.api.create_payment_intent(&request).await {
            Ok(intent) => {
                tracing::info!(
                    %user_id,
                    %plan_id,
                    payment_id = ?intent.payment_id.as_ref().map(ToString::to_string),
                    "Payment intent created"
                );
                navigate_if_open(window.as_ref(), &intent.checkout_url);
                Ok(CheckoutSession { intent, window })
            }
            Err(e) => {
                tracing::warn!(%user_id, %plan_id, error = %e, "Could not create payment intent");
                show_error_if_open(window.as_ref(), &e.user_message());
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{MockBillingApi, MockOpener, MockWindow};
    use serde_json::json;

    fn setup() -> (Arc<MockBillingApi>, Arc<MockOpener>, CheckoutInitiator) {
        let api = Arc::new(MockBillingApi::new());
        let opener = Arc::new(MockOpener::new());
        let initiator = CheckoutInitiator::new(api.clone(), opener.clone());
        (api, opener, initiator)
    }

    #[tokio::test]
    async fn test_invalid_ids_never_reach_network() {
        let (api, opener, initiator) = setup();
        let good_plan = MockBillingApi::sample_plan(6, "SMB", 300);

        for raw in [json!(null), json!(0), json!(-4), json!("abc"), json!(1.5)] {
            let user_id = UserId::resolve(&raw).map(|id| id.get() as i64);
            let result = initiator.start(user_id, &good_plan).await;
            assert!(matches!(result, Err(PaymentError::Validation(_))), "user id {raw}");
        }

        for bad_plan_id in [0, -1] {
            let plan = MockBillingApi::sample_plan(bad_plan_id, "Broken", 10);
            let result = initiator.start(Some(42), &plan).await;
            assert!(matches!(result, Err(PaymentError::Validation(_))), "plan id {bad_plan_id}");
        }

        assert_eq!(api.total_calls(), 0);
        assert_eq!(opener.opened(), 0);
    }

    #[tokio::test]
    async fn test_blocked_popup_makes_no_request() {
        let (api, opener, initiator) = setup();
        opener.block();

        let result = initiator.start(Some(42), &MockBillingApi::sample_plan(6, "SMB", 300)).await;
        assert!(matches!(result, Err(PaymentError::PopupBlocked)));
        assert_eq!(api.total_calls(), 0);
    }

    #[tokio::test]
    async fn test_success_navigates_window() {
        let (api, opener, initiator) = setup();
        api.set_intent("https://pay.example/abc", Some("999"));

        let session = initiator
            .start(Some(42), &MockBillingApi::sample_plan(6, "SMB", 300))
            .await
            .unwrap();

        assert_eq!(session.intent.payment_id.as_ref().map(|p| p.as_str()), Some("999"));
        assert_eq!(session.intent.plan_id.get(), 6);
        let window = opener.last().unwrap();
        assert_eq!(window.location().as_deref(), Some("https://pay.example/abc"));

        let sent = api.intent_requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].plan_name, "SMB");
    }

    #[tokio::test]
    async fn test_backend_failure_written_to_window() {
        let (api, opener, initiator) = setup();
        api.reject_intents("Plan is no longer on sale");

        let result = initiator.start(Some(42), &MockBillingApi::sample_plan(6, "SMB", 300)).await;
        assert!(matches!(result, Err(PaymentError::Rejected(_))));

        let window = opener.last().unwrap();
        assert_eq!(window.error().as_deref(), Some("Plan is no longer on sale"));
        assert!(!window.is_closed());
        assert_eq!(window.location(), None);
    }

    #[tokio::test]
    async fn test_missing_checkout_url_is_reported_in_window() {
        let (api, opener, initiator) = setup();
        api.omit_checkout_url();

        let result = initiator.start(Some(42), &MockBillingApi::sample_plan(6, "SMB", 300)).await;
        assert!(matches!(result, Err(PaymentError::MissingCheckoutUrl)));
        assert_eq!(api.intent_calls(), 1);

        let window = opener.last().unwrap();
        assert!(window.error().is_some());
        assert_eq!(window.location(), None);
    }

    #[tokio::test]
    async fn test_window_closed_during_request_is_tolerated() {
        let (api, opener, initiator) = setup();
        api.set_intent("https://pay.example/abc", None);
        opener.hand_out(MockWindow::closed());

        let session = initiator
            .start(Some(42), &MockBillingApi::sample_plan(6, "SMB", 300))
            .await
            .unwrap();
        assert!(session.intent.payment_id.is_none());
        assert_eq!(opener.last().unwrap().location(), None);
    }
}
