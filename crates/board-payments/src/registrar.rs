//! Subscription Registrar
//!
//! Activates a purchased plan once payment completion has been observed,
//! then refreshes the locally cached subscription.

use std::sync::Arc;

use board_core::{ActiveSubscription, PlanId, UserId, Viewer};
use serde::Serialize;
use tokio::sync::watch;

use crate::api::BillingApi;
use crate::error::Result;

/// Parameters of the register call (sent as query parameters)
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub user_id: UserId,
    pub plan_id: PlanId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employer_id: Option<u64>,
}

impl Registration {
    pub fn new(user_id: UserId, plan_id: PlanId) -> Self {
        Self {
            user_id,
            plan_id,
            employee_id: None,
            employer_id: None,
        }
    }

    /// Attach the viewer's employee / employer ids when they resolve
    pub fn for_viewer(user_id: UserId, plan_id: PlanId, viewer: &Viewer) -> Self {
        let positive = |raw: Option<i64>| raw.and_then(|v| u64::try_from(v).ok()).filter(|v| *v > 0);
        Self {
            employee_id: positive(viewer.employee_id),
            employer_id: positive(viewer.employer_id),
            ..Self::new(user_id, plan_id)
        }
    }
}

/// Registers subscriptions and keeps the cached copy current
pub struct SubscriptionRegistrar {
    api: Arc<dyn BillingApi>,
    current: watch::Sender<Option<ActiveSubscription>>,
}

impl SubscriptionRegistrar {
    pub fn new(api: Arc<dyn BillingApi>) -> Self {
        let (current, _) = watch::channel(None);
        Self { api, current }
    }

    /// Register and refresh; `false` if the backend refused or was unreachable
    ///
    /// Never errors: a refusal right after the provider reported success
    /// means the payment needs reconciling, and the caller decides how to
    /// present that.
    pub async fn register(&self, registration: &Registration) -> bool {
        if let Err(e) = self.api.register_subscription(registration).await {
            tracing::warn!(
                user_id = %registration.user_id,
                plan_id = %registration.plan_id,
                error = %e,
                "Subscription registration failed"
            );
            return false;
        }

        tracing::info!(
            user_id = %registration.user_id,
            plan_id = %registration.plan_id,
            "Subscription registered"
        );

        if let Err(e) = self.refresh(registration.user_id).await {
            tracing::warn!(user_id = %registration.user_id, error = %e, "Could not refresh subscription");
        }
        true
    }

    /// Re-fetch the user's active subscription into the cache
    pub async fn refresh(&self, user_id: UserId) -> Result<Option<ActiveSubscription>> {
        let subscription = self.api.subscription_for_user(user_id).await?;
        self.current.send_replace(subscription.clone());
        Ok(subscription)
    }

    /// Cached subscription (not authoritative)
    pub fn current(&self) -> Option<ActiveSubscription> {
        self.current.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<Option<ActiveSubscription>> {
        self.current.subscribe()
    }
}
