//! Billing Backend Client
//!
//! One trait method per backend operation used by the checkout workflow.
//! Implementations return typed results; raw response shapes are handled
//! by [`crate::normalize`] and never leave this module.

use std::time::Duration;

use async_trait::async_trait;
use board_core::{ActiveSubscription, Plan, PlanCategory, PlanId, UserId};
use reqwest::{RequestBuilder, StatusCode, Url};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{PaymentError, Result};
use crate::normalize;
use crate::registrar::Registration;
use crate::status::PaymentStatus;

/// Opaque payment identifier assigned by the backend
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PaymentId(String);

impl PaymentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PaymentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Body of the create payment intent call; mirrors the plan's public attributes
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentIntentRequest {
    pub plan_id: PlanId,
    pub plan_name: String,
    #[serde(rename = "type")]
    pub category: PlanCategory,
    pub description: String,
    #[serde(serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,
    pub duration_days: i64,
    pub features: String,
}

impl PaymentIntentRequest {
    pub fn for_plan(plan_id: PlanId, plan: &Plan) -> Self {
        Self {
            plan_id,
            plan_name: plan.plan_name.clone(),
            category: plan.category,
            description: plan.description.clone(),
            price: plan.price,
            duration_days: plan.duration_days,
            features: plan.features.clone(),
        }
    }
}

/// A created, not yet confirmed payment
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Present when the backend supports status polling for this payment
    pub payment_id: Option<PaymentId>,

    /// Hosted checkout page
    pub checkout_url: String,

    pub plan_id: PlanId,

    pub amount: Decimal,
}

/// One page of a list endpoint
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,

    /// Server-reported total, or the item count when none was sent
    pub total: usize,
}

/// Billing backend (Strategy pattern)
///
/// `register_subscription` must be safe to call twice for the same
/// user and plan; the completion listener and the status poller can race.
#[async_trait]
pub trait BillingApi: Send + Sync {
    /// Create a payment intent and hosted checkout page for a plan
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent>;

    /// Current status of a payment
    async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus>;

    /// Activate a plan for a user; `Err(Rejected)` when the backend refuses
    async fn register_subscription(&self, registration: &Registration) -> Result<()>;

    /// The user's active subscription, if any
    async fn subscription_for_user(&self, user_id: UserId) -> Result<Option<ActiveSubscription>>;

    /// Purchasable plans
    async fn list_plans(&self) -> Result<Page<Plan>>;

    /// Backend name for logs
    fn name(&self) -> &str;
}

/// HTTP backend configuration
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Base URL all paths are resolved against
    pub base_url: String,

    /// Bearer token sent with every request
    pub token: Option<String>,

    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080/api".into(),
            token: None,
            timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Result<Self> {
        let base_url = std::env::var("BOARD_API_URL")
            .map_err(|_| PaymentError::Config("BOARD_API_URL not set".into()))?;
        let token = std::env::var("BOARD_API_TOKEN").ok().filter(|t| !t.is_empty());
        let timeout = std::env::var("BOARD_API_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map_or_else(|| Self::default().timeout, Duration::from_secs);

        Ok(Self {
            base_url,
            token,
            timeout,
        })
    }
}

/// Backend reached over REST
pub struct HttpBillingApi {
    client: reqwest::Client,
    base: Url,
    token: Option<String>,
}

impl HttpBillingApi {
    pub fn new(config: ApiConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| PaymentError::Config(format!("invalid base URL {}: {e}", config.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(PaymentError::Config(format!("{} cannot be a base URL", config.base_url)));
        }

        let client = reqwest::Client::builder().timeout(config.timeout).build()?;

        Ok(Self {
            client,
            base,
            token: config.token,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(ApiConfig::from_env()?)
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    /// Send a request and return the status with the decoded body
    async fn fetch(&self, request: RequestBuilder) -> Result<(StatusCode, Value)> {
        let request = match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        };

        let response = request.send().await?;
        let status = response.status();
        let text = response.text().await?;

        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            match serde_json::from_str::<Value>(&text) {
                Ok(value) => value,
                Err(_) => Value::String(text),
            }
        };

        Ok((status, body))
    }

    /// Like `fetch`, but non-2xx becomes `Rejected` with the server's message
    async fn send(&self, request: RequestBuilder) -> Result<Value> {
        let (status, body) = self.fetch(request).await?;
        if status.is_success() {
            return Ok(body);
        }

        let message = normalize::error_message(&body)
            .unwrap_or_else(|| format!("Server responded with {status}"));
        tracing::warn!(%status, message = %message, "Billing request failed");
        Err(PaymentError::Rejected(message))
    }
}

#[async_trait]
impl BillingApi for HttpBillingApi {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
        let url = self.endpoint(&["payments", "create-intent"]);
        tracing::debug!(plan_id = %request.plan_id, "Creating payment intent");

        let body = self.send(self.client.post(url).json(request)).await?;
        normalize::payment_intent(&body, request.plan_id, request.price)
    }

    async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus> {
        let url = self.endpoint(&["payments", payment_id.as_str(), "status"]);
        let body = self.send(self.client.get(url)).await?;
        normalize::payment_status(&body)
    }

    async fn register_subscription(&self, registration: &Registration) -> Result<()> {
        let url = self.endpoint(&["subscriptions", "register"]);
        let body = self
            .send(self.client.post(url).query(registration).body(""))
            .await?;
        normalize::registration_accepted(&body).map_err(PaymentError::Rejected)
    }

    async fn subscription_for_user(&self, user_id: UserId) -> Result<Option<ActiveSubscription>> {
        let url = self.endpoint(&["subscriptions", "user", &user_id.to_string()]);
        let (status, body) = self.fetch(self.client.get(url)).await?;
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let message = normalize::error_message(&body)
                .unwrap_or_else(|| format!("Server responded with {status}"));
            return Err(PaymentError::Rejected(message));
        }
        Ok(normalize::active_subscription(&body))
    }

    async fn list_plans(&self) -> Result<Page<Plan>> {
        let url = self.endpoint(&["subscription-plans"]);
        let body = self.send(self.client.get(url)).await?;
        normalize::plan_page(&body)
    }

    fn name(&self) -> &str {
        "http"
    }
}
