//! In-memory Billing Backend and Checkout Window
//!
//! For tests and the demo binary. Every call is recorded so callers can
//! assert on what reached the "network".

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use board_core::{ActiveSubscription, Plan, PlanCategory, UserId};
use rust_decimal::Decimal;

use crate::api::{BillingApi, Page, PaymentId, PaymentIntent, PaymentIntentRequest};
use crate::error::{PaymentError, Result};
use crate::registrar::Registration;
use crate::status::PaymentStatus;
use crate::window::{CheckoutWindow, WindowOpener};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug)]
enum IntentReply {
    /// Generated URL and id per call
    Generated,
    Fixed {
        checkout_url: String,
        payment_id: Option<String>,
    },
    Rejected(String),
    MissingUrl,
}

/// Scriptable backend
pub struct MockBillingApi {
    plans: Mutex<Vec<Plan>>,
    intent_reply: Mutex<IntentReply>,
    intent_requests: Mutex<Vec<PaymentIntentRequest>>,
    statuses: Mutex<VecDeque<PaymentStatus>>,
    status_calls: AtomicU32,
    failing_status_calls: AtomicU32,
    registrations: Mutex<Vec<Registration>>,
    refusal: Mutex<Option<String>>,
    lookups_fail: AtomicBool,
    lookup_calls: AtomicU32,
}

impl Default for MockBillingApi {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBillingApi {
    pub fn new() -> Self {
        Self {
            plans: Mutex::new(Vec::new()),
            intent_reply: Mutex::new(IntentReply::Generated),
            intent_requests: Mutex::new(Vec::new()),
            statuses: Mutex::new(VecDeque::new()),
            status_calls: AtomicU32::new(0),
            failing_status_calls: AtomicU32::new(0),
            registrations: Mutex::new(Vec::new()),
            refusal: Mutex::new(None),
            lookups_fail: AtomicBool::new(false),
            lookup_calls: AtomicU32::new(0),
        }
    }

    /// Backend preloaded with a small employer and job seeker catalog
    pub fn with_sample_catalog() -> Self {
        let api = Self::new();
        api.add_plan(Self::sample_plan(5, "Starter", 100));
        api.add_plan(Self::sample_plan(6, "SMB", 300));
        let mut seeker = Self::sample_plan(11, "Seeker Plus", 15);
        seeker.category = PlanCategory::Employee;
        seeker.duration_days = 30;
        api.add_plan(seeker);
        api
    }

    /// An employer plan lasting 180 days
    pub fn sample_plan(id: i64, name: &str, price: i64) -> Plan {
        Plan {
            plan_id: id,
            plan_name: name.to_string(),
            category: PlanCategory::Employer,
            price: Decimal::from(price),
            duration_days: 180,
            features: "Job posts\nCandidate search".to_string(),
            description: format!("{name} plan"),
        }
    }

    pub fn add_plan(&self, plan: Plan) {
        locked(&self.plans).push(plan);
    }

    /// Every intent returns this URL and payment id
    pub fn set_intent(&self, checkout_url: &str, payment_id: Option<&str>) {
        *locked(&self.intent_reply) = IntentReply::Fixed {
            checkout_url: checkout_url.to_string(),
            payment_id: payment_id.map(str::to_string),
        };
    }

    pub fn reject_intents(&self, message: &str) {
        *locked(&self.intent_reply) = IntentReply::Rejected(message.to_string());
    }

    pub fn omit_checkout_url(&self) {
        *locked(&self.intent_reply) = IntentReply::MissingUrl;
    }

    /// Statuses returned in order; `Pending` once the script runs out
    pub fn script_statuses(&self, statuses: impl IntoIterator<Item = PaymentStatus>) {
        locked(&self.statuses).extend(statuses);
    }

    /// Make the next `n` status calls fail without consuming the script
    pub fn fail_status_calls(&self, n: u32) {
        self.failing_status_calls.store(n, Ordering::SeqCst);
    }

    pub fn refuse_registrations(&self, message: &str) {
        *locked(&self.refusal) = Some(message.to_string());
    }

    pub fn fail_subscription_lookups(&self, fail: bool) {
        self.lookups_fail.store(fail, Ordering::SeqCst);
    }

    pub fn intent_requests(&self) -> Vec<PaymentIntentRequest> {
        locked(&self.intent_requests).clone()
    }

    pub fn intent_calls(&self) -> usize {
        locked(&self.intent_requests).len()
    }

    pub fn status_calls(&self) -> u32 {
        self.status_calls.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<Registration> {
        locked(&self.registrations).clone()
    }

    pub fn lookup_calls(&self) -> u32 {
        self.lookup_calls.load(Ordering::SeqCst)
    }

    /// Calls to any backend operation that touches a payment
    pub fn total_calls(&self) -> usize {
        self.intent_calls() + self.status_calls() as usize + self.registrations().len()
    }
}

#[async_trait]
impl BillingApi for MockBillingApi {
    async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
        let call = {
            let mut requests = locked(&self.intent_requests);
            requests.push(request.clone());
            requests.len()
        };

        let reply = locked(&self.intent_reply).clone();
        let (checkout_url, payment_id) = match reply {
            IntentReply::Generated => (
                format!("https://pay.example/checkout/{}-{call}", request.plan_id),
                Some(format!("pay-{call}")),
            ),
            IntentReply::Fixed {
                checkout_url,
                payment_id,
            } => (checkout_url, payment_id),
            IntentReply::Rejected(message) => return Err(PaymentError::Rejected(message)),
            IntentReply::MissingUrl => return Err(PaymentError::MissingCheckoutUrl),
        };

        Ok(PaymentIntent {
            payment_id: payment_id.map(PaymentId::new),
            checkout_url,
            plan_id: request.plan_id,
            amount: request.price,
        })
    }

    async fn payment_status(&self, _payment_id: &PaymentId) -> Result<PaymentStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);

        let failing = self.failing_status_calls.load(Ordering::SeqCst);
        if failing > 0 {
            self.failing_status_calls.store(failing - 1, Ordering::SeqCst);
            return Err(PaymentError::Decode("connection reset".into()));
        }

        Ok(locked(&self.statuses)
            .pop_front()
            .unwrap_or(PaymentStatus::Pending))
    }

    async fn register_subscription(&self, registration: &Registration) -> Result<()> {
        locked(&self.registrations).push(registration.clone());
        match locked(&self.refusal).clone() {
            Some(message) => Err(PaymentError::Rejected(message)),
            None => Ok(()),
        }
    }

    async fn subscription_for_user(&self, user_id: UserId) -> Result<Option<ActiveSubscription>> {
        self.lookup_calls.fetch_add(1, Ordering::SeqCst);
        if self.lookups_fail.load(Ordering::SeqCst) {
            return Err(PaymentError::Decode("subscription lookup failed".into()));
        }
        if locked(&self.refusal).is_some() {
            return Ok(None);
        }

        let Some(plan_id) = locked(&self.registrations)
            .iter()
            .rev()
            .find(|r| r.user_id == user_id)
            .map(|r| r.plan_id)
        else {
            return Ok(None);
        };

        let plan = locked(&self.plans)
            .iter()
            .find(|p| p.id() == Some(plan_id))
            .cloned()
            .unwrap_or_else(|| {
                let raw = i64::try_from(plan_id.get()).unwrap_or(i64::MAX);
                Self::sample_plan(raw, "Plan", 0)
            });
        Ok(Some(ActiveSubscription::new(plan)))
    }

    async fn list_plans(&self) -> Result<Page<Plan>> {
        let items = locked(&self.plans).clone();
        let total = items.len();
        Ok(Page { items, total })
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// Checkout window that records what was done to it
pub struct MockWindow {
    closed: AtomicBool,
    closed_probe: Option<Box<dyn Fn() -> bool + Send + Sync>>,
    location: Mutex<Option<String>>,
    error: Mutex<Option<String>>,
    close_calls: AtomicUsize,
}

impl Default for MockWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWindow {
    pub fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
            closed_probe: None,
            location: Mutex::new(None),
            error: Mutex::new(None),
            close_calls: AtomicUsize::new(0),
        }
    }

    /// A window the user already closed
    pub fn closed() -> Self {
        let window = Self::new();
        window.user_close();
        window
    }

    /// Window that also reports closed whenever `probe` returns true
    pub fn with_closed_probe(probe: impl Fn() -> bool + Send + Sync + 'static) -> Self {
        Self {
            closed_probe: Some(Box::new(probe)),
            ..Self::new()
        }
    }

    /// Simulate the user closing the window
    pub fn user_close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    pub fn location(&self) -> Option<String> {
        locked(&self.location).clone()
    }

    pub fn error(&self) -> Option<String> {
        locked(&self.error).clone()
    }

    /// Closes issued by the application (not the user)
    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl CheckoutWindow for MockWindow {
    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.closed_probe.as_ref().is_some_and(|probe| probe())
    }

    fn navigate(&self, url: &str) {
        *locked(&self.location) = Some(url.to_string());
    }

    fn show_error(&self, message: &str) {
        *locked(&self.error) = Some(message.to_string());
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Opener handing out [`MockWindow`]s
#[derive(Default)]
pub struct MockOpener {
    blocked: AtomicBool,
    queued: Mutex<VecDeque<Arc<MockWindow>>>,
    opened: Mutex<Vec<Arc<MockWindow>>>,
}

impl MockOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse every open, as a popup blocker would
    pub fn block(&self) {
        self.blocked.store(true, Ordering::SeqCst);
    }

    /// Hand out `window` on the next open instead of a fresh one
    pub fn hand_out(&self, window: MockWindow) -> Arc<MockWindow> {
        let window = Arc::new(window);
        locked(&self.queued).push_back(window.clone());
        window
    }

    pub fn opened(&self) -> usize {
        locked(&self.opened).len()
    }

    /// Most recently opened window
    pub fn last(&self) -> Option<Arc<MockWindow>> {
        locked(&self.opened).last().cloned()
    }
}

impl WindowOpener for MockOpener {
    fn open_placeholder(&self) -> Option<Arc<dyn CheckoutWindow>> {
        if self.blocked.load(Ordering::SeqCst) {
            return None;
        }
        let window = locked(&self.queued)
            .pop_front()
            .unwrap_or_else(|| Arc::new(MockWindow::new()));
        locked(&self.opened).push(window.clone());
        Some(window)
    }
}
