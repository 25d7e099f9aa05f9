//! Payment Flow
//!
//! Ties the pieces together for one payment dialog:
//!
//! ```text
//!   pay() ──▶ CheckoutInitiator ──▶ checkout window
//!                  │
//!                  ▼ spawn observer
//!        ┌───────────────────────┐
//!        │ select! {             │
//!        │   shutdown            │◀── close() / drop
//!        │   listener.recv()     │──┐
//!        │   poller.poll()       │──┴─▶ SubscriptionRegistrar ──▶ dialog
//!        │ }                     │
//!        └───────────────────────┘
//! ```
//!
//! Whichever observer reports completion first registers the plan; the
//! backend tolerates a second registration if both get there.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use board_core::{Plan, PlanId, Viewer};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::Instrument;
use uuid::Uuid;

use crate::api::{BillingApi, PaymentId};
use crate::dialog::{DialogEvent, DialogSnapshot, PaymentDialog, WorkflowState};
use crate::error::{PaymentError, Result};
use crate::initiator::{CheckoutInitiator, CheckoutSession};
use crate::listener::{CheckoutMessage, MessageHub, MessageSubscription};
use crate::poller::{PollConfig, PollOutcome, StatusPoller};
use crate::registrar::{Registration, SubscriptionRegistrar};
use crate::window::{CheckoutWindow, WindowOpener, close_if_open};

const CONFIRMED: &str = "Payment confirmed. Your plan is now active.";
const CANCELLED: &str = "The payment was cancelled.";
const PROVIDER_FAILED: &str = "The payment failed or was cancelled by the provider.";
const WINDOW_CLOSED: &str = "The payment window was closed before we received confirmation. \
     If you completed the payment, check again in a moment.";
const TIMED_OUT: &str = "We have not received payment confirmation yet. \
     If you completed the payment, check again in a few minutes.";
const NEEDS_RECONCILING: &str = "Payment received, but the plan activation is still being confirmed. \
     Please check again shortly.";
const UNRESOLVED_IDS: &str = "Payment reported complete, but we could not match it to your account. \
     Please check again shortly.";

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Flow configuration
#[derive(Clone, Debug)]
pub struct FlowConfig {
    pub poll: PollConfig,

    /// Dismiss the dialog this long after success; `None` waits for the user
    pub auto_close_after: Option<Duration>,

    /// `host[:port]` completion messages must come from
    pub expected_host: String,
}

impl FlowConfig {
    pub fn new(expected_host: impl Into<String>) -> Self {
        Self {
            poll: PollConfig::default(),
            auto_close_after: None,
            expected_host: expected_host.into(),
        }
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Close the dialog automatically 1500 ms after success
    pub fn auto_closing(mut self) -> Self {
        self.auto_close_after = Some(Duration::from_millis(1500));
        self
    }
}

/// Dialog plus a counter that invalidates reports from abandoned attempts
struct Board {
    dialog: PaymentDialog,
    generation: u64,
}

/// A running observer task
struct Attempt {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
    window: Arc<dyn CheckoutWindow>,
}

impl Attempt {
    fn cancel(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Cancel and wait for the observer (and its listener) to be gone
    async fn stop(self) {
        self.cancel();
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!(error = %e, "Checkout observer panicked");
            }
        }
    }
}

struct Inner {
    initiator: CheckoutInitiator,
    registrar: SubscriptionRegistrar,
    poller: StatusPoller,
    hub: MessageHub,
    viewer: Viewer,
    config: FlowConfig,
    board: Mutex<Board>,
    snapshots: watch::Sender<DialogSnapshot>,
    attempt: Mutex<Option<Attempt>>,
}

/// One payment dialog and the checkout it drives
///
/// Dropping the flow stops its observer and releases its listener.
pub struct PaymentFlow {
    inner: Arc<Inner>,
}

impl PaymentFlow {
    pub fn new(
        api: Arc<dyn BillingApi>,
        opener: Arc<dyn WindowOpener>,
        hub: MessageHub,
        viewer: Viewer,
        config: FlowConfig,
    ) -> Self {
        tracing::debug!(backend = api.name(), expected_host = %config.expected_host, "Payment flow ready");
        let (snapshots, _) = watch::channel(DialogSnapshot::default());
        Self {
            inner: Arc::new(Inner {
                initiator: CheckoutInitiator::new(api.clone(), opener),
                registrar: SubscriptionRegistrar::new(api.clone()),
                poller: StatusPoller::new(api, config.poll.clone()),
                hub,
                viewer,
                config,
                board: Mutex::new(Board {
                    dialog: PaymentDialog::new(),
                    generation: 0,
                }),
                snapshots,
                attempt: Mutex::new(None),
            }),
        }
    }

    /// Show the dialog in `Confirm` for `plan`
    pub fn open(&self, plan: Plan) -> DialogSnapshot {
        self.inner.cancel_attempt();
        let mut board = locked(&self.inner.board);
        board.generation += 1;
        tracing::info!(plan_id = plan.plan_id, plan = %plan.plan_name, "Payment dialog opened");
        board.dialog.show(plan);
        self.inner.publish(&board.dialog)
    }

    /// Confirm the purchase and start checkout
    ///
    /// Returns `Processing` once observation has started, or `Failed` when
    /// checkout could not be started. `Err` only for an illegal transition.
    pub async fn pay(&self) -> Result<WorkflowState> {
        let (generation, plan) = {
            let mut board = locked(&self.inner.board);
            board.dialog.apply(DialogEvent::Pay)?;
            let plan = board.dialog.plan().cloned().ok_or(PaymentError::InvalidTransition {
                from: WorkflowState::Confirm,
                event: DialogEvent::Pay,
            })?;
            board.generation += 1;
            self.inner.publish(&board.dialog);
            (board.generation, plan)
        };
        self.inner.cancel_attempt();

        // Listen before the window exists so an early message is not missed
        let listener = self.inner.hub.subscribe(self.inner.config.expected_host.clone());

        let session = match self.inner.initiator.start(self.inner.viewer.user_id, &plan).await {
            Ok(session) => session,
            Err(e) => {
                let state = self
                    .inner
                    .report(generation, DialogEvent::CheckoutFailed(e.user_message()));
                return Ok(state.unwrap_or_else(|| self.snapshot().state));
            }
        };

        if !self.inner.is_current(generation) {
            tracing::debug!("Dialog closed while checkout was starting");
            return Ok(self.snapshot().state);
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let window = session.window.clone();
        let attempt_id = Uuid::new_v4();
        let span = tracing::info_span!("checkout", %attempt_id, plan_id = %session.intent.plan_id);
        let task = tokio::spawn(
            observe(self.inner.clone(), generation, listener, session, shutdown_rx).instrument(span),
        );

        *locked(&self.inner.attempt) = Some(Attempt {
            shutdown,
            task,
            window,
        });
        Ok(WorkflowState::Processing)
    }

    /// Re-query the user's subscription while `Pending`
    pub async fn check_again(&self) -> Result<WorkflowState> {
        let (generation, plan_id) = {
            let board = locked(&self.inner.board);
            if board.dialog.state() != WorkflowState::Pending {
                let mut dialog = board.dialog.clone();
                return dialog.apply(DialogEvent::CheckAgain { confirmed: false });
            }
            (board.generation, board.dialog.plan().and_then(Plan::id))
        };

        let confirmed = match (self.inner.viewer.id(), plan_id) {
            (Some(user_id), Some(plan_id)) => match self.inner.registrar.refresh(user_id).await {
                Ok(subscription) => subscription.is_some_and(|s| s.covers(plan_id)),
                Err(e) => {
                    tracing::warn!(error = %e, "Could not re-check subscription");
                    false
                }
            },
            _ => false,
        };

        if !confirmed {
            return Ok(self
                .inner
                .report(generation, DialogEvent::CheckAgain { confirmed })
                .unwrap_or_else(|| self.snapshot().state));
        }

        let attempt = locked(&self.inner.attempt).take();
        if let Some(attempt) = attempt {
            close_if_open(attempt.window.as_ref());
            attempt.stop().await;
        }
        // A completion message may have moved the dialog back to Processing meanwhile
        Ok(self
            .inner
            .report(generation, DialogEvent::Confirmed(CONFIRMED.into()))
            .unwrap_or_else(|| self.snapshot().state))
    }

    /// Back to `Confirm` after a failure
    pub fn retry(&self) -> Result<WorkflowState> {
        self.inner.cancel_attempt();
        let mut board = locked(&self.inner.board);
        let state = board.dialog.apply(DialogEvent::Retry)?;
        board.generation += 1;
        self.inner.publish(&board.dialog);
        Ok(state)
    }

    /// Dismiss the dialog; returns once the observer and listener are gone
    pub async fn close(&self) {
        let attempt = locked(&self.inner.attempt).take();
        {
            let mut board = locked(&self.inner.board);
            board.generation += 1;
            let _ = board.dialog.apply(DialogEvent::Close);
            self.inner.publish(&board.dialog);
        }
        if let Some(attempt) = attempt {
            attempt.stop().await;
        }
        tracing::info!("Payment dialog closed");
    }

    pub fn snapshot(&self) -> DialogSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DialogSnapshot> {
        self.inner.snapshots.subscribe()
    }

    /// Wait until the dialog leaves `Processing`
    pub async fn settled(&self) -> WorkflowState {
        let mut rx = self.subscribe();
        let result = rx
            .wait_for(|s| s.state != WorkflowState::Processing)
            .await
            .map(|s| s.state);
        result.unwrap_or_else(|_| self.snapshot().state)
    }

    /// The user's cached subscription, refreshed after registration
    pub fn registrar(&self) -> &SubscriptionRegistrar {
        &self.inner.registrar
    }
}

impl Drop for PaymentFlow {
    fn drop(&mut self) {
        if let Some(attempt) = locked(&self.inner.attempt).take() {
            attempt.cancel();
            attempt.task.abort();
        }
    }
}

impl Inner {
    fn publish(&self, dialog: &PaymentDialog) -> DialogSnapshot {
        let snapshot = dialog.snapshot();
        self.snapshots.send_replace(snapshot.clone());
        snapshot
    }

    fn is_current(&self, generation: u64) -> bool {
        locked(&self.board).generation == generation
    }

    /// Apply an event on behalf of attempt `generation`; stale reports are dropped
    fn report(&self, generation: u64, event: DialogEvent) -> Option<WorkflowState> {
        let mut board = locked(&self.board);
        if board.generation != generation {
            tracing::debug!(?event, "Dropping report from an abandoned checkout");
            return None;
        }
        match board.dialog.apply(event) {
            Ok(state) => {
                self.publish(&board.dialog);
                Some(state)
            }
            Err(e) => {
                tracing::debug!(error = %e, "Ignoring late checkout report");
                None
            }
        }
    }

    fn cancel_attempt(&self) {
        if let Some(attempt) = locked(&self.attempt).take() {
            attempt.cancel();
        }
    }

    /// Register the plan and report the result; `true` when the flow is done
    async fn confirm(&self, generation: u64, plan_id: Option<PlanId>, window: &dyn CheckoutWindow) -> bool {
        let (Some(user_id), Some(plan_id)) = (self.viewer.id(), plan_id) else {
            tracing::warn!(plan_id = ?plan_id, "Completed payment could not be matched to a user and plan");
            self.report(generation, DialogEvent::Unresolved(UNRESOLVED_IDS.into()));
            return false;
        };

        let registration = Registration::for_viewer(user_id, plan_id, &self.viewer);
        if !self.registrar.register(&registration).await {
            self.report(generation, DialogEvent::Unresolved(NEEDS_RECONCILING.into()));
            return false;
        }

        self.report(generation, DialogEvent::Confirmed(CONFIRMED.into()));
        close_if_open(window);

        if let Some(delay) = self.config.auto_close_after {
            tokio::time::sleep(delay).await;
            let mut board = locked(&self.board);
            if board.generation == generation && board.dialog.state() == WorkflowState::Success {
                let _ = board.dialog.apply(DialogEvent::Close);
                board.generation += 1;
                self.publish(&board.dialog);
                tracing::debug!("Payment dialog closed automatically");
            }
        }
        true
    }

    fn fail(&self, generation: u64, message: &str, window: &dyn CheckoutWindow) {
        self.report(generation, DialogEvent::Rejected(message.into()));
        close_if_open(window);
    }
}

/// Wait for the poll budget to run out when there is nothing to poll
async fn poll_or_wait(poller: &StatusPoller, payment_id: Option<&PaymentId>, window: &dyn CheckoutWindow) -> PollOutcome {
    match payment_id {
        Some(id) => poller.poll(id, window).await,
        None => {
            tokio::time::sleep(poller.config().ceiling()).await;
            PollOutcome::Exhausted { attempts: 0 }
        }
    }
}

async fn observe(
    inner: Arc<Inner>,
    generation: u64,
    listener: MessageSubscription,
    session: CheckoutSession,
    mut shutdown: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = shutdown.changed() => {
            tracing::debug!("Checkout observation cancelled");
        }
        () = race(&inner, generation, listener, &session) => {}
    }
}

/// Listener against poller until one of them settles the payment
async fn race(inner: &Inner, generation: u64, mut listener: MessageSubscription, session: &CheckoutSession) {
    let window = session.window.as_ref();
    let selected = Some(session.intent.plan_id);

    let poll = poll_or_wait(&inner.poller, session.intent.payment_id.as_ref(), window);
    tokio::pin!(poll);
    let mut polling = true;
    let mut listening = true;

    loop {
        tokio::select! {
            outcome = &mut poll, if polling => {
                polling = false;
                match outcome {
                    PollOutcome::Completed { .. } => {
                        if inner.confirm(generation, selected, window).await {
                            return;
                        }
                    }
                    PollOutcome::Failed { .. } => {
                        inner.fail(generation, PROVIDER_FAILED, window);
                        return;
                    }
                    PollOutcome::WindowClosed { .. } => {
                        inner.report(generation, DialogEvent::Unresolved(WINDOW_CLOSED.into()));
                    }
                    PollOutcome::Exhausted { .. } => {
                        inner.report(generation, DialogEvent::Unresolved(TIMED_OUT.into()));
                    }
                }
            }
            message = listener.recv(), if listening => match message {
                Some(CheckoutMessage::Completed { plan_id, order_code }) => {
                    tracing::info!(order_code = ?order_code, "Checkout reported completion");
                    inner.report(generation, DialogEvent::Observed);
                    let plan_id = plan_id.as_ref().and_then(PlanId::resolve).or(selected);
                    if inner.confirm(generation, plan_id, window).await {
                        return;
                    }
                }
                Some(CheckoutMessage::Cancelled) => {
                    tracing::info!("Checkout reported cancellation");
                    inner.fail(generation, CANCELLED, window);
                    return;
                }
                None => listening = false,
            },
            else => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Page, PaymentIntent, PaymentIntentRequest};
    use crate::listener::InboundMessage;
    use crate::mock::{MockBillingApi, MockOpener, MockWindow};
    use crate::status::PaymentStatus;
    use async_trait::async_trait;
    use board_core::{ActiveSubscription, Role, UserId};
    use serde_json::json;

    const HOST: &str = "board.example";
    const ORIGIN: &str = "https://board.example";

    struct Harness {
        api: Arc<MockBillingApi>,
        opener: Arc<MockOpener>,
        hub: MessageHub,
        flow: PaymentFlow,
    }

    fn harness_with(max_attempts: u32, configure: impl FnOnce(FlowConfig) -> FlowConfig) -> Harness {
        let api = Arc::new(MockBillingApi::with_sample_catalog());
        api.set_intent("https://pay.example/abc", Some("999"));
        let opener = Arc::new(MockOpener::new());
        let hub = MessageHub::new();
        let config = configure(FlowConfig::new(HOST).with_poll(PollConfig {
            interval: Duration::from_millis(2000),
            max_attempts,
        }));
        let flow = PaymentFlow::new(
            api.clone(),
            opener.clone(),
            hub.clone(),
            Viewer::new(42, Role::Employer),
            config,
        );
        Harness { api, opener, hub, flow }
    }

    /// Mock backend whose subscription calls take a while
    struct SlowSubscriptions {
        inner: Arc<MockBillingApi>,
        lookup_delay: Duration,
        register_delay: Duration,
    }

    #[async_trait]
    impl BillingApi for SlowSubscriptions {
        async fn create_payment_intent(&self, request: &PaymentIntentRequest) -> Result<PaymentIntent> {
            self.inner.create_payment_intent(request).await
        }

        async fn payment_status(&self, payment_id: &PaymentId) -> Result<PaymentStatus> {
            self.inner.payment_status(payment_id).await
        }

        async fn register_subscription(&self, registration: &Registration) -> Result<()> {
            tokio::time::sleep(self.register_delay).await;
            self.inner.register_subscription(registration).await
        }

        async fn subscription_for_user(&self, user_id: UserId) -> Result<Option<ActiveSubscription>> {
            tokio::time::sleep(self.lookup_delay).await;
            self.inner.subscription_for_user(user_id).await
        }

        async fn list_plans(&self) -> Result<Page<Plan>> {
            self.inner.list_plans().await
        }

        fn name(&self) -> &str {
            "slow-mock"
        }
    }

    fn harness(max_attempts: u32) -> Harness {
        harness_with(max_attempts, |config| config)
    }

    fn smb() -> Plan {
        let mut plan = MockBillingApi::sample_plan(6, "SMB", 300);
        plan.duration_days = 180;
        plan
    }

    fn registered(api: &MockBillingApi) -> Vec<(u64, u64)> {
        api.registrations()
            .iter()
            .map(|r| (r.user_id.get(), r.plan_id.get()))
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_paid_on_first_poll_registers_and_succeeds() {
        let h = harness(60);
        h.api.script_statuses([PaymentStatus::parse("paid")]);

        h.flow.open(smb());
        assert_eq!(h.flow.pay().await.unwrap(), WorkflowState::Processing);
        assert_eq!(h.flow.settled().await, WorkflowState::Success);

        assert_eq!(h.api.status_calls(), 1);
        assert_eq!(registered(&h.api), vec![(42, 6)]);
        let window = h.opener.last().unwrap();
        assert_eq!(window.location().as_deref(), Some("https://pay.example/abc"));
        assert_eq!(window.close_calls(), 1);
        assert!(h.flow.registrar().current().is_some_and(|s| s.covers(PlanId::new(6).unwrap())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_completes_after_four_polls_and_closes_window() {
        let h = harness(60);
        h.api.script_statuses([
            PaymentStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Pending,
            PaymentStatus::Completed,
        ]);

        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        assert_eq!(h.flow.settled().await, WorkflowState::Success);
        assert_eq!(h.api.status_calls(), 4);
        assert_eq!(h.opener.last().unwrap().close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_is_pending_and_polling_stops() {
        let h = harness(5);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        assert_eq!(h.flow.settled().await, WorkflowState::Pending);
        assert_eq!(h.api.status_calls(), 5);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(h.api.status_calls(), 5);
        assert_eq!(h.flow.snapshot().state, WorkflowState::Pending);
        assert_eq!(h.flow.snapshot().message.as_deref(), Some(TIMED_OUT));
        assert_eq!(h.opener.last().unwrap().close_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_window_closed_mid_poll_is_pending() {
        let h = harness(60);
        let probe = h.api.clone();
        h.opener
            .hand_out(MockWindow::with_closed_probe(move || probe.status_calls() >= 2));

        let mut states = h.flow.subscribe();
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        let mut seen = Vec::new();
        while states.changed().await.is_ok() {
            let state = states.borrow_and_update().state;
            seen.push(state);
            if state == WorkflowState::Pending {
                break;
            }
        }

        assert!(!seen.contains(&WorkflowState::Failed));
        assert_eq!(h.api.status_calls(), 2);
        assert_eq!(h.flow.snapshot().message.as_deref(), Some(WINDOW_CLOSED));
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_wins_race() {
        let h = harness(60);
        h.api.script_statuses([PaymentStatus::Completed]);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        h.hub.post(InboundMessage::new(
            ORIGIN,
            json!({"type": "payment:completed", "planId": 6, "orderCode": "A1"}),
        ));

        assert_eq!(h.flow.settled().await, WorkflowState::Success);
        assert!(!registered(&h.api).is_empty());
        assert!(registered(&h.api).iter().all(|r| *r == (42, 6)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_poll_wins_race_and_late_message_is_harmless() {
        let h = harness(60);
        h.api.script_statuses([PaymentStatus::Completed]);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        assert_eq!(h.flow.settled().await, WorkflowState::Success);
        h.hub.post(InboundMessage::new(ORIGIN, json!({"type": "payment:completed"})));
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert_eq!(h.flow.snapshot().state, WorkflowState::Success);
        assert_eq!(registered(&h.api), vec![(42, 6)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_origin_changes_nothing() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        let delivered = h.hub.post(InboundMessage::new(
            "https://evil.example",
            json!({"type": "payment:completed", "planId": 6}),
        ));
        assert_eq!(delivered, 1);
        tokio::time::sleep(Duration::from_millis(500)).await;

        assert_eq!(h.flow.snapshot().state, WorkflowState::Processing);
        assert!(h.api.registrations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_message_plan_id_preferred_over_selection() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        h.hub.post(InboundMessage::new(
            ORIGIN,
            json!({"type": "payment:completed", "planId": "5"}),
        ));
        assert_eq!(h.flow.settled().await, WorkflowState::Success);
        assert_eq!(registered(&h.api), vec![(42, 5)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_message_fails_and_closes_window() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        h.hub.post(InboundMessage::new(ORIGIN, json!({"type": "payment:cancel"})));
        assert_eq!(h.flow.settled().await, WorkflowState::Failed);
        assert_eq!(h.flow.snapshot().message.as_deref(), Some(CANCELLED));
        assert_eq!(h.opener.last().unwrap().close_calls(), 1);

        assert_eq!(h.flow.retry().unwrap(), WorkflowState::Confirm);
        assert_eq!(h.flow.pay().await.unwrap(), WorkflowState::Processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_checkout_rejection_fails_with_server_message() {
        let h = harness(60);
        h.api.reject_intents("Plan is no longer on sale");
        h.flow.open(smb());

        assert_eq!(h.flow.pay().await.unwrap(), WorkflowState::Failed);
        assert_eq!(h.flow.snapshot().message.as_deref(), Some("Plan is no longer on sale"));
        assert_eq!(h.hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_refused_registration_is_pending() {
        let h = harness(60);
        h.api.refuse_registrations("Payment not found");
        h.api.script_statuses([PaymentStatus::Completed]);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        assert_eq!(h.flow.settled().await, WorkflowState::Pending);
        assert_eq!(h.flow.snapshot().message.as_deref(), Some(NEEDS_RECONCILING));
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_again_confirms_later_activation() {
        let h = harness(2);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();
        assert_eq!(h.flow.settled().await, WorkflowState::Pending);

        assert_eq!(h.flow.check_again().await.unwrap(), WorkflowState::Pending);

        let activation = Registration::new(UserId::new(42).unwrap(), PlanId::new(6).unwrap());
        h.api.register_subscription(&activation).await.unwrap();

        assert_eq!(h.flow.check_again().await.unwrap(), WorkflowState::Success);
        assert_eq!(h.hub.listener_count(), 0);
        assert_eq!(h.opener.last().unwrap().close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_check_again_wins_over_message_registering_in_flight() {
        let mock = Arc::new(MockBillingApi::with_sample_catalog());
        mock.set_intent("https://pay.example/abc", Some("999"));
        let api = Arc::new(SlowSubscriptions {
            inner: mock.clone(),
            lookup_delay: Duration::from_millis(100),
            register_delay: Duration::from_millis(500),
        });
        let opener = Arc::new(MockOpener::new());
        let calls = mock.clone();
        opener.hand_out(MockWindow::with_closed_probe(move || calls.status_calls() >= 1));
        let hub = MessageHub::new();
        let flow = PaymentFlow::new(
            api,
            opener,
            hub.clone(),
            Viewer::new(42, Role::Employer),
            FlowConfig::new(HOST),
        );

        flow.open(smb());
        flow.pay().await.unwrap();
        assert_eq!(flow.settled().await, WorkflowState::Pending);
        assert_eq!(hub.listener_count(), 1);

        let activation = Registration::new(UserId::new(42).unwrap(), PlanId::new(6).unwrap());
        mock.register_subscription(&activation).await.unwrap();

        let (checked, ()) = tokio::join!(flow.check_again(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            hub.post(InboundMessage::new(
                ORIGIN,
                json!({"type": "payment:completed", "planId": 6}),
            ));
        });

        assert_eq!(checked.unwrap(), WorkflowState::Success);
        let snapshot = flow.snapshot();
        assert_eq!(snapshot.state, WorkflowState::Success);
        assert_eq!(snapshot.message.as_deref(), Some(CONFIRMED));
        assert_eq!(hub.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_observed_message_clears_pending_notice() {
        let mock = Arc::new(MockBillingApi::with_sample_catalog());
        mock.set_intent("https://pay.example/abc", Some("999"));
        let api = Arc::new(SlowSubscriptions {
            inner: mock.clone(),
            lookup_delay: Duration::ZERO,
            register_delay: Duration::from_millis(500),
        });
        let opener = Arc::new(MockOpener::new());
        let calls = mock.clone();
        opener.hand_out(MockWindow::with_closed_probe(move || calls.status_calls() >= 1));
        let hub = MessageHub::new();
        let flow = PaymentFlow::new(
            api,
            opener,
            hub.clone(),
            Viewer::new(42, Role::Employer),
            FlowConfig::new(HOST),
        );

        flow.open(smb());
        flow.pay().await.unwrap();
        assert_eq!(flow.settled().await, WorkflowState::Pending);
        assert_eq!(flow.snapshot().message.as_deref(), Some(WINDOW_CLOSED));

        hub.post(InboundMessage::new(ORIGIN, json!({"type": "payment:completed"})));
        tokio::time::sleep(Duration::from_millis(100)).await;
        let snapshot = flow.snapshot();
        assert_eq!(snapshot.state, WorkflowState::Processing);
        assert_eq!(snapshot.message, None);

        assert_eq!(flow.settled().await, WorkflowState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_stops_polling_and_listener() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();
        assert_eq!(h.hub.listener_count(), 1);

        h.flow.close().await;
        assert_eq!(h.hub.listener_count(), 0);
        assert!(!h.flow.snapshot().open);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_listener() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();
        assert_eq!(h.hub.listener_count(), 1);

        drop(h.flow);
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(h.hub.listener_count(), 0);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.api.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_without_payment_id_waits_for_message_until_ceiling() {
        let h = harness(3);
        h.api.set_intent("https://pay.example/abc", None);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(h.flow.settled().await, WorkflowState::Pending);
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
        assert_eq!(h.api.status_calls(), 0);

        // Listener outlives the timeout
        h.hub.post(InboundMessage::new(ORIGIN, json!({"type": "payment:completed"})));
        let mut states = h.flow.subscribe();
        let state = states
            .wait_for(|s| s.state == WorkflowState::Success)
            .await
            .map(|s| s.state)
            .unwrap();
        assert_eq!(state, WorkflowState::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_close_after_success() {
        let h = harness_with(60, FlowConfig::auto_closing);
        h.api.script_statuses([PaymentStatus::Completed]);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();

        assert_eq!(h.flow.settled().await, WorkflowState::Success);
        assert!(h.flow.snapshot().open);

        tokio::time::sleep(Duration::from_millis(1600)).await;
        assert!(!h.flow.snapshot().open);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pay_twice_is_rejected() {
        let h = harness(60);
        h.flow.open(smb());
        h.flow.pay().await.unwrap();
        assert!(h.flow.pay().await.is_err());
        assert_eq!(h.opener.opened(), 1);
    }
}
