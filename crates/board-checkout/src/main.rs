//! board-checkout
//!
//! Runs one plan purchase for a configured user: serves the completion
//! callback the checkout return page posts to, then drives the payment
//! flow until the payment settles or the user interrupts.

mod config;
mod handlers;
mod state;
mod window;

use std::sync::Arc;

use anyhow::Context;
use axum::{
    Router,
    routing::{get, post},
};
use board_core::PlanId;
use board_payments::{
    BillingApi, HttpBillingApi, PaymentFlow, PaymentStatus, PlanCatalog, WorkflowState,
    mock::MockBillingApi,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::CheckoutConfig;
use crate::handlers::{health_check, payment_callback};
use crate::state::AppState;
use crate::window::ConsoleOpener;

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_check))
        .route("/payment/callback", post(payment_callback))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn billing_backend(config: &CheckoutConfig) -> anyhow::Result<Arc<dyn BillingApi>> {
    if config.demo {
        tracing::warn!("BOARD_DEMO set - using the in-memory billing backend");
        let api = MockBillingApi::with_sample_catalog();
        api.script_statuses([PaymentStatus::Pending, PaymentStatus::Pending, PaymentStatus::Completed]);
        return Ok(Arc::new(api));
    }

    let api = HttpBillingApi::from_env().context("billing backend is not configured")?;
    Ok(Arc::new(api))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,board_payments=debug,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CheckoutConfig::from_env()?;
    let viewer = config.viewer();
    let api = billing_backend(&config)?;

    // Completion callback server
    let state = AppState::default();
    let hub = state.hub.clone();
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Completion callback on http://{}/payment/callback", config.bind_addr);
    tracing::info!("Accepting messages from {}", config.app_host);
    let server = tokio::spawn(async move { axum::serve(listener, router(state)).await });

    // Pick the plan
    let catalog = PlanCatalog::load(api.as_ref()).await?;
    let eligible = catalog.for_viewer(&viewer);
    let plan = match config.plan_id.and_then(PlanId::new) {
        Some(plan_id) => catalog
            .find(plan_id)
            .with_context(|| format!("plan {plan_id} is not offered"))?,
        None => eligible
            .first()
            .copied()
            .context("no plan is available for this account")?,
    }
    .clone();

    for offered in &eligible {
        tracing::info!(
            plan_id = offered.plan_id,
            price = %offered.price,
            days = offered.duration_days,
            "Offered: {}",
            offered.plan_name
        );
    }

    // Drive the payment
    let flow = PaymentFlow::new(api, Arc::new(ConsoleOpener), hub, viewer, config.flow());
    flow.open(plan);
    let mut states = flow.subscribe();
    flow.pay().await?;

    loop {
        let snapshot = states.borrow_and_update().clone();
        if let Some(message) = &snapshot.message {
            tracing::info!(state = %snapshot.state, "{message}");
        } else {
            tracing::info!(state = %snapshot.state, "Payment dialog updated");
        }
        if matches!(snapshot.state, WorkflowState::Success | WorkflowState::Failed) || !snapshot.open {
            break;
        }

        tokio::select! {
            changed = states.changed() => {
                if changed.is_err() {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
        }
    }

    if let Some(subscription) = flow.registrar().current() {
        tracing::info!(plan = %subscription.plan.plan_name, "Active subscription");
    }
    flow.close().await;
    server.abort();

    Ok(())
}
