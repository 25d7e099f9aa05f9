//! HTTP Handlers

use axum::{
    Json,
    extract::State,
    http::{HeaderMap, StatusCode, header},
};
use board_payments::InboundMessage;
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub listeners: usize,
}

#[derive(Debug, Serialize)]
pub struct CallbackResponse {
    /// Listeners the message was handed to
    pub delivered: usize,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

// ============================================================================
// Handlers
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        listeners: state.hub.listener_count(),
    })
}

/// Completion callback from the checkout return page
///
/// The page posts what it would have sent with `postMessage`; the browser's
/// `Origin` header stands in for the message origin. Filtering by origin is
/// left to the listeners.
pub async fn payment_callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(data): Json<Value>,
) -> Result<(StatusCode, Json<CallbackResponse>), (StatusCode, Json<ErrorResponse>)> {
    let origin = headers
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                Json(ErrorResponse {
                    error: "Missing Origin header".into(),
                    code: "MISSING_ORIGIN".into(),
                }),
            )
        })?;

    let delivered = state.hub.post(InboundMessage::new(origin, data));
    tracing::debug!(origin, delivered, "Checkout callback received");

    Ok((StatusCode::ACCEPTED, Json(CallbackResponse { delivered })))
}
