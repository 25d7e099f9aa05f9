//! Response Normalization
//!
//! The backend does not commit to one response shape: payloads arrive flat,
//! wrapped in `data`, or wrapped twice, with camelCase or snake_case keys
//! and paging metadata under several names. Each operation gets exactly one
//! function here that turns a raw body into a typed result.

use board_core::{ActiveSubscription, Plan, PlanId};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

use crate::api::{Page, PaymentId, PaymentIntent};
use crate::error::{PaymentError, Result};
use crate::status::PaymentStatus;

/// Envelope levels searched for a key, in priority order
const LEVELS: [&[&str]; 3] = [&["data"], &[], &["data", "data"]];

const CHECKOUT_URL_KEYS: &[&str] = &["checkoutUrl", "checkout_url", "paymentUrl", "payment_url"];
const PAYMENT_ID_KEYS: &[&str] = &["paymentId", "payment_id", "orderCode", "order_code"];
const STATUS_KEYS: &[&str] = &["status", "paymentStatus", "payment_status"];
const SUCCESS_KEYS: &[&str] = &["success", "isSuccess", "succeeded"];
const MESSAGE_KEYS: &[&str] = &["message", "error", "title", "errorMessage", "detail"];
const EXPIRY_KEYS: &[&str] = &["endDate", "end_date", "expiresAt", "expires_at", "expiredAt", "expiryDate"];

fn descend<'v>(value: &'v Value, path: &[&str]) -> Option<&'v Value> {
    path.iter().try_fold(value, |node, key| node.get(*key))
}

fn is_populated(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// First populated value among explicit key paths
pub fn probe<'v>(value: &'v Value, paths: &[&[&str]]) -> Option<&'v Value> {
    paths
        .iter()
        .filter_map(|path| descend(value, path))
        .find(|v| is_populated(v))
}

/// First populated value for any of `keys` under `data`, the root, or `data.data`
pub fn probe_keys<'v>(value: &'v Value, keys: &[&str]) -> Option<&'v Value> {
    LEVELS
        .iter()
        .filter_map(|level| descend(value, level))
        .flat_map(|node| keys.iter().filter_map(move |key| node.get(*key)))
        .find(|v| is_populated(v))
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Server-provided error message, if the body carries one
pub fn error_message(value: &Value) -> Option<String> {
    if let Value::String(s) = value {
        return Some(s.trim().to_string()).filter(|s| !s.is_empty());
    }
    let found = probe_keys(value, MESSAGE_KEYS)?;
    match found {
        Value::Object(_) => probe_keys(found, MESSAGE_KEYS).and_then(as_text),
        other => as_text(other),
    }
}

/// `Some(message)` when any envelope level carries an explicit `success: false`
fn explicit_failure(value: &Value) -> Option<String> {
    let refused = LEVELS
        .iter()
        .filter_map(|level| descend(value, level))
        .flat_map(|node| SUCCESS_KEYS.iter().filter_map(move |key| node.get(*key)))
        .any(|flag| flag == &Value::Bool(false));

    refused.then(|| error_message(value).unwrap_or_else(|| "Request was not successful".into()))
}

/// Create payment intent
pub fn payment_intent(value: &Value, plan_id: PlanId, amount: Decimal) -> Result<PaymentIntent> {
    if let Some(message) = explicit_failure(value) {
        return Err(PaymentError::Rejected(message));
    }

    let checkout_url = probe_keys(value, CHECKOUT_URL_KEYS)
        .and_then(as_text)
        .ok_or(PaymentError::MissingCheckoutUrl)?;

    let payment_id = probe_keys(value, PAYMENT_ID_KEYS)
        .and_then(as_text)
        .map(PaymentId::new);

    Ok(PaymentIntent {
        payment_id,
        checkout_url,
        plan_id,
        amount,
    })
}

/// Get payment status
pub fn payment_status(value: &Value) -> Result<PaymentStatus> {
    if let Value::String(raw) = value {
        return Ok(PaymentStatus::parse(raw));
    }
    probe_keys(value, STATUS_KEYS)
        .and_then(as_text)
        .map(|raw| PaymentStatus::parse(&raw))
        .ok_or_else(|| PaymentError::Decode(format!("no status field in {value}")))
}

/// Register subscription: `Err(message)` when the server says no
pub fn registration_accepted(value: &Value) -> std::result::Result<(), String> {
    explicit_failure(value).map_or(Ok(()), Err)
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
                .ok()
                .map(|naive| naive.and_utc())
        })
}

/// Get subscription by user id; `None` when the user has no plan
pub fn active_subscription(value: &Value) -> Option<ActiveSubscription> {
    const PLAN_PATHS: &[&[&str]] = &[
        &["data", "plan"],
        &["plan"],
        &["data", "subscriptionPlan"],
        &["subscriptionPlan"],
        &["data", "data", "plan"],
        &["data", "data"],
        &["data"],
        &[],
    ];

    let plan_value = PLAN_PATHS
        .iter()
        .filter_map(|path| descend(value, path))
        .find(|v| v.is_object() && probe_keys(v, &["planId", "plan_id", "id"]).is_some())?;

    let plan: Plan = match serde_json::from_value(plan_value.clone()) {
        Ok(plan) => plan,
        Err(e) => {
            tracing::warn!(error = %e, "Subscription payload did not contain a readable plan");
            return None;
        }
    };

    let expires_at = probe_keys(value, EXPIRY_KEYS)
        .or_else(|| probe_keys(plan_value, EXPIRY_KEYS))
        .and_then(Value::as_str)
        .and_then(parse_timestamp);

    Some(ActiveSubscription { plan, expires_at })
}

/// List subscription plans, with whatever paging metadata came along
pub fn plan_page(value: &Value) -> Result<Page<Plan>> {
    const ITEM_PATHS: &[&[&str]] = &[
        &[],
        &["data", "items"],
        &["data", "data"],
        &["data", "content"],
        &["data"],
        &["items"],
        &["results"],
        &["content"],
    ];
    const TOTAL_PATHS: &[&[&str]] = &[
        &["total"],
        &["totalCount"],
        &["totalItems"],
        &["count"],
        &["meta", "total"],
        &["data", "total"],
        &["data", "totalCount"],
        &["data", "totalItems"],
        &["pagination", "total"],
        &["data", "pagination", "total"],
    ];

    let items = ITEM_PATHS
        .iter()
        .filter_map(|path| descend(value, path))
        .find_map(Value::as_array)
        .ok_or_else(|| PaymentError::Decode("no plan list in response".into()))?;

    let plans: Vec<Plan> = items
        .iter()
        .filter_map(|item| match serde_json::from_value::<Plan>(item.clone()) {
            Ok(plan) => Some(plan),
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable plan entry");
                None
            }
        })
        .collect();

    let total = probe(value, TOTAL_PATHS)
        .and_then(as_text)
        .and_then(|t| t.parse::<usize>().ok())
        .unwrap_or(plans.len());

    Ok(Page { items: plans, total })
}
