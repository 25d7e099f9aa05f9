//! Domain Models
//!
//! Plans and subscriptions as the backend reports them. The server is the
//! source of truth; these are read-only snapshots for the current session.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::ids::PlanId;

/// Who a plan is sold to (`type` on the wire)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i64", into = "i64")]
pub enum PlanCategory {
    /// Job seeker plans
    Employee,
    /// Hiring company plans
    Employer,
    /// A category this client does not know about
    Other(i64),
}

impl From<i64> for PlanCategory {
    fn from(raw: i64) -> Self {
        match raw {
            1 => Self::Employee,
            2 => Self::Employer,
            other => Self::Other(other),
        }
    }
}

impl From<PlanCategory> for i64 {
    fn from(category: PlanCategory) -> Self {
        match category {
            PlanCategory::Employee => 1,
            PlanCategory::Employer => 2,
            PlanCategory::Other(raw) => raw,
        }
    }
}

/// A purchasable subscription tier
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    /// Raw id as sent by the server; validate with [`Plan::id`] before use
    #[serde(alias = "id", alias = "plan_id", deserialize_with = "lenient_i64")]
    pub plan_id: i64,

    #[serde(alias = "name", alias = "plan_name", default, deserialize_with = "nullable_string")]
    pub plan_name: String,

    #[serde(rename = "type", default = "default_category", deserialize_with = "lenient_category")]
    pub category: PlanCategory,

    #[serde(default, serialize_with = "rust_decimal::serde::float::serialize")]
    pub price: Decimal,

    #[serde(
        alias = "duration",
        alias = "duration_days",
        default,
        deserialize_with = "lenient_i64"
    )]
    pub duration_days: i64,

    /// Free text, possibly delimited; see [`Plan::feature_list`]
    #[serde(default, deserialize_with = "features_text")]
    pub features: String,

    #[serde(default, deserialize_with = "nullable_string")]
    pub description: String,
}

fn default_category() -> PlanCategory {
    PlanCategory::Other(0)
}

impl Plan {
    /// Validated plan id, `None` if the server sent a non-positive id
    pub fn id(&self) -> Option<PlanId> {
        PlanId::new(self.plan_id)
    }

    pub fn is_free(&self) -> bool {
        self.price.is_zero()
    }

    /// Split the feature text into display lines
    pub fn feature_list(&self) -> Vec<String> {
        self.features
            .split(['\n', ';', '|', ','])
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }
}

/// The user's currently active plan
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveSubscription {
    pub plan: Plan,

    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl ActiveSubscription {
    pub fn new(plan: Plan) -> Self {
        Self { plan, expires_at: None }
    }

    /// Active at `now` (no expiry means open-ended)
    pub fn is_current(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|expires| expires > now)
    }

    pub fn covers(&self, plan_id: PlanId) -> bool {
        self.plan.id() == Some(plan_id)
    }
}

fn lenient_i64<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| serde::de::Error::custom(format!("expected an integer, got {n}"))),
        Value::String(s) => s
            .trim()
            .parse()
            .map_err(|_| serde::de::Error::custom(format!("expected an integer, got {s:?}"))),
        other => Err(serde::de::Error::custom(format!("expected an integer, got {other}"))),
    }
}

fn lenient_category<'de, D: Deserializer<'de>>(deserializer: D) -> Result<PlanCategory, D::Error> {
    lenient_i64(deserializer).map(PlanCategory::from)
}

fn nullable_string<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

fn features_text<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Features {
        Text(String),
        List(Vec<String>),
    }

    Ok(match Option::<Features>::deserialize(deserializer)? {
        Some(Features::Text(text)) => text,
        Some(Features::List(items)) => items.join("\n"),
        None => String::new(),
    })
}
