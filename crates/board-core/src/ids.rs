//! Positive Identifiers
//!
//! Backend ids arrive as numbers, numeric strings, or not at all. These
//! newtypes can only be built from values that resolve to a positive integer.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, Result};

/// Resolve a loosely typed JSON value to a positive integer.
///
/// Accepts integral numbers and numeric strings; rejects null, booleans,
/// fractional numbers, zero and negatives.
pub fn resolve_positive(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                return (v > 0).then_some(v);
            }
            if n.as_i64().is_some() {
                return None;
            }
            let f = n.as_f64()?;
            if f.fract() == 0.0 && f >= 1.0 && f <= u64::MAX as f64 {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                Some(f as u64)
            } else {
                None
            }
        }
        Value::String(s) => s.trim().parse::<u64>().ok().filter(|v| *v > 0),
        _ => None,
    }
}

macro_rules! positive_id {
    ($(#[$meta:meta])* $name:ident, $field:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "Value", into = "u64")]
        pub struct $name(u64);

        impl $name {
            /// Build from a raw integer; `None` unless strictly positive
            pub fn new(raw: i64) -> Option<Self> {
                u64::try_from(raw).ok().filter(|v| *v > 0).map(Self)
            }

            /// Resolve from a loosely typed JSON value
            pub fn resolve(value: &Value) -> Option<Self> {
                resolve_positive(value).map(Self)
            }

            /// Validate a raw optional id, naming the field on failure
            pub fn require(raw: Option<i64>) -> Result<Self> {
                raw.and_then(Self::new)
                    .ok_or(CoreError::InvalidId { field: $field })
            }

            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl TryFrom<Value> for $name {
            type Error = CoreError;

            fn try_from(value: Value) -> Result<Self> {
                Self::resolve(&value).ok_or(CoreError::InvalidId { field: $field })
            }
        }

        impl From<$name> for u64 {
            fn from(id: $name) -> u64 {
                id.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

positive_id!(
    /// Identifier of a signed-in user
    UserId,
    "user id"
);

positive_id!(
    /// Identifier of a subscription plan
    PlanId,
    "plan id"
);

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_rejects_non_positive() {
        assert_eq!(UserId::new(0), None);
        assert_eq!(UserId::new(-7), None);
        assert_eq!(UserId::new(42).map(UserId::get), Some(42));
    }

    #[test]
    fn test_resolve_loose_values() {
        assert_eq!(PlanId::resolve(&json!(6)).map(PlanId::get), Some(6));
        assert_eq!(PlanId::resolve(&json!(" 6 ")).map(PlanId::get), Some(6));
        assert_eq!(PlanId::resolve(&json!(6.0)).map(PlanId::get), Some(6));

        for bad in [json!(null), json!(0), json!(-1), json!("abc"), json!(6.5), json!(true), json!("")] {
            assert_eq!(PlanId::resolve(&bad), None, "{bad} should not resolve");
        }
    }

    #[test]
    fn test_require_names_field() {
        let err = UserId::require(None).unwrap_err();
        assert_eq!(err, CoreError::InvalidId { field: "user id" });
        assert!(err.to_string().contains("user id"));
    }

    #[test]
    fn test_serde_as_integer() {
        let id: PlanId = serde_json::from_value(json!("12")).unwrap();
        assert_eq!(serde_json::to_value(id).unwrap(), json!(12));
        assert!(serde_json::from_value::<PlanId>(json!(0)).is_err());
    }
}
