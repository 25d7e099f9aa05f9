//! Viewer
//!
//! The signed-in user as the client sees it. This is a cached copy of
//! backend state and is never authoritative.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids::{UserId, resolve_positive};
use crate::model::PlanCategory;
use crate::role::Role;

/// Resolved context of the signed-in user
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewer {
    /// Raw user id; validated where it is used
    pub user_id: Option<i64>,
    pub role: Option<Role>,
    pub employee_id: Option<i64>,
    pub employer_id: Option<i64>,
}

impl Viewer {
    pub fn new(user_id: i64, role: Role) -> Self {
        Self {
            user_id: Some(user_id),
            role: Some(role),
            ..Self::default()
        }
    }

    pub fn with_employee_id(mut self, id: i64) -> Self {
        self.employee_id = Some(id);
        self
    }

    pub fn with_employer_id(mut self, id: i64) -> Self {
        self.employer_id = Some(id);
        self
    }

    /// Build from a token claim set or a `/me` style payload
    pub fn from_claims(claims: &Value) -> Self {
        let root = ["user", "data"]
            .iter()
            .find_map(|key| claims.get(*key).filter(|v| v.is_object()))
            .unwrap_or(claims);

        let int = |keys: &[&str]| -> Option<i64> {
            keys.iter()
                .filter_map(|key| root.get(*key))
                .find_map(resolve_positive)
                .and_then(|v| i64::try_from(v).ok())
        };

        let role = ["roleId", "role_id", "role"]
            .iter()
            .filter_map(|key| root.get(*key))
            .find_map(|value| match value {
                Value::Number(n) => n.as_i64().and_then(Role::from_id),
                Value::String(s) => s.parse().ok(),
                _ => None,
            });

        if role.is_none() {
            tracing::debug!("No recognised role in claims");
        }

        Self {
            user_id: int(&["userId", "user_id", "id"]),
            role,
            employee_id: int(&["employeeId", "employee_id"]),
            employer_id: int(&["employerId", "employer_id"]),
        }
    }

    /// Validated user id
    pub fn id(&self) -> Option<UserId> {
        self.user_id.and_then(UserId::new)
    }

    pub fn plan_category(&self) -> Option<PlanCategory> {
        self.role.and_then(Role::plan_category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_flat_claims() {
        let viewer = Viewer::from_claims(&json!({
            "userId": "42",
            "roleId": 4,
            "employerId": 9
        }));

        assert_eq!(viewer.id().map(UserId::get), Some(42));
        assert_eq!(viewer.role, Some(Role::Employer));
        assert_eq!(viewer.employer_id, Some(9));
        assert_eq!(viewer.employee_id, None);
        assert_eq!(viewer.plan_category(), Some(PlanCategory::Employer));
    }

    #[test]
    fn test_from_nested_claims_with_role_name() {
        let viewer = Viewer::from_claims(&json!({
            "data": { "id": 7, "role": "employee", "employee_id": 3 }
        }));

        assert_eq!(viewer.user_id, Some(7));
        assert_eq!(viewer.role, Some(Role::Employee));
        assert_eq!(viewer.employee_id, Some(3));
    }

    #[test]
    fn test_invalid_user_id_is_dropped() {
        let viewer = Viewer::from_claims(&json!({"userId": -1, "roleId": 99}));
        assert_eq!(viewer.user_id, None);
        assert_eq!(viewer.role, None);
        assert_eq!(viewer.id(), None);
    }
}
