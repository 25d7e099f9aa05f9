//! Roles
//!
//! The backend identifies roles by number. This is the only place that
//! number is interpreted; everything else works with [`Role`].

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::model::PlanCategory;

/// Semantic role of a signed-in account
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Staff,
    Finance,
    Employer,
    Employee,
}

impl Role {
    pub const ALL: [Self; 5] = [
        Self::Admin,
        Self::Staff,
        Self::Finance,
        Self::Employer,
        Self::Employee,
    ];

    /// Canonical numeric id to role mapping
    pub const fn from_id(id: i64) -> Option<Self> {
        match id {
            1 => Some(Self::Admin),
            2 => Some(Self::Staff),
            3 => Some(Self::Finance),
            4 => Some(Self::Employer),
            5 => Some(Self::Employee),
            _ => None,
        }
    }

    pub const fn id(self) -> i64 {
        match self {
            Self::Admin => 1,
            Self::Staff => 2,
            Self::Finance => 3,
            Self::Employer => 4,
            Self::Employee => 5,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Staff => "staff",
            Self::Finance => "finance",
            Self::Employer => "employer",
            Self::Employee => "employee",
        }
    }

    /// Which plans this role may purchase
    pub const fn plan_category(self) -> Option<PlanCategory> {
        match self {
            Self::Employee => Some(PlanCategory::Employee),
            Self::Employer => Some(PlanCategory::Employer),
            Self::Admin | Self::Staff | Self::Finance => None,
        }
    }

    pub const fn is_back_office(self) -> bool {
        matches!(self, Self::Admin | Self::Staff | Self::Finance)
    }
}

impl std::str::FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        if let Ok(id) = normalized.parse::<i64>() {
            return Self::from_id(id).ok_or_else(|| CoreError::UnknownRole(s.to_string()));
        }
        match normalized.as_str() {
            "admin" => Ok(Self::Admin),
            "staff" => Ok(Self::Staff),
            "finance" => Ok(Self::Finance),
            "employer" => Ok(Self::Employer),
            "employee" | "jobseeker" | "job_seeker" => Ok(Self::Employee),
            _ => Err(CoreError::UnknownRole(s.to_string())),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
