//! Payment Status
//!
//! Providers report status as free text in whatever casing they like.

use serde::{Deserialize, Serialize};

/// Status of a payment intent as reported by the backend
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    /// Anything not recognised; treated as non-terminal
    Unknown(String),
}

impl PaymentStatus {
    /// Normalize a raw status string (case-insensitive)
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            "completed" | "complete" | "success" | "succeeded" | "paid" => Self::Completed,
            "failed" | "failure" | "cancelled" | "canceled" | "expired" => Self::Failed,
            "pending" | "created" | "open" | "unpaid" => Self::Pending,
            "processing" | "in_progress" => Self::Processing,
            other => Self::Unknown(other.to_string()),
        }
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub const fn is_failure(&self) -> bool {
        matches!(self, Self::Failed)
    }

    pub const fn is_terminal(&self) -> bool {
        self.is_success() || self.is_failure()
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => f.write_str("pending"),
            Self::Processing => f.write_str("processing"),
            Self::Completed => f.write_str("completed"),
            Self::Failed => f.write_str("failed"),
            Self::Unknown(raw) => write!(f, "unknown({raw})"),
        }
    }
}
