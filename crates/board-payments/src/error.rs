//! Payment Error Types

use thiserror::Error;

use crate::dialog::{DialogEvent, WorkflowState};

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Payment workflow errors
#[derive(Error, Debug)]
pub enum PaymentError {
    /// User or plan id did not resolve to a positive integer
    #[error("Validation error: {0}")]
    Validation(#[from] board_core::CoreError),

    /// The checkout window could not be opened
    #[error("Checkout window was blocked")]
    PopupBlocked,

    /// Backend refused the request (server message when available)
    #[error("Rejected by server: {0}")]
    Rejected(String),

    /// Backend accepted the intent but sent no checkout URL
    #[error("No checkout URL returned")]
    MissingCheckoutUrl,

    /// Transport failure talking to the backend
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response body could not be interpreted
    #[error("Decode error: {0}")]
    Decode(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dialog event not allowed in the current state
    #[error("Cannot apply {event:?} while {from:?}")]
    InvalidTransition {
        from: WorkflowState,
        event: DialogEvent,
    },
}

impl PaymentError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Decode(_))
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(e) => e.user_message(),
            Self::PopupBlocked => {
                "The payment window was blocked. Please allow popups for this site and try again."
                    .into()
            }
            Self::Rejected(msg) => msg.clone(),
            Self::MissingCheckoutUrl => {
                "The payment provider did not return a checkout page. Please try again.".into()
            }
            Self::Network(_) => "Could not reach the server. Please check your connection.".into(),
            Self::Config(_) => "Service configuration error.".into(),
            _ => "An error occurred processing your payment.".into(),
        }
    }
}

impl From<serde_json::Error> for PaymentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_message_surfaces_verbatim() {
        let err = PaymentError::Rejected("Plan is no longer on sale".into());
        assert_eq!(err.user_message(), "Plan is no longer on sale");
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_validation_names_field() {
        let err = PaymentError::from(board_core::CoreError::InvalidId { field: "plan id" });
        assert!(err.user_message().contains("plan id"));
    }
}
