//! Error Types

use thiserror::Error;

/// Result type alias for domain operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Domain error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Role name or id not in the canonical mapping
    #[error("Unknown role: {0}")]
    UnknownRole(String),

    /// Identifier did not resolve to a positive integer
    #[error("Invalid {field}: expected a positive integer")]
    InvalidId { field: &'static str },

    /// Payload could not be decoded into a domain type
    #[error("Decode error: {0}")]
    Decode(String),
}

impl CoreError {
    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::UnknownRole(_) => "Your account role is not recognised.".into(),
            Self::InvalidId { field } => {
                format!("Could not determine your {field}. Please sign in again.")
            }
            Self::Decode(_) => "The server returned data we could not read.".into(),
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Decode(err.to_string())
    }
}
