//! Error types for backend calls

use thiserror::Error;

/// Failure of a call to the FitHero backend.
///
/// `Server` carries the human-readable message from the `{"error": "..."}`
/// body when the backend sent one.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Authentication required")]
    Unauthorized { message: Option<String> },

    #[error("Server returned {status}: {}", message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },

    #[error("Invalid response: {reason}")]
    Decode { reason: String },
}

impl ApiError {
    /// Build a server error, routing 401 to [`ApiError::Unauthorized`].
    pub fn from_status(status: u16, message: Option<String>) -> Self {
        if status == 401 {
            Self::Unauthorized { message }
        } else {
            Self::Server { status, message }
        }
    }

    /// Message to show the user: the server's own message when present,
    /// otherwise `fallback`.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Server {
                message: Some(message),
                ..
            }
            | ApiError::Unauthorized {
                message: Some(message),
            } if !message.trim().is_empty() => message.clone(),
            _ => fallback.to_string(),
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }

    /// HTTP status, when the failure came from a response.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Server { status, .. } => Some(*status),
            ApiError::Unauthorized { .. } => Some(401),
            _ => None,
        }
    }
}

/// Result type alias for backend calls.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// TESTS
// =============================================================================
