//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Checkout error types
#[derive(Error, Debug)]
pub enum PaymentError {
    /// Bad phone number or amount, recoverable by re-entry
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment credentials missing or malformed
    #[error("Configuration error: {0}")]
    Config(String),

    /// Provider rejected our OAuth credentials
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Relay or provider unreachable
    #[error("Network error: {0}")]
    Network(String),

    /// Relay answered with an error body
    #[error("Relay error ({status}): {message}")]
    Relay { status: u16, message: String },

    /// A poll loop is already running for this checkout
    #[error("Already polling checkout {0}")]
    AlreadyPolling(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PaymentError {
    /// Check if error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Relay { status: 500..=599, .. })
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(msg) | Self::Relay { message: msg, .. } => msg.clone(),
            Self::Config(_) => "Payment service is not configured.".into(),
            Self::Auth(_) => "Invalid Access Token".into(),
            Self::Network(_) => {
                "Unable to connect to payment server. Please check your internet connection and try again.".into()
            }
            Self::AlreadyPolling(_) => "A payment check is already in progress.".into(),
            Self::Json(_) => "An unexpected error occurred. Please try again.".into(),
        }
    }
}
