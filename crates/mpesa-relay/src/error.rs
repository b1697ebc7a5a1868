//! Relay Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, RelayError>;

/// Provider error code for a rejected bearer token
pub const ERROR_INVALID_ACCESS_TOKEN: &str = "404.001.03";

/// Provider error code for an unreachable or malformed callback URL
pub const ERROR_INVALID_CALLBACK_URL: &str = "400.002.02";

/// Daraja relay errors
#[derive(Error, Debug)]
pub enum RelayError {
    /// Required credentials are not configured
    #[error("Missing required credentials: {}", .0.join(", "))]
    MissingCredentials(Vec<&'static str>),

    /// Configuration present but unusable
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request rejected before reaching the provider
    #[error("Validation error: {0}")]
    Validation(String),

    /// Provider rejected the OAuth token or credentials
    #[error("Invalid access token: {0}")]
    Auth(String),

    /// Provider rejected the callback URL
    #[error("Invalid callback URL: {0}")]
    InvalidCallbackUrl(String),

    /// Provider answered with an error body
    #[error("Provider error ({status}): {message}")]
    Upstream {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// OAuth endpoint answered without a token
    #[error("Token response invalid: {0}")]
    TokenResponse(String),

    /// Callback payload could not be interpreted
    #[error("Callback parse error: {0}")]
    CallbackParse(String),

    /// Callback store failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Provider unreachable
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RelayError {
    /// Check if this error is retryable
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_) | Self::Upstream { status: 500..=599, .. }
        )
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingCredentials(missing) => {
                format!("Missing required credentials: {}", missing.join(", "))
            }
            Self::Auth(_) => "Authentication failed. Please check your Consumer Key and Consumer Secret in the .env file.".into(),
            Self::InvalidCallbackUrl(_) => {
                "The callback URL must be publicly accessible (not localhost).".into()
            }
            Self::Validation(msg) | Self::Upstream { message: msg, .. } => msg.clone(),
            Self::Network(_) => {
                "Unable to reach the payment provider. Please try again.".into()
            }
            Self::Config(msg) => msg.clone(),
            _ => "An unexpected error occurred".into(),
        }
    }
}
