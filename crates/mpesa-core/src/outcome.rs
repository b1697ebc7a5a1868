//! Payment Outcome Classification
//!
//! Maps provider result codes onto the terminal states of a checkout.
//! Priority: success sentinel, then user cancellation, then any other code.
//! A status without a code is not terminal.

use serde::{Deserialize, Serialize};

use crate::payment::PaymentStatus;

/// Provider result code for a completed payment
pub const RESULT_SUCCESS: i64 = 0;

/// Provider result code for a prompt the user dismissed
pub const RESULT_CANCELLED_BY_USER: i64 = 1032;

pub const CANCELLED_MESSAGE: &str = "You cancelled the payment request on your phone";
pub const FAILED_FALLBACK_MESSAGE: &str = "Payment could not be completed";
pub const TIMEOUT_MESSAGE: &str =
    "Payment status check timed out. Please check your phone or contact support.";
pub const ABORTED_MESSAGE: &str = "Payment status check was stopped before completion.";

/// Terminal state of a checkout poll loop
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum PaymentOutcome {
    /// Provider confirmed the charge
    Success { status: PaymentStatus },

    /// Shopper dismissed the PIN prompt
    Cancelled { status: PaymentStatus },

    /// Provider reported another failure code
    Failed { status: PaymentStatus, message: String },

    /// No terminal code within the attempt ceiling.
    /// The charge may still complete on the provider side.
    TimedOut { attempts: u32 },

    /// The loop was cancelled by its owner
    Aborted { attempts: u32 },
}

impl PaymentOutcome {
    /// Classify a poll result; `None` means keep polling
    pub fn classify(status: &PaymentStatus) -> Option<Self> {
        let code = status.result_code?;

        let outcome = match code {
            RESULT_SUCCESS => Self::Success { status: status.clone() },
            RESULT_CANCELLED_BY_USER => Self::Cancelled { status: status.clone() },
            _ => Self::Failed {
                status: status.clone(),
                message: status
                    .result_desc
                    .clone()
                    .unwrap_or_else(|| FAILED_FALLBACK_MESSAGE.into()),
            },
        };

        Some(outcome)
    }

    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// Message to show the shopper, `None` on success
    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Cancelled { .. } => Some(CANCELLED_MESSAGE),
            Self::Failed { message, .. } => Some(message),
            Self::TimedOut { .. } => Some(TIMEOUT_MESSAGE),
            Self::Aborted { .. } => Some(ABORTED_MESSAGE),
        }
    }

    /// The last provider status behind this outcome, if any
    pub const fn status(&self) -> Option<&PaymentStatus> {
        match self {
            Self::Success { status } | Self::Cancelled { status } | Self::Failed { status, .. } => {
                Some(status)
            }
            Self::TimedOut { .. } | Self::Aborted { .. } => None,
        }
    }
}
