//! Relay HTTP API Wire Types
//!
//! JSON bodies exchanged between the checkout client and the relay server.
//! Field names follow the storefront's existing camelCase contract, including
//! the upper-case `ID` suffixes.

use serde::{Deserialize, Serialize};

use crate::payment::{CheckoutHandle, PaymentRequest, PaymentStatus};

/// `POST /api/mpesa/stk-push` request body
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StkPushBody {
    /// Accepts a JSON string or a bare number
    #[serde(default, deserialize_with = "lenient::phone")]
    pub phone_number: Option<String>,

    /// Whole shillings; fractional values are rounded by the relay.
    /// Numeric strings such as `"100"` are accepted.
    #[serde(default, deserialize_with = "lenient::amount")]
    pub amount: Option<f64>,

    #[serde(default)]
    pub account_reference: Option<String>,

    #[serde(default)]
    pub transaction_desc: Option<String>,
}

impl From<&PaymentRequest> for StkPushBody {
    #[allow(clippy::cast_precision_loss)]
    fn from(request: &PaymentRequest) -> Self {
        Self {
            phone_number: Some(request.phone.as_str().to_string()),
            amount: Some(request.amount as f64),
            account_reference: Some(request.reference.clone()),
            transaction_desc: Some(request.description.clone()),
        }
    }
}

/// Successful `stk-push` reply
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StkPushReply {
    pub success: bool,

    #[serde(rename = "checkoutRequestID")]
    pub checkout_request_id: String,

    #[serde(default)]
    pub customer_message: Option<String>,

    #[serde(default)]
    pub response_code: Option<String>,

    #[serde(default)]
    pub response_description: Option<String>,

    #[serde(rename = "merchantRequestID", default)]
    pub merchant_request_id: Option<String>,
}

/// `POST /api/mpesa/query-status` request body
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct QueryStatusBody {
    #[serde(rename = "checkoutRequestID", default)]
    pub checkout_request_id: Option<String>,
}

impl QueryStatusBody {
    pub fn new(handle: &CheckoutHandle) -> Self {
        Self {
            checkout_request_id: Some(handle.as_str().to_string()),
        }
    }
}

/// Successful `query-status` reply
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryStatusReply {
    pub success: bool,

    #[serde(default)]
    pub result_code: Option<i64>,

    #[serde(default)]
    pub result_desc: Option<String>,

    #[serde(rename = "checkoutRequestID", default)]
    pub checkout_request_id: Option<String>,

    #[serde(rename = "merchantRequestID", default)]
    pub merchant_request_id: Option<String>,
}

impl QueryStatusReply {
    /// Convert into a domain status, falling back to the handle that was queried
    pub fn into_status(self, queried: &CheckoutHandle) -> PaymentStatus {
        PaymentStatus {
            result_code: self.result_code,
            result_desc: self.result_desc,
            checkout_request_id: self
                .checkout_request_id
                .map_or_else(|| queried.clone(), CheckoutHandle::new),
            merchant_request_id: self.merchant_request_id,
        }
    }
}

/// Error reply from any relay endpoint
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    #[serde(default)]
    pub error: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
}

impl ErrorBody {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: Some(message.into()),
            ..Default::default()
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Best shopper-facing text: `message`, then `error`, then `fallback`
    pub fn display_message(&self, fallback: &str) -> String {
        self.message
            .as_deref()
            .filter(|m| !m.is_empty())
            .or_else(|| Some(self.error.as_str()).filter(|e| !e.is_empty()))
            .unwrap_or(fallback)
            .to_string()
    }
}

/// Storefront forms post numbers as strings and phones as numbers
mod lenient {
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Amount {
        Number(f64),
        Text(String),
    }

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Phone {
        Text(String),
        Number(u64),
    }

    /// Number or numeric string; blank or unparsable text counts as absent
    pub fn amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Amount>::deserialize(deserializer)? {
            Some(Amount::Number(n)) => Some(n),
            Some(Amount::Text(s)) => s.trim().parse().ok(),
            None => None,
        })
    }

    pub fn phone<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(match Option::<Phone>::deserialize(deserializer)? {
            Some(Phone::Text(s)) => Some(s),
            Some(Phone::Number(n)) => Some(n.to_string()),
            None => None,
        })
    }
}
