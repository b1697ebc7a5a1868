//! STK Callback Handling
//!
//! The provider posts the final result of every push to the callback URL
//! once the payer answers (or ignores) the prompt. The browser never sees
//! this call; it learns the outcome only from its own status polls.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RelayError, Result};
use crate::types::lenient;

/// Acknowledgement the provider expects, whatever the inner result
pub const ACK_DESC: &str = "Callback received successfully";

#[derive(Debug, Deserialize)]
struct CallbackEnvelope {
    #[serde(rename = "Body", default)]
    body: Option<CallbackBody>,
}

#[derive(Debug, Deserialize)]
struct CallbackBody {
    #[serde(rename = "stkCallback", default)]
    stk_callback: Option<StkCallback>,
}

/// `Body.stkCallback` as sent by the provider
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkCallback {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: String,

    #[serde(default, deserialize_with = "lenient::code")]
    pub result_code: Option<i64>,

    #[serde(default)]
    pub result_desc: Option<String>,

    #[serde(default)]
    pub callback_metadata: Option<CallbackMetadata>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackMetadata {
    #[serde(default)]
    pub item: Vec<MetadataItem>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetadataItem {
    pub name: String,

    #[serde(default)]
    pub value: Option<serde_json::Value>,
}

impl CallbackMetadata {
    /// Item value rendered as text; numbers keep their JSON form
    fn text(&self, name: &str) -> Option<String> {
        self.item
            .iter()
            .find(|item| item.name == name)
            .and_then(|item| item.value.as_ref())
            .map(|value| match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            })
    }
}

/// Parsed callback
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallbackEvent {
    /// Payer entered their PIN and the charge went through
    PaymentCompleted {
        checkout_request_id: String,
        merchant_request_id: Option<String>,
        receipt_number: Option<String>,
        amount: Option<String>,
        phone_number: Option<String>,
        transaction_date: Option<String>,
    },

    /// Cancelled, timed out on the handset, insufficient funds, etc.
    PaymentFailed {
        checkout_request_id: String,
        merchant_request_id: Option<String>,
        result_code: Option<i64>,
        result_desc: Option<String>,
    },
}

impl CallbackEvent {
    pub fn checkout_request_id(&self) -> &str {
        match self {
            Self::PaymentCompleted { checkout_request_id, .. }
            | Self::PaymentFailed { checkout_request_id, .. } => checkout_request_id,
        }
    }
}

/// A callback as stored
#[derive(Clone, Debug, Serialize)]
pub struct CallbackRecord {
    pub event: CallbackEvent,
    pub received_at: DateTime<Utc>,
}

/// Callback storage trait
pub trait CallbackStore: Send + Sync {
    /// Save the latest callback for a checkout
    fn record(&self, record: CallbackRecord) -> Result<()>;

    /// Latest callback for a checkout
    fn get(&self, checkout_request_id: &str) -> Result<Option<CallbackRecord>>;

    /// Number of checkouts with a recorded callback
    fn count(&self) -> Result<usize>;
}

/// In-memory callback store
#[derive(Default)]
pub struct MemoryCallbackStore {
    records: RwLock<HashMap<String, CallbackRecord>>,
}

impl MemoryCallbackStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RelayError {
    RelayError::Storage("callback store lock poisoned".into())
}

impl CallbackStore for MemoryCallbackStore {
    fn record(&self, record: CallbackRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(record.event.checkout_request_id().to_string(), record);
        Ok(())
    }

    fn get(&self, checkout_request_id: &str) -> Result<Option<CallbackRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(checkout_request_id).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.read().map_err(poisoned)?.len())
    }
}

/// Callback handler
pub struct CallbackHandler<S: CallbackStore + ?Sized> {
    store: Arc<S>,
}

impl<S: CallbackStore + ?Sized> CallbackHandler<S> {
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Parse, log and record a callback.
    ///
    /// Returns `Ok(None)` for envelopes without an `stkCallback`.
    pub fn handle(&self, payload: serde_json::Value) -> Result<Option<CallbackEvent>> {
        let Some(event) = Self::parse(payload)? else {
            tracing::debug!("Callback without stkCallback body, ignoring");
            return Ok(None);
        };

        match &event {
            CallbackEvent::PaymentCompleted {
                checkout_request_id,
                merchant_request_id,
                receipt_number,
                amount,
                phone_number,
                transaction_date,
            } => {
                tracing::info!(
                    %checkout_request_id,
                    merchant_request_id = ?merchant_request_id,
                    receipt_number = ?receipt_number,
                    amount = ?amount,
                    phone_number = ?phone_number,
                    transaction_date = ?transaction_date,
                    "Payment successful"
                );
            }
            CallbackEvent::PaymentFailed {
                checkout_request_id,
                merchant_request_id,
                result_code,
                result_desc,
            } => {
                tracing::warn!(
                    %checkout_request_id,
                    merchant_request_id = ?merchant_request_id,
                    result_code = ?result_code,
                    result_desc = ?result_desc,
                    "Payment failed"
                );
            }
        }

        self.store.record(CallbackRecord {
            event: event.clone(),
            received_at: Utc::now(),
        })?;

        Ok(Some(event))
    }

    /// Parse the provider envelope into our event type
    fn parse(payload: serde_json::Value) -> Result<Option<CallbackEvent>> {
        let envelope: CallbackEnvelope = serde_json::from_value(payload)
            .map_err(|e| RelayError::CallbackParse(e.to_string()))?;

        let Some(callback) = envelope.body.and_then(|b| b.stk_callback) else {
            return Ok(None);
        };

        let event = if callback.result_code == Some(0) {
            let metadata = callback.callback_metadata.as_ref();
            let text = |name: &str| metadata.and_then(|m| m.text(name));

            CallbackEvent::PaymentCompleted {
                receipt_number: text("MpesaReceiptNumber"),
                amount: text("Amount"),
                phone_number: text("PhoneNumber"),
                transaction_date: text("TransactionDate"),
                checkout_request_id: callback.checkout_request_id,
                merchant_request_id: callback.merchant_request_id,
            }
        } else {
            CallbackEvent::PaymentFailed {
                checkout_request_id: callback.checkout_request_id,
                merchant_request_id: callback.merchant_request_id,
                result_code: callback.result_code,
                result_desc: callback.result_desc,
            }
        };

        Ok(Some(event))
    }
}
