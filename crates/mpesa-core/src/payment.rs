//! Payment Domain Types

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};
use crate::phone::PhoneNumber;

/// Default account reference shown on the shopper's phone
pub const DEFAULT_ACCOUNT_REFERENCE: &str = "VOLTVIBE";

/// Default transaction description
pub const DEFAULT_TRANSACTION_DESC: &str = "Payment for electronics purchase";

/// Shillings per US dollar used when the cart is priced in USD
pub const DEFAULT_KES_PER_USD: Decimal = dec!(130);

/// Provider correlation id for one push attempt (`CheckoutRequestID`)
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckoutHandle(String);

impl CheckoutHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CheckoutHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One checkout attempt's charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    /// Normalized payer phone
    pub phone: PhoneNumber,

    /// Whole shillings, always positive
    pub amount: u64,

    /// Account reference (shown on the PIN prompt)
    pub reference: String,

    /// Transaction description
    pub description: String,
}

impl PaymentRequest {
    /// Build a request with the storefront's default reference and description
    pub fn new(phone: PhoneNumber, amount: u64) -> Result<Self> {
        if amount == 0 {
            return Err(PaymentError::Validation("Amount must be greater than zero".into()));
        }

        Ok(Self {
            phone,
            amount,
            reference: DEFAULT_ACCOUNT_REFERENCE.into(),
            description: DEFAULT_TRANSACTION_DESC.into(),
        })
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = reference.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Result of a single status poll
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentStatus {
    /// Provider result code; `None` while the push is still pending
    pub result_code: Option<i64>,

    /// Provider description of the result
    pub result_desc: Option<String>,

    /// Checkout this status belongs to
    pub checkout_request_id: CheckoutHandle,

    pub merchant_request_id: Option<String>,
}

impl PaymentStatus {
    /// Status with no result yet
    pub fn pending(handle: CheckoutHandle) -> Self {
        Self {
            result_code: None,
            result_desc: None,
            checkout_request_id: handle,
            merchant_request_id: None,
        }
    }

    /// Status carrying a provider result
    pub fn with_result(handle: CheckoutHandle, code: i64, desc: impl Into<String>) -> Self {
        Self {
            result_code: Some(code),
            result_desc: Some(desc.into()),
            checkout_request_id: handle,
            merchant_request_id: None,
        }
    }
}

/// Convert a USD cart total to whole shillings, rounding half away from zero
pub fn to_shillings(total_usd: Decimal, kes_per_usd: Decimal) -> Result<u64> {
    let shillings = (total_usd * kes_per_usd)
        .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero);
    match shillings.to_u64() {
        Some(amount) if amount > 0 => Ok(amount),
        _ => Err(PaymentError::Validation(format!(
            "Cart total {total_usd} does not convert to a payable amount"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_shillings() {
        assert_eq!(to_shillings(dec!(100), DEFAULT_KES_PER_USD).unwrap(), 13_000);
        assert_eq!(to_shillings(dec!(19.99), DEFAULT_KES_PER_USD).unwrap(), 2_599);
        assert_eq!(to_shillings(dec!(0.5), dec!(5)).unwrap(), 3);
        assert!(to_shillings(dec!(0), DEFAULT_KES_PER_USD).is_err());
        assert!(to_shillings(dec!(-5), DEFAULT_KES_PER_USD).is_err());
    }

    #[test]
    fn test_request_rejects_zero_amount() {
        let phone = PhoneNumber::parse("0712345678").unwrap();
        assert!(PaymentRequest::new(phone.clone(), 0).is_err());

        let request = PaymentRequest::new(phone, 100).unwrap();
        assert_eq!(request.reference, DEFAULT_ACCOUNT_REFERENCE);
        assert_eq!(request.description, DEFAULT_TRANSACTION_DESC);
    }
}
