//! Phone Number Normalization
//!
//! Safaricom expects MSISDNs in the `254XXXXXXXXX` form. Shoppers type
//! anything from `0712 345 678` to `+254-712-345678`, so every entry point
//! funnels through [`normalize`] before validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{PaymentError, Result};

/// Kenyan country calling code
pub const COUNTRY_CODE: &str = "254";

/// Shape of a normalized Safaricom mobile number
static MSISDN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^254[17]\d{8}$").expect("valid MSISDN pattern"));

/// Shape of what a shopper may type before normalization
static MOBILE_INPUT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:254|\+254|0)?[71]\d{8}$").expect("valid mobile input pattern")
});

/// Normalize a free-form phone string to `254XXXXXXXXX`.
///
/// Never fails; malformed input comes out malformed and is caught by
/// [`is_valid_msisdn`].
pub fn normalize(raw: &str) -> String {
    let compact: String = raw
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .collect();

    if let Some(rest) = compact.strip_prefix('0') {
        format!("{COUNTRY_CODE}{rest}")
    } else if let Some(rest) = compact.strip_prefix('+') {
        rest.to_string()
    } else if compact.starts_with(COUNTRY_CODE) {
        compact
    } else {
        format!("{COUNTRY_CODE}{compact}")
    }
}

/// Check a normalized number against the Safaricom mobile shape
pub fn is_valid_msisdn(normalized: &str) -> bool {
    MSISDN.is_match(normalized)
}

/// Pre-submission check on the raw input, before normalization
pub fn looks_like_mobile(raw: &str) -> bool {
    MOBILE_INPUT.is_match(raw.trim())
}

/// A validated, normalized phone number
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    /// Normalize and validate
    pub fn parse(raw: &str) -> Result<Self> {
        let normalized = normalize(raw);
        if is_valid_msisdn(&normalized) {
            Ok(Self(normalized))
        } else {
            Err(PaymentError::Validation(
                "Phone number must be a valid Kenyan mobile number (e.g., 254712345678)".into(),
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for PhoneNumber {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_variants() {
        assert_eq!(normalize("0712345678"), "254712345678");
        assert_eq!(normalize("+254712345678"), "254712345678");
        assert_eq!(normalize("712345678"), "254712345678");
        assert_eq!(normalize("0712 345-678"), "254712345678");
        assert_eq!(normalize("0110 123 456"), "254110123456");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for raw in ["0712345678", "+254 712 345 678", "712345678", "254112345678", "07-12"] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "input {raw}");
        }
    }

    #[test]
    fn test_msisdn_validation() {
        assert!(is_valid_msisdn("254712345678"));
        assert!(is_valid_msisdn("254112345678"));
        assert!(!is_valid_msisdn("254812345678"));
        assert!(!is_valid_msisdn("25471234567"));
        assert!(!is_valid_msisdn("2547123456789"));
    }

    #[test]
    fn test_raw_input_check() {
        assert!(looks_like_mobile("0712345678"));
        assert!(looks_like_mobile("+254712345678"));
        assert!(looks_like_mobile("254112345678"));
        assert!(looks_like_mobile("712345678"));
        assert!(!looks_like_mobile("0812345678"));
        assert!(!looks_like_mobile("07123"));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(PhoneNumber::parse("0712 345 678").unwrap().as_str(), "254712345678");
        assert!(matches!(
            PhoneNumber::parse("12345"),
            Err(PaymentError::Validation(_))
        ));
    }
}
