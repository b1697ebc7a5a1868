//! STK Password Signing
//!
//! `Password = base64(BusinessShortCode + Passkey + Timestamp)` where the
//! timestamp is local time as `YYYYMMDDHHmmss`. The provider rejects a
//! timestamp it considers stale, so a password is generated per request and
//! never reused.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{Local, NaiveDateTime};

/// Fourteen-digit provider timestamp
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Password plus the timestamp it was built from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StkPassword {
    pub password: String,
    pub timestamp: String,
}

impl StkPassword {
    /// Sign with the current local time
    pub fn generate(shortcode: &str, passkey: &str) -> Self {
        Self::at(shortcode, passkey, &Local::now().naive_local())
    }

    /// Sign with a fixed time
    pub fn at(shortcode: &str, passkey: &str, now: &NaiveDateTime) -> Self {
        let timestamp = now.format(TIMESTAMP_FORMAT).to_string();
        let password = STANDARD.encode(format!("{shortcode}{passkey}{timestamp}"));
        Self { password, timestamp }
    }

    /// First 20 characters, for logs
    pub fn preview(&self) -> String {
        let head: String = self.password.chars().take(20).collect();
        format!("{head}...")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SANDBOX_PASSKEY: &str = "bfb279f9aa9bdbcf158e97dd71a467cd2e0c893059b10f78e6b72ada1ed2c919";

    #[test]
    fn test_matches_provider_example() {
        let at = NaiveDate::from_ymd_opt(2016, 2, 16)
            .unwrap()
            .and_hms_opt(16, 56, 27)
            .unwrap();
        let signed = StkPassword::at("174379", SANDBOX_PASSKEY, &at);

        assert_eq!(signed.timestamp, "20160216165627");
        assert_eq!(
            signed.password,
            "MTc0Mzc5YmZiMjc5ZjlhYTliZGJjZjE1OGU5N2RkNzFhNDY3Y2QyZTBjODkzMDU5YjEwZjc4ZTZiNzJhZGExZWQyYzkxOTIwMTYwMjE2MTY1NjI3"
        );
    }

    #[test]
    fn test_timestamp_is_zero_padded() {
        let at = NaiveDate::from_ymd_opt(2025, 1, 5)
            .unwrap()
            .and_hms_opt(3, 4, 9)
            .unwrap();
        let signed = StkPassword::at("600000", "key", &at);
        assert_eq!(signed.timestamp, "20250105030409");
        assert_eq!(signed.timestamp.len(), 14);
    }

    #[test]
    fn test_generate_uses_fresh_timestamp() {
        let signed = StkPassword::generate("174379", SANDBOX_PASSKEY);
        assert_eq!(signed.timestamp.len(), 14);
        assert!(signed.timestamp.chars().all(|c| c.is_ascii_digit()));
        assert!(signed.preview().ends_with("..."));
    }
}
