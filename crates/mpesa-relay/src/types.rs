//! Daraja Wire Types
//!
//! Request and response bodies of the provider API. The provider is loose
//! about numeric fields (`ResultCode` arrives as `"0"` from the query
//! endpoint and as `0` in callbacks), so codes go through [`lenient`].

use serde::{Deserialize, Serialize};

/// `TransactionType` for pay-bill STK pushes
pub const CUSTOMER_PAY_BILL_ONLINE: &str = "CustomerPayBillOnline";

/// `POST /mpesa/stkpush/v1/processrequest` body
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushPayload {
    pub business_short_code: u64,
    pub password: String,
    pub timestamp: String,
    pub transaction_type: &'static str,

    /// Whole shillings, sent as a string
    pub amount: String,

    pub party_a: String,
    pub party_b: u64,
    pub phone_number: String,

    #[serde(rename = "CallBackURL")]
    pub callback_url: String,

    pub account_reference: String,
    pub transaction_desc: String,
}

/// Accepted STK push
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkPushResponse {
    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,

    #[serde(default)]
    pub response_code: Option<String>,

    #[serde(default)]
    pub response_description: Option<String>,

    #[serde(default)]
    pub customer_message: Option<String>,
}

/// `POST /mpesa/stkpushquery/v1/query` body
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryPayload {
    pub business_short_code: u64,
    pub password: String,
    pub timestamp: String,

    #[serde(rename = "CheckoutRequestID")]
    pub checkout_request_id: String,
}

/// Query result
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct StkQueryResponse {
    #[serde(default)]
    pub response_code: Option<String>,

    #[serde(default)]
    pub response_description: Option<String>,

    #[serde(rename = "MerchantRequestID", default)]
    pub merchant_request_id: Option<String>,

    #[serde(rename = "CheckoutRequestID", default)]
    pub checkout_request_id: Option<String>,

    #[serde(default, deserialize_with = "lenient::code")]
    pub result_code: Option<i64>,

    #[serde(default)]
    pub result_desc: Option<String>,
}

/// `GET /oauth/v1/generate` response
#[derive(Clone, Debug, Deserialize)]
pub struct OAuthTokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,

    /// Seconds; the provider sends `"3599"`
    #[serde(default, deserialize_with = "lenient::code")]
    pub expires_in: Option<i64>,
}

/// Error body returned on any non-2xx provider response
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderErrorBody {
    #[serde(default)]
    pub request_id: Option<String>,

    #[serde(default)]
    pub error_code: Option<String>,

    #[serde(default)]
    pub error_message: Option<String>,
}

pub(crate) mod lenient {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        Float(f64),
        Text(String),
    }

    /// Integer that may arrive as a number or a numeric string
    pub fn code<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Option::<NumberOrString>::deserialize(deserializer)? {
            None => Ok(None),
            Some(NumberOrString::Number(n)) => Ok(Some(n)),
            #[allow(clippy::cast_possible_truncation)]
            Some(NumberOrString::Float(f)) if f.fract() == 0.0 => Ok(Some(f as i64)),
            Some(NumberOrString::Float(f)) => Err(D::Error::custom(format!("non-integer code {f}"))),
            Some(NumberOrString::Text(s)) => {
                let trimmed = s.trim();
                if trimmed.is_empty() {
                    Ok(None)
                } else {
                    trimmed.parse().map(Some).map_err(D::Error::custom)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_push_payload_field_names() {
        let payload = StkPushPayload {
            business_short_code: 174_379,
            password: "cGFzcw==".into(),
            timestamp: "20250101120000".into(),
            transaction_type: CUSTOMER_PAY_BILL_ONLINE,
            amount: "13000".into(),
            party_a: "254712345678".into(),
            party_b: 174_379,
            phone_number: "254712345678".into(),
            callback_url: "https://example.com/api/mpesa/callback".into(),
            account_reference: "VOLTVIBE".into(),
            transaction_desc: "Payment for electronics purchase".into(),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["BusinessShortCode"], 174_379);
        assert_eq!(value["PartyA"], "254712345678");
        assert_eq!(value["PartyB"], 174_379);
        assert_eq!(value["CallBackURL"], "https://example.com/api/mpesa/callback");
        assert_eq!(value["Amount"], "13000");
        assert_eq!(value["TransactionType"], "CustomerPayBillOnline");
    }

    #[test]
    fn test_query_response_string_code() {
        let response: StkQueryResponse = serde_json::from_value(json!({
            "ResponseCode": "0",
            "ResponseDescription": "The service request has been accepted successsfully",
            "MerchantRequestID": "22205-34066-1",
            "CheckoutRequestID": "ws_CO_13012021093521236557",
            "ResultCode": "1032",
            "ResultDesc": "Request cancelled by user"
        }))
        .unwrap();

        assert_eq!(response.result_code, Some(1032));
        assert_eq!(response.checkout_request_id.as_deref(), Some("ws_CO_13012021093521236557"));
    }

    #[test]
    fn test_query_response_missing_code() {
        let response: StkQueryResponse = serde_json::from_value(json!({ "ResultCode": null })).unwrap();
        assert_eq!(response.result_code, None);

        let response: StkQueryResponse = serde_json::from_value(json!({})).unwrap();
        assert_eq!(response.result_code, None);
    }

    #[test]
    fn test_oauth_expiry_as_string() {
        let token: OAuthTokenResponse =
            serde_json::from_value(json!({ "access_token": "abc", "expires_in": "3599" })).unwrap();
        assert_eq!(token.expires_in, Some(3599));
    }

    #[test]
    fn test_error_body() {
        let body: ProviderErrorBody = serde_json::from_value(json!({
            "requestId": "11728-2929992-1",
            "errorCode": "404.001.03",
            "errorMessage": "Invalid Access Token"
        }))
        .unwrap();
        assert_eq!(body.error_code.as_deref(), Some("404.001.03"));
    }
}
