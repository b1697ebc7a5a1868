//! Relay API Client
//!
//! The checkout talks to the relay server, never to the provider directly.
//! [`RelayApi`] is the seam the initiator and poller depend on;
//! [`HttpRelayClient`] is the production implementation.

use std::time::Duration;

use async_trait::async_trait;
use mpesa_core::api::{ErrorBody, QueryStatusBody, QueryStatusReply, StkPushBody, StkPushReply};
use mpesa_core::{CheckoutHandle, PaymentError, PaymentStatus, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

const STK_PUSH_PATH: &str = "/api/mpesa/stk-push";
const QUERY_STATUS_PATH: &str = "/api/mpesa/query-status";

/// Shown when the relay's error body carries no text
pub const INITIATE_FALLBACK_MESSAGE: &str = "Failed to initiate payment";
pub const QUERY_FALLBACK_MESSAGE: &str = "Failed to query payment status";

/// Relay operations (Strategy pattern)
#[async_trait]
pub trait RelayApi: Send + Sync {
    /// `POST /api/mpesa/stk-push`
    async fn stk_push(&self, body: &StkPushBody) -> Result<StkPushReply>;

    /// `POST /api/mpesa/query-status`
    async fn query_status(&self, handle: &CheckoutHandle) -> Result<PaymentStatus>;
}

/// reqwest-backed relay client
#[derive(Clone)]
pub struct HttpRelayClient {
    http: reqwest::Client,
    base_url: String,
}

impl HttpRelayClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, Duration::from_secs(30))
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn post<T, R>(&self, path: &str, body: &T, fallback: &str) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let url = format!("{}{}", self.base_url, path);

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(%url, error = %e, "Relay unreachable");
                PaymentError::Network(e.to_string())
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        let error: ErrorBody = serde_json::from_str(&text).unwrap_or_default();
        let message = error.display_message(fallback);
        tracing::warn!(%url, status = status.as_u16(), %message, "Relay returned an error");

        Err(PaymentError::Relay {
            status: status.as_u16(),
            message,
        })
    }
}

#[async_trait]
impl RelayApi for HttpRelayClient {
    async fn stk_push(&self, body: &StkPushBody) -> Result<StkPushReply> {
        self.post(STK_PUSH_PATH, body, INITIATE_FALLBACK_MESSAGE).await
    }

    async fn query_status(&self, handle: &CheckoutHandle) -> Result<PaymentStatus> {
        let reply: QueryStatusReply = self
            .post(QUERY_STATUS_PATH, &QueryStatusBody::new(handle), QUERY_FALLBACK_MESSAGE)
            .await?;
        Ok(reply.into_status(handle))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trims_trailing_slash() {
        let client = HttpRelayClient::new("http://localhost:3001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:3001");
    }

    #[tokio::test]
    async fn test_unreachable_relay_is_a_network_error() {
        // Port 9 (discard) is closed on any sane test host
        let client = HttpRelayClient::with_timeout("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client
            .query_status(&CheckoutHandle::new("ws_1"))
            .await
            .unwrap_err();

        assert!(matches!(err, PaymentError::Network(_)));
        assert!(err.is_retryable());
        assert_eq!(
            err.user_message(),
            "Unable to connect to payment server. Please check your internet connection and try again."
        );
    }
}
