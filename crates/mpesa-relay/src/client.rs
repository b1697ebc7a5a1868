//! Daraja API Client
//!
//! Wraps the three provider calls the checkout needs: OAuth token
//! generation, STK push initiation and STK push query.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use mpesa_core::PaymentRequest;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::DarajaCredentials;
use crate::error::{ERROR_INVALID_ACCESS_TOKEN, ERROR_INVALID_CALLBACK_URL, RelayError, Result};
use crate::password::StkPassword;
use crate::token::{AccessToken, DEFAULT_TOKEN_TTL, TokenCache, TokenSource};
use crate::types::{
    CUSTOMER_PAY_BILL_ONLINE, OAuthTokenResponse, ProviderErrorBody, StkPushPayload,
    StkPushResponse, StkQueryPayload, StkQueryResponse,
};

const OAUTH_PATH: &str = "/oauth/v1/generate?grant_type=client_credentials";
const STK_PUSH_PATH: &str = "/mpesa/stkpush/v1/processrequest";
const STK_QUERY_PATH: &str = "/mpesa/stkpushquery/v1/query";

/// Payment provider operations (Strategy pattern)
///
/// The server talks to this trait so handlers can be exercised without a
/// live provider.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Current bearer token, fetched or cached
    async fn access_token(&self) -> Result<String>;

    /// Send the PIN prompt to the payer's phone
    async fn stk_push(&self, request: &PaymentRequest, callback_url: &str) -> Result<StkPushResponse>;

    /// Ask the provider how a push ended
    async fn query(&self, checkout_request_id: &str) -> Result<StkQueryResponse>;
}

/// Daraja HTTP client
pub struct DarajaClient {
    http: reqwest::Client,
    credentials: DarajaCredentials,
    tokens: Arc<TokenCache>,
}

impl DarajaClient {
    /// Create a client with its own token cache
    pub fn new(credentials: DarajaCredentials) -> Result<Self> {
        Self::with_cache(credentials, Arc::new(TokenCache::new()))
    }

    /// Create a client that uses the given token cache
    pub fn with_cache(credentials: DarajaCredentials, tokens: Arc<TokenCache>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(credentials.timeout_secs))
            .build()?;

        Ok(Self {
            http,
            credentials,
            tokens,
        })
    }

    /// Create from environment variables
    pub fn from_env() -> Result<Self> {
        Self::new(DarajaCredentials::from_env())
    }

    pub const fn credentials(&self) -> &DarajaCredentials {
        &self.credentials
    }

    pub const fn token_cache(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.credentials.base_url, path)
    }

    /// POST a signed body with the bearer token
    async fn post_authorized<T, R>(&self, path: &str, body: &T) -> Result<R>
    where
        T: Serialize + Sync,
        R: DeserializeOwned + Send,
    {
        let token = self.access_token().await?;
        let url = self.url(path);
        tracing::debug!(%url, "POST");

        let response = self
            .http
            .post(&url)
            .bearer_auth(token)
            .json(body)
            .send()
            .await?;

        match self.handle_response(response).await {
            Err(RelayError::Auth(message)) => {
                // the provider revoked or never accepted this token
                self.tokens.invalidate().await;
                Err(RelayError::Auth(message))
            }
            other => other,
        }
    }

    /// Decode a success body or map the provider's error body
    async fn handle_response<R: DeserializeOwned>(&self, response: reqwest::Response) -> Result<R> {
        let status = response.status();
        let text = response.text().await?;

        if status.is_success() {
            return Ok(serde_json::from_str(&text)?);
        }

        let body: ProviderErrorBody = serde_json::from_str(&text).unwrap_or_default();
        tracing::error!(
            status = status.as_u16(),
            error_code = ?body.error_code,
            request_id = ?body.request_id,
            body = %text,
            "Provider returned an error"
        );

        Err(map_provider_error(status.as_u16(), body, &text))
    }
}

/// Classify a provider error body
fn map_provider_error(status: u16, body: ProviderErrorBody, raw: &str) -> RelayError {
    let message = body
        .error_message
        .clone()
        .unwrap_or_else(|| if raw.is_empty() { format!("HTTP {status}") } else { raw.to_string() });

    match body.error_code.as_deref() {
        Some(ERROR_INVALID_ACCESS_TOKEN) => RelayError::Auth(message),
        Some(ERROR_INVALID_CALLBACK_URL) => RelayError::InvalidCallbackUrl(message),
        _ => RelayError::Upstream {
            status,
            code: body.error_code,
            message,
        },
    }
}

#[async_trait]
impl TokenSource for DarajaClient {
    async fn fetch_token(&self) -> Result<AccessToken> {
        let (key, secret) = self.credentials.oauth_pair()?;
        let basic = STANDARD.encode(format!("{key}:{secret}"));
        let url = self.url(OAUTH_PATH);

        tracing::info!(%url, "Requesting OAuth token");

        let response = self
            .http
            .get(&url)
            .header(reqwest::header::AUTHORIZATION, format!("Basic {basic}"))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            tracing::error!(status = status.as_u16(), body = %text, "OAuth token request failed");
            return Err(RelayError::Auth(format!(
                "OAuth endpoint returned HTTP {}",
                status.as_u16()
            )));
        }

        let body: OAuthTokenResponse = response.json().await?;
        let token = body.access_token.filter(|t| !t.is_empty()).ok_or_else(|| {
            RelayError::TokenResponse(
                "Invalid response from OAuth endpoint. No access token received.".into(),
            )
        })?;

        let expires_in = body
            .expires_in
            .and_then(|secs| u64::try_from(secs).ok())
            .map_or(DEFAULT_TOKEN_TTL, Duration::from_secs);

        Ok(AccessToken { token, expires_in })
    }
}

#[async_trait]
impl PaymentGateway for DarajaClient {
    async fn access_token(&self) -> Result<String> {
        self.tokens.get_or_refresh(self).await
    }

    async fn stk_push(&self, request: &PaymentRequest, callback_url: &str) -> Result<StkPushResponse> {
        let keys = self.credentials.signing_keys()?;
        let signed = StkPassword::generate(keys.shortcode, keys.passkey);

        tracing::debug!(
            shortcode = keys.shortcode,
            passkey_len = keys.passkey.len(),
            timestamp = %signed.timestamp,
            password = %signed.preview(),
            "Signed STK push"
        );

        let payload = StkPushPayload {
            business_short_code: keys.shortcode_number,
            password: signed.password,
            timestamp: signed.timestamp,
            transaction_type: CUSTOMER_PAY_BILL_ONLINE,
            amount: request.amount.to_string(),
            party_a: request.phone.as_str().to_string(),
            party_b: keys.shortcode_number,
            phone_number: request.phone.as_str().to_string(),
            callback_url: callback_url.to_string(),
            account_reference: request.reference.clone(),
            transaction_desc: request.description.clone(),
        };

        tracing::info!(phone = %request.phone, amount = request.amount, %callback_url, "Initiating STK push");

        let response: StkPushResponse = self.post_authorized(STK_PUSH_PATH, &payload).await?;

        tracing::info!(
            checkout_request_id = %response.checkout_request_id,
            "STK push accepted"
        );

        Ok(response)
    }

    async fn query(&self, checkout_request_id: &str) -> Result<StkQueryResponse> {
        let keys = self.credentials.signing_keys()?;
        let signed = StkPassword::generate(keys.shortcode, keys.passkey);

        let payload = StkQueryPayload {
            business_short_code: keys.shortcode_number,
            password: signed.password,
            timestamp: signed.timestamp,
            checkout_request_id: checkout_request_id.to_string(),
        };

        let response: StkQueryResponse = self.post_authorized(STK_QUERY_PATH, &payload).await?;

        tracing::debug!(
            checkout_request_id,
            result_code = ?response.result_code,
            "STK query answered"
        );

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode, header};
    use axum::routing::{get, post};
    use axum::{Json, Router};
    use mpesa_core::PhoneNumber;
    use serde_json::{Value, json};

    /// Daraja stand-in on a local port
    #[derive(Clone, Default)]
    struct StubProvider {
        issued: Arc<AtomicU64>,
        reject_next_push: Arc<AtomicBool>,
        seen: Arc<Mutex<Vec<(&'static str, String, Value)>>>,
    }

    impl StubProvider {
        fn record(&self, endpoint: &'static str, headers: &HeaderMap, body: Value) {
            let auth = headers
                .get(header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
                .unwrap_or_default()
                .to_string();
            self.seen.lock().unwrap().push((endpoint, auth, body));
        }

        fn requests(&self, endpoint: &str) -> Vec<(String, Value)> {
            self.seen
                .lock()
                .unwrap()
                .iter()
                .filter(|(e, _, _)| *e == endpoint)
                .map(|(_, auth, body)| (auth.clone(), body.clone()))
                .collect()
        }
    }

    async fn issue_token(State(p): State<StubProvider>, headers: HeaderMap) -> Json<Value> {
        p.record("oauth", &headers, Value::Null);
        let n = p.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Json(json!({ "access_token": format!("tok-{n}"), "expires_in": "3599" }))
    }

    async fn accept_push(
        State(p): State<StubProvider>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        p.record("push", &headers, body);
        if p.reject_next_push.swap(false, Ordering::SeqCst) {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({
                    "requestId": "11728-2929992-1",
                    "errorCode": "404.001.03",
                    "errorMessage": "Invalid Access Token"
                })),
            );
        }
        (
            StatusCode::OK,
            Json(json!({
                "MerchantRequestID": "29115-34620561-1",
                "CheckoutRequestID": "ws_CO_1",
                "ResponseCode": "0",
                "ResponseDescription": "Success. Request accepted for processing",
                "CustomerMessage": "Success. Request accepted for processing"
            })),
        )
    }

    async fn answer_query(State(p): State<StubProvider>, headers: HeaderMap, Json(body): Json<Value>) -> Json<Value> {
        p.record("query", &headers, body);
        Json(json!({
            "ResponseCode": "0",
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": "ws_CO_1",
            "ResultCode": "0",
            "ResultDesc": "The service request is processed successfully."
        }))
    }

    async fn spawn_provider(provider: StubProvider) -> String {
        let app = Router::new()
            .route("/oauth/v1/generate", get(issue_token))
            .route(STK_PUSH_PATH, post(accept_push))
            .route(STK_QUERY_PATH, post(answer_query))
            .with_state(provider);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    fn live_credentials(base_url: String) -> DarajaCredentials {
        let mut credentials = DarajaCredentials::from_lookup(|key| match key {
            "MPESA_CONSUMER_KEY" => Some("key".into()),
            "MPESA_CONSUMER_SECRET" => Some("secret".into()),
            "MPESA_SHORTCODE" => Some("174379".into()),
            "MPESA_PASSKEY" => Some("passkey".into()),
            _ => None,
        });
        credentials.base_url = base_url;
        credentials
    }

    fn body(code: &str, message: &str) -> ProviderErrorBody {
        ProviderErrorBody {
            request_id: Some("11728-2929992-1".into()),
            error_code: Some(code.into()),
            error_message: Some(message.into()),
        }
    }

    #[test]
    fn test_maps_invalid_token() {
        let err = map_provider_error(404, body("404.001.03", "Invalid Access Token"), "");
        assert!(matches!(err, RelayError::Auth(m) if m == "Invalid Access Token"));
    }

    #[test]
    fn test_maps_invalid_callback_url() {
        let err = map_provider_error(400, body("400.002.02", "Bad Request - Invalid CallBackURL"), "");
        assert!(matches!(err, RelayError::InvalidCallbackUrl(_)));
    }

    #[test]
    fn test_maps_other_provider_errors() {
        let err = map_provider_error(500, body("500.001.1001", "The transaction is being processed"), "");
        match err {
            RelayError::Upstream { status, code, message } => {
                assert_eq!(status, 500);
                assert_eq!(code.as_deref(), Some("500.001.1001"));
                assert_eq!(message, "The transaction is being processed");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(map_provider_error(503, ProviderErrorBody::default(), "").is_retryable());
    }

    #[test]
    fn test_url_joins_base() {
        let mut credentials = DarajaCredentials::from_lookup(|_| None);
        credentials.base_url = "https://api.safaricom.co.ke".into();
        let client = DarajaClient::new(credentials).unwrap();
        assert_eq!(
            client.url(STK_PUSH_PATH),
            "https://api.safaricom.co.ke/mpesa/stkpush/v1/processrequest"
        );
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_network() {
        let client = DarajaClient::new(DarajaCredentials::from_lookup(|_| None)).unwrap();

        let token = client.access_token().await;
        assert!(matches!(token, Err(RelayError::MissingCredentials(m)) if m.len() == 2));

        let query = client.query("ws_1").await;
        assert!(matches!(query, Err(RelayError::MissingCredentials(m)) if m.len() == 4));
        assert_eq!(client.token_cache().refresh_count(), 0);
    }

    #[tokio::test]
    async fn test_provider_round_trip_and_token_rejection() {
        let provider = StubProvider::default();
        let base_url = spawn_provider(provider.clone()).await;
        let client = DarajaClient::new(live_credentials(base_url)).unwrap();

        // OAuth uses basic auth and honours the string expires_in
        assert_eq!(client.access_token().await.unwrap(), "tok-1");
        assert_eq!(client.token_cache().refresh_count(), 1);
        let remaining = client.token_cache().remaining().await.unwrap();
        assert!(remaining > Duration::from_secs(3500) && remaining <= Duration::from_secs(3599));

        let oauth = provider.requests("oauth");
        assert_eq!(oauth[0].0, format!("Basic {}", STANDARD.encode("key:secret")));

        // The provider disowns the token: the push fails and the cache is dropped
        provider.reject_next_push.store(true, Ordering::SeqCst);
        let request = PaymentRequest::new(PhoneNumber::parse("0712345678").unwrap(), 100).unwrap();
        let err = client
            .stk_push(&request, "https://shop.example/api/mpesa/callback")
            .await
            .unwrap_err();
        assert!(matches!(err, RelayError::Auth(m) if m == "Invalid Access Token"));
        assert!(client.token_cache().remaining().await.is_none());
        assert_eq!(client.token_cache().refresh_count(), 1);

        // Next call fetches a new token
        let status = client.query("ws_CO_1").await.unwrap();
        assert_eq!(status.result_code, Some(0));
        assert_eq!(client.token_cache().refresh_count(), 2);

        let query = provider.requests("query");
        assert_eq!(query[0].0, "Bearer tok-2");
        assert_eq!(query[0].1["CheckoutRequestID"], "ws_CO_1");
        assert_eq!(query[0].1["BusinessShortCode"], 174_379);

        let accepted = client
            .stk_push(&request, "https://shop.example/api/mpesa/callback")
            .await
            .unwrap();
        assert_eq!(accepted.checkout_request_id, "ws_CO_1");
        assert_eq!(client.token_cache().refresh_count(), 2);

        let pushes = provider.requests("push");
        assert_eq!(pushes.len(), 2);
        assert_eq!(pushes[0].0, "Bearer tok-1");
        assert_eq!(pushes[1].0, "Bearer tok-2");
        let body = &pushes[1].1;
        assert_eq!(body["Amount"], "100");
        assert_eq!(body["PhoneNumber"], "254712345678");
        assert_eq!(body["PartyA"], "254712345678");
        assert_eq!(body["PartyB"], 174_379);
        assert_eq!(body["TransactionType"], "CustomerPayBillOnline");
        assert_eq!(body["CallBackURL"], "https://shop.example/api/mpesa/callback");
        assert_eq!(body["Timestamp"].as_str().unwrap().len(), 14);
    }
}
