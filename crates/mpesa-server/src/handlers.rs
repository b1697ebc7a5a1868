//! HTTP Handlers

use axum::{
    Json,
    body::Bytes,
    extract::{Path, State, rejection::JsonRejection},
    http::{HeaderMap, StatusCode, header},
};
use mpesa_core::api::{ErrorBody, QueryStatusBody, QueryStatusReply, StkPushBody, StkPushReply};
use mpesa_core::payment::{DEFAULT_ACCOUNT_REFERENCE, DEFAULT_TRANSACTION_DESC};
use mpesa_core::{PaymentError, PaymentRequest, PhoneNumber};
use mpesa_relay::callback::ACK_DESC;
use mpesa_relay::{CallbackHandler, CallbackRecord, CallbackStore, CredentialReport, RelayError};
use serde::Serialize;

use crate::state::AppState;

type ApiError = (StatusCode, Json<ErrorBody>);

const SERVICE_NAME: &str = "M-Pesa Payment API";

const PASSKEY_DETAILS: &str =
    "STK Push (Lipa Na M-PESA Online) requires a Passkey from the Safaricom Developer Portal.";
const AUTH_DETAILS: &str = "The OAuth token could not be validated. Ensure your credentials are correct and your app is active in the Safaricom Developer Portal.";
const CALLBACK_DETAILS: &str = "For local development, expose the server with a tunnel such as ngrok (ngrok http 3001), then set MPESA_CALLBACK_URL in .env to the HTTPS URL.";
const CALLBACK_SOLUTION: &str = "1. Install ngrok: https://ngrok.com/download\n2. Run: ngrok http 3001\n3. Copy the HTTPS URL (e.g., https://abc123.ngrok.io)\n4. Add to .env: MPESA_CALLBACK_URL=https://abc123.ngrok.io/api/mpesa/callback\n5. Restart server";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
    pub version: &'static str,
    pub payments_configured: bool,
    pub callbacks_received: usize,
}

/// Acknowledgement body the provider expects
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackAck {
    pub result_code: u8,
    pub result_desc: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAuthResponse {
    pub success: bool,
    pub message: &'static str,
    pub credentials: CredentialReport,
    pub token_received: bool,
    pub token_length: usize,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TestAuthFailure {
    pub success: bool,
    pub error: &'static str,
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub credentials: Option<CredentialReport>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

fn reject(status: StatusCode, body: ErrorBody) -> ApiError {
    (status, Json(body))
}

fn missing_credentials(missing: &[&str]) -> ApiError {
    reject(
        StatusCode::INTERNAL_SERVER_ERROR,
        ErrorBody::new(
            "M-Pesa credentials not configured",
            format!("Missing required credentials: {}", missing.join(", ")),
        )
        .with_details(PASSKEY_DETAILS),
    )
}

/// Malformed or wrongly typed JSON body
fn bad_body(rejection: &JsonRejection) -> ApiError {
    tracing::warn!(error = %rejection, "Rejected request body");
    reject(
        StatusCode::BAD_REQUEST,
        ErrorBody::new("Invalid request body", rejection.body_text()),
    )
}

/// Provider text when there is one, otherwise our own error text
fn provider_message(e: &RelayError) -> String {
    match e {
        RelayError::Upstream { message, .. } => message.clone(),
        other => other.to_string(),
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: SERVICE_NAME,
        version: env!("CARGO_PKG_VERSION"),
        payments_configured: state.credentials.is_complete(),
        callbacks_received: state.callbacks.count().unwrap_or(0),
    })
}

/// Initiate an STK push
pub async fn stk_push(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<StkPushBody>, JsonRejection>,
) -> Result<Json<StkPushReply>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_body(&e))?;
    let phone = payload.phone_number.as_deref().map(str::trim).filter(|p| !p.is_empty());
    let amount = payload.amount.filter(|a| a.is_finite() && *a != 0.0);

    let (Some(phone), Some(amount)) = (phone, amount) else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "Phone number and amount are required".into(),
                ..Default::default()
            },
        ));
    };

    let missing = state.credentials.missing();
    if !missing.is_empty() {
        return Err(missing_credentials(&missing));
    }

    let phone = PhoneNumber::parse(phone).map_err(|e| {
        reject(
            StatusCode::BAD_REQUEST,
            ErrorBody::new("Invalid phone number format", e.user_message()),
        )
    })?;

    let request = whole_shillings(amount)
        .and_then(|shillings| PaymentRequest::new(phone, shillings))
        .map_err(|e| reject(StatusCode::BAD_REQUEST, ErrorBody::new("Invalid amount", e.user_message())))?
        .with_reference(
            payload
                .account_reference
                .filter(|r| !r.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_ACCOUNT_REFERENCE.into()),
        )
        .with_description(
            payload
                .transaction_desc
                .filter(|d| !d.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_TRANSACTION_DESC.into()),
        );

    let host = headers.get(header::HOST).and_then(|v| v.to_str().ok());
    let callback_url = state.credentials.callback_url_for(host);

    let response = state
        .gateway
        .stk_push(&request, &callback_url)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "STK push failed");
            match &e {
                RelayError::MissingCredentials(missing) => missing_credentials(missing),
                RelayError::Auth(_) => reject(
                    StatusCode::UNAUTHORIZED,
                    ErrorBody::new("Invalid Access Token", e.user_message()).with_details(AUTH_DETAILS),
                ),
                RelayError::InvalidCallbackUrl(_) => reject(
                    StatusCode::BAD_REQUEST,
                    ErrorBody {
                        callback_url: Some(callback_url.clone()),
                        solution: Some(CALLBACK_SOLUTION.into()),
                        ..ErrorBody::new("Invalid Callback URL", e.user_message()).with_details(CALLBACK_DETAILS)
                    },
                ),
                _ => reject(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody::new("Failed to initiate payment", provider_message(&e)),
                ),
            }
        })?;

    Ok(Json(StkPushReply {
        success: true,
        checkout_request_id: response.checkout_request_id,
        customer_message: response.customer_message,
        response_code: response.response_code,
        response_description: response.response_description,
        merchant_request_id: response.merchant_request_id,
    }))
}

/// Round a shilling amount from the wire to a whole number
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
fn whole_shillings(amount: f64) -> mpesa_core::Result<u64> {
    let rounded = amount.round();
    if rounded < 1.0 || rounded > u64::MAX as f64 {
        return Err(PaymentError::Validation("Amount must be at least 1 KES".into()));
    }
    Ok(rounded as u64)
}

/// Ask the provider how a push ended
pub async fn query_status(
    State(state): State<AppState>,
    payload: Result<Json<QueryStatusBody>, JsonRejection>,
) -> Result<Json<QueryStatusReply>, ApiError> {
    let Json(payload) = payload.map_err(|e| bad_body(&e))?;
    let Some(checkout_request_id) = payload.checkout_request_id.filter(|id| !id.trim().is_empty()) else {
        return Err(reject(
            StatusCode::BAD_REQUEST,
            ErrorBody {
                error: "CheckoutRequestID is required".into(),
                ..Default::default()
            },
        ));
    };

    let response = state.gateway.query(&checkout_request_id).await.map_err(|e| {
        tracing::error!(%checkout_request_id, error = %e, "Status query failed");
        reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Failed to query payment status", provider_message(&e)),
        )
    })?;

    Ok(Json(QueryStatusReply {
        success: true,
        result_code: response.result_code,
        result_desc: response.result_desc,
        checkout_request_id: response.checkout_request_id.or(Some(checkout_request_id)),
        merchant_request_id: response.merchant_request_id,
    }))
}

/// Provider result notification; acknowledged whatever it says
pub async fn callback(
    State(state): State<AppState>,
    body: Bytes,
) -> (StatusCode, Json<CallbackAck>) {
    let payload: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(payload) => payload,
        Err(e) => {
            tracing::error!(error = %e, "Callback body is not JSON");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(CallbackAck {
                    result_code: 1,
                    result_desc: "Error processing callback",
                }),
            );
        }
    };

    tracing::debug!(%payload, "M-Pesa callback received");

    if let Err(e) = CallbackHandler::new(state.callbacks.clone()).handle(payload) {
        tracing::warn!(error = %e, "Callback not recorded");
    }

    (
        StatusCode::OK,
        Json(CallbackAck {
            result_code: 0,
            result_desc: ACK_DESC,
        }),
    )
}

/// Latest callback recorded for a checkout
pub async fn callback_status(
    State(state): State<AppState>,
    Path(checkout_request_id): Path<String>,
) -> Result<Json<CallbackRecord>, ApiError> {
    match state.callbacks.get(&checkout_request_id) {
        Ok(Some(record)) => Ok(Json(record)),
        Ok(None) => Err(reject(
            StatusCode::NOT_FOUND,
            ErrorBody::new("Callback not found", "No callback received for this checkout yet"),
        )),
        Err(e) => Err(reject(
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody::new("Callback lookup failed", e.to_string()),
        )),
    }
}

/// Credential report plus a live token fetch
pub async fn test_auth(
    State(state): State<AppState>,
) -> Result<Json<TestAuthResponse>, (StatusCode, Json<TestAuthFailure>)> {
    let report = state.credentials.report();

    let key = match state.credentials.oauth_pair() {
        Ok((key, _)) => key.to_string(),
        Err(_) => {
            return Err((
                StatusCode::BAD_REQUEST,
                Json(TestAuthFailure {
                    success: false,
                    error: "Credentials not configured",
                    message: "Please configure MPESA_CONSUMER_KEY and MPESA_CONSUMER_SECRET in your .env file".into(),
                    credentials: Some(report),
                    details: None,
                }),
            ));
        }
    };

    let token = state.gateway.access_token().await.map_err(|e| {
        tracing::error!(error = %e, "Test authentication failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(TestAuthFailure {
                success: false,
                error: "Authentication failed",
                message: e.to_string(),
                credentials: None,
                details: Some("Check your credentials and network connection".into()),
            }),
        )
    })?;

    Ok(Json(TestAuthResponse {
        success: true,
        message: "Authentication successful",
        credentials: report.with_key_preview(&key),
        token_received: !token.is_empty(),
        token_length: token.len(),
    }))
}
