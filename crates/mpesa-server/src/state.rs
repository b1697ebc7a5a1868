//! Application State

use std::sync::Arc;

use mpesa_relay::{DarajaCredentials, MemoryCallbackStore, PaymentGateway};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Daraja client (or a stand-in under test)
    pub gateway: Arc<dyn PaymentGateway>,

    /// Credentials the gateway was built from, for validation and diagnostics
    pub credentials: Arc<DarajaCredentials>,

    /// Callbacks received from the provider
    pub callbacks: Arc<MemoryCallbackStore>,
}
