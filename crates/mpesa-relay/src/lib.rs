//! # mpesa-relay
//!
//! Server-side half of the checkout: holds the Daraja credentials, keeps an
//! OAuth token warm, signs STK push and query requests, and parses the
//! callbacks the provider posts back.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mpesa_core::{PaymentRequest, PhoneNumber};
//! use mpesa_relay::{DarajaClient, PaymentGateway};
//!
//! let client = DarajaClient::from_env()?;
//! let request = PaymentRequest::new(PhoneNumber::parse("0712345678")?, 100)?;
//! let accepted = client.stk_push(&request, "https://shop.example/api/mpesa/callback").await?;
//! let status = client.query(&accepted.checkout_request_id).await?;
//! ```

pub mod callback;
pub mod client;
pub mod config;
pub mod error;
pub mod password;
pub mod token;
pub mod types;

pub use callback::{CallbackEvent, CallbackHandler, CallbackRecord, CallbackStore, MemoryCallbackStore};
pub use client::{DarajaClient, PaymentGateway};
pub use config::{CredentialReport, DarajaCredentials};
pub use error::{RelayError, Result};
pub use password::StkPassword;
pub use token::{TokenCache, TokenSource};
