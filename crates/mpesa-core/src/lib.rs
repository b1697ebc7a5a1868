//! # mpesa-core
//!
//! Types shared by the M-Pesa relay server and the checkout client.
//!
//! ## Checkout flow
//!
//! ```text
//! ┌──────────┐  stk-push   ┌─────────┐  processrequest  ┌──────────┐
//! │ checkout │────────────▶│  relay  │─────────────────▶│  Daraja  │
//! │  client  │◀────────────│ server  │◀─────────────────│   API    │
//! └──────────┘ query-status└─────────┘     callback     └──────────┘
//! ```
//!
//! The client never learns about the provider callback; it only sees what
//! its own status polls return.

pub mod api;
pub mod error;
pub mod outcome;
pub mod payment;
pub mod phone;

pub use error::{PaymentError, Result};
pub use outcome::PaymentOutcome;
pub use payment::{CheckoutHandle, PaymentRequest, PaymentStatus};
pub use phone::PhoneNumber;
