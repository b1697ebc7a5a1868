//! # mpesa-checkout
//!
//! Client half of the M-Pesa checkout. Talks to the relay server only:
//!
//! - [`PaymentInitiator`] sends one STK push per attempt
//! - [`StatusPoller`] queries the relay until the push settles, times out
//!   or is cancelled
//! - [`CheckoutSession`] runs both as the shopper-facing state machine
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use mpesa_checkout::{CheckoutConfig, CheckoutSession, HttpRelayClient};
//!
//! let config = CheckoutConfig::from_env();
//! let relay = Arc::new(HttpRelayClient::new(&config.relay_url)?);
//! let mut session = CheckoutSession::new(relay, &config);
//!
//! let outcome = session.pay("0712345678", dec!(100)).await?;
//! if let Some(message) = outcome.message() {
//!     eprintln!("{message}");
//! }
//! ```

pub mod api;
pub mod config;
pub mod initiator;
pub mod mock;
pub mod poller;
pub mod session;

pub use api::{HttpRelayClient, RelayApi};
pub use config::{CheckoutConfig, PollConfig};
pub use initiator::{Initiation, PaymentInitiator};
pub use mock::MockRelay;
pub use poller::{PollAttempt, PollGuard, PollObserver, PollRegistry, StatusPoller};
pub use session::{CheckoutSession, CheckoutStep};

pub use mpesa_core::{CheckoutHandle, PaymentError, PaymentOutcome, Result};
pub use tokio_util::sync::CancellationToken;
