//! Checkout Session
//!
//! Drives one shopper through `Entry → Processing → Waiting → {Success | Error}`:
//! validates the phone, converts the cart total, initiates the push and polls
//! it to an outcome.

use std::sync::Arc;

use mpesa_core::payment::to_shillings;
use mpesa_core::phone::looks_like_mobile;
use mpesa_core::{CheckoutHandle, PaymentError, PaymentOutcome, PaymentRequest, PhoneNumber, Result};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::api::RelayApi;
use crate::config::CheckoutConfig;
use crate::initiator::{Initiation, PaymentInitiator};
use crate::poller::{PollObserver, PollRegistry, StatusPoller};

/// Shown when the raw input fails the client-side format check
pub const INVALID_PHONE_MESSAGE: &str = "Please enter a valid M-Pesa phone number";

/// Where the shopper is in the checkout
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutStep {
    /// Waiting for a phone number
    Entry,
    /// Push being initiated
    Processing,
    /// PIN prompt on the phone, polling
    Waiting,
    Success,
    Error,
}

/// One checkout, from phone entry to outcome
pub struct CheckoutSession<A: RelayApi + ?Sized> {
    attempt_id: Uuid,
    step: CheckoutStep,
    handle: Option<CheckoutHandle>,
    customer_message: Option<String>,
    error: Option<String>,
    cancel: CancellationToken,
    kes_per_usd: Decimal,
    initiator: PaymentInitiator<A>,
    poller: StatusPoller<A>,
}

impl<A: RelayApi + ?Sized> CheckoutSession<A> {
    pub fn new(relay: Arc<A>, config: &CheckoutConfig) -> Self {
        Self {
            attempt_id: Uuid::new_v4(),
            step: CheckoutStep::Entry,
            handle: None,
            customer_message: None,
            error: None,
            cancel: CancellationToken::new(),
            kes_per_usd: config.kes_per_usd,
            initiator: PaymentInitiator::new(Arc::clone(&relay)),
            poller: StatusPoller::new(relay, config.poll),
        }
    }

    /// Share the one-loop-per-handle registry across sessions
    #[must_use]
    pub fn with_registry(mut self, registry: PollRegistry) -> Self {
        self.poller = self.poller.with_registry(registry);
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: PollObserver) -> Self {
        self.poller = self.poller.with_observer(observer);
        self
    }

    pub const fn attempt_id(&self) -> Uuid {
        self.attempt_id
    }

    pub const fn step(&self) -> CheckoutStep {
        self.step
    }

    pub const fn handle(&self) -> Option<&CheckoutHandle> {
        self.handle.as_ref()
    }

    /// Provider prompt text once the push is accepted
    pub fn customer_message(&self) -> Option<&str> {
        self.customer_message.as_deref()
    }

    /// Message for the `Error` step
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Token that stops this session's poll loop; clone it to cancel from elsewhere
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stop polling; the loop ends with [`PaymentOutcome::Aborted`]
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Back to `Entry` with a fresh attempt id, as when the modal is closed
    pub fn reset(&mut self) {
        self.cancel.cancel();
        self.attempt_id = Uuid::new_v4();
        self.step = CheckoutStep::Entry;
        self.handle = None;
        self.customer_message = None;
        self.error = None;
        self.cancel = CancellationToken::new();
    }

    /// Charge `total_usd` to the phone typed by the shopper.
    ///
    /// A bad phone leaves the session in `Entry`. Initiation failures move it
    /// to `Error` and are returned; every poll ending is an outcome.
    pub async fn pay(&mut self, raw_phone: &str, total_usd: Decimal) -> Result<PaymentOutcome> {
        if self.step != CheckoutStep::Entry {
            return Err(PaymentError::Validation(format!(
                "Checkout already in step {:?}",
                self.step
            )));
        }

        if !looks_like_mobile(raw_phone) {
            self.error = Some(INVALID_PHONE_MESSAGE.into());
            return Err(PaymentError::Validation(INVALID_PHONE_MESSAGE.into()));
        }
        self.error = None;
        self.step = CheckoutStep::Processing;

        let initiation = match self.initiate(raw_phone, total_usd).await {
            Ok(initiation) => initiation,
            Err(e) => {
                tracing::warn!(attempt_id = %self.attempt_id, error = %e, "Checkout initiation failed");
                self.fail(e.user_message());
                return Err(e);
            }
        };

        self.step = CheckoutStep::Waiting;
        self.handle = Some(initiation.handle.clone());
        self.customer_message = initiation.customer_message;

        let outcome = match self.poller.poll(&initiation.handle, &self.cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.fail(e.user_message());
                return Err(e);
            }
        };

        match outcome.message() {
            None => self.step = CheckoutStep::Success,
            Some(message) => self.fail(message.to_string()),
        }

        tracing::info!(
            attempt_id = %self.attempt_id,
            checkout_request_id = %initiation.handle,
            step = ?self.step,
            "Checkout finished"
        );

        Ok(outcome)
    }

    async fn initiate(&self, raw_phone: &str, total_usd: Decimal) -> Result<Initiation> {
        let phone = PhoneNumber::parse(raw_phone)?;
        let amount = to_shillings(total_usd, self.kes_per_usd)?;
        self.initiator.initiate(&PaymentRequest::new(phone, amount)?).await
    }

    fn fail(&mut self, message: String) {
        self.step = CheckoutStep::Error;
        self.error = Some(message);
    }
}
