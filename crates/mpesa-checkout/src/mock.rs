//! Mock Relay
//!
//! Scripted [`RelayApi`] for tests and offline demos. Status replies are
//! served in order; once the script runs out every query reports pending.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use mpesa_core::api::{StkPushBody, StkPushReply};
use mpesa_core::{CheckoutHandle, PaymentError, PaymentStatus, Result};

use crate::api::RelayApi;

/// Scripted relay
pub struct MockRelay {
    push: Mutex<Option<Result<StkPushReply>>>,
    statuses: Mutex<VecDeque<Result<PaymentStatus>>>,
    pushes: Mutex<Vec<StkPushBody>>,
    queries: AtomicU32,
    latency: Duration,
}

impl MockRelay {
    /// Relay that accepts the push under `handle`
    pub fn accepting(handle: &str) -> Self {
        Self::with_push(Ok(StkPushReply {
            success: true,
            checkout_request_id: handle.into(),
            customer_message: Some("Success. Request accepted for processing".into()),
            response_code: Some("0".into()),
            response_description: Some("Success. Request accepted for processing".into()),
            merchant_request_id: Some("29115-34620561-1".into()),
        }))
    }

    /// Relay that rejects the push
    pub fn rejecting(error: PaymentError) -> Self {
        Self::with_push(Err(error))
    }

    fn with_push(push: Result<StkPushReply>) -> Self {
        Self {
            push: Mutex::new(Some(push)),
            statuses: Mutex::new(VecDeque::new()),
            pushes: Mutex::new(Vec::new()),
            queries: AtomicU32::new(0),
            latency: Duration::ZERO,
        }
    }

    /// Queue status replies
    #[must_use]
    pub fn then(self, statuses: impl IntoIterator<Item = Result<PaymentStatus>>) -> Self {
        self.statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .extend(statuses);
        self
    }

    /// Delay every query
    #[must_use]
    pub const fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Status queries served so far
    pub fn query_count(&self) -> u32 {
        self.queries.load(Ordering::SeqCst)
    }

    /// Push bodies received so far
    pub fn pushes(&self) -> Vec<StkPushBody> {
        self.pushes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl RelayApi for MockRelay {
    async fn stk_push(&self, body: &StkPushBody) -> Result<StkPushReply> {
        self.pushes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(body.clone());

        self.push
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take()
            .unwrap_or_else(|| {
                Err(PaymentError::Relay {
                    status: 500,
                    message: "mock relay accepts a single push".into(),
                })
            })
    }

    async fn query_status(&self, handle: &CheckoutHandle) -> Result<PaymentStatus> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.queries.fetch_add(1, Ordering::SeqCst);

        self.statuses
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_else(|| Ok(PaymentStatus::pending(handle.clone())))
    }
}
