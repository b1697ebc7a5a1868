//! Payment Initiator
//!
//! One STK push per call. Nothing here retries: a second push would put a
//! second PIN prompt on the shopper's phone.

use std::sync::Arc;

use mpesa_core::api::StkPushBody;
use mpesa_core::{CheckoutHandle, PaymentError, PaymentRequest, Result};

use crate::api::{INITIATE_FALLBACK_MESSAGE, RelayApi};

/// Accepted push
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Initiation {
    pub handle: CheckoutHandle,

    /// Prompt text from the provider, e.g. "Success. Request accepted for processing"
    pub customer_message: Option<String>,

    pub merchant_request_id: Option<String>,
}

/// Sends STK pushes through the relay
pub struct PaymentInitiator<A: RelayApi + ?Sized> {
    relay: Arc<A>,
}

impl<A: RelayApi + ?Sized> Clone for PaymentInitiator<A> {
    fn clone(&self) -> Self {
        Self {
            relay: Arc::clone(&self.relay),
        }
    }
}

impl<A: RelayApi + ?Sized> PaymentInitiator<A> {
    pub const fn new(relay: Arc<A>) -> Self {
        Self { relay }
    }

    /// Ask the relay to prompt the payer
    pub async fn initiate(&self, request: &PaymentRequest) -> Result<Initiation> {
        tracing::info!(
            phone = %request.phone,
            amount = request.amount,
            reference = %request.reference,
            "Initiating STK push"
        );

        let reply = self.relay.stk_push(&StkPushBody::from(request)).await?;

        if !reply.success || reply.checkout_request_id.is_empty() {
            return Err(PaymentError::Relay {
                status: 200,
                message: INITIATE_FALLBACK_MESSAGE.into(),
            });
        }

        let handle = CheckoutHandle::new(reply.checkout_request_id);
        tracing::info!(checkout_request_id = %handle, "STK push accepted");

        Ok(Initiation {
            handle,
            customer_message: reply.customer_message,
            merchant_request_id: reply.merchant_request_id,
        })
    }
}
