//! Status Poller
//!
//! Repeats `query-status` for one checkout until the provider reports a
//! terminal result code, the attempt ceiling is reached, or the owner
//! cancels. A poll that fails at the network or relay level still uses up an
//! attempt.
//!
//! At most one loop runs per checkout handle. [`PollRegistry`] hands out a
//! [`PollGuard`] per handle and refuses a second one until the first is
//! dropped.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use mpesa_core::{CheckoutHandle, PaymentError, PaymentOutcome, PaymentStatus, Result};
use tokio_util::sync::CancellationToken;

use crate::api::RelayApi;
use crate::config::PollConfig;

/// One poll result, as reported to an observer
#[derive(Debug)]
pub struct PollAttempt<'a> {
    /// 1-based
    pub attempt: u32,
    pub max_attempts: u32,
    pub result: std::result::Result<&'a PaymentStatus, &'a PaymentError>,
}

/// Callback invoked after every poll
pub type PollObserver = Arc<dyn Fn(&PollAttempt<'_>) + Send + Sync>;

/// Handles with a poll loop in flight
#[derive(Clone, Debug, Default)]
pub struct PollRegistry {
    active: Arc<Mutex<HashSet<String>>>,
}

impl PollRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `handle`, failing if a loop already holds it
    pub fn acquire(&self, handle: &CheckoutHandle) -> Result<PollGuard> {
        if !self.lock().insert(handle.as_str().to_string()) {
            return Err(PaymentError::AlreadyPolling(handle.to_string()));
        }

        Ok(PollGuard {
            active: Arc::clone(&self.active),
            handle: handle.as_str().to_string(),
        })
    }

    pub fn is_polling(&self, handle: &CheckoutHandle) -> bool {
        self.lock().contains(handle.as_str())
    }

    /// Number of loops in flight
    pub fn active(&self) -> usize {
        self.lock().len()
    }
}

/// Releases its handle on drop
#[derive(Debug)]
pub struct PollGuard {
    active: Arc<Mutex<HashSet<String>>>,
    handle: String,
}

impl Drop for PollGuard {
    fn drop(&mut self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.handle);
    }
}

/// Polls the relay until a checkout settles
pub struct StatusPoller<A: RelayApi + ?Sized> {
    relay: Arc<A>,
    config: PollConfig,
    registry: PollRegistry,
    observer: Option<PollObserver>,
}

impl<A: RelayApi + ?Sized> StatusPoller<A> {
    pub fn new(relay: Arc<A>, config: PollConfig) -> Self {
        Self {
            relay,
            config,
            registry: PollRegistry::new(),
            observer: None,
        }
    }

    /// Share a registry with other pollers
    #[must_use]
    pub fn with_registry(mut self, registry: PollRegistry) -> Self {
        self.registry = registry;
        self
    }

    #[must_use]
    pub fn with_observer(mut self, observer: PollObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    pub const fn registry(&self) -> &PollRegistry {
        &self.registry
    }

    pub const fn config(&self) -> &PollConfig {
        &self.config
    }

    /// Poll `handle` to a terminal outcome.
    ///
    /// Only a second concurrent loop for the same handle is an error; every
    /// other ending, including timeout and cancellation, is an outcome.
    pub async fn poll(&self, handle: &CheckoutHandle, cancel: &CancellationToken) -> Result<PaymentOutcome> {
        let _guard = self.registry.acquire(handle)?;
        let max_attempts = self.config.max_attempts;
        let mut attempts = 0;

        if !pause(self.config.initial_delay, cancel).await {
            return Ok(Self::aborted(handle, attempts));
        }

        while attempts < max_attempts {
            let result = tokio::select! {
                biased;
                () = cancel.cancelled() => return Ok(Self::aborted(handle, attempts)),
                result = self.relay.query_status(handle) => result,
            };
            attempts += 1;

            if let Some(observer) = &self.observer {
                observer(&PollAttempt {
                    attempt: attempts,
                    max_attempts,
                    result: result.as_ref(),
                });
            }

            match &result {
                Ok(status) => {
                    if let Some(outcome) = PaymentOutcome::classify(status) {
                        tracing::info!(
                            checkout_request_id = %handle,
                            attempt = attempts,
                            result_code = ?status.result_code,
                            result_desc = ?status.result_desc,
                            "Checkout settled"
                        );
                        return Ok(outcome);
                    }
                    tracing::debug!(checkout_request_id = %handle, attempt = attempts, "Payment pending");
                }
                Err(e) => {
                    tracing::warn!(
                        checkout_request_id = %handle,
                        attempt = attempts,
                        error = %e,
                        "Status poll failed"
                    );
                }
            }

            if attempts < max_attempts && !pause(self.config.interval, cancel).await {
                return Ok(Self::aborted(handle, attempts));
            }
        }

        tracing::warn!(
            checkout_request_id = %handle,
            attempts,
            "Status polling timed out; the payment may still complete"
        );
        Ok(PaymentOutcome::TimedOut { attempts })
    }

    fn aborted(handle: &CheckoutHandle, attempts: u32) -> PaymentOutcome {
        tracing::info!(checkout_request_id = %handle, attempts, "Status polling cancelled");
        PaymentOutcome::Aborted { attempts }
    }
}

/// Sleep unless cancelled first; `false` means cancelled
async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(duration) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockRelay;
    use mpesa_core::outcome::{CANCELLED_MESSAGE, TIMEOUT_MESSAGE};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn handle() -> CheckoutHandle {
        CheckoutHandle::new("ws_1")
    }

    fn pending() -> Result<PaymentStatus> {
        Ok(PaymentStatus::pending(handle()))
    }

    fn result(code: i64, desc: &str) -> Result<PaymentStatus> {
        Ok(PaymentStatus::with_result(handle(), code, desc))
    }

    fn poller(relay: MockRelay, attempts: u32) -> (StatusPoller<MockRelay>, Arc<MockRelay>) {
        let relay = Arc::new(relay);
        let poller = StatusPoller::new(relay.clone(), PollConfig::new(attempts, Duration::from_secs(3)));
        (poller, relay)
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_pending_polls() {
        let (poller, relay) = poller(
            MockRelay::accepting("ws_1").then([pending(), pending(), result(0, "The service request is processed successfully.")]),
            30,
        );

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(relay.query_count(), 3);
        assert!(!poller.registry().is_polling(&handle()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_on_last_attempt() {
        let mut script: Vec<_> = (0..4).map(|_| pending()).collect();
        script.push(result(0, "ok"));
        let (poller, _) = poller(MockRelay::accepting("ws_1").then(script), 5);

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_user_cancellation_message() {
        let (poller, _) = poller(
            MockRelay::accepting("ws_1").then([result(1032, "Request cancelled by user")]),
            30,
        );

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert!(matches!(outcome, PaymentOutcome::Cancelled { .. }));
        assert_eq!(outcome.message(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test(start_paused = true)]
    async fn test_other_codes_keep_provider_description() {
        let (poller, _) = poller(
            MockRelay::accepting("ws_1").then([result(1, "The balance is insufficient for the transaction.")]),
            30,
        );

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome.message(), Some("The balance is insufficient for the transaction."));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_after_exactly_max_attempts() {
        let (poller, relay) = poller(MockRelay::accepting("ws_1"), 4);

        let started = tokio::time::Instant::now();
        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();

        assert_eq!(outcome, PaymentOutcome::TimedOut { attempts: 4 });
        assert_eq!(outcome.message(), Some(TIMEOUT_MESSAGE));
        assert_eq!(relay.query_count(), 4);
        // initial delay plus three gaps between four queries
        assert_eq!(started.elapsed(), Duration::from_secs(12));
    }

    #[tokio::test(start_paused = true)]
    async fn test_network_failures_count_as_attempts() {
        let script = (0..3).map(|_| Err(PaymentError::Network("connection refused".into())));
        let (poller, relay) = poller(MockRelay::accepting("ws_1").then(script), 3);

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert_eq!(outcome, PaymentOutcome::TimedOut { attempts: 3 });
        assert_eq!(relay.query_count(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_network_failure() {
        let (poller, _) = poller(
            MockRelay::accepting("ws_1").then([Err(PaymentError::Network("reset".into())), result(0, "ok")]),
            30,
        );

        let outcome = poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert!(outcome.is_success());
    }

    #[tokio::test(start_paused = true)]
    async fn test_observer_sees_every_poll() {
        let seen = Arc::new(AtomicU32::new(0));
        let failures = Arc::new(AtomicU32::new(0));
        let (seen_in, failures_in) = (seen.clone(), failures.clone());

        let (poller, _) = poller(
            MockRelay::accepting("ws_1").then([pending(), Err(PaymentError::Network("reset".into())), result(0, "ok")]),
            30,
        );
        let poller = poller.with_observer(Arc::new(move |attempt: &PollAttempt<'_>| {
            assert_eq!(attempt.max_attempts, 30);
            seen_in.store(attempt.attempt, Ordering::SeqCst);
            if attempt.result.is_err() {
                failures_in.fetch_add(1, Ordering::SeqCst);
            }
        }));

        poller.poll(&handle(), &CancellationToken::new()).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 3);
        assert_eq!(failures.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_loop_for_same_handle_is_refused() {
        let relay = Arc::new(MockRelay::accepting("ws_1"));
        let registry = PollRegistry::new();
        let config = PollConfig::new(30, Duration::from_secs(3));
        let first = Arc::new(StatusPoller::new(relay.clone(), config).with_registry(registry.clone()));
        let second = StatusPoller::new(relay, config).with_registry(registry.clone());

        let cancel = CancellationToken::new();
        let running = {
            let first = first.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { first.poll(&handle(), &cancel).await })
        };
        tokio::task::yield_now().await;
        assert!(registry.is_polling(&handle()));

        let err = second.poll(&handle(), &CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, PaymentError::AlreadyPolling(h) if h == "ws_1"));

        cancel.cancel();
        let outcome = running.await.unwrap().unwrap();
        assert!(matches!(outcome, PaymentOutcome::Aborted { .. }));
        assert_eq!(registry.active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_aborts() {
        let (poller, relay) = poller(MockRelay::accepting("ws_1"), 30);
        let poller = Arc::new(poller);
        let cancel = CancellationToken::new();

        let running = {
            let poller = poller.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { poller.poll(&handle(), &cancel).await })
        };

        // initial delay, first query, then halfway through the next wait
        tokio::time::sleep(Duration::from_millis(4500)).await;
        cancel.cancel();

        let outcome = running.await.unwrap().unwrap();
        assert_eq!(outcome, PaymentOutcome::Aborted { attempts: 1 });
        assert_eq!(relay.query_count(), 1);
        assert_eq!(poller.registry().active(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_before_start() {
        let (poller, relay) = poller(MockRelay::accepting("ws_1"), 30);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = poller.poll(&handle(), &cancel).await.unwrap();
        assert_eq!(outcome, PaymentOutcome::Aborted { attempts: 0 });
        assert_eq!(relay.query_count(), 0);
    }
}
