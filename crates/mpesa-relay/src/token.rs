//! OAuth Token Cache
//!
//! One bearer token shared by every request a client makes. A token is
//! reused while it has more than [`REFRESH_BUFFER`] left, otherwise the
//! next caller fetches a fresh one.
//!
//! The check-and-refresh runs under an async mutex, so callers that arrive
//! while a refresh is in flight wait for it and reuse its result instead of
//! each fetching their own token.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;

/// Refresh a token this long before it expires
pub const REFRESH_BUFFER: Duration = Duration::from_secs(60);

/// Lifetime assumed when the provider omits `expires_in`
pub const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(3600);

/// Freshly issued token
#[derive(Clone, Debug)]
pub struct AccessToken {
    pub token: String,
    pub expires_in: Duration,
}

/// Token held by the cache
#[derive(Clone, Debug)]
pub struct CachedToken {
    token: String,
    expires_at: Instant,
}

impl CachedToken {
    /// Time left before expiry at `now`
    pub fn remaining(&self, now: Instant) -> Duration {
        self.expires_at.saturating_duration_since(now)
    }

    /// Usable if strictly more than `buffer` remains
    pub fn is_fresh(&self, now: Instant, buffer: Duration) -> bool {
        self.remaining(now) > buffer
    }
}

/// Where fresh tokens come from
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn fetch_token(&self) -> Result<AccessToken>;
}

/// Single-slot token cache
pub struct TokenCache {
    slot: Mutex<Option<CachedToken>>,
    buffer: Duration,
    refreshes: AtomicU64,
}

impl Default for TokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache {
    pub fn new() -> Self {
        Self::with_buffer(REFRESH_BUFFER)
    }

    pub fn with_buffer(buffer: Duration) -> Self {
        Self {
            slot: Mutex::new(None),
            buffer,
            refreshes: AtomicU64::new(0),
        }
    }

    /// Return the cached token, refreshing it from `source` when stale
    pub async fn get_or_refresh<S>(&self, source: &S) -> Result<String>
    where
        S: TokenSource + ?Sized,
    {
        let mut slot = self.slot.lock().await;

        if let Some(cached) = slot.as_ref().filter(|c| c.is_fresh(Instant::now(), self.buffer)) {
            return Ok(cached.token.clone());
        }

        tracing::debug!("M-Pesa OAuth token missing or near expiry, refreshing");
        let fresh = source.fetch_token().await?;
        self.refreshes.fetch_add(1, Ordering::Relaxed);

        tracing::info!(
            expires_in_secs = fresh.expires_in.as_secs(),
            "OAuth token obtained"
        );

        let token = fresh.token.clone();
        *slot = Some(CachedToken {
            token: fresh.token,
            expires_at: Instant::now() + fresh.expires_in,
        });

        Ok(token)
    }

    /// Drop the cached token so the next call refetches
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }

    /// Seconds left on the cached token, if any
    pub async fn remaining(&self) -> Option<Duration> {
        self.slot
            .lock()
            .await
            .as_ref()
            .map(|c| c.remaining(Instant::now()))
    }

    /// How many times a token has been fetched
    pub fn refresh_count(&self) -> u64 {
        self.refreshes.load(Ordering::Relaxed)
    }
}
