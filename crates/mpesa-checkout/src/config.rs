//! Checkout Configuration

use std::time::Duration;

use mpesa_core::payment::DEFAULT_KES_PER_USD;
use rust_decimal::Decimal;

/// Relay server used when `MPESA_RELAY_URL` is unset
pub const DEFAULT_RELAY_URL: &str = "http://localhost:3001";

pub const DEFAULT_POLL_ATTEMPTS: u32 = 30;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);

/// Status poll settings
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollConfig {
    /// Queries issued before giving up
    pub max_attempts: u32,

    /// Pause between queries
    pub interval: Duration,

    /// Pause between initiation and the first query
    pub initial_delay: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_POLL_ATTEMPTS,
            interval: DEFAULT_POLL_INTERVAL,
            initial_delay: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl PollConfig {
    /// Same pause before the first query as between queries
    pub const fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
            initial_delay: interval,
        }
    }
}

/// Client-side checkout settings
#[derive(Clone, Debug)]
pub struct CheckoutConfig {
    /// Relay base URL, no trailing slash
    pub relay_url: String,

    pub poll: PollConfig,

    /// Shillings per US dollar for cart conversion
    pub kes_per_usd: Decimal,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            relay_url: DEFAULT_RELAY_URL.into(),
            poll: PollConfig::default(),
            kes_per_usd: DEFAULT_KES_PER_USD,
        }
    }
}

impl CheckoutConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from any key/value lookup; unparseable values fall back to defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let interval = read("MPESA_POLL_INTERVAL_MS")
            .and_then(|v| v.parse().ok())
            .map_or(DEFAULT_POLL_INTERVAL, Duration::from_millis);

        let max_attempts = read("MPESA_POLL_ATTEMPTS")
            .and_then(|v| v.parse::<u32>().ok())
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_POLL_ATTEMPTS);

        let kes_per_usd = read("MPESA_KES_PER_USD")
            .and_then(|v| v.parse::<Decimal>().ok())
            .filter(|rate| rate.is_sign_positive() && !rate.is_zero())
            .unwrap_or(DEFAULT_KES_PER_USD);

        Self {
            relay_url: read("MPESA_RELAY_URL")
                .unwrap_or_else(|| DEFAULT_RELAY_URL.into())
                .trim_end_matches('/')
                .to_string(),
            poll: PollConfig::new(max_attempts, interval),
            kes_per_usd,
        }
    }
}
