//! Daraja Credentials
//!
//! Loaded from the environment. Every value is trimmed and an empty value
//! counts as absent, so a stray space in `.env` doesn't produce a
//! confusing provider-side auth failure.

use serde::Serialize;

use crate::error::{RelayError, Result};

/// Sandbox host; production is `https://api.safaricom.co.ke`
pub const DEFAULT_BASE_URL: &str = "https://sandbox.safaricom.co.ke";

/// Outbound request timeout
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Path the provider posts results to
pub const CALLBACK_PATH: &str = "/api/mpesa/callback";

/// Provider credentials and endpoints
#[derive(Clone, Default)]
pub struct DarajaCredentials {
    pub consumer_key: Option<String>,
    pub consumer_secret: Option<String>,
    pub shortcode: Option<String>,
    pub passkey: Option<String>,

    /// Provider host, no trailing slash
    pub base_url: String,

    /// Public callback URL; derived per request when unset
    pub callback_url: Option<String>,

    pub timeout_secs: u64,
}

impl DarajaCredentials {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create from any key/value lookup
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Self {
            consumer_key: read("MPESA_CONSUMER_KEY"),
            consumer_secret: read("MPESA_CONSUMER_SECRET"),
            shortcode: read("MPESA_SHORTCODE"),
            passkey: read("MPESA_PASSKEY"),
            base_url: read("MPESA_BASE_URL")
                .unwrap_or_else(|| DEFAULT_BASE_URL.into())
                .trim_end_matches('/')
                .to_string(),
            callback_url: read("MPESA_CALLBACK_URL"),
            timeout_secs: read("MPESA_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_TIMEOUT_SECS),
        }
    }

    /// Names of required variables that are not set
    pub fn missing(&self) -> Vec<&'static str> {
        [
            ("MPESA_CONSUMER_KEY", self.consumer_key.is_none()),
            ("MPESA_CONSUMER_SECRET", self.consumer_secret.is_none()),
            ("MPESA_SHORTCODE", self.shortcode.is_none()),
            ("MPESA_PASSKEY", self.passkey.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, absent)| absent.then_some(name))
        .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.missing().is_empty()
    }

    /// Consumer key and secret for the OAuth call
    pub fn oauth_pair(&self) -> Result<(&str, &str)> {
        match (self.consumer_key.as_deref(), self.consumer_secret.as_deref()) {
            (Some(key), Some(secret)) => Ok((key, secret)),
            (key, secret) => {
                let mut missing = Vec::new();
                if key.is_none() {
                    missing.push("MPESA_CONSUMER_KEY");
                }
                if secret.is_none() {
                    missing.push("MPESA_CONSUMER_SECRET");
                }
                Err(RelayError::MissingCredentials(missing))
            }
        }
    }

    /// Shortcode (string and numeric forms) and passkey for signing
    pub fn signing_keys(&self) -> Result<SigningKeys<'_>> {
        let missing = self.missing();
        if !missing.is_empty() {
            return Err(RelayError::MissingCredentials(missing));
        }

        let (Some(shortcode), Some(passkey)) = (self.shortcode.as_deref(), self.passkey.as_deref())
        else {
            return Err(RelayError::MissingCredentials(vec!["MPESA_SHORTCODE", "MPESA_PASSKEY"]));
        };

        let number = shortcode.parse().map_err(|_| {
            RelayError::Config(format!("MPESA_SHORTCODE must be numeric, got '{shortcode}'"))
        })?;

        Ok(SigningKeys {
            shortcode,
            shortcode_number: number,
            passkey,
        })
    }

    /// Callback URL for a request arriving on `host`
    pub fn callback_url_for(&self, host: Option<&str>) -> String {
        if let Some(configured) = &self.callback_url {
            return configured.clone();
        }

        let derived = format!("http://{}{}", host.unwrap_or("localhost"), CALLBACK_PATH);
        if derived.contains("localhost") || derived.contains("127.0.0.1") {
            tracing::warn!(
                callback_url = %derived,
                "Using localhost callback URL; the provider cannot reach it. Set MPESA_CALLBACK_URL to a public HTTPS URL"
            );
        }
        derived
    }

    /// Presence report safe to return from diagnostics
    pub fn report(&self) -> CredentialReport {
        CredentialReport {
            has_consumer_key: self.consumer_key.is_some(),
            has_consumer_secret: self.consumer_secret.is_some(),
            has_shortcode: self.shortcode.is_some(),
            has_passkey: self.passkey.is_some(),
            base_url: self.base_url.clone(),
            shortcode: self.shortcode.clone().unwrap_or_else(|| "NOT SET".into()),
            consumer_key: None,
        }
    }
}

impl std::fmt::Debug for DarajaCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| if v.is_some() { "<set>" } else { "<unset>" };
        f.debug_struct("DarajaCredentials")
            .field("consumer_key", &redact(&self.consumer_key))
            .field("consumer_secret", &redact(&self.consumer_secret))
            .field("shortcode", &self.shortcode)
            .field("passkey", &redact(&self.passkey))
            .field("base_url", &self.base_url)
            .field("callback_url", &self.callback_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

/// Borrowed signing material
#[derive(Clone, Copy, Debug)]
pub struct SigningKeys<'a> {
    pub shortcode: &'a str,
    pub shortcode_number: u64,
    pub passkey: &'a str,
}

/// Which credentials are configured
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialReport {
    pub has_consumer_key: bool,
    pub has_consumer_secret: bool,
    pub has_shortcode: bool,
    pub has_passkey: bool,
    pub base_url: String,
    pub shortcode: String,

    /// First ten characters of the key, only after a successful auth
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consumer_key: Option<String>,
}

impl CredentialReport {
    pub fn with_key_preview(mut self, key: &str) -> Self {
        let preview: String = key.chars().take(10).collect();
        self.consumer_key = Some(format!("{preview}..."));
        self
    }
}
