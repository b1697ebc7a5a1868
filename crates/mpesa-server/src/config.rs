//! Server Configuration

use std::path::PathBuf;

pub const DEFAULT_PORT: u16 = 3001;

/// Listener and static file settings
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// `host:port` to bind
    pub bind_addr: String,

    /// Built storefront to serve for non-API paths
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    /// Create from environment variables
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// `BIND_ADDR` wins over `PORT`
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let read = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let bind_addr = read("BIND_ADDR").unwrap_or_else(|| {
            let port = read("PORT")
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(DEFAULT_PORT);
            format!("0.0.0.0:{port}")
        });

        Self {
            bind_addr,
            static_dir: read("STATIC_DIR").map(PathBuf::from),
        }
    }
}
