//! Server Configuration
//!
//! Loads configuration from environment variables.

use std::env;
use std::time::Duration;

use anyhow::{Context, Result};

/// Default negotiation timeout in seconds.
const DEFAULT_NEGOTIATION_TIMEOUT_SECS: u64 = 10;

/// Default lifetime of an unclaimed admission token in seconds.
const DEFAULT_TOKEN_TTL_SECS: u64 = 300;

/// Server configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address (e.g., "0.0.0.0:9000")
    pub bind_address: String,

    /// Display name of the room created at startup
    pub default_room_name: String,

    /// WebRTC STUN server (optional)
    pub stun_server: Option<String>,

    /// WebRTC TURN server (optional)
    pub turn_server: Option<String>,

    /// WebRTC TURN username (optional)
    pub turn_username: Option<String>,

    /// WebRTC TURN credential (optional)
    pub turn_credential: Option<String>,

    /// Upper bound on a single offer/answer exchange. `None` disables it.
    pub negotiation_timeout: Option<Duration>,

    /// Lifetime of an issued but unused admission token. `None` keeps
    /// tokens until they are used.
    pub token_ttl: Option<Duration>,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:9000".into()),
            default_room_name: env::var("DEFAULT_ROOM_NAME")
                .ok()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "Default".into()),
            stun_server: non_empty_var("STUN_SERVER"),
            turn_server: non_empty_var("TURN_SERVER"),
            turn_username: non_empty_var("TURN_USERNAME"),
            turn_credential: non_empty_var("TURN_CREDENTIAL"),
            negotiation_timeout: seconds_var(
                "NEGOTIATION_TIMEOUT_SECS",
                DEFAULT_NEGOTIATION_TIMEOUT_SECS,
            )?,
            token_ttl: seconds_var("TOKEN_TTL_SECS", DEFAULT_TOKEN_TTL_SECS)?,
        })
    }

    /// Check if TURN is configured.
    #[must_use]
    pub const fn has_turn(&self) -> bool {
        self.turn_server.is_some()
    }

    /// Create a default configuration for testing.
    #[must_use]
    pub fn default_for_test() -> Self {
        Self {
            bind_address: "127.0.0.1:0".into(),
            default_room_name: "Default".into(),
            stun_server: None,
            turn_server: None,
            turn_username: None,
            turn_credential: None,
            negotiation_timeout: Some(Duration::from_secs(5)),
            token_ttl: Some(Duration::from_secs(60)),
        }
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Read a duration in whole seconds. Zero disables it.
fn seconds_var(key: &str, default: u64) -> Result<Option<Duration>> {
    let secs = match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of seconds"))?,
        Err(_) => default,
    };
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}
