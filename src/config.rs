//! Service configuration loaded from environment variables

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::assignment::MIN_ASSIGNABLE;

/// Default usability floor for a roster
pub const DEFAULT_MIN_PARTICIPANTS: usize = 3;

#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: IpAddr,
    pub port: u16,
    pub exchange: ExchangeConfig,
    /// JSON snapshot file for the record store (None = memory only)
    pub snapshot_path: Option<PathBuf>,
    pub rate_limit: Option<RateLimitConfig>,
}

/// Rules applied when creating events
#[derive(Debug, Clone, PartialEq)]
pub struct ExchangeConfig {
    /// Smallest roster accepted at creation. Never below what the assignment can handle.
    pub min_participants: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            min_participants: DEFAULT_MIN_PARTICIPANTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    pub max_requests: u32,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 30,
            window: Duration::from_secs(10),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port: 3000,
            exchange: ExchangeConfig::default(),
            snapshot_path: None,
            rate_limit: Some(RateLimitConfig::default()),
        }
    }
}

/// Read an env var, trimmed, treating blank as unset
fn env_value(key: &str) -> Option<String> {
    std::env::var(key).ok().and_then(|v| {
        let trimmed = v.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    })
}

/// Parse an env var, falling back to `default` (with a warning) when it is invalid
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    match env_value(key) {
        Some(raw) => raw.parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = raw.as_str(), "Ignoring invalid value");
            default
        }),
        None => default,
    }
}

fn env_flag(key: &str, default: bool) -> bool {
    env_value(key)
        .map(|v| v != "0" && v.to_lowercase() != "false")
        .unwrap_or(default)
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let min_participants = env_parse("MIN_PARTICIPANTS", DEFAULT_MIN_PARTICIPANTS);
        if min_participants < MIN_ASSIGNABLE {
            tracing::warn!(
                min_participants,
                "MIN_PARTICIPANTS below {}, clamping",
                MIN_ASSIGNABLE
            );
        }

        let rate_limit = if env_flag("RATE_LIMIT", true) {
            let fallback = RateLimitConfig::default();
            Some(RateLimitConfig {
                max_requests: env_parse("RATE_LIMIT_MAX", fallback.max_requests),
                window: Duration::from_secs(env_parse(
                    "RATE_LIMIT_WINDOW",
                    fallback.window.as_secs(),
                )),
            })
        } else {
            None
        };

        let config = Self {
            bind_addr: env_parse("BIND_ADDR", defaults.bind_addr),
            port: env_parse("PORT", defaults.port),
            exchange: ExchangeConfig {
                min_participants: min_participants.max(MIN_ASSIGNABLE),
            },
            snapshot_path: env_value("SNAPSHOT_PATH").map(PathBuf::from),
            rate_limit,
        };

        tracing::info!(
            port = config.port,
            min_participants = config.exchange.min_participants,
            persistent = config.snapshot_path.is_some(),
            rate_limited = config.rate_limit.is_some(),
            "Configuration loaded"
        );

        config
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.port)
    }
}
