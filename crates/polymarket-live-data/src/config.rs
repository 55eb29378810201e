/*
[INPUT]:  Caller options (endpoint, heartbeat, reconnect policy)
[OUTPUT]: Validated client configuration
[POS]:    Configuration layer - connection tuning
[UPDATE]: When adding new configuration options
*/

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigError;

/// Default live data endpoint
pub const DEFAULT_HOST: &str = "wss://ws-live-data.polymarket.com";
/// Default heartbeat ping interval in milliseconds
pub const DEFAULT_PING_INTERVAL_MS: u64 = 5_000;

const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_CLOSE_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_INITIAL_BACKOFF_MS: u64 = 1_000;
const DEFAULT_MAX_BACKOFF_MS: u64 = 30_000;
const DEFAULT_JITTER_MS: u64 = 250;

/// Client configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    /// WebSocket endpoint URL
    pub host: String,
    /// Interval between heartbeat pings
    pub ping_interval_ms: u64,
    /// How long to wait for a pong; defaults to half the ping interval
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pong_timeout_ms: Option<u64>,
    /// Upper bound on the opening handshake
    pub connect_timeout_ms: u64,
    /// Upper bound on the closing handshake
    pub close_timeout_ms: u64,
    /// Reconnect after unexpected disconnects
    pub auto_reconnect: bool,
    pub reconnect: ReconnectPolicy,
    /// Behavior when an unsubscribe key matches nothing
    pub unmatched_unsubscribe: UnmatchedUnsubscribe,
    /// Blockchain RPC URL for caller-side payload interpretation; never used
    /// by the connection itself.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub web3_provider: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            ping_interval_ms: DEFAULT_PING_INTERVAL_MS,
            pong_timeout_ms: None,
            connect_timeout_ms: DEFAULT_CONNECT_TIMEOUT_MS,
            close_timeout_ms: DEFAULT_CLOSE_TIMEOUT_MS,
            auto_reconnect: true,
            reconnect: ReconnectPolicy::default(),
            unmatched_unsubscribe: UnmatchedUnsubscribe::default(),
            web3_provider: None,
        }
    }
}

impl ClientConfig {
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim().to_string();
        self
    }

    pub fn with_ping_interval(mut self, interval: Duration) -> Self {
        self.ping_interval_ms = duration_ms(interval);
        self
    }

    pub fn with_pong_timeout(mut self, timeout: Duration) -> Self {
        self.pong_timeout_ms = Some(duration_ms(timeout));
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_close_timeout(mut self, timeout: Duration) -> Self {
        self.close_timeout_ms = duration_ms(timeout);
        self
    }

    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_unmatched_unsubscribe(mut self, behavior: UnmatchedUnsubscribe) -> Self {
        self.unmatched_unsubscribe = behavior;
        self
    }

    pub fn with_web3_provider(mut self, url: impl Into<String>) -> Self {
        self.web3_provider = Some(url.into());
        self
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(
            self.pong_timeout_ms
                .unwrap_or(self.ping_interval_ms / 2)
                .max(1),
        )
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }

    /// Parse and check the endpoint URL.
    pub fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = Url::parse(&self.host).map_err(|err| ConfigError::InvalidHost {
            host: self.host.clone(),
            reason: err.to_string(),
        })?;
        match url.scheme() {
            "ws" | "wss" => Ok(url),
            other => Err(ConfigError::UnsupportedScheme(other.to_string())),
        }
    }

    /// Validate the configuration before a connection is started.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint()?;

        if self.ping_interval_ms == 0 {
            return Err(ConfigError::ZeroPingInterval);
        }

        let pong_timeout_ms = duration_ms(self.pong_timeout());
        if pong_timeout_ms >= self.ping_interval_ms {
            return Err(ConfigError::PongTimeoutTooLong {
                pong_timeout_ms,
                ping_interval_ms: self.ping_interval_ms,
            });
        }

        self.reconnect.validate()
    }
}

/// What `unsubscribe` does with a key that matches no registered subscription.
///
/// The service's handling of e.g. unsubscribing `comments/comment_created`
/// while subscribed to `comments/*` is not documented, so the client lets
/// the caller pick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UnmatchedUnsubscribe {
    /// Treat as a no-op; no frame is sent.
    #[default]
    Ignore,
    /// Fail the call with `SubscriptionError::NoMatch`.
    Reject,
}

/// Capped exponential backoff between reconnect attempts
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub initial_backoff_ms: u64,
    /// Upper bound for backoff growth
    pub max_backoff_ms: u64,
    /// Maximum random jitter added to each delay
    pub jitter_ms: u64,
    /// Give up after this many consecutive failed attempts
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_backoff_ms: DEFAULT_INITIAL_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            jitter_ms: DEFAULT_JITTER_MS,
            max_attempts: None,
        }
    }
}

impl ReconnectPolicy {
    /// Fixed delay without jitter.
    pub fn fixed(delay: Duration) -> Self {
        let ms = duration_ms(delay);
        Self {
            initial_backoff_ms: ms,
            max_backoff_ms: ms,
            jitter_ms: 0,
            max_attempts: None,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Delay before the given retry, without jitter.
    ///
    /// `attempt` is 1-based.
    pub fn base_delay_for_attempt(&self, attempt: u32) -> Duration {
        let mut delay = self.initial_backoff_ms;
        for _ in 1..attempt {
            delay = delay.saturating_mul(2).min(self.max_backoff_ms);
            if delay == self.max_backoff_ms {
                break;
            }
        }
        Duration::from_millis(delay.min(self.max_backoff_ms))
    }

    /// Delay before the given retry, jitter included.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_for_attempt(attempt);
        if self.jitter_ms == 0 {
            return base;
        }
        let jitter = rand::thread_rng().gen_range(0..=self.jitter_ms);
        base + Duration::from_millis(jitter)
    }

    /// Whether another attempt is allowed after `attempt` consecutive failures.
    pub fn allows_attempt(&self, attempt: u32) -> bool {
        self.max_attempts.is_none_or(|max| attempt <= max)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.initial_backoff_ms == 0 {
            return Err(ConfigError::InvalidBackoff(
                "initial_backoff_ms must be greater than zero".to_string(),
            ));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(ConfigError::InvalidBackoff(format!(
                "max_backoff_ms ({}) is below initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }
}

fn duration_ms(duration: Duration) -> u64 {
    duration.as_millis().min(u64::MAX as u128) as u64
}
