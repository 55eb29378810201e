/*
[INPUT]:  Error sources (transport, codec, caller requests, configuration)
[OUTPUT]: Structured error types with retry hints
[POS]:    Error handling layer - unified error types for entire crate
[UPDATE]: When adding new error sources or improving error messages
*/

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Main error type for the live data client
#[derive(Error, Debug)]
pub enum ClientError {
    /// `connect()` was called while a connection is already being managed
    #[error("client is already connected")]
    AlreadyConnected,

    /// The client was started outside of a Tokio runtime
    #[error("no Tokio runtime available to drive the connection")]
    NoRuntime,

    /// A raw frame was sent while no session is open
    #[error("no open session")]
    NotConnected,

    /// Caller supplied an invalid subscribe/unsubscribe request
    #[error("invalid subscription request: {0}")]
    Subscription(#[from] SubscriptionError),

    /// Configuration rejected by validation
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Transport-level failure
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ClientError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            ClientError::Transport(err) => err.is_retryable(),
            _ => false,
        }
    }
}

/// Failure of the underlying socket
#[derive(Error, Debug)]
pub enum TransportError {
    /// WebSocket protocol or I/O error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// The opening handshake did not finish in time
    #[error("connect timed out after {duration_ms}ms")]
    ConnectTimeout { duration_ms: u64 },

    /// The socket is already closed
    #[error("connection closed")]
    Closed,

    /// Failure injected by an in-process transport
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Check if reconnecting could succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::WebSocket(tungstenite::Error::Url(_)))
    }
}

/// Subscription request rejected at the call site
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionError {
    #[error("request contains no subscriptions")]
    EmptyRequest,

    #[error("subscription topic must not be empty")]
    EmptyTopic,

    #[error("subscription type must not be empty (use \"*\" for all types)")]
    EmptyType,

    /// Unsubscribe key matched nothing in the registry
    #[error("no subscription registered for topic {topic:?} type {message_type:?}")]
    NoMatch { topic: String, message_type: String },
}

/// Invalid client configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid host URL {host:?}: {reason}")]
    InvalidHost { host: String, reason: String },

    #[error("unsupported URL scheme {0:?} (expected ws or wss)")]
    UnsupportedScheme(String),

    #[error("ping interval must be greater than zero")]
    ZeroPingInterval,

    #[error("pong timeout ({pong_timeout_ms}ms) must be shorter than ping interval ({ping_interval_ms}ms)")]
    PongTimeoutTooLong {
        pong_timeout_ms: u64,
        ping_interval_ms: u64,
    },

    #[error("reconnect backoff is invalid: {0}")]
    InvalidBackoff(String),
}

/// Inbound frame that could not be interpreted
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    NotJson(#[source] serde_json::Error),

    #[error("binary frame is not valid UTF-8")]
    NotUtf8,

    #[error("malformed envelope: {0}")]
    MalformedEnvelope(#[source] serde_json::Error),
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, ClientError>;
