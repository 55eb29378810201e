/*
[INPUT]:  Crate modules and public type definitions
[OUTPUT]: Public live data client crate surface
[POS]:    Crate root - module wiring
[UPDATE]: When public modules or exports change
*/

pub mod config;
pub mod error;
pub mod types;
pub mod ws;

// Re-export configuration
pub use config::{ClientConfig, ReconnectPolicy, UnmatchedUnsubscribe};

// Re-export errors
pub use error::{ClientError, ConfigError, DecodeError, Result, SubscriptionError, TransportError};

// Re-export all types
pub use types::*;

// Re-export commonly used types from ws
pub use ws::{
    CallbackHandler,
    Connector,
    EventHandler,
    Frame,
    LiveDataClient,
    SessionState,
    Termination,
    TerminationCause,
    Transport,
};
