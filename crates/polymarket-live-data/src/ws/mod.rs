/*
[INPUT]:  Client configuration, subscriptions and caller callbacks
[OUTPUT]: A supervised live data stream delivered to an event handler
[POS]:    WebSocket layer - connection, heartbeat, replay and dispatch
[UPDATE]: When adding session behavior or changing the public client surface
*/

pub mod client;
pub mod codec;
pub mod handler;
pub mod heartbeat;
pub mod registry;
pub mod session;
mod supervisor;
pub mod transport;

pub use client::LiveDataClient;
pub use codec::{Action, ControlMessage, Frame, Inbound};
pub use handler::{CallbackHandler, EventHandler};
pub use heartbeat::{HeartbeatMonitor, Liveness};
pub use registry::SubscriptionRegistry;
pub use session::{SessionState, Termination, TerminationCause};
pub use transport::{Connector, Transport, TungsteniteConnector};
