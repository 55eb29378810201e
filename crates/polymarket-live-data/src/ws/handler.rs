/*
[INPUT]:  Session lifecycle events and decoded envelopes
[OUTPUT]: Ordered invocations of caller callbacks
[POS]:    WebSocket layer - callback contract and dispatcher task
[UPDATE]: When adding callback kinds or changing delivery order
*/

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::client::LiveDataClient;
use super::session::Termination;
use crate::types::Envelope;

/// Caller-supplied handling logic.
///
/// All callbacks run on one dispatcher task, in the order the events were
/// produced, so a slow callback delays later callbacks but never the socket
/// read loop or heartbeat.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Called every time a session reaches `Open`, reconnects included.
    async fn on_connect(&self, _client: &LiveDataClient) {}

    /// Called once per decoded envelope, in arrival order.
    async fn on_message(&self, client: &LiveDataClient, envelope: Envelope);

    /// Called once per ended session, including failed connect attempts.
    async fn on_close(&self, _client: &LiveDataClient, _termination: &Termination) {}
}

type ConnectFn = Box<dyn Fn(&LiveDataClient) + Send + Sync>;
type MessageFn = Box<dyn Fn(&LiveDataClient, Envelope) + Send + Sync>;
type CloseFn = Box<dyn Fn(&LiveDataClient, &Termination) + Send + Sync>;

/// [`EventHandler`] built from plain closures.
#[derive(Default)]
pub struct CallbackHandler {
    connect: Option<ConnectFn>,
    message: Option<MessageFn>,
    close: Option<CloseFn>,
}

impl CallbackHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn when_connected<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LiveDataClient) + Send + Sync + 'static,
    {
        self.connect = Some(Box::new(callback));
        self
    }

    pub fn when_message<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LiveDataClient, Envelope) + Send + Sync + 'static,
    {
        self.message = Some(Box::new(callback));
        self
    }

    pub fn when_closed<F>(mut self, callback: F) -> Self
    where
        F: Fn(&LiveDataClient, &Termination) + Send + Sync + 'static,
    {
        self.close = Some(Box::new(callback));
        self
    }
}

#[async_trait]
impl EventHandler for CallbackHandler {
    async fn on_connect(&self, client: &LiveDataClient) {
        if let Some(callback) = &self.connect {
            callback(client);
        }
    }

    async fn on_message(&self, client: &LiveDataClient, envelope: Envelope) {
        if let Some(callback) = &self.message {
            callback(client, envelope);
        }
    }

    async fn on_close(&self, client: &LiveDataClient, termination: &Termination) {
        if let Some(callback) = &self.close {
            callback(client, termination);
        }
    }
}

#[derive(Debug)]
pub(crate) enum ClientEvent {
    Connected,
    Message(Envelope),
    Closed(Termination),
}

/// Deliver events to the handler until every sender is gone.
pub(crate) async fn dispatch(client: LiveDataClient, mut events: mpsc::UnboundedReceiver<ClientEvent>) {
    let handler = client.handler();
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::Connected => handler.on_connect(&client).await,
            ClientEvent::Message(envelope) => handler.on_message(&client, envelope).await,
            ClientEvent::Closed(termination) => handler.on_close(&client, &termination).await,
        }
    }
}
