/*
[INPUT]:  Test scenarios needing a controllable server and observable callbacks
[OUTPUT]: In-memory connector/transport pair, recording event handler, config fixtures
[POS]:    Test infrastructure - shared across all test modules
[UPDATE]: When adding new test patterns or fixtures
*/

//! Common test utilities for polymarket-live-data tests

#![allow(dead_code)]

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use polymarket_live_data::ws::{ControlMessage, Frame};
use polymarket_live_data::{
    ClientConfig,
    Connector,
    Envelope,
    EventHandler,
    LiveDataClient,
    ReconnectPolicy,
    Subscription,
    SubscriptionIdentity,
    Termination,
    Transport,
    TransportError,
};
use tokio::sync::mpsc;
use url::Url;

/// Upper bound on any single wait in a test
pub const WAIT: Duration = Duration::from_secs(120);

/// Config pointing at a dummy host, with a short fixed reconnect delay
pub fn test_config() -> ClientConfig {
    ClientConfig::default()
        .with_host("ws://live-data.test")
        .with_reconnect_policy(ReconnectPolicy::fixed(Duration::from_millis(100)))
}

pub fn identities(subscriptions: &[Subscription]) -> HashSet<SubscriptionIdentity> {
    subscriptions.iter().map(Subscription::identity).collect()
}

struct ConnectorState {
    accepted: mpsc::UnboundedSender<MockConnection>,
    auto_pong: AtomicBool,
    confirm_close: AtomicBool,
    stall_remaining: AtomicUsize,
    refuse_remaining: AtomicUsize,
    attempts: AtomicUsize,
}

/// Connector handing each new connection to the paired [`MockServer`].
#[derive(Clone)]
pub struct MockConnector {
    state: Arc<ConnectorState>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &Url) -> Result<Box<dyn Transport>, TransportError> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        let refused = self
            .state
            .refuse_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if refused {
            return Err(TransportError::Other("connection refused".to_string()));
        }

        let stalled = self
            .state
            .stall_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if stalled {
            std::future::pending::<()>().await;
        }

        let (to_client, inbound) = mpsc::unbounded_channel();
        let (outbound, from_client) = mpsc::unbounded_channel();
        let _ = self.state.accepted.send(MockConnection {
            to_client: to_client.clone(),
            from_client,
        });

        Ok(Box::new(MockTransport {
            inbound,
            loopback: to_client,
            outbound,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockTransport {
    inbound: mpsc::UnboundedReceiver<Result<Frame, TransportError>>,
    loopback: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    outbound: mpsc::UnboundedSender<Frame>,
    state: Arc<ConnectorState>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: Frame) -> Result<(), TransportError> {
        match &frame {
            Frame::Ping(payload) if self.state.auto_pong.load(Ordering::SeqCst) => {
                let _ = self.loopback.send(Ok(Frame::Pong(payload.clone())));
            }
            // Confirm the closing handshake like a well-behaved server.
            Frame::Close if self.state.confirm_close.load(Ordering::SeqCst) => {
                let _ = self.loopback.send(Ok(Frame::Close));
            }
            _ => {}
        }
        // The server side may already be gone; frames are then discarded.
        let _ = self.outbound.send(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<Frame, TransportError>> {
        self.inbound.recv().await
    }
}

/// Server side of the in-memory transport.
pub struct MockServer {
    accepted: mpsc::UnboundedReceiver<MockConnection>,
    connector: MockConnector,
}

pub fn mock_pair() -> (MockConnector, MockServer) {
    let (accepted_tx, accepted) = mpsc::unbounded_channel();
    let connector = MockConnector {
        state: Arc::new(ConnectorState {
            accepted: accepted_tx,
            auto_pong: AtomicBool::new(true),
            confirm_close: AtomicBool::new(true),
            stall_remaining: AtomicUsize::new(0),
            refuse_remaining: AtomicUsize::new(0),
            attempts: AtomicUsize::new(0),
        }),
    };
    let server = MockServer {
        accepted,
        connector: connector.clone(),
    };
    (connector, server)
}

impl MockServer {
    /// Wait for the client to open the next connection.
    pub async fn accept(&mut self) -> MockConnection {
        tokio::time::timeout(WAIT, self.accepted.recv())
            .await
            .expect("timed out waiting for a connection")
            .expect("connector dropped")
    }

    pub fn try_accept(&mut self) -> Option<MockConnection> {
        self.accepted.try_recv().ok()
    }

    /// Answer pings automatically (default) or let them go unanswered.
    pub fn set_auto_pong(&self, enabled: bool) {
        self.connector.state.auto_pong.store(enabled, Ordering::SeqCst);
    }

    /// Echo the client's close frame (default) or leave it unanswered.
    pub fn set_confirm_close(&self, enabled: bool) {
        self.connector.state.confirm_close.store(enabled, Ordering::SeqCst);
    }

    /// Never complete the next `count` connection attempts.
    pub fn stall_next(&self, count: usize) {
        self.connector.state.stall_remaining.store(count, Ordering::SeqCst);
    }

    /// Refuse the next `count` connection attempts.
    pub fn refuse_next(&self, count: usize) {
        self.connector.state.refuse_remaining.store(count, Ordering::SeqCst);
    }

    /// Connection attempts seen so far, refused ones included.
    pub fn attempts(&self) -> usize {
        self.connector.state.attempts.load(Ordering::SeqCst)
    }
}

/// One accepted connection, as seen by the server.
pub struct MockConnection {
    to_client: mpsc::UnboundedSender<Result<Frame, TransportError>>,
    from_client: mpsc::UnboundedReceiver<Frame>,
}

impl MockConnection {
    pub fn push_text(&self, text: &str) {
        let _ = self.to_client.send(Ok(Frame::Text(text.to_string())));
    }

    pub fn push_envelope(&self, envelope: &Envelope) {
        let text = serde_json::to_string(envelope).expect("envelope should serialize");
        self.push_text(&text);
    }

    /// Drop the connection without a closing handshake.
    pub fn reset(&self) {
        let _ = self
            .to_client
            .send(Err(TransportError::Other("connection reset by peer".to_string())));
    }

    /// Close the connection from the server side.
    pub fn close(&self) {
        let _ = self.to_client.send(Ok(Frame::Close));
    }

    /// Next frame the client sent, heartbeat frames included.
    pub async fn next_frame(&mut self) -> Frame {
        tokio::time::timeout(WAIT, self.from_client.recv())
            .await
            .expect("timed out waiting for a client frame")
            .expect("client transport dropped")
    }

    /// Next text frame the client sent, skipping heartbeat frames.
    pub async fn next_text(&mut self) -> serde_json::Value {
        loop {
            if let Frame::Text(text) = self.next_frame().await {
                return serde_json::from_str(&text).expect("client frame should be json");
            }
        }
    }

    pub async fn next_control(&mut self) -> ControlMessage {
        serde_json::from_value(self.next_text().await).expect("client frame should be a control message")
    }
}

/// Event observed by [`RecordingHandler`].
#[derive(Debug, Clone)]
pub enum Recorded {
    Connected,
    Message(Envelope),
    Closed(Termination),
}

pub struct RecordingHandler {
    events: mpsc::UnboundedSender<Recorded>,
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn on_connect(&self, _client: &LiveDataClient) {
        let _ = self.events.send(Recorded::Connected);
    }

    async fn on_message(&self, _client: &LiveDataClient, envelope: Envelope) {
        let _ = self.events.send(Recorded::Message(envelope));
    }

    async fn on_close(&self, _client: &LiveDataClient, termination: &Termination) {
        let _ = self.events.send(Recorded::Closed(termination.clone()));
    }
}

pub fn recording_handler() -> (RecordingHandler, EventLog) {
    let (events, rx) = mpsc::unbounded_channel();
    (RecordingHandler { events }, EventLog { rx })
}

/// Callback invocations in delivery order.
pub struct EventLog {
    rx: mpsc::UnboundedReceiver<Recorded>,
}

impl EventLog {
    pub async fn next(&mut self) -> Recorded {
        tokio::time::timeout(WAIT, self.rx.recv())
            .await
            .expect("timed out waiting for a callback")
            .expect("handler dropped")
    }

    pub async fn expect_connected(&mut self) {
        match self.next().await {
            Recorded::Connected => {}
            other => panic!("expected on_connect, got {other:?}"),
        }
    }

    pub async fn expect_message(&mut self) -> Envelope {
        match self.next().await {
            Recorded::Message(envelope) => envelope,
            other => panic!("expected on_message, got {other:?}"),
        }
    }

    pub async fn expect_closed(&mut self) -> Termination {
        match self.next().await {
            Recorded::Closed(termination) => termination,
            other => panic!("expected on_close, got {other:?}"),
        }
    }

    pub fn try_next(&mut self) -> Option<Recorded> {
        self.rx.try_recv().ok()
    }
}
