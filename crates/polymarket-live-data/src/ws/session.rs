/*
[INPUT]:  Connector, subscription registry snapshot, outbound requests, inbound frames
[OUTPUT]: Decoded envelopes for dispatch, state transitions, a termination cause
[POS]:    WebSocket layer - one physical connection and its state machine
[UPDATE]: When changing handshake, heartbeat wiring, replay, or close behavior
*/

use std::fmt;
use std::sync::{Mutex, MutexGuard};

use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use super::client::Shared;
use super::codec::{self, ControlMessage, Frame, Inbound};
use super::handler::ClientEvent;
use super::heartbeat::{HeartbeatMonitor, Liveness};
use super::registry::SubscriptionRegistry;
use super::transport::Transport;
use crate::error::{DecodeError, TransportError};
use crate::types::Subscription;

const ACK_LOG_LIMIT: usize = 10;
const DECODE_FAIL_LOG_LIMIT: usize = 3;
const RAW_LOG_MAX_BYTES: usize = 1024;

/// Lifecycle of a connection session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Open => "open",
            SessionState::Closing => "closing",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Why a session ended.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TerminationCause {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("no pong within {timeout_ms}ms of ping")]
    HeartbeatTimeout { timeout_ms: u64 },

    #[error("connection closed by server")]
    ClosedByServer,

    #[error("connection closed by caller")]
    ExplicitClose,
}

impl TerminationCause {
    pub fn is_explicit(&self) -> bool {
        matches!(self, TerminationCause::ExplicitClose)
    }
}

impl From<TransportError> for TerminationCause {
    fn from(err: TransportError) -> Self {
        TerminationCause::Transport(err.to_string())
    }
}

/// Termination event raised when a session reaches `Closed`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Termination {
    pub session_id: Uuid,
    pub cause: TerminationCause,
    /// Whether the session ever reached `Open`
    pub was_open: bool,
}

/// Outbound request queued for the open session
#[derive(Debug, Clone)]
pub(crate) enum Outbound {
    Control(ControlMessage),
    Raw(serde_json::Value),
}

/// Sender half of the currently open session's outbound queue.
///
/// Empty whenever no session is `Open`; requests made then are dropped here
/// and picked up by the next replay instead. Registry changes are made while
/// holding [`OutboundSlot::lock`], so the wire sees them in registry order.
#[derive(Debug, Default)]
pub(crate) struct OutboundSlot {
    sender: Mutex<Option<mpsc::UnboundedSender<Outbound>>>,
}

/// Held lock on the slot.
pub(crate) struct OutboundGuard<'a> {
    sender: MutexGuard<'a, Option<mpsc::UnboundedSender<Outbound>>>,
}

impl OutboundGuard<'_> {
    /// Queue for the open session; `false` if none is open.
    pub(crate) fn send(&self, message: Outbound) -> bool {
        match self.sender.as_ref() {
            Some(sender) => sender.send(message).is_ok(),
            None => false,
        }
    }
}

impl OutboundSlot {
    /// Install `sender` and snapshot `registry` under one lock: any registry
    /// change lands either in the snapshot or as its own frame after it.
    fn install(
        &self,
        sender: mpsc::UnboundedSender<Outbound>,
        registry: &SubscriptionRegistry,
    ) -> Vec<Subscription> {
        let mut guard = self.lock();
        *guard.sender = Some(sender);
        registry.snapshot()
    }

    fn clear_if(&self, sender: &mpsc::UnboundedSender<Outbound>) {
        let mut guard = self.lock();
        if guard.sender.as_ref().is_some_and(|current| current.same_channel(sender)) {
            *guard.sender = None;
        }
    }

    pub(crate) fn send(&self, message: Outbound) -> bool {
        self.lock().send(message)
    }

    pub(crate) fn lock(&self) -> OutboundGuard<'_> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        OutboundGuard { sender }
    }
}

/// Run one session from `Connecting` to `Closed`.
pub(crate) async fn run_session(
    shared: &Shared,
    events: &mpsc::UnboundedSender<ClientEvent>,
    shutdown: &CancellationToken,
) -> Termination {
    let mut session = Session {
        id: Uuid::new_v4(),
        shared,
        events,
        acks_logged: 0,
        decode_failures: 0,
    };

    session.set_state(SessionState::Connecting);
    info!(session_id = %session.id, host = %shared.url, "connecting");

    let connect_timeout = shared.config.connect_timeout();
    let connect = tokio::time::timeout(connect_timeout, shared.connector.connect(&shared.url));
    let transport = tokio::select! {
        _ = shutdown.cancelled() => {
            return session.finish(TerminationCause::ExplicitClose, false);
        }
        result = connect => match result {
            Ok(Ok(transport)) => transport,
            Ok(Err(err)) => return session.finish(err.into(), false),
            Err(_) => {
                let err = TransportError::ConnectTimeout {
                    duration_ms: shared.config.connect_timeout_ms,
                };
                return session.finish(err.into(), false);
            }
        }
    };

    let cause = session.run_open(transport, shutdown).await;
    session.finish(cause, true)
}

struct Session<'a> {
    id: Uuid,
    shared: &'a Shared,
    events: &'a mpsc::UnboundedSender<ClientEvent>,
    acks_logged: usize,
    decode_failures: usize,
}

impl Session<'_> {
    fn set_state(&self, state: SessionState) {
        let previous = self.shared.state.send_replace(state);
        if previous != state {
            debug!(session_id = %self.id, from = %previous, to = %state, "session state changed");
        }
    }

    fn finish(&self, cause: TerminationCause, was_open: bool) -> Termination {
        self.set_state(SessionState::Closed);
        match &cause {
            TerminationCause::ExplicitClose => {
                info!(session_id = %self.id, "session closed");
            }
            cause => {
                warn!(session_id = %self.id, was_open, cause = %cause, "session terminated");
            }
        }
        Termination {
            session_id: self.id,
            cause,
            was_open,
        }
    }

    /// Owns the transport for the whole open phase; it is dropped, and the
    /// socket released, on every return path.
    async fn run_open(
        &mut self,
        mut transport: Box<dyn Transport>,
        shutdown: &CancellationToken,
    ) -> TerminationCause {
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let snapshot = self
            .shared
            .outbound
            .install(outbound_tx.clone(), &self.shared.registry);
        self.set_state(SessionState::Open);
        info!(session_id = %self.id, "session open");

        let mut heartbeat =
            HeartbeatMonitor::new(self.shared.config.ping_interval(), self.shared.config.pong_timeout());
        heartbeat.arm(Instant::now());
        let _ = self.events.send(ClientEvent::Connected);

        let cause = self
            .open_loop(transport.as_mut(), snapshot, &mut outbound_rx, &mut heartbeat, shutdown)
            .await;

        heartbeat.disarm();
        self.shared.outbound.clear_if(&outbound_tx);
        cause
    }

    async fn open_loop(
        &mut self,
        transport: &mut dyn Transport,
        snapshot: Vec<Subscription>,
        outbound_rx: &mut mpsc::UnboundedReceiver<Outbound>,
        heartbeat: &mut HeartbeatMonitor,
        shutdown: &CancellationToken,
    ) -> TerminationCause {
        if let Err(cause) = self.replay(transport, snapshot).await {
            return cause;
        }

        let interval = heartbeat.ping_interval();
        let mut ping_timer = tokio::time::interval_at(Instant::now() + interval, interval);
        ping_timer.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let pong_deadline = heartbeat.pong_deadline();
            tokio::select! {
                biased;

                _ = shutdown.cancelled() => {
                    return self.close_gracefully(transport).await;
                }
                _ = tokio::time::sleep_until(pong_deadline.unwrap_or_else(Instant::now)), if pong_deadline.is_some() => {
                    let now = Instant::now();
                    if heartbeat.check(now) == Liveness::TimedOut {
                        let timeout_ms = heartbeat.pong_timeout().as_millis() as u64;
                        let since_last_pong_ms = heartbeat
                            .last_pong()
                            .map(|at| now.saturating_duration_since(at).as_millis() as u64);
                        warn!(
                            session_id = %self.id,
                            timeout_ms,
                            since_last_pong_ms = ?since_last_pong_ms,
                            "pong not received in time"
                        );
                        return TerminationCause::HeartbeatTimeout { timeout_ms };
                    }
                }
                _ = ping_timer.tick() => {
                    if let Err(err) = transport.send(codec::ping_frame()).await {
                        return err.into();
                    }
                    heartbeat.on_ping_sent(Instant::now());
                    trace!(session_id = %self.id, "ping sent");
                }
                Some(outbound) = outbound_rx.recv() => {
                    if let Err(cause) = self.send_outbound(transport, outbound).await {
                        return cause;
                    }
                }
                inbound = transport.recv() => match inbound {
                    None => {
                        return TerminationCause::Transport("connection ended unexpectedly".to_string());
                    }
                    Some(Err(err)) => return err.into(),
                    Some(Ok(frame)) => {
                        if let Some(cause) = self.handle_frame(frame, heartbeat) {
                            return cause;
                        }
                    }
                },
            }
        }
    }

    /// Send the full registry snapshot as one subscribe frame.
    async fn replay(
        &self,
        transport: &mut dyn Transport,
        snapshot: Vec<Subscription>,
    ) -> Result<(), TerminationCause> {
        if snapshot.is_empty() {
            debug!(session_id = %self.id, "no subscriptions to replay");
            return Ok(());
        }

        let count = snapshot.len();
        let frame = codec::encode(&ControlMessage::subscribe(snapshot))
            .map_err(|err| TerminationCause::Protocol(format!("encode replay: {err}")))?;
        transport.send(frame).await?;
        info!(session_id = %self.id, subscriptions = count, "subscriptions replayed");
        Ok(())
    }

    async fn send_outbound(
        &self,
        transport: &mut dyn Transport,
        outbound: Outbound,
    ) -> Result<(), TerminationCause> {
        match outbound {
            Outbound::Control(message) => {
                let frame = codec::encode(&message)
                    .map_err(|err| TerminationCause::Protocol(format!("encode control frame: {err}")))?;
                transport.send(frame).await?;
                for subscription in &message.subscriptions {
                    info!(
                        session_id = %self.id,
                        action = ?message.action,
                        topic = %subscription.topic,
                        message_type = %subscription.selector,
                        has_filters = subscription.filters.is_some(),
                        has_auth = subscription.has_auth(),
                        "ws subscription sent"
                    );
                }
            }
            Outbound::Raw(value) => {
                transport.send(Frame::Text(value.to_string())).await?;
                debug!(session_id = %self.id, "raw frame sent");
            }
        }
        Ok(())
    }

    /// Returns a cause when the frame ends the session.
    fn handle_frame(&mut self, frame: Frame, heartbeat: &mut HeartbeatMonitor) -> Option<TerminationCause> {
        match codec::decode(&frame) {
            Ok(Inbound::Envelope(envelope)) => {
                trace!(
                    session_id = %self.id,
                    topic = %envelope.topic,
                    message_type = %envelope.message_type,
                    "envelope received"
                );
                let _ = self.events.send(ClientEvent::Message(envelope));
            }
            Ok(Inbound::Pong) => {
                heartbeat.on_pong(Instant::now());
                trace!(session_id = %self.id, "pong received");
            }
            Ok(Inbound::Ping(_)) => {
                trace!(session_id = %self.id, "ping received");
            }
            Ok(Inbound::Ack(value)) => self.log_ack(&value),
            Ok(Inbound::Empty) => {}
            Ok(Inbound::Close) => return Some(TerminationCause::ClosedByServer),
            Err(err) => self.log_decode_failure(&err, &frame),
        }
        None
    }

    async fn close_gracefully(&self, transport: &mut dyn Transport) -> TerminationCause {
        self.set_state(SessionState::Closing);

        if transport.send(Frame::Close).await.is_ok() {
            let confirm = async {
                loop {
                    match transport.recv().await {
                        Some(Ok(Frame::Close)) | Some(Err(_)) | None => break,
                        Some(Ok(_)) => continue,
                    }
                }
            };
            if tokio::time::timeout(self.shared.config.close_timeout(), confirm)
                .await
                .is_err()
            {
                debug!(session_id = %self.id, "close not confirmed in time; forcing closed");
            }
        }
        TerminationCause::ExplicitClose
    }

    fn log_ack(&mut self, value: &serde_json::Value) {
        self.acks_logged += 1;
        let preview = truncate_for_log(&value.to_string(), RAW_LOG_MAX_BYTES);
        if self.acks_logged <= ACK_LOG_LIMIT {
            info!(
                session_id = %self.id,
                sample_index = self.acks_logged,
                sample_limit = ACK_LOG_LIMIT,
                message = %preview,
                "ws control message"
            );
        } else {
            debug!(session_id = %self.id, message = %preview, "ws control message");
        }
    }

    fn log_decode_failure(&mut self, err: &DecodeError, frame: &Frame) {
        self.decode_failures += 1;
        let raw = match frame {
            Frame::Text(text) => truncate_for_log(text, RAW_LOG_MAX_BYTES),
            Frame::Binary(bytes) => format!("<{} binary bytes>", bytes.len()),
            _ => String::new(),
        };
        if self.decode_failures <= DECODE_FAIL_LOG_LIMIT {
            warn!(
                session_id = %self.id,
                sample_index = self.decode_failures,
                sample_limit = DECODE_FAIL_LOG_LIMIT,
                error = %err,
                message = %raw,
                "ws message parse failed; frame discarded"
            );
        } else {
            debug!(session_id = %self.id, error = %err, message = %raw, "ws message parse failed");
        }
    }
}

fn truncate_for_log(value: &str, max_len: usize) -> String {
    if value.len() <= max_len {
        return value.to_string();
    }
    let mut end = max_len;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    let mut out = String::with_capacity(end + 3);
    out.push_str(&value[..end]);
    out.push_str("...");
    out
}
