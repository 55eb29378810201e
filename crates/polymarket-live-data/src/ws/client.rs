/*
[INPUT]:  Caller configuration, event handler, subscribe/unsubscribe requests
[OUTPUT]: A managed live data connection and callback invocations
[POS]:    WebSocket layer - client facade, the only public entry point
[UPDATE]: When the public client API or connection ownership changes
*/

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

use super::codec::ControlMessage;
use super::handler::{self, EventHandler};
use super::registry::SubscriptionRegistry;
use super::session::{Outbound, OutboundSlot, SessionState, Termination};
use super::supervisor;
use super::transport::{Connector, TungsteniteConnector};
use crate::config::{ClientConfig, UnmatchedUnsubscribe};
use crate::error::{ClientError, Result, SubscriptionError, TransportError};
use crate::types::{Subscription, SubscriptionKey};

/// State shared between the facade, the supervisor and the open session.
pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) url: Url,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) state: watch::Sender<SessionState>,
    pub(crate) outbound: OutboundSlot,
    handler: Arc<dyn EventHandler>,
    shutdown: Mutex<Option<CancellationToken>>,
    finished: watch::Sender<Option<Termination>>,
}

/// Client for the live data push service.
///
/// Cheap to clone; all clones drive the same connection.
#[derive(Clone)]
pub struct LiveDataClient {
    shared: Arc<Shared>,
}

impl LiveDataClient {
    /// Create a client using the default websocket transport.
    pub fn new<H: EventHandler>(config: ClientConfig, handler: H) -> Result<Self> {
        Self::with_connector(config, handler, TungsteniteConnector)
    }

    /// Create a client with a custom transport connector.
    pub fn with_connector<H, C>(config: ClientConfig, handler: H, connector: C) -> Result<Self>
    where
        H: EventHandler,
        C: Connector,
    {
        config.validate()?;
        let url = config.endpoint()?;
        let (state, _) = watch::channel(SessionState::Closed);
        let (finished, _) = watch::channel(None);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                url,
                registry: SubscriptionRegistry::new(),
                connector: Arc::new(connector),
                state,
                outbound: OutboundSlot::default(),
                handler: Arc::new(handler),
                shutdown: Mutex::new(None),
                finished,
            }),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.shared.config
    }

    /// Start connecting in the background.
    ///
    /// Fails with [`ClientError::AlreadyConnected`] while a previous
    /// `connect()` is still being managed, including while it waits to
    /// reconnect.
    pub fn connect(&self) -> Result<()> {
        let mut shutdown_slot = self.lock_shutdown();
        if shutdown_slot.is_some() && self.shared.finished.borrow().is_none() {
            return Err(ClientError::AlreadyConnected);
        }

        let runtime = tokio::runtime::Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let shutdown = CancellationToken::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        self.shared.finished.send_replace(None);
        *shutdown_slot = Some(shutdown.clone());
        drop(shutdown_slot);

        info!(host = %self.shared.url, auto_reconnect = self.shared.config.auto_reconnect, "starting live data client");

        runtime.spawn(handler::dispatch(self.clone(), events_rx));

        let shared = Arc::clone(&self.shared);
        runtime.spawn(async move {
            let termination = supervisor::supervise(Arc::clone(&shared), events_tx, shutdown).await;
            info!(session_id = %termination.session_id, cause = %termination.cause, "live data client stopped");
            shared.finished.send_replace(Some(termination));
        });

        Ok(())
    }

    /// Close the connection and suppress reconnects for this shutdown.
    ///
    /// Returns once the socket has been released. Callbacks already queued
    /// may still run afterwards.
    pub async fn disconnect(&self) {
        let Some(shutdown) = self.lock_shutdown().clone() else {
            return;
        };
        shutdown.cancel();
        self.wait_finished().await;
    }

    /// Wait for the connection to stop for good and return the final
    /// termination. `None` if `connect()` was never called.
    pub async fn closed(&self) -> Option<Termination> {
        if self.lock_shutdown().is_none() {
            return None;
        }
        self.wait_finished().await
    }

    /// Connect and wait until the connection stops for good.
    pub async fn run(&self) -> Result<Termination> {
        self.connect()?;
        self.wait_finished()
            .await
            .ok_or(ClientError::Transport(TransportError::Closed))
    }

    /// Register subscriptions and send them if a session is open.
    ///
    /// While not open, the registry is still updated and the next session
    /// replays it.
    pub fn subscribe(&self, subscriptions: Vec<Subscription>) -> Result<()> {
        if subscriptions.is_empty() {
            return Err(SubscriptionError::EmptyRequest.into());
        }
        for subscription in &subscriptions {
            subscription.validate()?;
        }

        let normalized = subscriptions.into_iter().map(Subscription::normalized).collect();
        // Held across the registry change: wire order follows registry order.
        let outbound = self.shared.outbound.lock();
        let inserted = self.shared.registry.add(normalized);
        if inserted.is_empty() {
            debug!("subscriptions already registered");
            return Ok(());
        }

        let count = inserted.len();
        if !outbound.send(Outbound::Control(ControlMessage::subscribe(inserted))) {
            debug!(subscriptions = count, "not connected; subscribe deferred to next replay");
        }
        Ok(())
    }

    /// Remove every registered subscription matching each key's topic and
    /// type, whatever its filters.
    ///
    /// Keys that match nothing are ignored or rejected according to
    /// [`ClientConfig::unmatched_unsubscribe`]. An exact type never matches
    /// a `*` registration.
    pub fn unsubscribe(&self, keys: Vec<SubscriptionKey>) -> Result<()> {
        if keys.is_empty() {
            return Err(SubscriptionError::EmptyRequest.into());
        }
        for key in &keys {
            key.validate()?;
        }

        let outbound = self.shared.outbound.lock();
        if self.shared.config.unmatched_unsubscribe == UnmatchedUnsubscribe::Reject
            && let Some(missing) = keys.iter().find(|key| !self.shared.registry.contains(key))
        {
            return Err(SubscriptionError::NoMatch {
                topic: missing.topic.clone(),
                message_type: missing.selector.to_string(),
            }
            .into());
        }

        let removed = self.shared.registry.remove(&keys);
        let matched: Vec<SubscriptionKey> = keys
            .into_iter()
            .zip(removed)
            .filter_map(|(key, count)| (count > 0).then_some(key))
            .collect();

        if matched.is_empty() {
            debug!("unsubscribe matched no registered subscription; nothing sent");
            return Ok(());
        }

        if !outbound.send(Outbound::Control(ControlMessage::unsubscribe(&matched))) {
            debug!(keys = matched.len(), "not connected; unsubscribe deferred to next replay");
        }
        Ok(())
    }

    /// Send an arbitrary JSON frame on the open session.
    ///
    /// Not recorded anywhere, so it is not replayed after a reconnect.
    pub fn send(&self, message: serde_json::Value) -> Result<()> {
        if self.shared.outbound.send(Outbound::Raw(message)) {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    /// Current desired subscription set.
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.shared.registry.snapshot()
    }

    pub fn state(&self) -> SessionState {
        *self.shared.state.borrow()
    }

    /// Watch session state transitions.
    pub fn state_changes(&self) -> watch::Receiver<SessionState> {
        self.shared.state.subscribe()
    }

    pub(crate) fn handler(&self) -> Arc<dyn EventHandler> {
        Arc::clone(&self.shared.handler)
    }

    async fn wait_finished(&self) -> Option<Termination> {
        let mut finished = self.shared.finished.subscribe();
        let result = finished.wait_for(Option::is_some).await;
        result.ok().and_then(|termination| termination.clone())
    }

    fn lock_shutdown(&self) -> MutexGuard<'_, Option<CancellationToken>> {
        self.shared
            .shutdown
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl std::fmt::Debug for LiveDataClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveDataClient")
            .field("host", &self.shared.config.host)
            .field("state", &self.state())
            .field("subscriptions", &self.shared.registry.len())
            .finish()
    }
}
