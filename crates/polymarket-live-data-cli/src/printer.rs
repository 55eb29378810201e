/*
[INPUT]:  Client lifecycle callbacks and delivered envelopes
[OUTPUT]: Structured log lines per event
[POS]:    Event handling - runner's EventHandler implementation
[UPDATE]: When adding typed payloads worth summarizing
*/

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use tracing::{info, warn};

use polymarket_live_data::{Envelope, EventHandler, LiveDataClient, Payload, Termination};

/// Logs every event the client delivers.
#[derive(Debug, Default)]
pub struct LogPrinter {
    received: AtomicU64,
}

impl LogPrinter {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl EventHandler for LogPrinter {
    async fn on_connect(&self, client: &LiveDataClient) {
        info!(subscriptions = client.subscriptions().len(), "connected");
    }

    async fn on_message(&self, _client: &LiveDataClient, envelope: Envelope) {
        let seq = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        let at = envelope.time().map(|time| time.to_rfc3339()).unwrap_or_default();

        match envelope.typed_payload() {
            Payload::Trade(trade) => info!(
                seq,
                at = %at,
                market = %trade.slug,
                outcome = %trade.outcome,
                side = ?trade.side,
                price = %trade.price,
                size = %trade.size,
                "trade"
            ),
            Payload::Comment(comment) => info!(
                seq,
                at = %at,
                message_type = %envelope.message_type,
                comment_id = %comment.id,
                entity = comment.parent_entity_id,
                body = %comment.body,
                "comment"
            ),
            Payload::Reaction(reaction) => info!(
                seq,
                at = %at,
                message_type = %envelope.message_type,
                comment_id = reaction.comment_id,
                reaction = %reaction.reaction_type,
                "reaction"
            ),
            Payload::Raw(payload) => info!(
                seq,
                at = %at,
                topic = %envelope.topic,
                message_type = %envelope.message_type,
                payload = %payload,
                "message"
            ),
        }
    }

    async fn on_close(&self, _client: &LiveDataClient, termination: &Termination) {
        if termination.cause.is_explicit() {
            info!(session_id = %termination.session_id, "connection closed");
        } else {
            warn!(
                session_id = %termination.session_id,
                was_open = termination.was_open,
                cause = %termination.cause,
                "connection lost"
            );
        }
    }
}
