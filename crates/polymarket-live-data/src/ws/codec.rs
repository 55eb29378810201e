/*
[INPUT]:  Outbound control messages / raw inbound frames
[OUTPUT]: Wire frames / decoded envelopes, acks and heartbeat frames
[POS]:    WebSocket layer - stateless envelope codec
[UPDATE]: When the control frame schema or inbound envelope format changes
*/

use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::types::{Envelope, Subscription, SubscriptionKey};

/// Transport-agnostic websocket frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
    Ping(Vec<u8>),
    Pong(Vec<u8>),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Subscribe,
    Unsubscribe,
}

/// Outbound subscribe/unsubscribe control frame
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControlMessage {
    pub action: Action,
    pub subscriptions: Vec<Subscription>,
}

impl ControlMessage {
    pub fn subscribe(subscriptions: Vec<Subscription>) -> Self {
        Self {
            action: Action::Subscribe,
            subscriptions,
        }
    }

    pub fn unsubscribe(keys: &[SubscriptionKey]) -> Self {
        Self {
            action: Action::Unsubscribe,
            subscriptions: keys
                .iter()
                .map(|key| Subscription::new(key.topic.clone(), key.selector.clone()))
                .collect(),
        }
    }
}

/// Decoded inbound frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Envelope(Envelope),
    /// Structured frame without a payload (subscription acks, notices)
    Ack(serde_json::Value),
    Pong,
    Ping(Vec<u8>),
    Close,
    Empty,
}

pub fn encode(message: &ControlMessage) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(message).map(Frame::Text)
}

pub fn encode_envelope(envelope: &Envelope) -> Result<Frame, serde_json::Error> {
    serde_json::to_string(envelope).map(Frame::Text)
}

pub fn ping_frame() -> Frame {
    Frame::Ping(Vec::new())
}

pub fn decode(frame: &Frame) -> Result<Inbound, DecodeError> {
    match frame {
        Frame::Text(text) => decode_text(text),
        Frame::Binary(bytes) => {
            let text = std::str::from_utf8(bytes).map_err(|_| DecodeError::NotUtf8)?;
            decode_text(text)
        }
        Frame::Ping(payload) => Ok(Inbound::Ping(payload.clone())),
        Frame::Pong(_) => Ok(Inbound::Pong),
        Frame::Close => Ok(Inbound::Close),
    }
}

fn decode_text(text: &str) -> Result<Inbound, DecodeError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(Inbound::Empty);
    }
    if trimmed.eq_ignore_ascii_case("pong") {
        return Ok(Inbound::Pong);
    }

    let value: serde_json::Value = serde_json::from_str(trimmed).map_err(DecodeError::NotJson)?;
    if value.get("payload").is_some() {
        return serde_json::from_value(value)
            .map(Inbound::Envelope)
            .map_err(DecodeError::MalformedEnvelope);
    }
    Ok(Inbound::Ack(value))
}
