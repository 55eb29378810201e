/*
[INPUT]:  Envelope payloads for the known activity/comments streams
[OUTPUT]: Typed trade, comment and reaction models
[POS]:    Data layer - optional payload interpretation for callers
[UPDATE]: When the service changes a payload schema or adds a stream
*/

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::envelope::Envelope;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParentEntityType {
    Event,
    Series,
}

/// Trade on the `activity/trades` stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trade {
    /// ERC1155 token id of the traded conditional token
    pub asset: String,
    #[serde(default)]
    pub bio: String,
    /// Market id, also the CTF condition id
    pub condition_id: String,
    pub event_slug: String,
    #[serde(default)]
    pub icon: String,
    #[serde(default)]
    pub name: String,
    pub outcome: String,
    pub outcome_index: i64,
    pub price: Decimal,
    #[serde(default)]
    pub profile_image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile_image_optimized: Option<String>,
    pub proxy_wallet: String,
    #[serde(default)]
    pub pseudonym: String,
    pub side: TradeSide,
    pub size: Decimal,
    pub slug: String,
    pub timestamp: i64,
    pub title: String,
    pub transaction_hash: String,
}

/// Comment on the `comments` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub body: String,
    pub parent_entity_type: ParentEntityType,
    #[serde(rename = "parentEntityID")]
    pub parent_entity_id: i64,
    #[serde(rename = "parentCommentID", default)]
    pub parent_comment_id: Option<String>,
    pub user_address: String,
    #[serde(default)]
    pub reply_address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Reaction on the `comments` topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    #[serde(rename = "commentID")]
    pub comment_id: i64,
    pub reaction_type: String,
    #[serde(default)]
    pub icon: String,
    pub user_address: String,
    pub created_at: String,
}

/// Payload interpreted by topic and type
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Trade(Trade),
    Comment(Comment),
    Reaction(Reaction),
    /// Unknown stream, or a payload that did not fit its schema
    Raw(serde_json::Value),
}

impl Payload {
    pub(crate) fn from_envelope(envelope: &Envelope) -> Self {
        let parsed = match (envelope.topic.as_str(), envelope.message_type.as_str()) {
            ("activity", "trades") => envelope.parse_payload().map(Payload::Trade),
            ("comments", "comment_created" | "comment_removed") => {
                envelope.parse_payload().map(Payload::Comment)
            }
            ("comments", "reaction_created" | "reaction_removed") => {
                envelope.parse_payload().map(Payload::Reaction)
            }
            _ => return Payload::Raw(envelope.payload.clone()),
        };

        parsed.unwrap_or_else(|err| {
            debug!(
                topic = %envelope.topic,
                message_type = %envelope.message_type,
                error = %err,
                "payload did not match schema; keeping raw value"
            );
            Payload::Raw(envelope.payload.clone())
        })
    }
}
