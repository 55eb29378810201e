/*
[INPUT]:  Decoded inbound data frames
[OUTPUT]: Envelope values handed to the message callback
[POS]:    Data layer - unit of delivery
[UPDATE]: When the inbound frame schema changes
*/

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use super::payloads::Payload;

/// One inbound message: topic, type and an opaque payload.
///
/// A missing topic or type decodes as an empty string; the payload is still
/// delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(default)]
    pub topic: String,
    #[serde(rename = "type", default)]
    pub message_type: String,
    /// Server timestamp in milliseconds since the epoch
    #[serde(
        default,
        deserialize_with = "deserialize_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub timestamp: Option<i64>,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn new(
        topic: impl Into<String>,
        message_type: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            topic: topic.into(),
            message_type: message_type.into(),
            timestamp: None,
            payload,
        }
    }

    pub fn with_timestamp(mut self, timestamp_ms: i64) -> Self {
        self.timestamp = Some(timestamp_ms);
        self
    }

    /// Server timestamp as a UTC datetime.
    pub fn time(&self) -> Option<DateTime<Utc>> {
        self.timestamp.and_then(DateTime::from_timestamp_millis)
    }

    /// Deserialize the payload into a caller-defined type.
    pub fn parse_payload<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.payload)
    }

    /// Interpret the payload using the known topic/type schemas.
    ///
    /// Falls back to [`Payload::Raw`] for unknown streams or payloads that do
    /// not match their schema.
    pub fn typed_payload(&self) -> Payload {
        Payload::from_envelope(self)
    }
}

// Fractional milliseconds are truncated.
fn deserialize_timestamp<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let number = Option::<serde_json::Number>::deserialize(deserializer)?;
    Ok(number.and_then(|number| number.as_i64().or_else(|| number.as_f64().map(|ms| ms as i64))))
}
