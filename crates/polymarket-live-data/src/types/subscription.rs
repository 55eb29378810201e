/*
[INPUT]:  Caller subscribe/unsubscribe requests and the subscribe wire schema
[OUTPUT]: Subscription, type selector and key types
[POS]:    Data layer - subscription model shared by registry and codec
[UPDATE]: When the subscribe schema gains fields
*/

use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::auth::{ClobApiKeyCreds, Credentials, GammaAuth};
use crate::error::SubscriptionError;

const WILDCARD: &str = "*";

/// Message type selector within a topic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeSelector {
    /// A single message type, e.g. `trades`
    Exact(String),
    /// Every type under the topic (`*` on the wire)
    All,
}

impl TypeSelector {
    pub fn as_str(&self) -> &str {
        match self {
            TypeSelector::Exact(name) => name,
            TypeSelector::All => WILDCARD,
        }
    }

    pub fn is_all(&self) -> bool {
        matches!(self, TypeSelector::All)
    }
}

impl From<&str> for TypeSelector {
    fn from(value: &str) -> Self {
        if value == WILDCARD {
            TypeSelector::All
        } else {
            TypeSelector::Exact(value.to_string())
        }
    }
}

impl From<String> for TypeSelector {
    fn from(value: String) -> Self {
        if value == WILDCARD {
            TypeSelector::All
        } else {
            TypeSelector::Exact(value)
        }
    }
}

impl fmt::Display for TypeSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for TypeSelector {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for TypeSelector {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(TypeSelector::from)
    }
}

/// Key used to remove subscriptions: topic plus type selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionKey {
    pub topic: String,
    #[serde(rename = "type")]
    pub selector: TypeSelector,
}

impl SubscriptionKey {
    pub fn new(topic: impl Into<String>, selector: impl Into<TypeSelector>) -> Self {
        Self {
            topic: topic.into(),
            selector: selector.into(),
        }
    }

    pub fn validate(&self) -> Result<(), SubscriptionError> {
        validate_parts(&self.topic, &self.selector)
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.topic, self.selector)
    }
}

/// Identity of a registered subscription: topic, type selector and filters.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionIdentity {
    pub topic: String,
    pub selector: TypeSelector,
    pub filters: Option<String>,
}

/// A caller's interest in one (topic, type) stream.
#[derive(Debug, Clone)]
pub struct Subscription {
    pub topic: String,
    pub selector: TypeSelector,
    /// Opaque server-side criteria, forwarded verbatim
    pub filters: Option<String>,
    pub auth: Option<Credentials>,
}

impl Subscription {
    pub fn new(topic: impl Into<String>, selector: impl Into<TypeSelector>) -> Self {
        Self {
            topic: topic.into(),
            selector: selector.into(),
            filters: None,
            auth: None,
        }
    }

    /// Subscribe to every type under `topic`.
    pub fn all(topic: impl Into<String>) -> Self {
        Self::new(topic, TypeSelector::All)
    }

    pub fn with_filters(mut self, filters: impl Into<String>) -> Self {
        self.filters = Some(filters.into());
        self
    }

    pub fn with_auth(mut self, auth: Credentials) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey {
            topic: self.topic.clone(),
            selector: self.selector.clone(),
        }
    }

    pub fn identity(&self) -> SubscriptionIdentity {
        SubscriptionIdentity {
            topic: self.topic.clone(),
            selector: self.selector.clone(),
            filters: self.filters.clone(),
        }
    }

    pub fn has_auth(&self) -> bool {
        self.auth.is_some()
    }

    pub fn validate(&self) -> Result<(), SubscriptionError> {
        validate_parts(&self.topic, &self.selector)
    }

    /// Filters carry no meaning at all-types granularity, so they are dropped.
    pub(crate) fn normalized(mut self) -> Self {
        if self.selector.is_all() && self.filters.take().is_some() {
            tracing::debug!(
                topic = %self.topic,
                "dropping filters on wildcard subscription"
            );
        }
        self
    }
}

fn validate_parts(topic: &str, selector: &TypeSelector) -> Result<(), SubscriptionError> {
    if topic.trim().is_empty() {
        return Err(SubscriptionError::EmptyTopic);
    }
    if let TypeSelector::Exact(name) = selector
        && name.trim().is_empty()
    {
        return Err(SubscriptionError::EmptyType);
    }
    Ok(())
}

#[derive(Serialize)]
struct SubscriptionWire<'a> {
    topic: &'a str,
    #[serde(rename = "type")]
    selector: &'a TypeSelector,
    #[serde(skip_serializing_if = "Option::is_none")]
    filters: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    clob_auth: Option<&'a ClobApiKeyCreds>,
    #[serde(skip_serializing_if = "Option::is_none")]
    gamma_auth: Option<&'a GammaAuth>,
}

#[derive(Deserialize)]
struct SubscriptionOwned {
    topic: String,
    #[serde(rename = "type")]
    selector: TypeSelector,
    #[serde(default)]
    filters: Option<String>,
    #[serde(default)]
    clob_auth: Option<ClobApiKeyCreds>,
    #[serde(default)]
    gamma_auth: Option<GammaAuth>,
}

impl Serialize for Subscription {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let (clob_auth, gamma_auth) = match &self.auth {
            Some(Credentials::Clob(creds)) => (Some(creds), None),
            Some(Credentials::Gamma(creds)) => (None, Some(creds)),
            None => (None, None),
        };
        SubscriptionWire {
            topic: &self.topic,
            selector: &self.selector,
            filters: self.filters.as_deref(),
            clob_auth,
            gamma_auth,
        }
        .serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Subscription {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = SubscriptionOwned::deserialize(deserializer)?;
        let auth = match (raw.clob_auth, raw.gamma_auth) {
            (Some(_), Some(_)) => {
                return Err(D::Error::custom(
                    "subscription may carry clob_auth or gamma_auth, not both",
                ));
            }
            (Some(creds), None) => Some(Credentials::Clob(creds)),
            (None, Some(creds)) => Some(Credentials::Gamma(creds)),
            (None, None) => None,
        };
        Ok(Self {
            topic: raw.topic,
            selector: raw.selector,
            filters: raw.filters,
            auth,
        })
    }
}
