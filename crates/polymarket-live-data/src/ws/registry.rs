/*
[INPUT]:  Caller subscribe/unsubscribe requests
[OUTPUT]: Desired subscription set and atomic snapshots for replay
[POS]:    WebSocket layer - process-local source of truth for subscriptions
[UPDATE]: When changing subscription identity or removal semantics
*/

use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::types::{Subscription, SubscriptionKey};

/// Everything the caller currently wants delivered.
///
/// Lives in memory only. Every session that reaches `Open` replays the full
/// snapshot, which is how subscriptions survive reconnects.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<Subscription>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert subscriptions, skipping any whose identity (topic, type,
    /// filters) is already registered.
    ///
    /// Returns the entries that were actually inserted.
    pub fn add(&self, subscriptions: Vec<Subscription>) -> Vec<Subscription> {
        let mut entries = self.write();
        let mut inserted = Vec::new();
        for subscription in subscriptions {
            let identity = subscription.identity();
            if entries.iter().any(|entry| entry.identity() == identity) {
                continue;
            }
            entries.push(subscription.clone());
            inserted.push(subscription);
        }
        inserted
    }

    /// Remove every entry sharing topic and type with any of `keys`,
    /// regardless of filters.
    ///
    /// Returns how many entries each key removed, in key order.
    pub fn remove(&self, keys: &[SubscriptionKey]) -> Vec<usize> {
        let mut entries = self.write();
        keys.iter()
            .map(|key| {
                let before = entries.len();
                entries.retain(|entry| entry.topic != key.topic || entry.selector != key.selector);
                before - entries.len()
            })
            .collect()
    }

    /// Whether any entry has this topic and type.
    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.read()
            .iter()
            .any(|entry| entry.topic == key.topic && entry.selector == key.selector)
    }

    /// Consistent copy of the current set, in insertion order.
    pub fn snapshot(&self) -> Vec<Subscription> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Poisoning is ignored: every mutation leaves the Vec whole.
    fn read(&self) -> RwLockReadGuard<'_, Vec<Subscription>> {
        self.entries
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Vec<Subscription>> {
        self.entries
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
