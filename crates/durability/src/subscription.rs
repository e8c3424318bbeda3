//! Subscription Manager: pattern- and read-set-based reactive notifications.
//!
//! A subscription is either interested in events matching a glob pattern and
//! event-type filter, or in a fixed read set of `(entity_type, entity_id,
//! revision)` triples that it wants to be notified about as soon as any of
//! them advances past the recorded revision.

use std::collections::HashMap;

use dashmap::DashMap;
use uuid::Uuid;

use crate::event::Event;

/// How a subscription decides whether an event is relevant to it.
#[derive(Debug, Clone)]
pub enum SubscriptionMode {
    /// Glob patterns (matched against `Event::path`) and optional event-type
    /// filter; an empty `event_types` matches every type.
    Pattern {
        /// Patterns to match against the event's path; empty matches every path.
        patterns: Vec<String>,
        /// Event types to match; empty matches every type.
        event_types: Vec<String>,
    },
    /// A fixed read set; notified when any member's revision is exceeded.
    ReadSet {
        /// `(entity_type, entity_id, revision)` triples observed at subscribe time.
        reads: Vec<(String, String, i64)>,
    },
}

/// A registered reactive subscription.
#[derive(Debug, Clone)]
pub struct Subscription {
    /// Unique id for this subscription.
    pub subscription_id: Uuid,
    /// The connection this subscription's notifications should be dispatched on.
    pub connection_id: String,
    /// Zone this subscription is scoped to.
    pub zone_id: String,
    /// The interest expression.
    pub mode: SubscriptionMode,
    /// Opaque id echoed back in dispatched updates, e.g. a client query id.
    pub query_id: Option<String>,
}

/// One subscription's contribution to a dispatched batch.
#[derive(Debug, Clone)]
pub struct UpdateRef {
    /// The subscription that matched.
    pub subscription_id: Uuid,
    /// The subscription's client-supplied query id, if any.
    pub query_id: Option<String>,
}

/// One message dispatched to a single connection, grouping every
/// subscription on that connection that matched one event.
#[derive(Debug, Clone)]
pub struct BatchUpdate {
    /// Target connection.
    pub connection_id: String,
    /// Ordering key: messages on one connection are ordered by `commit_id`.
    pub commit_id: i64,
    /// Event timestamp, echoed for client display.
    pub timestamp: i64,
    /// The event that triggered this dispatch.
    pub event: Event,
    /// Every subscription on `connection_id` that matched.
    pub updates: Vec<UpdateRef>,
}

fn glob_match(pattern: &str, path: &str) -> bool {
    let p: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let t: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match_segments(&p, &t)
}

fn match_segments(pattern: &[&str], path: &[&str]) -> bool {
    match pattern.first() {
        None => path.is_empty(),
        Some(&"**") => match_segments(&pattern[1..], path) || (!path.is_empty() && match_segments(pattern, &path[1..])),
        Some(seg) => match path.split_first() {
            Some((first, rest)) => segment_matches(seg, first) && match_segments(&pattern[1..], rest),
            None => false,
        },
    }
}

fn segment_matches(pattern: &str, text: &str) -> bool {
    match pattern.split_once('*') {
        None => pattern == text,
        Some((prefix, suffix)) => text.starts_with(prefix) && text.ends_with(suffix) && text.len() >= prefix.len() + suffix.len(),
    }
}

/// Registry of active subscriptions and the dispatch logic for [`Event`]s.
#[derive(Default)]
pub struct SubscriptionManager {
    subscriptions: DashMap<Uuid, Subscription>,
    by_connection: DashMap<String, Vec<Uuid>>,
}

impl SubscriptionManager {
    /// An empty manager.
    pub fn new() -> Self {
        SubscriptionManager::default()
    }

    /// Register a subscription.
    pub fn register(&self, subscription: Subscription) {
        self.by_connection
            .entry(subscription.connection_id.clone())
            .or_default()
            .push(subscription.subscription_id);
        self.subscriptions.insert(subscription.subscription_id, subscription);
    }

    /// Remove one subscription.
    pub fn unregister(&self, subscription_id: Uuid) {
        if let Some((_, sub)) = self.subscriptions.remove(&subscription_id) {
            if let Some(mut ids) = self.by_connection.get_mut(&sub.connection_id) {
                ids.retain(|id| *id != subscription_id);
            }
        }
    }

    /// Drop every subscription on `connection_id` — called after a failed dispatch.
    pub fn cleanup_connection(&self, connection_id: &str) {
        if let Some((_, ids)) = self.by_connection.remove(connection_id) {
            for id in ids {
                self.subscriptions.remove(&id);
            }
        }
    }

    /// Find every subscription matching `event` and group them into one
    /// [`BatchUpdate`] per connection.
    pub fn publish(&self, event: &Event) -> Vec<BatchUpdate> {
        let mut groups: HashMap<String, Vec<UpdateRef>> = HashMap::new();
        for item in self.subscriptions.iter() {
            let sub = item.value();
            if sub.zone_id != event.zone_id {
                continue;
            }
            if matches(sub, event) {
                groups.entry(sub.connection_id.clone()).or_default().push(UpdateRef {
                    subscription_id: sub.subscription_id,
                    query_id: sub.query_id.clone(),
                });
            }
        }
        groups
            .into_iter()
            .map(|(connection_id, updates)| BatchUpdate {
                connection_id,
                commit_id: event.revision,
                timestamp: event.timestamp,
                event: event.clone(),
                updates,
            })
            .collect()
    }
}

fn matches(sub: &Subscription, event: &Event) -> bool {
    match &sub.mode {
        SubscriptionMode::Pattern { patterns, event_types } => {
            let type_ok = event_types.is_empty() || event_types.iter().any(|t| t == &event.event_type);
            let path_ok = match &event.path {
                Some(p) => patterns.is_empty() || patterns.iter().any(|pat| glob_match(pat, p)),
                None => patterns.is_empty(),
            };
            type_ok && path_ok
        }
        SubscriptionMode::ReadSet { reads } => reads.iter().any(|(entity_type, entity_id, revision)| {
            event.entity_type.as_deref() == Some(entity_type.as_str())
                && event.entity_id.as_deref() == Some(entity_id.as_str())
                && event.revision > *revision
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern_sub(connection: &str, pattern: &str) -> Subscription {
        Subscription {
            subscription_id: Uuid::new_v4(),
            connection_id: connection.to_string(),
            zone_id: "z1".to_string(),
            mode: SubscriptionMode::Pattern {
                patterns: vec![pattern.to_string()],
                event_types: vec![],
            },
            query_id: None,
        }
    }

    #[test]
    fn pattern_subscription_matches_path() {
        let mgr = SubscriptionManager::new();
        mgr.register(pattern_sub("conn-1", "/docs/*"));
        let updates = mgr.publish(&Event::filesystem("write", "/docs/a.txt", "z1", 1, 0));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].connection_id, "conn-1");
    }

    #[test]
    fn pattern_subscription_ignores_other_zone() {
        let mgr = SubscriptionManager::new();
        mgr.register(pattern_sub("conn-1", "/docs/*"));
        let updates = mgr.publish(&Event::filesystem("write", "/docs/a.txt", "z2", 1, 0));
        assert!(updates.is_empty());
    }

    #[test]
    fn multiple_subscriptions_same_connection_batch_together() {
        let mgr = SubscriptionManager::new();
        mgr.register(pattern_sub("conn-1", "/docs/*"));
        mgr.register(pattern_sub("conn-1", "/docs/a.txt"));
        let updates = mgr.publish(&Event::filesystem("write", "/docs/a.txt", "z1", 1, 0));
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].updates.len(), 2);
    }

    #[test]
    fn read_set_subscription_fires_when_revision_advances() {
        let mgr = SubscriptionManager::new();
        mgr.register(Subscription {
            subscription_id: Uuid::new_v4(),
            connection_id: "conn-2".to_string(),
            zone_id: "z1".to_string(),
            mode: SubscriptionMode::ReadSet {
                reads: vec![("file".to_string(), "doc1".to_string(), 5)],
            },
            query_id: None,
        });
        let stale = Event::entity("tuple_write", "file", "doc1", "z1", 5, 0);
        assert!(mgr.publish(&stale).is_empty());

        let fresh = Event::entity("tuple_write", "file", "doc1", "z1", 6, 0);
        assert_eq!(mgr.publish(&fresh).len(), 1);
    }

    #[test]
    fn cleanup_connection_drops_its_subscriptions() {
        let mgr = SubscriptionManager::new();
        mgr.register(pattern_sub("conn-1", "/docs/*"));
        mgr.cleanup_connection("conn-1");
        let updates = mgr.publish(&Event::filesystem("write", "/docs/a.txt", "z1", 1, 0));
        assert!(updates.is_empty());
    }
}
