//! The filesystem mutation event recorded by the WAL and dispatched by the
//! subscription manager.

use serde::{Deserialize, Serialize};

/// One append-only log entry: a filesystem mutation or an authorization
/// tuple change, either of which advances a zone's revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Event {
    /// Event kind, e.g. `"write"`, `"delete"`, `"mkdir"`, `"tuple_write"`.
    pub event_type: String,
    /// Display-form virtual path affected, when this is a filesystem event.
    pub path: Option<String>,
    /// Entity type affected, when this event should satisfy read-set subscriptions.
    pub entity_type: Option<String>,
    /// Entity id affected, when this event should satisfy read-set subscriptions.
    pub entity_id: Option<String>,
    /// Zone the event occurred in.
    pub zone_id: String,
    /// Monotonic revision within `zone_id`.
    pub revision: i64,
    /// Unix millis the event was recorded.
    pub timestamp: i64,
}

impl Event {
    /// Construct a filesystem mutation event.
    pub fn filesystem(event_type: impl Into<String>, path: impl Into<String>, zone_id: impl Into<String>, revision: i64, timestamp: i64) -> Self {
        Event {
            event_type: event_type.into(),
            path: Some(path.into()),
            entity_type: None,
            entity_id: None,
            zone_id: zone_id.into(),
            revision,
            timestamp,
        }
    }

    /// Construct an entity-revision event (e.g. a tuple write) for read-set subscriptions.
    pub fn entity(
        event_type: impl Into<String>,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        zone_id: impl Into<String>,
        revision: i64,
        timestamp: i64,
    ) -> Self {
        Event {
            event_type: event_type.into(),
            path: None,
            entity_type: Some(entity_type.into()),
            entity_id: Some(entity_id.into()),
            zone_id: zone_id.into(),
            revision,
            timestamp,
        }
    }
}
