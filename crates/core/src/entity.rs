//! Typed entity identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A typed identifier pair: `(entity_type, entity_id)`.
///
/// `entity_type` is drawn from an open-ended but conventionally short set
/// (`user`, `group`, `agent`, `file`, `tenant`, ...); the namespace config
/// decides which types it knows relations for. `entity_id` is opaque to
/// this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Entity {
    /// The entity's type, e.g. `"user"`, `"group"`, `"file"`.
    pub entity_type: String,
    /// The entity's identifier within its type.
    pub entity_id: String,
}

impl Entity {
    /// Construct an entity from a type and id.
    pub fn new(entity_type: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Entity {
            entity_type: entity_type.into(),
            entity_id: entity_id.into(),
        }
    }

    /// The wildcard/public subject `(*, *)`. A tuple with this subject
    /// grants to all subjects regardless of type.
    pub fn wildcard() -> Self {
        Entity::new("*", "*")
    }

    /// Whether this entity is the wildcard subject.
    pub fn is_wildcard(&self) -> bool {
        self.entity_type == "*" && self.entity_id == "*"
    }

    /// Parse the conventional `type:id` userset shorthand, e.g. `"user:alice"`.
    pub fn parse(s: &str) -> Option<Self> {
        let (t, i) = s.split_once(':')?;
        Some(Entity::new(t, i))
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.entity_id)
    }
}
