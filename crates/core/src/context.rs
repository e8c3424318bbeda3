//! The per-request operation context.
//!
//! `OperationContext` is the only piece of per-request mutable state that
//! flows through Nexus; there is no other module-level mutable state beyond
//! the three explicitly-initialized singletons (namespace config, local
//! disk cache, WAL segment writer — see each crate's top-level docs).

use crate::value::AttributeContext;
use crate::zone::ZoneId;
use crate::entity::Entity;

/// Per-request context threaded through every mutating and read operation.
#[derive(Debug, Clone)]
pub struct OperationContext {
    /// The identity performing the operation.
    pub subject: Entity,
    /// The zone the operation is scoped to.
    pub zone: ZoneId,
    /// Attributes available to ABAC condition evaluation (user/request attrs).
    pub attributes: AttributeContext,
    /// Whether this context is allowed to bypass normal authorization checks
    /// (system/admin operations such as share-link revocation by an admin).
    pub is_admin: bool,
}

impl OperationContext {
    /// Construct a context for an ordinary (non-admin) subject.
    pub fn new(subject: Entity, zone: ZoneId) -> Self {
        OperationContext {
            subject,
            zone,
            attributes: AttributeContext::new(),
            is_admin: false,
        }
    }

    /// Construct an admin/system context that bypasses ownership checks.
    pub fn admin(zone: ZoneId) -> Self {
        OperationContext {
            subject: Entity::new("system", "admin"),
            zone,
            attributes: AttributeContext::new(),
            is_admin: true,
        }
    }

    /// Attach an attribute, for ABAC condition evaluation.
    pub fn with_attribute(mut self, key: impl Into<String>, value: crate::value::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}
