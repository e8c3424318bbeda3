//! Zone Manager: multi-tenant isolation enforcement.
//!
//! A zone is an administrative boundary — typically a tenant or
//! organization. Tuples, events, and caches are partitioned by `zone_id`
//! except for an explicit allow-list of cross-zone relations.

use nexus_core::{Error, Result, ZoneId};

const CROSS_ZONE_RELATIONS: &[&str] = &["shared-viewer", "shared-editor", "shared-owner"];

/// Enforces zone isolation on writes and decides which relations read
/// across zone boundaries.
#[derive(Debug, Clone, Default)]
pub struct ZoneManager {
    enforce: bool,
}

impl ZoneManager {
    /// A manager with isolation enforcement on (the default posture).
    pub fn new() -> Self {
        ZoneManager { enforce: true }
    }

    /// Build a manager with isolation enforcement explicitly configured.
    pub fn with_enforcement(enforce: bool) -> Self {
        ZoneManager { enforce }
    }

    /// Whether `relation` is on the cross-zone allow-list.
    pub fn is_cross_zone_readable(&self, relation: &str) -> bool {
        CROSS_ZONE_RELATIONS.contains(&relation)
    }

    /// Validate that a write from `subject_zone` onto `object_zone` using
    /// `relation` is permitted.
    ///
    /// Succeeds if the zones match, or if enforcement is off, or if the
    /// relation is on the cross-zone allow-list; otherwise fails with
    /// [`Error::ZoneIsolation`].
    pub fn validate_write(
        &self,
        subject_zone: &ZoneId,
        object_zone: &ZoneId,
        relation: &str,
    ) -> Result<()> {
        if !self.enforce || subject_zone == object_zone || self.is_cross_zone_readable(relation) {
            return Ok(());
        }
        Err(Error::ZoneIsolation(format!(
            "write from zone {subject_zone} to zone {object_zone} via relation {relation} is not allowed"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_zone_write_allowed() {
        let zm = ZoneManager::new();
        let z = ZoneId::new("default");
        assert!(zm.validate_write(&z, &z, "viewer").is_ok());
    }

    #[test]
    fn cross_zone_non_shared_relation_rejected() {
        let zm = ZoneManager::new();
        let a = ZoneId::new("tenant-a");
        let b = ZoneId::new("tenant-b");
        let err = zm.validate_write(&a, &b, "direct_viewer").unwrap_err();
        assert!(matches!(err, nexus_core::Error::ZoneIsolation(_)));
    }

    #[test]
    fn cross_zone_shared_relation_allowed() {
        let zm = ZoneManager::new();
        let a = ZoneId::new("tenant-a");
        let b = ZoneId::new("tenant-b");
        assert!(zm.validate_write(&a, &b, "shared-viewer").is_ok());
    }

    #[test]
    fn enforcement_off_allows_any_write() {
        let zm = ZoneManager::with_enforcement(false);
        let a = ZoneId::new("tenant-a");
        let b = ZoneId::new("tenant-b");
        assert!(zm.validate_write(&a, &b, "direct_viewer").is_ok());
    }
}
