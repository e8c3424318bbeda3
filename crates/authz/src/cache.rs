//! Permission Cache: result cache and directory-visibility cache.
//!
//! Two independent sub-caches, both TTL-bounded and both invalidated
//! synchronously by tuple writes before the write returns (see the crate's
//! `engine` module for the orchestration). The directory-visibility cache
//! additionally supports an optional per-subject bitmap reverse-index for
//! O(1) ancestor-visibility decisions.

use dashmap::DashMap;
use nexus_core::{Entity, ZoneId};
use std::time::{Duration, Instant};
use tracing::debug;

type ResultKey = (String, String, String, String, String); // (subject_type, subject_id, permission, object_type+id, zone)

fn result_key(subject: &Entity, permission: &str, object: &Entity, zone: &ZoneId) -> ResultKey {
    (
        subject.entity_type.clone(),
        subject.entity_id.clone(),
        permission.to_string(),
        format!("{}:{}", object.entity_type, object.entity_id),
        zone.0.clone(),
    )
}

struct ResultEntry {
    value: bool,
    expires_at: Instant,
}

type VisibilityKey = (String, String, String, String); // (zone, subject_type, subject_id, dir_path)

struct VisibilityEntry {
    visible: bool,
    reason: String,
    expires_at: Instant,
}

/// The two-tier permission cache.
pub struct PermissionCache {
    ttl: Duration,
    results: DashMap<ResultKey, ResultEntry>,
    visibility: DashMap<VisibilityKey, VisibilityEntry>,
    /// Per-subject reverse index: resource ids visible to a subject, used as
    /// the fast path for directory-visibility decisions. Keyed by
    /// `(zone, subject_type, subject_id)`.
    visible_resources: DashMap<(String, String, String), Vec<String>>,
}

impl PermissionCache {
    /// A cache with the given TTL for both sub-caches.
    pub fn new(ttl: Duration) -> Self {
        PermissionCache {
            ttl,
            results: DashMap::new(),
            visibility: DashMap::new(),
            visible_resources: DashMap::new(),
        }
    }

    /// Look up a cached permission result, if present and unexpired.
    pub fn get_result(&self, subject: &Entity, permission: &str, object: &Entity, zone: &ZoneId) -> Option<bool> {
        let key = result_key(subject, permission, object, zone);
        self.results.get(&key).and_then(|e| {
            if e.expires_at > Instant::now() {
                Some(e.value)
            } else {
                None
            }
        })
    }

    /// Cache a permission result.
    pub fn put_result(&self, subject: &Entity, permission: &str, object: &Entity, zone: &ZoneId, value: bool) {
        let key = result_key(subject, permission, object, zone);
        self.results.insert(key, ResultEntry { value, expires_at: Instant::now() + self.ttl });
    }

    /// Invalidate every cached result in a zone (coarse — used on any write
    /// whose downstream blast radius isn't precisely known).
    pub fn invalidate_zone(&self, zone: &ZoneId) {
        let before = self.results.len() + self.visibility.len();
        self.results.retain(|k, _| k.4 != zone.0);
        self.visibility.retain(|k, _| k.0 != zone.0);
        self.visible_resources.retain(|k, _| k.0 != zone.0);
        let evicted = before - (self.results.len() + self.visibility.len());
        debug!(zone = %zone.0, evicted, "permission cache evicted on zone invalidation");
    }

    /// Invalidate cached results for one object (precise — used on tuple
    /// writes targeting that object).
    pub fn invalidate_object(&self, object: &Entity, zone: &ZoneId) {
        let needle = format!("{}:{}", object.entity_type, object.entity_id);
        let before = self.results.len();
        self.results.retain(|k, _| !(k.3 == needle && k.4 == zone.0));
        debug!(object = %needle, evicted = before - self.results.len(), "permission cache evicted for object");
    }

    /// Invalidate cached results that could depend on a Leopard membership
    /// change for `member_id`/`group_id`.
    pub fn invalidate_membership(&self, member_id: &str, group_id: &str) {
        let before = self.results.len();
        self.results.retain(|k, _| k.1 != member_id && k.1 != group_id);
        debug!(member_id, group_id, evicted = before - self.results.len(), "permission cache evicted for membership change");
    }

    /// Look up directory visibility for `(zone, subject, dir_path)`.
    pub fn get_visibility(&self, zone: &ZoneId, subject: &Entity, dir_path: &str) -> Option<(bool, String)> {
        if let Some(resources) = self.visible_resources.get(&(zone.0.clone(), subject.entity_type.clone(), subject.entity_id.clone())) {
            let visible = resources.iter().any(|r| r.starts_with(dir_path));
            return Some((visible, "bitmap".to_string()));
        }
        let key = (zone.0.clone(), subject.entity_type.clone(), subject.entity_id.clone(), dir_path.to_string());
        self.visibility.get(&key).and_then(|e| {
            if e.expires_at > Instant::now() {
                Some((e.visible, e.reason.clone()))
            } else {
                None
            }
        })
    }

    /// Cache a directory-visibility decision.
    pub fn put_visibility(&self, zone: &ZoneId, subject: &Entity, dir_path: &str, visible: bool, reason: impl Into<String>) {
        let key = (zone.0.clone(), subject.entity_type.clone(), subject.entity_id.clone(), dir_path.to_string());
        self.visibility.insert(
            key,
            VisibilityEntry {
                visible,
                reason: reason.into(),
                expires_at: Instant::now() + self.ttl,
            },
        );
    }

    /// Record that `resource_path` is visible to `subject`, extending the
    /// per-subject reverse-bitmap index.
    pub fn mark_resource_visible(&self, zone: &ZoneId, subject: &Entity, resource_path: &str) {
        self.visible_resources
            .entry((zone.0.clone(), subject.entity_type.clone(), subject.entity_id.clone()))
            .or_default()
            .push(resource_path.to_string());
    }

    /// Invalidate directory visibility along a resource's ancestor chain:
    /// `/a/b/c/file` invalidates `/a/b/c`, `/a/b`, `/a`, and `/`, within
    /// `zone`.
    pub fn invalidate_ancestor_chain(&self, zone: &ZoneId, resource_path: &str) {
        let mut current = resource_path.trim_end_matches('/').to_string();
        loop {
            self.visibility.retain(|k, _| !(k.0 == zone.0 && k.3 == current));
            if current.is_empty() || current == "/" {
                break;
            }
            match current.rfind('/') {
                Some(0) => current = "/".to_string(),
                Some(idx) => current = current[..idx].to_string(),
                None => break,
            }
        }
        self.visible_resources.retain(|k, _| k.0 != zone.0);
    }
}
