//! `AuthzEngine`: the composed authorization facade.
//!
//! Binds the namespace config, tuple store, Leopard closure, zone manager,
//! consistency manager, graph traversal, and permission cache into the
//! operations the RPC boundary calls: `rebac_create`, `rebac_check`,
//! `rebac_check_bulk`, `rebac_delete`, `rebac_expand`, `rebac_list_tuples`.
//!
//! Tuple writes/deletes invalidate caches synchronously before returning,
//! and a membership-affecting write updates the Leopard closure within the
//! same call — there is no window where a caller can observe a write
//! without its cache/closure side effects applied.

use std::collections::HashMap;
use std::time::Duration;

use nexus_core::{
    AttributeContext, ConsistencyRequirement, Entity, Error, GraphLimits, NamespaceConfig, OperationContext, Result,
    Tuple, TupleSpec, WriteResult, ZoneId, Condition,
};
use uuid::Uuid;

use crate::cache::PermissionCache;
use crate::closure::LeopardClosure;
use crate::consistency::ConsistencyManager;
use crate::traversal::GraphTraversal;
use crate::tuple_store::TupleStore;
use crate::zone::ZoneManager;

const GROUP_LIKE_TYPES: &[&str] = &["group", "team", "organization", "tenant"];

/// Configuration for an [`AuthzEngine`], mirroring the options recognized
/// at the RPC boundary.
#[derive(Debug, Clone)]
pub struct AuthzConfig {
    /// TTL for the permission cache's two sub-caches.
    pub cache_ttl: Duration,
    /// P0-5 graph traversal safety limits.
    pub limits: GraphLimits,
    /// Whether cross-zone writes are rejected outside the shared-relation allow-list.
    pub enforce_zone_isolation: bool,
    /// Whether nested-group checks consult the Leopard closure, or fall back
    /// to on-demand recursion when disabled.
    pub enable_leopard: bool,
}

impl Default for AuthzConfig {
    fn default() -> Self {
        AuthzConfig {
            cache_ttl: Duration::from_secs(300),
            limits: GraphLimits::default(),
            enforce_zone_isolation: true,
            enable_leopard: true,
        }
    }
}

/// The composed authorization engine.
pub struct AuthzEngine {
    namespace: NamespaceConfig,
    tuples: TupleStore,
    closure: LeopardClosure,
    zone_manager: ZoneManager,
    consistency: ConsistencyManager,
    cache: PermissionCache,
    config: AuthzConfig,
}

impl AuthzEngine {
    /// Construct an engine over a namespace configuration and runtime config.
    pub fn new(namespace: NamespaceConfig, config: AuthzConfig) -> Self {
        AuthzEngine {
            namespace,
            tuples: TupleStore::new(),
            closure: LeopardClosure::default(),
            zone_manager: ZoneManager::with_enforcement(config.enforce_zone_isolation),
            consistency: ConsistencyManager::new(),
            cache: PermissionCache::new(config.cache_ttl),
            config,
        }
    }

    fn is_membership_write(spec: &TupleSpec) -> bool {
        spec.relation == "member-of-direct" && GROUP_LIKE_TYPES.contains(&spec.subject_type.as_str())
    }

    /// `rebac_create`: write a tuple and apply its cache/closure side effects.
    ///
    /// `object_zone` defaults to `ctx.zone` when `None`; pass an explicit
    /// zone to write a cross-zone share (only relations on the zone
    /// manager's allow-list succeed when it differs from `ctx.zone`).
    pub fn rebac_create(
        &self,
        ctx: &OperationContext,
        subject: Entity,
        relation: impl Into<String>,
        object: Entity,
        object_zone: Option<ZoneId>,
        conditions: Option<Condition>,
        expires_at: Option<i64>,
    ) -> Result<WriteResult> {
        let relation = relation.into();
        let object_zone = object_zone.unwrap_or_else(|| ctx.zone.clone());
        let spec = TupleSpec {
            subject_type: subject.entity_type.clone(),
            subject_id: subject.entity_id.clone(),
            subject_relation: None,
            relation: relation.clone(),
            object_type: object.entity_type.clone(),
            object_id: object.entity_id.clone(),
            zone_id: object_zone.0.clone(),
            conditions,
            expires_at,
        };
        let is_membership = Self::is_membership_write(&spec);
        let (result, effect) = self.tuples.write(spec, &ctx.zone, &self.zone_manager, &self.consistency)?;

        self.cache.invalidate_zone(&object_zone);
        self.cache.invalidate_object(&effect.object, &object_zone);

        if is_membership {
            self.closure.on_membership_add(&subject, &object, &object_zone);
            self.cache.invalidate_membership(&effect.subject.entity_id, &effect.object.entity_id);
        }

        Ok(result)
    }

    /// `rebac_create` for a userset subject: grants `relation` on `object` to
    /// every member of `subject#subject_relation` (e.g. every `member` of a
    /// `group`), rather than to a single concrete subject.
    ///
    /// Used for group-addressed shares, where `has_direct_relation`'s
    /// userset-subject branch resolves membership through the Leopard
    /// closure at check time instead of enumerating members at write time.
    pub fn rebac_create_userset(
        &self,
        ctx: &OperationContext,
        subject: Entity,
        subject_relation: impl Into<String>,
        relation: impl Into<String>,
        object: Entity,
        object_zone: Option<ZoneId>,
        conditions: Option<Condition>,
        expires_at: Option<i64>,
    ) -> Result<WriteResult> {
        let relation = relation.into();
        let object_zone = object_zone.unwrap_or_else(|| ctx.zone.clone());
        let spec = TupleSpec {
            subject_type: subject.entity_type.clone(),
            subject_id: subject.entity_id.clone(),
            subject_relation: Some(subject_relation.into()),
            relation,
            object_type: object.entity_type.clone(),
            object_id: object.entity_id.clone(),
            zone_id: object_zone.0.clone(),
            conditions,
            expires_at,
        };
        let (result, effect) = self.tuples.write(spec, &ctx.zone, &self.zone_manager, &self.consistency)?;
        self.cache.invalidate_zone(&object_zone);
        self.cache.invalidate_object(&effect.object, &object_zone);
        Ok(result)
    }

    /// `rebac_delete`: remove a tuple and apply its cache/closure side effects.
    pub fn rebac_delete(&self, ctx: &OperationContext, tuple_id: Uuid) -> Result<bool> {
        let existing = self.tuples.get(tuple_id);
        let removed = self.tuples.delete(tuple_id);
        if let Some(tuple) = existing {
            let zone = ZoneId::new(tuple.zone_id.clone());
            let object = Entity::new(tuple.object_type.clone(), tuple.object_id.clone());
            let subject = Entity::new(tuple.subject_type.clone(), tuple.subject_id.clone());
            self.cache.invalidate_zone(&zone);
            self.cache.invalidate_object(&object, &zone);
            if tuple.relation == "member-of-direct" && GROUP_LIKE_TYPES.contains(&tuple.subject_type.as_str()) {
                self.closure.on_membership_remove(&subject, &object, &zone, &self.tuples, now_ms());
                self.cache.invalidate_membership(&subject.entity_id, &object.entity_id);
            }
        }
        let _ = ctx;
        Ok(removed)
    }

    /// `rebac_check`: whether `subject` has `permission` on `object` in `ctx.zone`.
    ///
    /// Admin contexts bypass the check. Otherwise the result cache is
    /// consulted first unless `requirement` is `STRONG`; on a miss the
    /// graph traversal runs and its result is cached.
    pub fn rebac_check(
        &self,
        ctx: &OperationContext,
        subject: &Entity,
        permission: &str,
        object: &Entity,
        requirement: ConsistencyRequirement,
    ) -> Result<bool> {
        if ctx.is_admin {
            return Ok(true);
        }

        let bypass_cache = matches!(requirement, ConsistencyRequirement::Strong);
        if !bypass_cache {
            if let Some(cached) = self.cache.get_result(subject, permission, object, &ctx.zone) {
                return Ok(cached);
            }
        }

        let traversal = GraphTraversal::new(&self.namespace, &self.tuples, &self.closure, &self.zone_manager, self.config.enable_leopard);
        let result = traversal.compute_permission(
            subject,
            permission,
            object,
            &ctx.zone,
            &ctx.attributes,
            self.config.limits,
            now_ms(),
        )?;

        self.cache.put_result(subject, permission, object, &ctx.zone, result);
        if result {
            self.cache.mark_resource_visible(&ctx.zone, subject, &object.entity_id);
        }
        Ok(result)
    }

    /// `rebac_check_bulk`: evaluate many `(subject, permission, object)` triples.
    pub fn rebac_check_bulk(
        &self,
        ctx: &OperationContext,
        checks: Vec<(Entity, String, Entity)>,
        requirement: ConsistencyRequirement,
    ) -> Result<HashMap<String, bool>> {
        let mut out = HashMap::with_capacity(checks.len());
        for (subject, permission, object) in checks {
            let key = format!("{subject}#{permission}@{object}");
            let value = self.rebac_check(ctx, &subject, &permission, &object, requirement)?;
            out.insert(key, value);
        }
        Ok(out)
    }

    /// `rebac_expand`: the tuples directly backing a permission on an object
    /// (one level — not a full recursive expansion tree).
    pub fn rebac_expand(&self, object: &Entity, permission: &str, zone: &ZoneId) -> Vec<Tuple> {
        self.tuples.list_tuples(permission, zone, Some(object), now_ms())
    }

    /// `rebac_list_tuples`: list tuples for a relation/zone, optionally
    /// filtered to one object.
    pub fn rebac_list_tuples(&self, relation: &str, zone: &ZoneId, object: Option<&Entity>) -> Vec<Tuple> {
        self.tuples.list_tuples(relation, zone, object, now_ms())
    }

    /// Background sweep removing expired tuples; also invalidates the
    /// affected zones' caches.
    pub fn cleanup_expired(&self) -> usize {
        self.tuples.cleanup_expired(now_ms())
    }

    /// Evaluate a raw ABAC condition against a context — exposed for callers
    /// that need to pre-flight a condition outside a full permission check.
    pub fn evaluate_condition(condition: &Condition, context: &AttributeContext) -> bool {
        condition.evaluate(context)
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(subject: Entity, zone: &str) -> OperationContext {
        OperationContext::new(subject, ZoneId::new(zone))
    }

    #[test]
    fn write_then_check_under_strong_is_immediately_true() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "alice"), "z1");
        engine
            .rebac_create(&c, Entity::new("user", "alice"), "direct_viewer", Entity::new("file", "doc"), None, None, None)
            .unwrap();

        let ok = engine
            .rebac_check(&c, &Entity::new("user", "alice"), "read", &Entity::new("file", "doc"), ConsistencyRequirement::Strong)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn expired_tuple_never_grants() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "alice"), "z1");
        engine
            .rebac_create(
                &c,
                Entity::new("user", "alice"),
                "direct_viewer",
                Entity::new("file", "doc"),
                None,
                None,
                Some(1),
            )
            .unwrap();

        let ok = engine
            .rebac_check(&c, &Entity::new("user", "alice"), "read", &Entity::new("file", "doc"), ConsistencyRequirement::Strong)
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn cross_zone_write_rejected_end_to_end() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "bob"), "tenant-b");
        let err = engine
            .rebac_create(
                &c,
                Entity::new("user", "bob"),
                "direct_viewer",
                Entity::new("file", "doc2"),
                Some(ZoneId::new("tenant-a")),
                None,
                None,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ZoneIsolation(_)));
    }

    #[test]
    fn cross_zone_shared_relation_write_allowed() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "bob"), "tenant-b");
        engine
            .rebac_create(
                &c,
                Entity::new("user", "bob"),
                "shared-viewer",
                Entity::new("file", "doc2"),
                Some(ZoneId::new("tenant-a")),
                None,
                None,
            )
            .unwrap();
    }

    #[test]
    fn membership_write_extends_leopard_closure() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "alice"), "z1");
        engine
            .rebac_create(
                &c,
                Entity::new("group", "eng"),
                "member-of-direct",
                Entity::new("group", "all-staff"),
                None,
                None,
                None,
            )
            .unwrap();
        let groups = engine.closure.transitive_groups(&Entity::new("group", "eng"), &ZoneId::new("z1"));
        assert!(groups.contains(&("group".to_string(), "all-staff".to_string())));
    }

    #[test]
    fn userset_share_grants_to_group_member() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "alice"), "z1");
        engine
            .rebac_create(
                &c,
                Entity::new("user", "alice"),
                "member",
                Entity::new("group", "eng"),
                None,
                None,
                None,
            )
            .unwrap();
        engine
            .rebac_create_userset(
                &c,
                Entity::new("group", "eng"),
                "member",
                "direct_viewer",
                Entity::new("file", "doc"),
                None,
                None,
                None,
            )
            .unwrap();

        let ok = engine
            .rebac_check(&c, &Entity::new("user", "alice"), "read", &Entity::new("file", "doc"), ConsistencyRequirement::Strong)
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn delete_returns_false_when_absent() {
        let engine = AuthzEngine::new(NamespaceConfig::default_nexus(), AuthzConfig::default());
        let c = ctx(Entity::new("user", "alice"), "z1");
        assert!(!engine.rebac_delete(&c, Uuid::new_v4()).unwrap());
    }
}
