//! Graph Traversal: the recursive permission-check algorithm.
//!
//! `compute_permission` is the heart of the authorization engine. It walks
//! the namespace's relation graph — permission aliases, unions,
//! tupleToUserset indirections, and finally direct tuples — memoizing
//! `(subject, permission, object)` results across the whole check and
//! detecting cycles along the current path, all under the P0-5 safety
//! limits enforced eagerly at every step.

use nexus_core::{AttributeContext, Entity, Error, GraphLimits, LimitKind, NamespaceConfig, RelationKind, Result, ZoneId};
use std::collections::{HashMap, HashSet};
use std::time::Instant;

use crate::closure::LeopardClosure;
use crate::tuple_store::TupleStore;
use crate::zone::ZoneManager;

type MemoKey = (Entity, String, Entity);

struct CheckState<'a> {
    memo: HashMap<MemoKey, bool>,
    limits: GraphLimits,
    tuple_queries: u32,
    started_at: Instant,
    closure: &'a LeopardClosure,
    now_ms: i64,
}

impl<'a> CheckState<'a> {
    fn check_wall_time(&self) -> Result<()> {
        let elapsed = self.started_at.elapsed().as_millis() as u64;
        if elapsed > self.limits.max_execution_time_ms {
            return Err(Error::graph_limit(LimitKind::WallTime, self.limits.max_execution_time_ms, elapsed));
        }
        Ok(())
    }

    fn count_tuple_query(&mut self) -> Result<()> {
        self.tuple_queries += 1;
        if self.tuple_queries as u64 > self.limits.max_tuple_queries as u64 {
            return Err(Error::graph_limit(
                LimitKind::TupleQueries,
                self.limits.max_tuple_queries as u64,
                self.tuple_queries as u64,
            ));
        }
        Ok(())
    }

    fn check_fan_out(&self, count: usize) -> Result<()> {
        if count as u64 > self.limits.max_fan_out as u64 {
            return Err(Error::graph_limit(LimitKind::FanOut, self.limits.max_fan_out as u64, count as u64));
        }
        Ok(())
    }

    fn check_depth(&self, depth: u32) -> Result<()> {
        if depth > self.limits.max_depth {
            return Err(Error::graph_limit(LimitKind::Depth, self.limits.max_depth as u64, depth as u64));
        }
        Ok(())
    }

    fn record_visit(&mut self) -> Result<()> {
        if self.memo.len() as u64 > self.limits.max_visited_nodes as u64 {
            return Err(Error::graph_limit(
                LimitKind::VisitedNodes,
                self.limits.max_visited_nodes as u64,
                self.memo.len() as u64,
            ));
        }
        Ok(())
    }
}

/// The graph traversal engine: stateless over its inputs, holding only
/// shared references to the namespace, tuple store, and closure index.
pub struct GraphTraversal<'a> {
    namespace: &'a NamespaceConfig,
    tuples: &'a TupleStore,
    closure: &'a LeopardClosure,
    zone_manager: &'a ZoneManager,
    enable_leopard: bool,
}

impl<'a> GraphTraversal<'a> {
    /// Construct a traversal engine over shared component references.
    pub fn new(
        namespace: &'a NamespaceConfig,
        tuples: &'a TupleStore,
        closure: &'a LeopardClosure,
        zone_manager: &'a ZoneManager,
        enable_leopard: bool,
    ) -> Self {
        GraphTraversal {
            namespace,
            tuples,
            closure,
            zone_manager,
            enable_leopard,
        }
    }

    /// Whether `subject` has `permission` on `object` in `zone`, under `context`
    /// for ABAC evaluation, bounded by `limits`.
    pub fn compute_permission(
        &self,
        subject: &Entity,
        permission: &str,
        object: &Entity,
        zone: &ZoneId,
        context: &AttributeContext,
        limits: GraphLimits,
        now_ms: i64,
    ) -> Result<bool> {
        let mut state = CheckState {
            memo: HashMap::new(),
            limits,
            tuple_queries: 0,
            started_at: Instant::now(),
            closure: self.closure,
            now_ms,
        };
        let mut visiting = HashSet::new();
        self.eval(subject, permission, object, zone, context, &mut state, &mut visiting, 0)
    }

    fn eval(
        &self,
        subject: &Entity,
        relation: &str,
        object: &Entity,
        zone: &ZoneId,
        context: &AttributeContext,
        state: &mut CheckState,
        visiting: &mut HashSet<MemoKey>,
        depth: u32,
    ) -> Result<bool> {
        let memo_key: MemoKey = (subject.clone(), relation.to_string(), object.clone());
        if let Some(result) = state.memo.get(&memo_key) {
            return Ok(*result);
        }
        if visiting.contains(&memo_key) {
            // Cycle along the current path: treat as not-yet-proven, so the
            // branch that closes the cycle contributes `false` rather than
            // recursing forever.
            return Ok(false);
        }

        state.check_depth(depth)?;
        state.check_wall_time()?;

        visiting.insert(memo_key.clone());
        let result = self.eval_uncached(subject, relation, object, zone, context, state, visiting, depth)?;
        visiting.remove(&memo_key);

        state.memo.insert(memo_key, result);
        state.record_visit()?;
        Ok(result)
    }

    fn eval_uncached(
        &self,
        subject: &Entity,
        relation: &str,
        object: &Entity,
        zone: &ZoneId,
        context: &AttributeContext,
        state: &mut CheckState,
        visiting: &mut HashSet<MemoKey>,
        depth: u32,
    ) -> Result<bool> {
        if self.namespace.namespace(&object.entity_type).is_none() {
            return self.has_direct_relation(subject, relation, object, zone, context, state, visiting, depth);
        }

        if self.namespace.has_permission(&object.entity_type, relation) {
            let usersets = self
                .namespace
                .permission_usersets(&object.entity_type, relation)
                .unwrap_or(&[]);
            state.check_fan_out(usersets.len())?;
            for member_relation in usersets {
                if self.eval(subject, member_relation, object, zone, context, state, visiting, depth + 1)? {
                    return Ok(true);
                }
            }
            return Ok(false);
        }

        match self.namespace.relation_kind(&object.entity_type, relation) {
            Some(RelationKind::Union(members)) => {
                state.check_fan_out(members.len())?;
                for member_relation in members {
                    if self.eval(subject, member_relation, object, zone, context, state, visiting, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Some(RelationKind::TupleToUserset { tupleset, computed }) => {
                state.count_tuple_query()?;
                let related = self.tuples.find_related_objects(object, tupleset, zone, state.now_ms);
                state.check_fan_out(related.len())?;
                for r in &related {
                    if self.eval(subject, computed, r, zone, context, state, visiting, depth + 1)? {
                        return Ok(true);
                    }
                }

                if tupleset == "parent" {
                    return Ok(false);
                }

                state.count_tuple_query()?;
                let related_subjects = self.tuples.find_subjects(object, tupleset, zone, state.now_ms);
                state.check_fan_out(related_subjects.len())?;
                for s in &related_subjects {
                    if self.eval(subject, computed, s, zone, context, state, visiting, depth + 1)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Some(RelationKind::Direct) | None => self.has_direct_relation(subject, relation, object, zone, context, state, visiting, depth),
        }
    }

    fn has_direct_relation(
        &self,
        subject: &Entity,
        relation: &str,
        object: &Entity,
        zone: &ZoneId,
        context: &AttributeContext,
        state: &mut CheckState,
        visiting: &mut HashSet<MemoKey>,
        depth: u32,
    ) -> Result<bool> {
        state.count_tuple_query()?;
        let rows = self.tuples.tuples_for_object(object, relation, zone, state.now_ms);

        for row in &rows {
            if row.is_userset_subject() {
                continue;
            }
            let concrete_match = row.subject_type == subject.entity_type && row.subject_id == subject.entity_id;
            let wildcard_match = row.is_wildcard_subject();
            if concrete_match || wildcard_match {
                let satisfied = match &row.conditions {
                    Some(cond) => cond.evaluate(context),
                    None => true,
                };
                if satisfied {
                    return Ok(true);
                }
            }
        }

        // Userset-as-subject rows: "subject has `relation` on `object` because
        // `subject` belongs to a userset that does".
        let usersets: Vec<_> = rows.into_iter().filter(|r| r.is_userset_subject()).collect();
        state.check_fan_out(usersets.len())?;
        for row in &usersets {
            let userset_relation = row.subject_relation.as_deref().unwrap_or_default();
            let userset_entity = Entity::new(row.subject_type.clone(), row.subject_id.clone());

            if self.enable_leopard && userset_relation == "member" {
                if state
                    .closure
                    .transitive_groups(subject, zone)
                    .contains(&(userset_entity.entity_type.clone(), userset_entity.entity_id.clone()))
                {
                    return Ok(true);
                }
            }

            if self.eval(subject, userset_relation, &userset_entity, zone, context, state, visiting, depth + 1)? {
                return Ok(true);
            }
        }

        let _ = self.zone_manager; // reserved for future cross-zone read relaxation
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consistency::ConsistencyManager;
    use nexus_core::TupleSpec;

    fn direct_spec(subject: (&str, &str), relation: &str, object: (&str, &str), zone: &str) -> TupleSpec {
        TupleSpec {
            subject_type: subject.0.into(),
            subject_id: subject.1.into(),
            subject_relation: None,
            relation: relation.into(),
            object_type: object.0.into(),
            object_id: object.1.into(),
            zone_id: zone.into(),
            conditions: None,
            expires_at: None,
        }
    }

    fn userset_spec(userset: (&str, &str, &str), relation: &str, object: (&str, &str), zone: &str) -> TupleSpec {
        TupleSpec {
            subject_type: userset.0.into(),
            subject_id: userset.1.into(),
            subject_relation: Some(userset.2.into()),
            relation: relation.into(),
            object_type: object.0.into(),
            object_id: object.1.into(),
            zone_id: zone.into(),
            conditions: None,
            expires_at: None,
        }
    }

    fn setup() -> (TupleStore, LeopardClosure, ZoneManager, ConsistencyManager, NamespaceConfig, ZoneId) {
        (
            TupleStore::new(),
            LeopardClosure::default(),
            ZoneManager::new(),
            ConsistencyManager::new(),
            NamespaceConfig::default_nexus(),
            ZoneId::new("z1"),
        )
    }

    #[test]
    fn group_inheritance_scenario() {
        // Seed scenario 1: alice member-of eng; eng direct_viewer file:/doc -> alice can read.
        let (tuples, closure, zm, cm, ns, zone) = setup();
        tuples
            .write(userset_spec(("group", "eng", "member"), "member-of", ("group", "eng"), "z1"), &zone, &zm, &cm)
            .unwrap();
        tuples
            .write(direct_spec(("group", "eng"), "direct_viewer", ("file", "doc"), "z1"), &zone, &zm, &cm)
            .unwrap();

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, true);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "alice"),
                "read",
                &Entity::new("file", "doc"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn parent_ttu_grants_nested_read() {
        let (tuples, closure, zm, cm, ns, zone) = setup();
        tuples
            .write(
                direct_spec(("user", "alice"), "direct_viewer", ("file", "/a/b"), "z1"),
                &zone,
                &zm,
                &cm,
            )
            .unwrap();

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, true);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "alice"),
                "read",
                &Entity::new("file", "/a/b/c.txt"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn cycle_terminates_and_denies() {
        let (tuples, closure, zm, cm, ns, zone) = setup();
        // group-style cycle via userset subjects: a#member -> b, b#member -> a, neither grants directly.
        tuples
            .write(userset_spec(("group", "a", "member"), "viewer", ("file", "doc"), "z1"), &zone, &zm, &cm)
            .unwrap();
        tuples
            .write(userset_spec(("group", "b", "member"), "member", ("group", "a"), "z1"), &zone, &zm, &cm)
            .unwrap();
        tuples
            .write(userset_spec(("group", "a", "member"), "member", ("group", "b"), "z1"), &zone, &zm, &cm)
            .unwrap();

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, false);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "nobody"),
                "viewer",
                &Entity::new("file", "doc"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn cycle_through_userset_subject_terminates_without_error() {
        // Unlike `cycle_terminates_and_denies`, this cycle is only reachable
        // through `has_direct_relation`'s userset-as-subject branch: `group`'s
        // "member-of" relation is Direct (not a union/TTU), so the namespace
        // lookup in `eval_uncached` falls straight through to it. If the
        // recursive call there used a fresh `visiting` set per hop instead of
        // the caller's, this cycle would never be detected along the path and
        // would recurse until a much looser query-count limit tripped instead
        // of returning a clean `false`.
        let (tuples, closure, zm, cm, ns, zone) = setup();
        tuples
            .write(userset_spec(("group", "b", "member-of"), "member-of", ("group", "a"), "z1"), &zone, &zm, &cm)
            .unwrap();
        tuples
            .write(userset_spec(("group", "a", "member-of"), "member-of", ("group", "b"), "z1"), &zone, &zm, &cm)
            .unwrap();

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, false);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "nobody"),
                "member-of",
                &Entity::new("group", "a"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn depth_limit_trips_through_userset_subject_chain() {
        // A chain of groups linked purely through userset-as-subject rows
        // (`group:g{i} member-of group:g{i+1}`) recurses through
        // `has_direct_relation` at every hop rather than through a TTU/union —
        // this is the path `max_depth` must bound, not only `find_related_objects`.
        let (tuples, closure, zm, cm, ns, zone) = setup();
        for i in 0..6 {
            tuples
                .write(
                    userset_spec(("group", &format!("g{i}"), "member-of"), "member-of", ("group", &format!("g{}", i + 1)), "z1"),
                    &zone,
                    &zm,
                    &cm,
                )
                .unwrap();
        }

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, false);
        let ctx = AttributeContext::new();
        let mut limits = GraphLimits::default();
        limits.max_depth = 3;
        let err = traversal
            .compute_permission(
                &Entity::new("user", "nobody"),
                "member-of",
                &Entity::new("group", "g6"),
                &zone,
                &ctx,
                limits,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::GraphLimitExceeded { kind: LimitKind::Depth, .. }));
    }

    #[test]
    fn wildcard_subject_grants_to_anyone() {
        let (tuples, closure, zm, cm, ns, zone) = setup();
        tuples
            .write(direct_spec(("*", "*"), "direct_viewer", ("file", "public"), "z1"), &zone, &zm, &cm)
            .unwrap();

        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, true);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "anyone"),
                "read",
                &Entity::new("file", "public"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(ok);
    }

    #[test]
    fn depth_limit_trips_on_long_parent_chain() {
        let (tuples, closure, zm, cm, ns, zone) = setup();
        let mut limits = GraphLimits::default();
        limits.max_depth = 2;
        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, true);
        let ctx = AttributeContext::new();
        let err = traversal
            .compute_permission(
                &Entity::new("user", "alice"),
                "read",
                &Entity::new("file", "/a/b/c/d/e/f"),
                &zone,
                &ctx,
                limits,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, Error::GraphLimitExceeded { .. }));
    }

    #[test]
    fn no_grant_returns_false_not_error() {
        let (tuples, closure, zm, _cm, ns, zone) = setup();
        let traversal = GraphTraversal::new(&ns, &tuples, &closure, &zm, true);
        let ctx = AttributeContext::new();
        let ok = traversal
            .compute_permission(
                &Entity::new("user", "alice"),
                "read",
                &Entity::new("file", "nope"),
                &zone,
                &ctx,
                GraphLimits::default(),
                0,
            )
            .unwrap();
        assert!(!ok);
    }
}
