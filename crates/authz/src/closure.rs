//! Leopard Transitive Closure: pre-computed group-membership reachability.
//!
//! For each member, the closure holds the full set of groups it transitively
//! belongs to, with the depth of the shortest membership path. Recursive
//! group lookups are the hottest path in the graph traversal engine —
//! trading write amplification here for O(1) reads at check time is the
//! same bet Zanzibar's own Leopard index makes.
//!
//! Consistency is eventual within a single check: a check racing an
//! in-flight recomputation may miss a just-added membership, converging on
//! retry once the recomputation completes. See `on_membership_remove` for
//! where that window opens.

use dashmap::DashMap;
use nexus_core::{Entity, ZoneId};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::debug;

use crate::tuple_store::TupleStore;

type MemberKey = (String, String, String); // (entity_type, entity_id, zone)
type GroupKey = MemberKey;

const DEFAULT_MAX_SIZE: usize = 100_000;

fn key(entity: &Entity, zone: &ZoneId) -> MemberKey {
    (entity.entity_type.clone(), entity.entity_id.clone(), zone.0.clone())
}

fn unkey(k: &MemberKey) -> Entity {
    Entity::new(k.0.clone(), k.1.clone())
}

/// Pre-computed transitive group membership index.
pub struct LeopardClosure {
    forward: DashMap<MemberKey, HashMap<GroupKey, u32>>,
    reverse: DashMap<GroupKey, HashSet<MemberKey>>,
    order: Mutex<VecDeque<MemberKey>>,
    max_size: usize,
}

impl Default for LeopardClosure {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_SIZE)
    }
}

impl LeopardClosure {
    /// A closure cache with the given member-capacity bound.
    pub fn new(max_size: usize) -> Self {
        LeopardClosure {
            forward: DashMap::new(),
            reverse: DashMap::new(),
            order: Mutex::new(VecDeque::new()),
            max_size,
        }
    }

    fn touch(&self, member: &MemberKey) {
        let mut order = self.order.lock();
        order.retain(|k| k != member);
        order.push_back(member.clone());
        while order.len() > self.max_size {
            if let Some(evicted) = order.pop_front() {
                debug!(entity_type = %evicted.0, entity_id = %evicted.1, zone = %evicted.2, "leopard closure entry evicted at capacity");
                self.forward.remove(&evicted);
            }
        }
    }

    /// `O(1)` lookup: the set of groups `member` transitively belongs to.
    pub fn transitive_groups(&self, member: &Entity, zone: &ZoneId) -> HashSet<(String, String)> {
        let k = key(member, zone);
        self.forward
            .get(&k)
            .map(|m| m.keys().map(|g| (g.0.clone(), g.1.clone())).collect())
            .unwrap_or_default()
    }

    fn ancestors_with_depth(&self, group: &GroupKey) -> Vec<(GroupKey, u32)> {
        self.forward
            .get(group)
            .map(|m| m.iter().map(|(g, d)| (g.clone(), *d)).collect())
            .unwrap_or_default()
    }

    fn descendants_with_depth(&self, subject: &MemberKey) -> Vec<(MemberKey, u32)> {
        self.reverse
            .get(subject)
            .map(|members| {
                members
                    .iter()
                    .filter_map(|m| self.forward.get(m).and_then(|gm| gm.get(subject).map(|d| (m.clone(), *d))))
                    .collect()
            })
            .unwrap_or_default()
    }

    fn insert_entry(&self, member: &MemberKey, group: &GroupKey, depth: u32) {
        let mut entry = self.forward.entry(member.clone()).or_default();
        let slot = entry.entry(group.clone()).or_insert(depth);
        if depth < *slot {
            *slot = depth;
        }
        drop(entry);
        self.reverse.entry(group.clone()).or_default().insert(member.clone());
        self.touch(member);
    }

    /// Record a new direct membership edge `subject member-of group` and
    /// extend the closure: the cross-product of `subject`'s descendants
    /// (plus itself) with `group`'s ancestors (plus itself).
    pub fn on_membership_add(&self, subject: &Entity, group: &Entity, zone: &ZoneId) {
        let subject_key = key(subject, zone);
        let group_key = key(group, zone);

        let mut descendants = self.descendants_with_depth(&subject_key);
        descendants.push((subject_key.clone(), 0));
        let mut ancestors = self.ancestors_with_depth(&group_key);
        ancestors.push((group_key.clone(), 0));

        for (d_key, d_depth) in &descendants {
            for (a_key, a_depth) in &ancestors {
                if d_key == a_key {
                    continue;
                }
                self.insert_entry(d_key, a_key, d_depth + a_depth + 1);
            }
        }
    }

    /// Remove a direct membership edge. Conservative strategy: drop every
    /// closure row for every descendant of `subject` (including `subject`
    /// itself), then recompute each from the remaining direct tuples via
    /// BFS. Between the drop and the recompute, a concurrent check may
    /// observe a membership that should have been revoked — see the
    /// crate-level docs.
    pub fn on_membership_remove(&self, subject: &Entity, _group: &Entity, zone: &ZoneId, tuples: &TupleStore, now_ms: i64) {
        let subject_key = key(subject, zone);
        let mut affected: Vec<MemberKey> = self
            .descendants_with_depth(&subject_key)
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        affected.push(subject_key);

        debug!(subject = %subject.entity_id, zone = %zone.0, affected = affected.len(), "leopard closure rebuilding after membership removal");
        for member_key in &affected {
            self.clear_member(member_key);
        }
        for member_key in &affected {
            self.recompute_member(member_key, tuples, zone, now_ms);
        }
    }

    fn clear_member(&self, member: &MemberKey) {
        if let Some((_, groups)) = self.forward.remove(member) {
            for group_key in groups.keys() {
                if let Some(mut set) = self.reverse.get_mut(group_key) {
                    set.remove(member);
                }
            }
        }
    }

    fn recompute_member(&self, member: &MemberKey, tuples: &TupleStore, zone: &ZoneId, now_ms: i64) {
        let start = unkey(member);
        let mut visited: HashMap<GroupKey, u32> = HashMap::new();
        let mut queue: VecDeque<(Entity, u32)> = VecDeque::new();
        queue.push_back((start, 0));

        while let Some((current, depth)) = queue.pop_front() {
            for group in tuples.find_related_objects(&current, "member-of-direct", zone, now_ms) {
                let gk = key(&group, zone);
                let next_depth = depth + 1;
                let better = visited.get(&gk).map_or(true, |&d| next_depth < d);
                if better {
                    visited.insert(gk, next_depth);
                    queue.push_back((group, next_depth));
                }
            }
        }

        for (group_key, depth) in &visited {
            self.insert_entry(member, group_key, *depth);
        }
    }

    /// Full recompute for a zone from source tuples: used for migration and
    /// periodic verification. Direct membership edges are read via the
    /// `member-of-direct` relation (the store's raw, non-transitive
    /// membership tuples).
    pub fn rebuild_for_zone(&self, zone: &ZoneId, tuples: &TupleStore, members: &[Entity], now_ms: i64) {
        debug!(zone = %zone.0, members = members.len(), "leopard closure full rebuild starting");
        for member in members {
            let k = key(member, zone);
            self.clear_member(&k);
        }
        for member in members {
            let k = key(member, zone);
            self.recompute_member(&k, tuples, zone, now_ms);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nexus_core::{TupleSpec};
    use crate::consistency::ConsistencyManager;
    use crate::zone::ZoneManager;

    fn membership_spec(member: &str, group: &str, zone: &str) -> TupleSpec {
        TupleSpec {
            subject_type: "group".into(),
            subject_id: member.into(),
            subject_relation: None,
            relation: "member-of-direct".into(),
            object_type: "group".into(),
            object_id: group.into(),
            zone_id: zone.into(),
            conditions: None,
            expires_at: None,
        }
    }

    #[test]
    fn chained_membership_transitive() {
        let closure = LeopardClosure::default();
        let zone = ZoneId::new("z1");
        let a = Entity::new("group", "a");
        let b = Entity::new("group", "b");
        let c = Entity::new("group", "c");

        closure.on_membership_add(&a, &b, &zone);
        closure.on_membership_add(&b, &c, &zone);

        let groups = closure.transitive_groups(&a, &zone);
        assert!(groups.contains(&("group".to_string(), "b".to_string())));
        assert!(groups.contains(&("group".to_string(), "c".to_string())));
    }

    #[test]
    fn membership_remove_shrinks_closure() {
        let closure = LeopardClosure::default();
        let zone = ZoneId::new("z1");
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();

        store.write(membership_spec("a", "b", "z1"), &zone, &zm, &cm).unwrap();
        let (r2, _) = store.write(membership_spec("b", "c", "z1"), &zone, &zm, &cm).unwrap();

        let a = Entity::new("group", "a");
        let b = Entity::new("group", "b");
        let c = Entity::new("group", "c");
        closure.on_membership_add(&a, &b, &zone);
        closure.on_membership_add(&b, &c, &zone);
        assert!(closure.transitive_groups(&a, &zone).contains(&("group".into(), "c".into())));

        store.delete(r2.tuple_id);
        closure.on_membership_remove(&b, &c, &zone, &store, 0);

        let groups = closure.transitive_groups(&a, &zone);
        assert!(!groups.contains(&("group".into(), "c".into())));
        assert!(groups.contains(&("group".into(), "b".into())));
    }

    #[test]
    fn rebuild_matches_incremental() {
        let zone = ZoneId::new("z1");
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        store.write(membership_spec("a", "b", "z1"), &zone, &zm, &cm).unwrap();
        store.write(membership_spec("b", "c", "z1"), &zone, &zm, &cm).unwrap();

        let incremental = LeopardClosure::default();
        let a = Entity::new("group", "a");
        let b = Entity::new("group", "b");
        let c = Entity::new("group", "c");
        incremental.on_membership_add(&a, &b, &zone);
        incremental.on_membership_add(&b, &c, &zone);

        let rebuilt = LeopardClosure::default();
        rebuilt.rebuild_for_zone(&zone, &store, &[a.clone(), b.clone(), c.clone()], 0);

        assert_eq!(incremental.transitive_groups(&a, &zone), rebuilt.transitive_groups(&a, &zone));
    }

    #[test]
    fn cycle_does_not_loop_forever() {
        let zone = ZoneId::new("z1");
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        store.write(membership_spec("a", "b", "z1"), &zone, &zm, &cm).unwrap();
        store.write(membership_spec("b", "a", "z1"), &zone, &zm, &cm).unwrap();

        let closure = LeopardClosure::default();
        let a = Entity::new("group", "a");
        closure.rebuild_for_zone(&zone, &store, &[a.clone(), Entity::new("group", "b")], 0);
        let groups = closure.transitive_groups(&a, &zone);
        assert!(groups.contains(&("group".into(), "b".into())));
    }
}
