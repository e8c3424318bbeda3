//! Tuple Store: persistence and indexing for authorization tuples.
//!
//! Backed by `dashmap` for the primary table and each secondary index, in
//! the same style the storage engine uses for its in-memory tables —
//! sharded concurrent maps rather than a single `Mutex<HashMap>`, so reads
//! and writes on unrelated keys never contend.

use chrono::Utc;
use dashmap::DashMap;
use nexus_core::{ConsistencyToken, Entity, Error, NexusPath, Result, Revision, Tuple, TupleSpec, WriteResult, ZoneId};
use uuid::Uuid;

use crate::consistency::ConsistencyManager;
use crate::zone::ZoneManager;

type IndexKey = (String, String, String, String);

/// The uniqueness key for `(subject*, relation, object*, zone_id)`.
type UniqueKey = (String, String, Option<String>, String, String, String, String);

fn subject_key(t: &Tuple) -> IndexKey {
    (
        t.subject_type.clone(),
        t.subject_id.clone(),
        t.relation.clone(),
        t.zone_id.clone(),
    )
}

fn object_key(t: &Tuple) -> IndexKey {
    (
        t.object_type.clone(),
        t.object_id.clone(),
        t.relation.clone(),
        t.zone_id.clone(),
    )
}

fn relation_zone_key(t: &Tuple) -> (String, String) {
    (t.relation.clone(), t.zone_id.clone())
}

fn unique_key(spec: &TupleSpec) -> UniqueKey {
    (
        spec.subject_type.clone(),
        spec.subject_id.clone(),
        spec.subject_relation.clone(),
        spec.relation.clone(),
        spec.object_type.clone(),
        spec.object_id.clone(),
        spec.zone_id.clone(),
    )
}

/// Groups the tuple ids attributable to one write, for cache invalidation by
/// the caller (the authz engine owns cache/closure invalidation, not the
/// store itself — see the crate's top-level docs on orchestration).
#[derive(Debug, Clone)]
pub struct WriteEffect {
    /// The zone the write landed in.
    pub zone_id: String,
    /// The object affected, for precise cache invalidation.
    pub object: Entity,
    /// The written tuple's subject, for Leopard closure invalidation when
    /// it denotes a group-like entity.
    pub subject: Entity,
}

/// Persists and indexes [`Tuple`] rows.
#[derive(Debug, Default)]
pub struct TupleStore {
    primary: DashMap<Uuid, Tuple>,
    unique: DashMap<UniqueKey, Uuid>,
    by_subject: DashMap<IndexKey, Vec<Uuid>>,
    by_object: DashMap<IndexKey, Vec<Uuid>>,
    by_relation_zone: DashMap<(String, String), Vec<Uuid>>,
}

impl TupleStore {
    /// An empty store.
    pub fn new() -> Self {
        TupleStore::default()
    }

    fn validate(spec: &TupleSpec) -> Result<()> {
        if spec.subject_type.is_empty() || spec.subject_id.is_empty() {
            return Err(Error::Validation("tuple subject must be non-empty".into()));
        }
        if spec.relation.is_empty() {
            return Err(Error::Validation("tuple relation must be non-empty".into()));
        }
        if spec.object_type.is_empty() || spec.object_id.is_empty() {
            return Err(Error::Validation("tuple object must be non-empty".into()));
        }
        if spec.zone_id.is_empty() {
            return Err(Error::Validation("tuple zone_id must be non-empty".into()));
        }
        Ok(())
    }

    fn index_insert(&self, t: &Tuple) {
        self.by_subject.entry(subject_key(t)).or_default().push(t.tuple_id);
        self.by_object.entry(object_key(t)).or_default().push(t.tuple_id);
        self.by_relation_zone
            .entry(relation_zone_key(t))
            .or_default()
            .push(t.tuple_id);
    }

    fn index_remove(&self, t: &Tuple) {
        if let Some(mut v) = self.by_subject.get_mut(&subject_key(t)) {
            v.retain(|id| *id != t.tuple_id);
        }
        if let Some(mut v) = self.by_object.get_mut(&object_key(t)) {
            v.retain(|id| *id != t.tuple_id);
        }
        if let Some(mut v) = self.by_relation_zone.get_mut(&relation_zone_key(t)) {
            v.retain(|id| *id != t.tuple_id);
        }
    }

    /// Write a tuple, allocating a fresh revision and consistency token.
    ///
    /// `subject_zone` is the zone the acting subject is writing from; it is
    /// compared against `spec.zone_id` (the object's zone) for isolation.
    /// Writing the same `(subject*, relation, object*, zone_id)` key again
    /// upserts in place, replacing conditions/expiry and reusing the
    /// existing `tuple_id`.
    pub fn write(
        &self,
        spec: TupleSpec,
        subject_zone: &ZoneId,
        zone_manager: &ZoneManager,
        consistency: &ConsistencyManager,
    ) -> Result<(WriteResult, WriteEffect)> {
        Self::validate(&spec)?;
        zone_manager.validate_write(subject_zone, &ZoneId::new(spec.zone_id.clone()), &spec.relation)?;

        let key = unique_key(&spec);
        let tuple_id = self.unique.get(&key).map(|r| *r.value()).unwrap_or_else(Uuid::new_v4);

        if let Some(existing) = self.primary.get(&tuple_id) {
            self.index_remove(&existing);
        }

        let effect = WriteEffect {
            zone_id: spec.zone_id.clone(),
            object: Entity::new(spec.object_type.clone(), spec.object_id.clone()),
            subject: Entity::new(spec.subject_type.clone(), spec.subject_id.clone()),
        };

        let tuple = spec.into_tuple(tuple_id);
        self.index_insert(&tuple);
        self.primary.insert(tuple_id, tuple);
        self.unique.insert(key, tuple_id);

        let (revision, consistency_token) = consistency.allocate();
        let result = WriteResult {
            tuple_id,
            revision,
            consistency_token,
            written_at_ms: Utc::now().timestamp_millis(),
        };
        Ok((result, effect))
    }

    /// Write a batch of tuples atomically: every spec validates before any
    /// write lands.
    pub fn write_batch(
        &self,
        specs: Vec<TupleSpec>,
        subject_zone: &ZoneId,
        zone_manager: &ZoneManager,
        consistency: &ConsistencyManager,
    ) -> Result<Vec<WriteEffect>> {
        for spec in &specs {
            Self::validate(spec)?;
            zone_manager.validate_write(subject_zone, &ZoneId::new(spec.zone_id.clone()), &spec.relation)?;
        }
        let mut effects = Vec::with_capacity(specs.len());
        for spec in specs {
            let (_, effect) = self.write(spec, subject_zone, zone_manager, consistency)?;
            effects.push(effect);
        }
        Ok(effects)
    }

    /// Delete a tuple by id. Returns `false` if absent.
    pub fn delete(&self, tuple_id: Uuid) -> bool {
        match self.primary.remove(&tuple_id) {
            Some((_, tuple)) => {
                self.index_remove(&tuple);
                self.unique.retain(|_, v| *v != tuple_id);
                true
            }
            None => false,
        }
    }

    /// Whether a direct `(subject, relation, object, zone)` row exists and
    /// has not expired, as of `now_ms`.
    pub fn exists(&self, subject: &Entity, relation: &str, object: &Entity, zone: &ZoneId, now_ms: i64) -> bool {
        let key = (
            subject.entity_type.clone(),
            subject.entity_id.clone(),
            relation.to_string(),
            zone.0.clone(),
        );
        self.by_subject.get(&key).map_or(false, |ids| {
            ids.iter().any(|id| {
                self.primary.get(id).map_or(false, |t| {
                    t.object_type == object.entity_type && t.object_id == object.entity_id && !t.is_expired(now_ms)
                })
            })
        })
    }

    /// All live tuples matching `(subject, relation, zone)`.
    pub fn tuples_for_subject(&self, subject: &Entity, relation: &str, zone: &ZoneId, now_ms: i64) -> Vec<Tuple> {
        let key = (
            subject.entity_type.clone(),
            subject.entity_id.clone(),
            relation.to_string(),
            zone.0.clone(),
        );
        self.by_subject
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.primary.get(id).map(|t| t.clone()))
                    .filter(|t| !t.is_expired(now_ms))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All live tuples matching `(object, relation, zone)`.
    pub fn tuples_for_object(&self, object: &Entity, relation: &str, zone: &ZoneId, now_ms: i64) -> Vec<Tuple> {
        let key = (
            object.entity_type.clone(),
            object.entity_id.clone(),
            relation.to_string(),
            zone.0.clone(),
        );
        self.by_object
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.primary.get(id).map(|t| t.clone()))
                    .filter(|t| !t.is_expired(now_ms))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Find the objects `object` is related to via `relation` — "parents"
    /// in the tupleToUserset sense.
    ///
    /// For `object_type == "file"` and `relation == "parent"`, this is
    /// derived from the path hierarchy directly, without a tuple query:
    /// the parent directory of `object.entity_id` (treated as a display
    /// path) is returned as a synthetic `file` entity.
    pub fn find_related_objects(&self, object: &Entity, relation: &str, zone: &ZoneId, now_ms: i64) -> Vec<Entity> {
        if object.entity_type == "file" && relation == "parent" {
            let path = NexusPath::unscoped(&object.entity_id);
            return match path.parent() {
                Some(parent) => vec![Entity::new("file", parent)],
                None => Vec::new(),
            };
        }
        self.tuples_for_object(object, relation, zone, now_ms)
            .into_iter()
            .map(|t| Entity::new(t.subject_type, t.subject_id))
            .collect()
    }

    /// Find the subjects related to `object` via `relation` — the inverse
    /// direction, used for group-style tupleToUserset lookups.
    pub fn find_subjects(&self, object: &Entity, relation: &str, zone: &ZoneId, now_ms: i64) -> Vec<Entity> {
        self.tuples_for_object(object, relation, zone, now_ms)
            .into_iter()
            .map(|t| Entity::new(t.subject_type, t.subject_id))
            .collect()
    }

    /// All live userset-subject tuples (`subject_relation.is_some()`) on
    /// `(object, relation, zone)` — consulted by `has_direct_relation` when
    /// no concrete-subject row matches.
    pub fn userset_tuples_for_object(&self, object: &Entity, relation: &str, zone: &ZoneId, now_ms: i64) -> Vec<Tuple> {
        self.tuples_for_object(object, relation, zone, now_ms)
            .into_iter()
            .filter(|t| t.is_userset_subject())
            .collect()
    }

    /// Fetch a tuple by id.
    pub fn get(&self, tuple_id: Uuid) -> Option<Tuple> {
        self.primary.get(&tuple_id).map(|t| t.clone())
    }

    /// List tuples by arbitrary filters (relation/zone required, object/subject optional),
    /// used by `rebac_list_tuples`.
    pub fn list_tuples(&self, relation: &str, zone: &ZoneId, object: Option<&Entity>, now_ms: i64) -> Vec<Tuple> {
        let key = (relation.to_string(), zone.0.clone());
        self.by_relation_zone
            .get(&key)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| self.primary.get(id).map(|t| t.clone()))
                    .filter(|t| !t.is_expired(now_ms))
                    .filter(|t| object.map_or(true, |o| t.object_type == o.entity_type && t.object_id == o.entity_id))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Sweep and delete all tuples expired as of `now_ms`. Returns the count removed.
    pub fn cleanup_expired(&self, now_ms: i64) -> usize {
        let expired: Vec<Uuid> = self
            .primary
            .iter()
            .filter(|entry| entry.value().is_expired(now_ms))
            .map(|entry| *entry.key())
            .collect();
        let count = expired.len();
        for id in expired {
            self.delete(id);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(subject: (&str, &str), relation: &str, object: (&str, &str), zone: &str) -> TupleSpec {
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

    #[test]
    fn write_then_exists() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let zone = ZoneId::new("z1");
        let (_, _effect) = store
            .write(spec(("user", "alice"), "viewer", ("file", "doc1"), "z1"), &zone, &zm, &cm)
            .unwrap();
        assert!(store.exists(
            &Entity::new("user", "alice"),
            "viewer",
            &Entity::new("file", "doc1"),
            &zone,
            0,
        ));
    }

    #[test]
    fn cross_zone_write_rejected() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let err = store
            .write(
                spec(("user", "alice"), "direct_viewer", ("file", "doc1"), "z2"),
                &ZoneId::new("z1"),
                &zm,
                &cm,
            )
            .unwrap_err();
        assert!(matches!(err, Error::ZoneIsolation(_)));
    }

    #[test]
    fn rewrite_upserts_same_tuple_id() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let zone = ZoneId::new("z1");
        let (r1, _) = store
            .write(spec(("user", "alice"), "viewer", ("file", "doc1"), "z1"), &zone, &zm, &cm)
            .unwrap();
        let (r2, _) = store
            .write(spec(("user", "alice"), "viewer", ("file", "doc1"), "z1"), &zone, &zm, &cm)
            .unwrap();
        assert_eq!(r1.tuple_id, r2.tuple_id);
        assert!(r2.revision > r1.revision);
    }

    #[test]
    fn delete_removes_from_all_indexes() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let zone = ZoneId::new("z1");
        let (result, _) = store
            .write(spec(("user", "alice"), "viewer", ("file", "doc1"), "z1"), &zone, &zm, &cm)
            .unwrap();
        assert!(store.delete(result.tuple_id));
        assert!(!store.exists(&Entity::new("user", "alice"), "viewer", &Entity::new("file", "doc1"), &zone, 0));
        assert!(!store.delete(result.tuple_id));
    }

    #[test]
    fn file_parent_relation_derived_from_path_not_tuple() {
        let store = TupleStore::new();
        let zone = ZoneId::new("z1");
        let related = store.find_related_objects(&Entity::new("file", "/a/b/c.txt"), "parent", &zone, 0);
        assert_eq!(related, vec![Entity::new("file", "/a/b")]);
    }

    #[test]
    fn expired_tuple_does_not_satisfy_exists() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let zone = ZoneId::new("z1");
        let mut s = spec(("user", "alice"), "viewer", ("file", "doc1"), "z1");
        s.expires_at = Some(100);
        store.write(s, &zone, &zm, &cm).unwrap();
        assert!(store.exists(&Entity::new("user", "alice"), "viewer", &Entity::new("file", "doc1"), &zone, 50));
        assert!(!store.exists(&Entity::new("user", "alice"), "viewer", &Entity::new("file", "doc1"), &zone, 150));
    }

    #[test]
    fn write_batch_atomic_on_validation_failure() {
        let store = TupleStore::new();
        let zm = ZoneManager::new();
        let cm = ConsistencyManager::new();
        let zone = ZoneId::new("z1");
        let mut bad = spec(("user", "alice"), "viewer", ("file", "doc1"), "z1");
        bad.relation = String::new();
        let specs = vec![spec(("user", "bob"), "viewer", ("file", "doc2"), "z1"), bad];
        let err = store.write_batch(specs, &zone, &zm, &cm).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(!store.exists(&Entity::new("user", "bob"), "viewer", &Entity::new("file", "doc2"), &zone, 0));
    }
}
