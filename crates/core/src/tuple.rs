//! Relationship tuples: the atomic unit the tuple store persists.
//!
//! A tuple reads as "subject has relation on object", optionally scoped to
//! a userset subject (`subject_relation`), guarded by an ABAC condition, and
//! bounded by an expiry. Zone isolation is enforced by the tuple store, not
//! by the tuple itself — `zone_id` is just the field it checks against.

use crate::consistency::{ConsistencyToken, Revision};
use crate::value::Condition;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A persisted relationship fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    /// Unique identifier, assigned at write time.
    pub tuple_id: Uuid,
    /// The subject's object type (`"user"`, `"group"`, ...), or `"*"` for a
    /// public wildcard subject.
    pub subject_type: String,
    /// The subject's id, or `"*"` for a public wildcard subject.
    pub subject_id: String,
    /// If set, the subject is a userset: "all entities with this relation on
    /// `subject_type:subject_id`" rather than the entity itself.
    pub subject_relation: Option<String>,
    /// The relation this tuple grants.
    pub relation: String,
    /// The object's type.
    pub object_type: String,
    /// The object's id.
    pub object_id: String,
    /// The zone this tuple is visible in.
    pub zone_id: String,
    /// An optional ABAC condition gating whether this tuple applies.
    pub conditions: Option<Condition>,
    /// Optional expiry, as Unix millis; tuples past this are treated as absent.
    pub expires_at: Option<i64>,
}

impl Tuple {
    /// Whether this tuple's subject is the `"*"` public wildcard.
    pub fn is_wildcard_subject(&self) -> bool {
        self.subject_type == "*" || self.subject_id == "*"
    }

    /// Whether this tuple names a userset subject (`subject#relation`) rather
    /// than a concrete entity.
    pub fn is_userset_subject(&self) -> bool {
        self.subject_relation.is_some()
    }

    /// Whether this tuple has expired as of `now_ms`.
    pub fn is_expired(&self, now_ms: i64) -> bool {
        matches!(self.expires_at, Some(exp) if exp <= now_ms)
    }
}

/// The caller-supplied fields for writing a new tuple; `tuple_id` is assigned
/// by the store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TupleSpec {
    /// See [`Tuple::subject_type`].
    pub subject_type: String,
    /// See [`Tuple::subject_id`].
    pub subject_id: String,
    /// See [`Tuple::subject_relation`].
    pub subject_relation: Option<String>,
    /// See [`Tuple::relation`].
    pub relation: String,
    /// See [`Tuple::object_type`].
    pub object_type: String,
    /// See [`Tuple::object_id`].
    pub object_id: String,
    /// See [`Tuple::zone_id`].
    pub zone_id: String,
    /// See [`Tuple::conditions`].
    pub conditions: Option<Condition>,
    /// See [`Tuple::expires_at`].
    pub expires_at: Option<i64>,
}

impl TupleSpec {
    /// Materialize this spec into a [`Tuple`], assigning a fresh id.
    pub fn into_tuple(self, tuple_id: Uuid) -> Tuple {
        Tuple {
            tuple_id,
            subject_type: self.subject_type,
            subject_id: self.subject_id,
            subject_relation: self.subject_relation,
            relation: self.relation,
            object_type: self.object_type,
            object_id: self.object_id,
            zone_id: self.zone_id,
            conditions: self.conditions,
            expires_at: self.expires_at,
        }
    }
}

/// The result of a successful tuple write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    /// The id assigned to the written tuple.
    pub tuple_id: Uuid,
    /// The revision this write was assigned.
    pub revision: Revision,
    /// The consistency token a caller can use for read-your-writes.
    pub consistency_token: ConsistencyToken,
    /// Unix millis the write was committed at.
    pub written_at_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> TupleSpec {
        TupleSpec {
            subject_type: "user".into(),
            subject_id: "alice".into(),
            subject_relation: None,
            relation: "viewer".into(),
            object_type: "file".into(),
            object_id: "doc1".into(),
            zone_id: "default".into(),
            conditions: None,
            expires_at: None,
        }
    }

    #[test]
    fn wildcard_subject_detected() {
        let mut s = spec();
        s.subject_type = "*".into();
        s.subject_id = "*".into();
        let t = s.into_tuple(Uuid::nil());
        assert!(t.is_wildcard_subject());
    }

    #[test]
    fn userset_subject_detected() {
        let mut s = spec();
        s.subject_type = "group".into();
        s.subject_id = "eng".into();
        s.subject_relation = Some("member".into());
        let t = s.into_tuple(Uuid::nil());
        assert!(t.is_userset_subject());
    }

    #[test]
    fn expiry_is_checked_against_now() {
        let mut s = spec();
        s.expires_at = Some(1_000);
        let t = s.into_tuple(Uuid::nil());
        assert!(!t.is_expired(999));
        assert!(t.is_expired(1_000));
        assert!(t.is_expired(1_001));
    }

    #[test]
    fn no_expiry_never_expires() {
        let t = spec().into_tuple(Uuid::nil());
        assert!(!t.is_expired(i64::MAX));
    }
}
