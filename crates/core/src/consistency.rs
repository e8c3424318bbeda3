//! Revisions, consistency tokens, and read requirements.
//!
//! Every write receives a monotonically increasing [`Revision`] and an
//! opaque [`ConsistencyToken`] (`"v{revision}"`). Reads accept a
//! [`ConsistencyRequirement`] describing the minimum snapshot they must
//! observe. A token returned from a write, when supplied to a later read
//! under `AtLeastAsFresh`, guarantees the read observes that write
//! (read-your-writes across the process boundary).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A monotonically increasing revision number.
///
/// The source may order revisions zone-globally or process-globally; either
/// is non-decreasing under any observable ordering, which is all callers
/// may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revision(pub u64);

impl fmt::Display for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// An opaque consistency token encoding a revision, in the form `"v{revision}"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsistencyToken(pub String);

impl ConsistencyToken {
    /// Encode a revision as a token.
    pub fn from_revision(rev: Revision) -> Self {
        ConsistencyToken(format!("v{}", rev.0))
    }

    /// Decode the revision a token encodes, if well-formed.
    pub fn revision(&self) -> Option<Revision> {
        self.0.strip_prefix('v')?.parse::<u64>().ok().map(Revision)
    }
}

impl fmt::Display for ConsistencyToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The consistency mode a read requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsistencyRequirement {
    /// Any committed snapshot; cache reads are allowed.
    Eventual,
    /// The read must reflect all writes at or before `min_revision`.
    AtLeastAsFresh {
        /// The minimum revision the read must observe.
        min_revision: Revision,
    },
    /// Bypass the cache; read reflects all committed writes.
    Strong,
}

impl ConsistencyRequirement {
    /// Build an `AtLeastAsFresh` requirement from a token returned by a write.
    ///
    /// Returns `Strong` if the token is malformed, which is the safe
    /// (never-stale) fallback.
    pub fn at_least_as_fresh(token: &ConsistencyToken) -> Self {
        match token.revision() {
            Some(min_revision) => ConsistencyRequirement::AtLeastAsFresh { min_revision },
            None => ConsistencyRequirement::Strong,
        }
    }

    /// Whether a cached value observed at `observed_at` satisfies this requirement.
    pub fn satisfied_by(&self, observed_at: Revision) -> bool {
        match self {
            ConsistencyRequirement::Eventual => true,
            ConsistencyRequirement::Strong => false,
            ConsistencyRequirement::AtLeastAsFresh { min_revision } => observed_at >= *min_revision,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_roundtrip() {
        let tok = ConsistencyToken::from_revision(Revision(42));
        assert_eq!(tok.0, "v42");
        assert_eq!(tok.revision(), Some(Revision(42)));
    }

    #[test]
    fn malformed_token_has_no_revision() {
        let tok = ConsistencyToken("garbage".into());
        assert_eq!(tok.revision(), None);
    }

    #[test]
    fn eventual_always_satisfied() {
        assert!(ConsistencyRequirement::Eventual.satisfied_by(Revision(0)));
    }

    #[test]
    fn strong_never_satisfied_by_cache() {
        assert!(!ConsistencyRequirement::Strong.satisfied_by(Revision(1_000_000)));
    }

    #[test]
    fn at_least_as_fresh_compares_revisions() {
        let req = ConsistencyRequirement::AtLeastAsFresh { min_revision: Revision(42) };
        assert!(req.satisfied_by(Revision(42)));
        assert!(req.satisfied_by(Revision(43)));
        assert!(!req.satisfied_by(Revision(41)));
    }

    #[test]
    fn read_your_writes() {
        let token = ConsistencyToken::from_revision(Revision(42));
        let req = ConsistencyRequirement::at_least_as_fresh(&token);
        assert!(req.satisfied_by(Revision(42)));
        assert!(!req.satisfied_by(Revision(41)));
    }
}
