//! Zone identifiers.
//!
//! A zone is an administrative isolation boundary — typically a tenant or
//! organization. Tuples, events, and caches are partitioned by zone except
//! for an explicit allow-list of cross-zone relations (see
//! `nexus_authz::zone::ZoneManager`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// A zone identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ZoneId(pub String);

impl ZoneId {
    /// Construct a zone id from anything string-like.
    pub fn new(id: impl Into<String>) -> Self {
        ZoneId(id.into())
    }

    /// The zone used when no explicit zone is supplied.
    pub fn default_zone() -> Self {
        ZoneId("default".to_string())
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ZoneId {
    fn from(s: &str) -> Self {
        ZoneId::new(s)
    }
}
