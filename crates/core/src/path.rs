//! Canonical storage paths vs. their external display form.
//!
//! Stored paths carry internal `"/tenant:<id>/user:<id>/"` or `"/zone/<id>/"`
//! prefixes so the index can place every zone's tree under one namespace.
//! The RPC boundary strips these on all outgoing paths. Rather than strip
//! by string munging at each call site (the source's approach, flagged in
//! the specification's design notes as a leak risk), [`NexusPath`] tracks
//! both forms together so a caller can never accidentally hand out the
//! storage form.
use serde::{Deserialize, Serialize};

/// A path that knows both its storage form and its external display form.
///
/// Construct with [`NexusPath::scoped`] from a zone/tenant/user prefix and
/// a logical path; read the external form with [`NexusPath::display`] and
/// the storage form with [`NexusPath::storage`]. There is deliberately no
/// way to obtain the display form from a bare string without going through
/// the scoping constructor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NexusPath {
    storage: String,
    display: String,
}

impl NexusPath {
    /// Build a path scoped under a zone prefix.
    ///
    /// `logical` must start with `/`. The storage form becomes
    /// `/zone/<zone_id>{logical}`; the display form is `logical` unchanged.
    pub fn scoped(zone_prefix: &str, logical: &str) -> Self {
        let logical = if logical.starts_with('/') {
            logical.to_string()
        } else {
            format!("/{logical}")
        };
        NexusPath {
            storage: format!("/zone/{zone_prefix}{logical}"),
            display: logical,
        }
    }

    /// Wrap an already-unscoped path (no transformation, used for root `"/"`
    /// listings and other paths with no zone prefix to strip).
    pub fn unscoped(logical: &str) -> Self {
        NexusPath {
            storage: logical.to_string(),
            display: logical.to_string(),
        }
    }

    /// Parse a storage-form path (as persisted in the index) back into a
    /// `NexusPath`, stripping any recognized internal prefix.
    ///
    /// Recognizes `/tenant:<id>/user:<id>/...`, `/zone/<id>/...`, or no
    /// prefix at all.
    pub fn from_storage(storage: &str) -> Self {
        let display = strip_internal_prefixes(storage);
        NexusPath {
            storage: storage.to_string(),
            display,
        }
    }

    /// The form safe to return across the RPC boundary.
    pub fn display(&self) -> &str {
        &self.display
    }

    /// The form used as the index key.
    pub fn storage(&self) -> &str {
        &self.storage
    }

    /// The parent of this path's display form, or `None` at the root.
    pub fn parent(&self) -> Option<String> {
        let trimmed = self.display.trim_end_matches('/');
        if trimmed.is_empty() {
            return None;
        }
        match trimmed.rfind('/') {
            Some(0) => Some("/".to_string()),
            Some(idx) => Some(trimmed[..idx].to_string()),
            None => None,
        }
    }
}

fn strip_internal_prefixes(storage: &str) -> String {
    let mut rest = storage;
    loop {
        if let Some(after) = rest.strip_prefix("/tenant:").or_else(|| rest.strip_prefix("/user:")) {
            match after.find('/') {
                Some(idx) => rest = &after[idx..],
                None => return "/".to_string(),
            }
            continue;
        }
        if let Some(after) = rest.strip_prefix("/zone/") {
            match after.find('/') {
                Some(idx) => rest = &after[idx..],
                None => return "/".to_string(),
            }
            continue;
        }
        break;
    }
    if rest.is_empty() {
        "/".to_string()
    } else {
        rest.to_string()
    }
}

/// Validate that a path is safe to return across the RPC boundary: it must
/// match `^/[^:]*$` — no `tenant:`, `user:`, or `zone/` segments.
pub fn is_unscoped(path: &str) -> bool {
    path.starts_with('/') && !path.contains(':')
}
