//! Unified error type for Nexus.
//!
//! Every method on a Nexus engine returns [`Result<T>`], carrying either
//! success data or one [`Error`] variant. The transport layer (out of scope
//! for this crate) maps each variant to an HTTP status; see the table in
//! the specification's error handling section. Internal recursion never
//! swallows errors silently — the only broadly-caught case is cache writes,
//! where failure is logged but does not fail the enclosing read.

use thiserror::Error;

/// Result type alias used throughout Nexus.
pub type Result<T> = std::result::Result<T, Error>;

/// One limit kind enforced by the graph traversal engine (P0-5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    /// Recursion depth exceeded.
    Depth,
    /// Too many distinct `(subject, permission, object)` triples visited.
    VisitedNodes,
    /// Too many tuple-store queries issued by one check.
    TupleQueries,
    /// Too many branches considered at a single union/fan-out point.
    FanOut,
    /// Wall-clock budget for the whole check exceeded.
    WallTime,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LimitKind::Depth => "depth",
            LimitKind::VisitedNodes => "visited_nodes",
            LimitKind::TupleQueries => "tuple_queries",
            LimitKind::FanOut => "fan_out",
            LimitKind::WallTime => "wall_time_ms",
        };
        f.write_str(s)
    }
}

/// The unified Nexus error type.
///
/// Each variant corresponds to one row of the error taxonomy table in the
/// specification and yields a distinct error code at the transport boundary.
#[derive(Debug, Error)]
pub enum Error {
    /// Path, tuple, upload session, share link, or snapshot does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A permission check failed, or the caller lacks ownership of a resource.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Malformed input: negative length, bad glob pattern, invalid relation, etc.
    #[error("validation error: {0}")]
    Validation(String),

    /// A write attempted to cross a zone boundary on a non-shared relation.
    #[error("zone isolation error: {0}")]
    ZoneIsolation(String),

    /// The backend refused the operation or was unreachable.
    #[error("backend error: {0}")]
    Backend(String),

    /// A graph traversal safety limit (P0-5) was exceeded.
    #[error("graph limit exceeded: {kind} limit={limit} actual={actual}")]
    GraphLimitExceeded {
        /// Which limit tripped.
        kind: LimitKind,
        /// The configured limit.
        limit: u64,
        /// The value actually observed.
        actual: u64,
    },

    /// A chunked-upload `PATCH` arrived with an offset that does not match
    /// the session's current `upload_offset`.
    #[error("upload offset mismatch: expected {expected}, received {received}")]
    UploadOffsetMismatch {
        /// Offset the session expected.
        expected: u64,
        /// Offset the client sent.
        received: u64,
    },

    /// A chunked-upload checksum header did not match the received bytes.
    #[error("upload checksum mismatch: algorithm={0}")]
    UploadChecksumMismatch(String),

    /// The upload session has passed its TTL and may not receive more chunks.
    #[error("upload session expired")]
    UploadExpired,

    /// The global upload concurrency semaphore has no free permits.
    #[error("too many concurrent uploads")]
    TooManyConcurrentUploads,

    /// An `if_match`/`if_none_match` precondition failed.
    #[error("conflict: {0}")]
    Conflict(String),

    /// An unexpected internal error. Indicates a bug.
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Build a [`Error::GraphLimitExceeded`] for the given kind.
    pub fn graph_limit(kind: LimitKind, limit: u64, actual: u64) -> Self {
        Error::GraphLimitExceeded {
            kind,
            limit,
            actual,
        }
    }

    /// Whether this error represents a "not found" condition at the transport boundary.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Whether a caller may reasonably retry this operation unchanged.
    ///
    /// Backend errors may be transient; everything else reflects a durable
    /// condition (bad input, exhausted permit, terminal session state) that
    /// retrying without change will not fix.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Backend(_))
    }

    /// The HTTP-ish status code a transport would report for this error.
    ///
    /// The core has no transport of its own; this is provided so that the
    /// (out-of-scope) RPC/HTTP boundary has a single place to look up the
    /// mapping instead of re-deriving it per call site.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::PermissionDenied(_) | Error::GraphLimitExceeded { .. } => 403,
            Error::Validation(_) | Error::ZoneIsolation(_) => 400,
            Error::Backend(_) => 502,
            Error::UploadOffsetMismatch { .. } => 409,
            Error::UploadChecksumMismatch(_) => 460,
            Error::UploadExpired => 410,
            Error::TooManyConcurrentUploads => 429,
            Error::Conflict(_) => 412,
            Error::Internal(_) => 500,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_taxonomy() {
        assert_eq!(Error::NotFound("x".into()).status_code(), 404);
        assert_eq!(Error::UploadChecksumMismatch("sha256".into()).status_code(), 460);
        assert_eq!(Error::UploadExpired.status_code(), 410);
        assert_eq!(Error::TooManyConcurrentUploads.status_code(), 429);
        assert_eq!(Error::Conflict("etag".into()).status_code(), 412);
    }

    #[test]
    fn graph_limit_constructor() {
        let e = Error::graph_limit(LimitKind::Depth, 50, 51);
        assert!(matches!(e, Error::GraphLimitExceeded { limit: 50, actual: 51, .. }));
        assert_eq!(e.to_string(), "graph limit exceeded: depth limit=50 actual=51");
    }

    #[test]
    fn backend_errors_are_retryable() {
        assert!(Error::Backend("timeout".into()).is_retryable());
        assert!(!Error::Validation("bad".into()).is_retryable());
    }
}
