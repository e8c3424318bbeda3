//! Graph traversal safety limits (P0-5).
//!
//! These bound the work a single `compute_permission` check may perform.
//! All are enforced eagerly — depth before recursion, fan-out before the
//! iteration loop, tuple-query count before each store access, visited
//! count after each insert, wall time before each recursion — so that a
//! pathological tuple graph (deep nesting, wide unions, cycles) fails fast
//! instead of degrading the whole process.

use serde::{Deserialize, Serialize};

/// The P0-5 safety limits for one permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphLimits {
    /// Maximum recursion depth.
    pub max_depth: u32,
    /// Maximum distinct `(subject, permission, object)` triples visited.
    pub max_visited_nodes: u32,
    /// Maximum tuple-store queries issued by one check.
    pub max_tuple_queries: u32,
    /// Maximum branches considered at a single union/fan-out point.
    pub max_fan_out: u32,
    /// Maximum wall-clock time for the whole check, in milliseconds.
    pub max_execution_time_ms: u64,
}

impl Default for GraphLimits {
    fn default() -> Self {
        GraphLimits {
            max_depth: 50,
            max_visited_nodes: 10_000,
            max_tuple_queries: 1_000,
            max_fan_out: 500,
            max_execution_time_ms: 5_000,
        }
    }
}
