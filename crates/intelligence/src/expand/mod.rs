//! Query expansion interface.
//!
//! Nexus delegates the actual LLM call out of process (see the crate's
//! top-level docs on out-of-scope collaborators); this module only fixes
//! the shape a caller can drive multi-query retrieval against — a natural
//! language query expanded into typed BM25/vector search variants, fused
//! downstream with weighted RRF.
//!
//! # Expansion Types
//!
//! | Type | Purpose | Search mode |
//! |------|---------|-------------|
//! | `Lex` | Keyword reformulations | BM25 only |
//! | `Vec` | Semantic rephrasings | BM25 + vector (hybrid) |
//! | `Hyde` | Hypothetical document text | Vector only |

pub mod error;
pub mod signal;

#[cfg(test)]
pub(crate) mod mock;

pub use error::ExpandError;
pub use signal::{ScoredResult, SignalDetector};

/// Type of expanded query — determines how it is searched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    /// Keyword reformulation — searched via BM25 only
    Lex,
    /// Semantic rephrasing — searched via hybrid (BM25 + vector)
    Vec,
    /// Hypothetical document text (HyDE) — embedded and searched via vector only
    Hyde,
}

/// A single expanded query with its type.
#[derive(Debug, Clone)]
pub struct ExpandedQuery {
    /// How this query should be searched
    pub query_type: QueryType,
    /// The query text
    pub text: String,
}

/// Result of query expansion — multiple typed queries.
#[derive(Debug, Clone)]
pub struct ExpandedQueries {
    /// The expanded query variants
    pub queries: Vec<ExpandedQuery>,
}

/// Trait for query expansion implementations.
///
/// Implementations take a natural language query and generate typed search
/// variants, typically by delegating to an out-of-process LLM endpoint. The
/// trait is object-safe for use as `Arc<dyn QueryExpander>`.
pub trait QueryExpander: Send + Sync {
    /// Expand a query into multiple typed search variants.
    fn expand(&self, query: &str) -> Result<ExpandedQueries, ExpandError>;
}

/// Expand `query` through `expander`, but only if `initial_results` don't
/// already show a strong signal per `detector`. Returns `None` when
/// expansion was skipped.
pub fn expand_if_warranted(
    detector: &SignalDetector,
    initial_results: &[ScoredResult],
    expander: &dyn QueryExpander,
    query: &str,
) -> Result<Option<ExpandedQueries>, ExpandError> {
    if detector.should_expand(initial_results) {
        Ok(Some(expander.expand(query)?))
    } else {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expand::mock::MockExpander;
    use std::sync::Arc;

    #[test]
    fn test_query_expander_is_object_safe() {
        let expander: Arc<dyn QueryExpander> = Arc::new(MockExpander);
        let result = expander.expand("test").unwrap();
        assert!(!result.queries.is_empty());
    }

    #[test]
    fn test_expanded_query_types() {
        assert_ne!(QueryType::Lex, QueryType::Vec);
        assert_ne!(QueryType::Vec, QueryType::Hyde);
        assert_ne!(QueryType::Lex, QueryType::Hyde);
    }

    #[test]
    fn strong_signal_skips_expansion() {
        let detector = SignalDetector::default();
        let expander = MockExpander;
        let results = [ScoredResult { score: 0.95 }, ScoredResult { score: 0.4 }];
        let outcome = expand_if_warranted(&detector, &results, &expander, "q").unwrap();
        assert!(outcome.is_none());
    }

    #[test]
    fn weak_signal_runs_expansion() {
        let detector = SignalDetector::default();
        let expander = MockExpander;
        let results = [ScoredResult { score: 0.4 }];
        let outcome = expand_if_warranted(&detector, &results, &expander, "q").unwrap();
        assert!(outcome.is_some());
    }
}
