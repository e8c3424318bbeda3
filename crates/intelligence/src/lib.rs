//! Interfaces for Nexus's out-of-process intelligence collaborators.
//!
//! Embedding, generation, and relationship-extraction providers are
//! deliberately out of scope for this workspace — only the shapes Nexus
//! calls through matter here. [`expand`] fixes the query-expansion
//! boundary (multi-query retrieval fanned out to BM25/vector search);
//! [`memory_evolution`] fixes the boundary for detecting how a newly
//! written memory relates to the existing memory graph.

#![warn(missing_docs)]

pub mod expand;
pub mod memory_evolution;

pub use expand::{expand_if_warranted, ExpandError, ExpandedQueries, ExpandedQuery, QueryExpander, QueryType, ScoredResult, SignalDetector};
pub use memory_evolution::{
    classify_heuristic, detect_evolution, EvolutionOutcome, EvolutionRelation, MemoryEvolutionEngine, MemoryNode,
    DEFAULT_CONFIDENCE_THRESHOLD,
};
