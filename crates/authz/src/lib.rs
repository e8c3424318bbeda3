//! Authorization engine: Zanzibar-derived ReBAC over the Nexus data model.
//!
//! Wires together the tuple store, the Leopard transitive-closure index, the
//! zone manager, the consistency manager, the graph traversal engine, and
//! the two-tier permission cache. [`AuthzEngine`] is the entry point other
//! crates (and, ultimately, the RPC boundary) call through.

#![warn(missing_docs)]

pub mod cache;
pub mod closure;
pub mod consistency;
pub mod engine;
pub mod traversal;
pub mod tuple_store;
pub mod zone;

pub use cache::PermissionCache;
pub use closure::LeopardClosure;
pub use consistency::ConsistencyManager;
pub use engine::AuthzEngine;
pub use traversal::GraphTraversal;
pub use tuple_store::TupleStore;
pub use zone::ZoneManager;
