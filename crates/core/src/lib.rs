//! Core data model for Nexus.
//!
//! This crate defines the types shared by every engine in the workspace:
//! entities, tuples, namespace configuration, ABAC conditions, consistency
//! tokens, operation context, and the unified error taxonomy. Nothing here
//! depends on storage, authorization, or transport — it is the vocabulary
//! the other crates are written against.
//!
//! # Layout
//!
//! - [`entity`]: typed identifier pairs (`entity_type`, `entity_id`)
//! - [`tuple`]: authorization facts and write results
//! - [`namespace`]: per-object-type relation declarations
//! - [`value`]: ABAC condition trees and evaluation context
//! - [`zone`]: administrative isolation boundaries
//! - [`consistency`]: revisions, tokens, and read requirements
//! - [`context`]: the `OperationContext` threaded through every call
//! - [`limits`]: P0-5 graph traversal safety limits
//! - [`path`]: canonical vs. display path forms
//! - [`error`]: the unified error type and transport-facing taxonomy

#![warn(missing_docs)]

pub mod consistency;
pub mod context;
pub mod entity;
pub mod error;
pub mod limits;
pub mod namespace;
pub mod path;
pub mod tuple;
pub mod value;
pub mod zone;

pub use consistency::{ConsistencyRequirement, ConsistencyToken, Revision};
pub use context::OperationContext;
pub use entity::Entity;
pub use error::{Error, Result};
pub use limits::GraphLimits;
pub use namespace::{NamespaceConfig, PermissionAlias, RelationKind};
pub use path::NexusPath;
pub use tuple::{Tuple, TupleSpec, WriteResult};
pub use value::{Condition, Value};
pub use zone::ZoneId;
