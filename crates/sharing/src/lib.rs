//! Share links and workspace snapshots for Nexus.
//!
//! Two independent capabilities that both sit above the CAS layer:
//! [`share_link`] issues capability-URL tokens granting scoped access to a
//! resource without consulting the tuple store per access, and [`snapshot`]
//! versions a workspace subtree as CAS-backed manifests that can be
//! restored, listed, and diffed without copying bytes.

#![warn(missing_docs)]

pub mod share_link;
pub mod snapshot;

pub use share_link::{AccessLogEntry, AccessOutcome, PermissionLevel, ShareLink, ShareLinkService};
pub use snapshot::{ManifestEntry, RestoreAction, SnapshotDiff, SnapshotManifest, SnapshotRecord, SnapshotService};
