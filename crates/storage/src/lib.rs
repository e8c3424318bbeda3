//! Local disk cache and connector sync pipeline for Nexus.
//!
//! Sits between the permission/result caches (`nexus-authz`) and network
//! backends: a content-addressable cache on local storage
//! ([`disk_cache::LocalDiskCache`]), and a seven-stage batch sync pipeline
//! ([`sync::run_sync`]) that keeps the local index current with connector
//! backends without issuing one round-trip per file.

#![warn(missing_docs)]

pub mod backend;
pub mod bloom;
pub mod content_cache;
pub mod disk_cache;
pub mod glob;
pub mod sync;

pub use backend::{ConnectorBackend, EmbeddingProvider, FileInfo, MultipartBackend};
pub use bloom::BloomFilter;
pub use content_cache::{CachedContentMeta, ContentCacheStore, ContentType};
pub use disk_cache::{content_hash, CacheEntry, CacheStats, LocalDiskCache};
pub use sync::{run_sync, SyncConfig, SyncResult};
