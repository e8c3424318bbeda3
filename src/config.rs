//! Process-wide configuration for a [`crate::NexusCore`] instance.

use std::path::PathBuf;

use nexus_authz::engine::AuthzConfig;
use nexus_upload::UploadConfig;

/// Configuration recognized when constructing a [`crate::NexusCore`],
/// matching the options the specification's boundary recognizes.
#[derive(Debug, Clone)]
pub struct NexusConfig {
    /// Directory the local disk cache persists content and metadata under.
    pub cache_dir: PathBuf,
    /// Directory the WAL writes segment files under.
    pub wal_dir: PathBuf,
    /// Local-disk-cache capacity, in entries.
    pub max_entries: u64,
    /// Local-disk-cache capacity, in bytes.
    pub max_size_bytes: u64,
    /// Authorization engine configuration (cache TTL, graph limits, zone
    /// isolation, Leopard closure).
    pub authz: AuthzConfig,
    /// Chunked upload service configuration.
    pub upload: UploadConfig,
}

impl NexusConfig {
    /// A configuration rooted at `data_dir`, with every other option at its
    /// specification-documented default.
    pub fn at(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        NexusConfig {
            cache_dir: data_dir.join("cache"),
            wal_dir: data_dir.join("wal"),
            max_entries: 100_000,
            max_size_bytes: 10 * 1024 * 1024 * 1024,
            authz: AuthzConfig::default(),
            upload: UploadConfig::default(),
        }
    }
}
