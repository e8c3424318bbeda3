//! In-memory virtual filesystem index: the `File Entity` the facade serves
//! `write`/`read`/`list`/`glob`/`grep` against.
//!
//! Content bytes live in the local disk cache, addressed by `etag`; this
//! index holds only the metadata row per path, keyed by [`NexusPath::storage`]
//! so every zone's tree sits under one `DashMap` without colliding.

use dashmap::DashMap;

use nexus_core::{Entity, NexusPath, ZoneId};

/// One virtual filesystem entry — a file or a directory marker.
#[derive(Debug, Clone)]
pub struct FileEntity {
    /// The path's external (display) form.
    pub virtual_path: String,
    /// Which connector backend produced this entry, when synced rather than
    /// written directly through this facade.
    pub backend_id: Option<String>,
    /// The backend's own path for this entry, when `backend_id` is set.
    pub physical_path: Option<String>,
    /// Content size in bytes (`0` for directories).
    pub size: u64,
    /// Content hash (SHA-256 hex) — doubles as the entry's `etag`.
    pub etag: String,
    /// MIME type, guessed or caller-supplied.
    pub mime_type: Option<String>,
    /// Zone this entry belongs to.
    pub zone_id: String,
    /// Monotonically increasing per-path version, bumped on every write.
    pub version: u64,
    /// Unix millis of the most recent write.
    pub modified_at: i64,
    /// Identity that created the entry.
    pub created_by: Entity,
    /// Whether this entry is a directory marker rather than a file.
    pub is_directory: bool,
}

/// The live path -> [`FileEntity`] table for one `NexusCore` instance.
///
/// Keyed by storage-form path so lookups never need to re-derive a zone
/// prefix; callers resolve display-form paths through [`NexusPath`] before
/// touching the index.
#[derive(Default)]
pub struct FileIndex {
    entries: DashMap<String, FileEntity>,
}

impl FileIndex {
    /// An empty index.
    pub fn new() -> Self {
        FileIndex::default()
    }

    /// Look up an entry by its storage-form path.
    pub fn get(&self, storage_path: &str) -> Option<FileEntity> {
        self.entries.get(storage_path).map(|e| e.clone())
    }

    /// Insert or replace an entry.
    pub fn put(&self, storage_path: String, entity: FileEntity) {
        self.entries.insert(storage_path, entity);
    }

    /// Remove an entry, returning it if it existed.
    pub fn remove(&self, storage_path: &str) -> Option<FileEntity> {
        self.entries.remove(storage_path).map(|(_, e)| e)
    }

    /// Whether an entry exists at `storage_path`.
    pub fn contains(&self, storage_path: &str) -> bool {
        self.entries.contains_key(storage_path)
    }

    /// Every entry in `zone` whose storage path starts with `prefix`,
    /// optionally restricted to direct children only (`recursive = false`).
    pub fn list_under(&self, zone: &ZoneId, prefix: &str, recursive: bool) -> Vec<FileEntity> {
        let scoped_prefix = NexusPath::scoped(&zone.0, prefix);
        let base = scoped_prefix.storage();
        self.entries
            .iter()
            .filter(|item| {
                let path = item.key().as_str();
                if path == base {
                    return false;
                }
                let Some(rest) = path.strip_prefix(base) else { return false };
                let rest = rest.strip_prefix('/').unwrap_or(rest);
                if rest.is_empty() {
                    return false;
                }
                recursive || !rest.contains('/')
            })
            .map(|item| item.value().clone())
            .collect()
    }

    /// Every entry currently held, for zone-wide scans (`glob`/`grep`).
    pub fn all(&self) -> Vec<FileEntity> {
        self.entries.iter().map(|item| item.value().clone()).collect()
    }
}
