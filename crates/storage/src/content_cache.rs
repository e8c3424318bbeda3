//! Cached Content Meta: the sync pipeline's per-file version/content table.
//!
//! Distinct from [`crate::disk_cache::LocalDiskCache`] (a byte-addressable
//! CAS store): this table tracks, per virtual path, which backend version is
//! currently reflected in the index and whether the cached content is still
//! considered fresh.

use dashmap::DashMap;

/// Whether a cached entry holds the full content or a truncated excerpt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// The full content is cached.
    Full,
    /// Only a size-bounded excerpt is cached.
    Excerpt,
}

/// Per-path sync metadata.
#[derive(Debug, Clone)]
pub struct CachedContentMeta {
    /// Display-form virtual path.
    pub virtual_path: String,
    /// Zone the entry belongs to.
    pub zone_id: String,
    /// Content hash of the cached bytes.
    pub content_hash: String,
    /// Parsed text, when a content parser produced one.
    pub content_text: Option<String>,
    /// Whether `content_text` is full or an excerpt.
    pub content_type: ContentType,
    /// Size of the original backend content.
    pub original_size: u64,
    /// Size of the cached representation (may differ for excerpts).
    pub cached_size: u64,
    /// The backend's version/etag as of the last sync.
    pub backend_version: String,
    /// Unix millis of the last successful sync.
    pub synced_at: i64,
    /// Set when a sync has determined the cached copy no longer matches
    /// the backend; cleared on the next successful re-sync.
    pub stale: bool,
    /// `true` for sources (e.g. email, archive snapshots) that are never
    /// re-read from the backend once cached.
    pub immutable: bool,
}

type Key = (String, String); // (zone_id, virtual_path)

/// The sync pipeline's content-version table.
#[derive(Debug, Default)]
pub struct ContentCacheStore {
    entries: DashMap<Key, CachedContentMeta>,
}

impl ContentCacheStore {
    /// An empty store.
    pub fn new() -> Self {
        ContentCacheStore::default()
    }

    /// Bulk-load metadata for every candidate path in one call — the sync
    /// pipeline's "load cache" stage is always a single round-trip, never
    /// one lookup per candidate.
    pub fn load_many(&self, zone_id: &str, paths: &[String]) -> Vec<Option<CachedContentMeta>> {
        paths
            .iter()
            .map(|p| self.entries.get(&(zone_id.to_string(), p.clone())).map(|e| e.clone()))
            .collect()
    }

    /// Single lookup, for callers outside the bulk sync path.
    pub fn get(&self, zone_id: &str, virtual_path: &str) -> Option<CachedContentMeta> {
        self.entries.get(&(zone_id.to_string(), virtual_path.to_string())).map(|e| e.clone())
    }

    /// Batch-write accumulated sync records in one call.
    pub fn write_many(&self, records: Vec<CachedContentMeta>) {
        for record in records {
            let key = (record.zone_id.clone(), record.virtual_path.clone());
            self.entries.insert(key, record);
        }
    }

    /// Mark one entry stale, forcing the next sync to re-read it regardless
    /// of matching backend version.
    pub fn mark_stale(&self, zone_id: &str, virtual_path: &str) {
        if let Some(mut entry) = self.entries.get_mut(&(zone_id.to_string(), virtual_path.to_string())) {
            entry.stale = true;
        }
    }

    /// Number of tracked entries, for diagnostics.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(path: &str, version: &str, stale: bool) -> CachedContentMeta {
        CachedContentMeta {
            virtual_path: path.to_string(),
            zone_id: "z1".to_string(),
            content_hash: "deadbeef".to_string(),
            content_text: None,
            content_type: ContentType::Full,
            original_size: 10,
            cached_size: 10,
            backend_version: version.to_string(),
            synced_at: 0,
            stale,
            immutable: false,
        }
    }

    #[test]
    fn load_many_returns_none_for_missing() {
        let store = ContentCacheStore::new();
        store.write_many(vec![meta("/a", "v1", false)]);
        let results = store.load_many("z1", &["/a".to_string(), "/b".to_string()]);
        assert!(results[0].is_some());
        assert!(results[1].is_none());
    }

    #[test]
    fn mark_stale_flags_existing_entry() {
        let store = ContentCacheStore::new();
        store.write_many(vec![meta("/a", "v1", false)]);
        store.mark_stale("z1", "/a");
        assert!(store.get("z1", "/a").unwrap().stale);
    }
}
