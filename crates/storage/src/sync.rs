//! Sync Pipeline: seven-stage batch synchronization from a connector
//! backend into the local index and disk cache.
//!
//! Each stage has its own error basin — a failure synchronizing one file is
//! recorded in [`SyncResult::errors`] and does not abort the batch for the
//! other candidates. The stage boundaries exist so that every N-item run
//! issues O(1) round-trips to the content-cache table and the backend's
//! batch version API, not O(N).

use nexus_core::NexusPath;

use crate::backend::{ConnectorBackend, EmbeddingProvider};
use crate::content_cache::{CachedContentMeta, ContentCacheStore, ContentType};
use crate::disk_cache::{content_hash, LocalDiskCache};
use crate::glob::passes_filters;

/// Configuration for one sync run.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Backend path to scan, recursively.
    pub source_path: String,
    /// Virtual path candidates are mounted under.
    pub mount_point: String,
    /// Zone the synced content belongs to.
    pub zone_id: String,
    /// Include glob patterns (matched against the virtual path); empty means "match all".
    pub include: Vec<String>,
    /// Exclude glob patterns; checked after include and always wins on overlap.
    pub exclude: Vec<String>,
    /// Files larger than this are skipped during the process-content stage.
    pub max_size: u64,
    /// Whether to generate embeddings for changed records (stage 7).
    pub generate_embeddings: bool,
}

/// Outcome of one sync run.
#[derive(Debug, Clone, Default)]
pub struct SyncResult {
    /// Candidates discovered before filtering.
    pub files_scanned: u64,
    /// Files whose content cache entry was written or refreshed.
    pub files_synced: u64,
    /// Files skipped: filtered out, immutable, or already current.
    pub files_skipped: u64,
    /// Total bytes read from the backend and written to cache.
    pub bytes_synced: u64,
    /// Embeddings successfully generated.
    pub embeddings_generated: u64,
    /// Per-file failures recorded along the way; does not abort the batch.
    pub errors: Vec<String>,
}

struct ReadRecord {
    virtual_path: String,
    content: Vec<u8>,
    backend_version: String,
}

struct ProcessedRecord {
    virtual_path: String,
    content_hash: String,
    content: Vec<u8>,
    backend_version: String,
}

/// Run the seven-stage pipeline once against `backend`, updating
/// `content_cache` and `disk_cache` in place.
pub fn run_sync(
    backend: &dyn ConnectorBackend,
    disk_cache: &LocalDiskCache,
    content_cache: &ContentCacheStore,
    embedder: Option<&dyn EmbeddingProvider>,
    config: &SyncConfig,
) -> SyncResult {
    let mut result = SyncResult::default();

    // Stage 1: discover.
    let discovered = discover(backend, config, &mut result);

    // Stage 2: load cache — one bulk read for every candidate.
    let virtual_paths: Vec<String> = discovered.iter().map(|(vp, _)| vp.clone()).collect();
    let cached = content_cache.load_many(&config.zone_id, &virtual_paths);

    // Stage 3: check versions.
    let mut to_read = Vec::new();
    for ((virtual_path, backend_path), existing) in discovered.into_iter().zip(cached.into_iter()) {
        match existing {
            Some(meta) if meta.immutable => {
                result.files_skipped += 1;
            }
            Some(meta) if !meta.stale => {
                // version comparison is deferred to the batch fetch below
                to_read.push((virtual_path, backend_path, Some(meta.backend_version)));
            }
            _ => to_read.push((virtual_path, backend_path, None)),
        }
    }

    let backend_paths: Vec<String> = to_read.iter().map(|(_, bp, _)| bp.clone()).collect();
    let versions = backend.batch_versions(&backend_paths).unwrap_or_default();
    let version_map: std::collections::HashMap<&str, &str> =
        versions.iter().map(|(p, v)| (p.as_str(), v.as_str())).collect();

    let mut marked = Vec::new();
    for (virtual_path, backend_path, cached_version) in to_read {
        let current_version = version_map.get(backend_path.as_str()).copied();
        match (cached_version.as_deref(), current_version) {
            (Some(cached), Some(current)) if cached == current => {
                result.files_skipped += 1;
            }
            _ => marked.push((virtual_path, backend_path)),
        }
    }

    // Stage 4: read backend.
    let mut read_records = Vec::new();
    for (virtual_path, backend_path) in marked {
        match backend.read_content(&backend_path) {
            Ok(content) => {
                let backend_version = version_map.get(backend_path.as_str()).map(|s| s.to_string()).unwrap_or_default();
                read_records.push(ReadRecord { virtual_path, content, backend_version });
            }
            Err(e) => {
                result.errors.push(format!("{backend_path}: read failed: {e}"));
            }
        }
    }

    // Stage 5: process content.
    let mut processed = Vec::new();
    for record in read_records {
        if record.content.len() as u64 > config.max_size {
            result.files_skipped += 1;
            continue;
        }
        let hash = content_hash(&record.content);
        if let Some(existing) = content_cache.get(&config.zone_id, &record.virtual_path) {
            if existing.content_hash == hash {
                result.files_skipped += 1;
                continue;
            }
        }
        processed.push(ProcessedRecord {
            virtual_path: record.virtual_path,
            content_hash: hash,
            content: record.content,
            backend_version: record.backend_version,
        });
    }

    // Stage 6: write cache — one batch write for every changed record.
    let mut cache_records = Vec::with_capacity(processed.len());
    for record in &processed {
        disk_cache
            .put(&record.content_hash, &record.content, Some(&config.zone_id), 0, false)
            .unwrap_or_else(|e| {
                result.errors.push(format!("{}: disk cache write failed: {e}", record.virtual_path));
                false
            });
        result.bytes_synced += record.content.len() as u64;
        cache_records.push(CachedContentMeta {
            virtual_path: record.virtual_path.clone(),
            zone_id: config.zone_id.clone(),
            content_hash: record.content_hash.clone(),
            content_text: String::from_utf8(record.content.clone()).ok(),
            content_type: ContentType::Full,
            original_size: record.content.len() as u64,
            cached_size: record.content.len() as u64,
            backend_version: record.backend_version.clone(),
            synced_at: 0,
            stale: false,
            immutable: false,
        });
    }
    result.files_synced = cache_records.len() as u64;
    content_cache.write_many(cache_records);

    // Stage 7: generate embeddings (optional, best-effort per file).
    if config.generate_embeddings {
        if let Some(embedder) = embedder {
            for record in &processed {
                let Some(text) = String::from_utf8(record.content.clone()).ok() else { continue };
                match embedder.embed(&text) {
                    Ok(_vector) => result.embeddings_generated += 1,
                    Err(e) => result.errors.push(format!("{}: embedding failed: {e}", record.virtual_path)),
                }
            }
        }
    }

    result
}

fn discover(
    backend: &dyn ConnectorBackend,
    config: &SyncConfig,
    result: &mut SyncResult,
) -> Vec<(String, String)> {
    let mut out = Vec::new();
    let mut stack = vec![config.source_path.clone()];
    while let Some(dir) = stack.pop() {
        let Ok(entries) = backend.list_dir(&dir) else { continue };
        for entry in entries {
            result.files_scanned += 1;
            if entry.is_directory {
                stack.push(entry.path.clone());
                continue;
            }
            let relative = entry.path.strip_prefix(&config.source_path).unwrap_or(&entry.path);
            let virtual_path = NexusPath::scoped(&config.mount_point, relative).display().to_string();
            if !passes_filters(&virtual_path, &config.include, &config.exclude) {
                result.files_skipped += 1;
                continue;
            }
            out.push((virtual_path, entry.path));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FileInfo;
    use nexus_core::Result;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct FakeBackend {
        files: HashMap<String, Vec<u8>>,
        versions: Mutex<HashMap<String, String>>,
    }

    impl ConnectorBackend for FakeBackend {
        fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>> {
            Ok(self
                .files
                .keys()
                .filter(|p| p.starts_with(path))
                .map(|p| FileInfo {
                    path: p.clone(),
                    is_directory: false,
                    size: self.files[p].len() as u64,
                    backend_version: self.versions.lock().unwrap().get(p).cloned().unwrap_or_default(),
                    mime_type: None,
                })
                .collect())
        }
        fn read_content(&self, path: &str) -> Result<Vec<u8>> {
            Ok(self.files.get(path).cloned().unwrap_or_default())
        }
        fn is_directory(&self, _path: &str) -> Result<bool> {
            Ok(false)
        }
        fn exists(&self, path: &str) -> Result<bool> {
            Ok(self.files.contains_key(path))
        }
        fn get_file_info(&self, path: &str) -> Result<FileInfo> {
            Ok(FileInfo {
                path: path.to_string(),
                is_directory: false,
                size: self.files.get(path).map(|c| c.len() as u64).unwrap_or(0),
                backend_version: self.versions.lock().unwrap().get(path).cloned().unwrap_or_default(),
                mime_type: None,
            })
        }
    }

    fn config() -> SyncConfig {
        SyncConfig {
            source_path: "/connector".to_string(),
            mount_point: "z1".to_string(),
            zone_id: "z1".to_string(),
            include: vec![],
            exclude: vec![],
            max_size: 1_000_000,
            generate_embeddings: false,
        }
    }

    #[test]
    fn first_sync_writes_everything() {
        let dir = tempdir().unwrap();
        let disk_cache = LocalDiskCache::open(dir.path(), 1000, 10_000_000).unwrap();
        let content_cache = ContentCacheStore::new();
        let mut files = HashMap::new();
        files.insert("/connector/a.txt".to_string(), b"alpha".to_vec());
        let mut versions = HashMap::new();
        versions.insert("/connector/a.txt".to_string(), "v1".to_string());
        let backend = FakeBackend { files, versions: Mutex::new(versions) };

        let result = run_sync(&backend, &disk_cache, &content_cache, None, &config());
        assert_eq!(result.files_synced, 1);
        assert_eq!(result.files_skipped, 0);
        assert_eq!(result.bytes_synced, 5);
    }

    #[test]
    fn unchanged_version_is_skipped_on_resync() {
        let dir = tempdir().unwrap();
        let disk_cache = LocalDiskCache::open(dir.path(), 1000, 10_000_000).unwrap();
        let content_cache = ContentCacheStore::new();
        let mut files = HashMap::new();
        files.insert("/connector/a.txt".to_string(), b"alpha".to_vec());
        let mut versions = HashMap::new();
        versions.insert("/connector/a.txt".to_string(), "v1".to_string());
        let backend = FakeBackend { files, versions: Mutex::new(versions) };

        run_sync(&backend, &disk_cache, &content_cache, None, &config());
        let second = run_sync(&backend, &disk_cache, &content_cache, None, &config());
        assert_eq!(second.files_synced, 0);
        assert_eq!(second.files_skipped, 1);
    }

    #[test]
    fn changed_version_triggers_resync() {
        let dir = tempdir().unwrap();
        let disk_cache = LocalDiskCache::open(dir.path(), 1000, 10_000_000).unwrap();
        let content_cache = ContentCacheStore::new();
        let mut files = HashMap::new();
        files.insert("/connector/a.txt".to_string(), b"alpha".to_vec());
        let mut versions = HashMap::new();
        versions.insert("/connector/a.txt".to_string(), "v1".to_string());
        let backend = FakeBackend { files, versions: Mutex::new(versions) };
        run_sync(&backend, &disk_cache, &content_cache, None, &config());

        let mut files2 = HashMap::new();
        files2.insert("/connector/a.txt".to_string(), b"alpha-v2".to_vec());
        let mut versions2 = HashMap::new();
        versions2.insert("/connector/a.txt".to_string(), "v2".to_string());
        let backend2 = FakeBackend { files: files2, versions: Mutex::new(versions2) };

        let second = run_sync(&backend2, &disk_cache, &content_cache, None, &config());
        assert_eq!(second.files_synced, 1);
    }

    #[test]
    fn exclude_pattern_skips_candidate() {
        let dir = tempdir().unwrap();
        let disk_cache = LocalDiskCache::open(dir.path(), 1000, 10_000_000).unwrap();
        let content_cache = ContentCacheStore::new();
        let mut files = HashMap::new();
        files.insert("/connector/secret.env".to_string(), b"shh".to_vec());
        let backend = FakeBackend { files, versions: Mutex::new(HashMap::new()) };

        let mut cfg = config();
        cfg.exclude = vec!["/z1/*.env".to_string()];
        let result = run_sync(&backend, &disk_cache, &content_cache, None, &cfg);
        assert_eq!(result.files_synced, 0);
        assert_eq!(result.files_skipped, 1);
    }
}
