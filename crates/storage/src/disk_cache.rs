//! Local Disk Cache: a content-addressable cache between the in-memory
//! permission/result caches and network backends.
//!
//! Entries live under a two-level sharded directory (`content/{h0..2}/{h2..4}/`)
//! to keep any one directory's fan-out bounded regardless of cache size.
//! Eviction uses CLOCK (second-chance LRU) rather than a true LRU list so a
//! hit never needs to reshuffle a linked list under lock — only the
//! survivor's reference bit flips.

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use dashmap::DashMap;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use nexus_core::{Error, Result};

use crate::bloom::BloomFilter;

const METADATA_VERSION: u32 = 1;
const DEFAULT_BLOCK_SIZE: usize = 4 * 1024 * 1024;

/// Metadata tracked per cached content hash.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// SHA-256 hex digest of the content.
    pub content_hash: String,
    /// Tenant the entry is scoped to, if the cache is multi-tenant.
    pub tenant_id: Option<String>,
    /// Content length in bytes.
    pub size: u64,
    /// Unix millis of first insertion.
    pub created_at: i64,
    /// Unix millis of the most recent hit.
    pub last_accessed: i64,
    /// Number of hits since creation.
    pub access_count: u64,
    /// CLOCK reference bit: set on access, cleared on an eviction scan pass.
    pub clock_bit: bool,
    /// Priority entries are skipped on the first CLOCK scan pass.
    pub priority: u8,
}

/// Point-in-time cache statistics.
#[derive(Debug, Clone, Copy, Default)]
pub struct CacheStats {
    /// Number of entries currently held.
    pub entry_count: u64,
    /// Sum of `size` across all entries.
    pub total_size_bytes: u64,
    /// Configured entry-count capacity.
    pub max_entries: u64,
    /// Configured byte-size capacity.
    pub max_size_bytes: u64,
    /// Entries evicted over the cache's lifetime.
    pub evicted_count: u64,
    /// Bytes reclaimed by eviction over the cache's lifetime.
    pub evicted_bytes: u64,
}

/// Compute the SHA-256 hex digest of `content`.
pub fn content_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex_encode(&hasher.finalize())
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        s.push_str(&format!("{b:02x}"));
    }
    s
}

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

fn make_key(hash: &str, tenant: Option<&str>) -> String {
    match tenant {
        Some(t) => format!("{t}:{hash}"),
        None => hash.to_string(),
    }
}

fn shard_dir(root: &Path, sub: &str, hash: &str) -> PathBuf {
    let a = &hash[..hash.len().min(2)];
    let b = &hash[hash.len().min(2)..hash.len().min(4)];
    root.join(sub).join(a).join(b)
}

fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)
}

/// Content-addressable cache backed by a sharded directory on local disk.
pub struct LocalDiskCache {
    root: PathBuf,
    entries: DashMap<String, CacheEntry>,
    order: Mutex<std::collections::VecDeque<String>>,
    bloom: BloomFilter,
    max_entries: u64,
    max_size_bytes: u64,
    current_size: AtomicU64,
    evicted_count: AtomicU64,
    evicted_bytes: AtomicU64,
    block_size: usize,
}

impl LocalDiskCache {
    /// Open (or initialize) a cache rooted at `root`.
    ///
    /// Loads `metadata.bin` if present; otherwise rebuilds the metadata
    /// table by scanning `content/` on disk.
    pub fn open(root: impl Into<PathBuf>, max_entries: u64, max_size_bytes: u64) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(root.join("content")).map_err(|e| Error::Internal(e.to_string()))?;
        fs::create_dir_all(root.join("blocks")).map_err(|e| Error::Internal(e.to_string()))?;

        let cache = LocalDiskCache {
            root,
            entries: DashMap::new(),
            order: Mutex::new(std::collections::VecDeque::new()),
            bloom: BloomFilter::new(max_entries.max(1) as usize, 0.01),
            max_entries,
            max_size_bytes,
            current_size: AtomicU64::new(0),
            evicted_count: AtomicU64::new(0),
            evicted_bytes: AtomicU64::new(0),
            block_size: DEFAULT_BLOCK_SIZE,
        };

        if !cache.load_metadata().map_err(|e| Error::Internal(e.to_string()))? {
            cache.rebuild_from_disk().map_err(|e| Error::Internal(e.to_string()))?;
        }
        Ok(cache)
    }

    fn content_path(&self, hash: &str, key: &str) -> PathBuf {
        shard_dir(&self.root, "content", hash).join(format!("{key}.bin"))
    }

    fn block_path(&self, hash: &str, key: &str, block_idx: u32) -> PathBuf {
        shard_dir(&self.root, "blocks", hash).join(format!("{key}.{block_idx:04}.bin"))
    }

    /// Read cached content by hash, updating access stats on a hit.
    pub fn get(&self, hash: &str, tenant: Option<&str>) -> Option<Vec<u8>> {
        let key = make_key(hash, tenant);
        if !self.bloom.might_contain(&key) {
            return None;
        }
        self.entries.get_mut(&key)?;
        let path = self.content_path(hash, &key);
        match fs::read(&path) {
            Ok(bytes) => {
                if let Some(mut entry) = self.entries.get_mut(&key) {
                    entry.last_accessed = now_ms();
                    entry.access_count += 1;
                    entry.clock_bit = true;
                }
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Read one block of a large cached file, updating access stats on a hit.
    pub fn get_block(&self, hash: &str, block_idx: u32, tenant: Option<&str>) -> Option<Vec<u8>> {
        let key = make_key(hash, tenant);
        if !self.bloom.might_contain(&key) {
            return None;
        }
        self.entries.get_mut(&key)?;
        let path = self.block_path(hash, &key, block_idx);
        match fs::read(&path) {
            Ok(bytes) => {
                if let Some(mut entry) = self.entries.get_mut(&key) {
                    entry.last_accessed = now_ms();
                    entry.access_count += 1;
                    entry.clock_bit = true;
                }
                Some(bytes)
            }
            Err(_) => None,
        }
    }

    /// Insert `content` under `hash`, evicting as needed. Returns `false` if
    /// `content` alone exceeds the cache's total capacity.
    pub fn put(
        &self,
        hash: &str,
        content: &[u8],
        tenant: Option<&str>,
        priority: u8,
        store_blocks: bool,
    ) -> Result<bool> {
        let size = content.len() as u64;
        if size > self.max_size_bytes {
            return Ok(false);
        }
        let key = make_key(hash, tenant);
        self.ensure_capacity(size);

        let path = self.content_path(hash, &key);
        write_atomic(&path, content).map_err(|e| Error::Internal(e.to_string()))?;

        if store_blocks && content.len() > self.block_size {
            for (idx, chunk) in content.chunks(self.block_size).enumerate() {
                let block_path = self.block_path(hash, &key, idx as u32);
                write_atomic(&block_path, chunk).map_err(|e| Error::Internal(e.to_string()))?;
            }
        }

        let existing_size = self.entries.get(&key).map(|e| e.size);
        let ts = now_ms();
        self.entries.insert(
            key.clone(),
            CacheEntry {
                content_hash: hash.to_string(),
                tenant_id: tenant.map(str::to_string),
                size,
                created_at: ts,
                last_accessed: ts,
                access_count: 0,
                clock_bit: true,
                priority,
            },
        );
        if existing_size.is_none() {
            self.order.lock().push_back(key.clone());
        }
        self.bloom.insert(&key);

        match existing_size {
            Some(old) if old >= size => self.current_size.fetch_sub(old - size, Ordering::SeqCst),
            Some(old) => self.current_size.fetch_add(size - old, Ordering::SeqCst),
            None => self.current_size.fetch_add(size, Ordering::SeqCst),
        };
        Ok(true)
    }

    /// Remove a cached entry. Does not retract the (append-only) Bloom
    /// filter; a later probe may false-positive into a metadata miss.
    pub fn remove(&self, hash: &str, tenant: Option<&str>) -> bool {
        let key = make_key(hash, tenant);
        match self.entries.remove(&key) {
            Some((_, entry)) => {
                let _ = fs::remove_file(self.content_path(hash, &key));
                self.order.lock().retain(|k| k != &key);
                self.current_size.fetch_sub(entry.size, Ordering::SeqCst);
                true
            }
            None => false,
        }
    }

    /// Whether metadata for `hash` is currently tracked (does not touch
    /// access stats).
    pub fn exists(&self, hash: &str, tenant: Option<&str>) -> bool {
        self.entries.contains_key(&make_key(hash, tenant))
    }

    /// Remove every entry and on-disk file, and reset all statistics.
    pub fn clear(&self) -> Result<()> {
        self.entries.clear();
        self.order.lock().clear();
        self.bloom.clear();
        self.current_size.store(0, Ordering::SeqCst);
        for sub in ["content", "blocks"] {
            let dir = self.root.join(sub);
            if dir.exists() {
                fs::remove_dir_all(&dir).map_err(|e| Error::Internal(e.to_string()))?;
            }
            fs::create_dir_all(&dir).map_err(|e| Error::Internal(e.to_string()))?;
        }
        Ok(())
    }

    /// Current cache statistics.
    pub fn get_stats(&self) -> CacheStats {
        CacheStats {
            entry_count: self.entries.len() as u64,
            total_size_bytes: self.current_size.load(Ordering::SeqCst),
            max_entries: self.max_entries,
            max_size_bytes: self.max_size_bytes,
            evicted_count: self.evicted_count.load(Ordering::SeqCst),
            evicted_bytes: self.evicted_bytes.load(Ordering::SeqCst),
        }
    }

    /// Persist the metadata table to `metadata.bin` for fast restart.
    pub fn persist_metadata(&self) -> Result<()> {
        let mut buf = Vec::new();
        buf.write_u32::<LittleEndian>(METADATA_VERSION).unwrap();
        buf.write_u64::<LittleEndian>(self.entries.len() as u64).unwrap();
        for item in self.entries.iter() {
            let key = item.key();
            let e = item.value();
            write_string(&mut buf, key);
            write_string(&mut buf, &e.content_hash);
            write_opt_string(&mut buf, e.tenant_id.as_deref());
            buf.write_u64::<LittleEndian>(e.size).unwrap();
            buf.write_i64::<LittleEndian>(e.created_at).unwrap();
            buf.write_i64::<LittleEndian>(e.last_accessed).unwrap();
            buf.write_u64::<LittleEndian>(e.access_count).unwrap();
            buf.write_u8(e.priority).unwrap();
            buf.write_u8(e.clock_bit as u8).unwrap();
        }
        fs::write(self.root.join("metadata.bin"), buf).map_err(|e| Error::Internal(e.to_string()))
    }

    fn load_metadata(&self) -> io::Result<bool> {
        let path = self.root.join("metadata.bin");
        if !path.exists() {
            return Ok(false);
        }
        let mut buf = Vec::new();
        fs::File::open(&path)?.read_to_end(&mut buf)?;
        let mut cursor = io::Cursor::new(buf);
        let version = cursor.read_u32::<LittleEndian>()?;
        if version != METADATA_VERSION {
            return Ok(false);
        }
        let count = cursor.read_u64::<LittleEndian>()?;
        let mut total = 0u64;
        let mut order = self.order.lock();
        for _ in 0..count {
            let key = read_string(&mut cursor)?;
            let content_hash = read_string(&mut cursor)?;
            let tenant_id = read_opt_string(&mut cursor)?;
            let size = cursor.read_u64::<LittleEndian>()?;
            let created_at = cursor.read_i64::<LittleEndian>()?;
            let last_accessed = cursor.read_i64::<LittleEndian>()?;
            let access_count = cursor.read_u64::<LittleEndian>()?;
            let priority = cursor.read_u8()?;
            let clock_bit = cursor.read_u8()? != 0;
            total += size;
            self.bloom.insert(&key);
            order.push_back(key.clone());
            self.entries.insert(
                key,
                CacheEntry {
                    content_hash,
                    tenant_id,
                    size,
                    created_at,
                    last_accessed,
                    access_count,
                    clock_bit,
                    priority,
                },
            );
        }
        drop(order);
        self.current_size.store(total, Ordering::SeqCst);
        Ok(true)
    }

    fn rebuild_from_disk(&self) -> io::Result<()> {
        let content_dir = self.root.join("content");
        let mut total = 0u64;
        let mut order = self.order.lock();
        visit_files(&content_dir, &mut |path| {
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else { return };
            let (tenant_id, content_hash) = match stem.split_once(':') {
                Some((t, h)) => (Some(t.to_string()), h.to_string()),
                None => (None, stem.to_string()),
            };
            let meta = match fs::metadata(path) {
                Ok(m) => m,
                Err(_) => return,
            };
            let size = meta.len();
            let ts = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);
            total += size;
            let key = stem.to_string();
            self.bloom.insert(&key);
            order.push_back(key.clone());
            self.entries.insert(
                key,
                CacheEntry {
                    content_hash,
                    tenant_id,
                    size,
                    created_at: ts,
                    last_accessed: ts,
                    access_count: 0,
                    clock_bit: false,
                    priority: 0,
                },
            );
        })?;
        drop(order);
        self.current_size.store(total, Ordering::SeqCst);
        Ok(())
    }

    fn ensure_capacity(&self, incoming: u64) {
        while self.entries.len() as u64 >= self.max_entries
            || self.current_size.load(Ordering::SeqCst) + incoming > self.max_size_bytes
        {
            if !self.evict_one() {
                break;
            }
        }
    }

    /// One CLOCK eviction step. Bounded at `2 * len(entries)` scanned slots
    /// so it always terminates: priority entries are protected on the first
    /// pass (slots `0..n`) and evictable on the second (slots `n..2n`).
    fn evict_one(&self) -> bool {
        let n = self.entries.len().max(1) as u64;
        let bound = 2 * n;
        let mut order = self.order.lock();
        for i in 0..bound {
            let Some(key) = order.pop_front() else { return false };
            let second_pass = i >= n;
            let outcome = match self.entries.get_mut(&key) {
                None => None,
                Some(mut entry) => {
                    if entry.priority > 0 && !second_pass {
                        entry.clock_bit = false;
                        Some(false)
                    } else if entry.clock_bit {
                        entry.clock_bit = false;
                        Some(false)
                    } else {
                        Some(true)
                    }
                }
            };
            match outcome {
                None => continue,
                Some(false) => order.push_back(key),
                Some(true) => {
                    drop(order);
                    self.evict_key(&key);
                    return true;
                }
            }
        }
        false
    }

    fn evict_key(&self, key: &str) {
        if let Some((_, entry)) = self.entries.remove(key) {
            let _ = fs::remove_file(self.content_path(&entry.content_hash, key));
            self.current_size.fetch_sub(entry.size, Ordering::SeqCst);
            self.evicted_count.fetch_add(1, Ordering::SeqCst);
            self.evicted_bytes.fetch_add(entry.size, Ordering::SeqCst);
        }
    }
}

fn visit_files(dir: &Path, f: &mut impl FnMut(&Path)) -> io::Result<()> {
    if !dir.exists() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            visit_files(&path, f)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("bin") {
            f(&path);
        }
    }
    Ok(())
}

fn write_string(buf: &mut Vec<u8>, s: &str) {
    buf.write_u16::<LittleEndian>(s.len() as u16).unwrap();
    buf.extend_from_slice(s.as_bytes());
}

fn write_opt_string(buf: &mut Vec<u8>, s: Option<&str>) {
    match s {
        Some(s) => {
            buf.write_u8(1).unwrap();
            write_string(buf, s);
        }
        None => buf.write_u8(0).unwrap(),
    }
}

fn read_string(cursor: &mut io::Cursor<Vec<u8>>) -> io::Result<String> {
    let len = cursor.read_u16::<LittleEndian>()? as usize;
    let mut buf = vec![0u8; len];
    cursor.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_opt_string(cursor: &mut io::Cursor<Vec<u8>>) -> io::Result<Option<String>> {
    let tag = cursor.read_u8()?;
    if tag == 0 {
        Ok(None)
    } else {
        Ok(Some(read_string(cursor)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let cache = LocalDiskCache::open(dir.path(), 100, 1_000_000).unwrap();
        let hash = content_hash(b"hello world");
        cache.put(&hash, b"hello world", None, 0, false).unwrap();
        assert_eq!(cache.get(&hash, None), Some(b"hello world".to_vec()));
    }

    #[test]
    fn tenant_prefixed_keys_do_not_collide() {
        let dir = tempdir().unwrap();
        let cache = LocalDiskCache::open(dir.path(), 100, 1_000_000).unwrap();
        let hash = content_hash(b"shared-bytes");
        cache.put(&hash, b"tenant-a-view", Some("a"), 0, false).unwrap();
        cache.put(&hash, b"tenant-b-view", Some("b"), 0, false).unwrap();
        assert_eq!(cache.get(&hash, Some("a")), Some(b"tenant-a-view".to_vec()));
        assert_eq!(cache.get(&hash, Some("b")), Some(b"tenant-b-view".to_vec()));
        assert_eq!(cache.get(&hash, None), None);
    }

    #[test]
    fn oversized_content_is_rejected() {
        let dir = tempdir().unwrap();
        let cache = LocalDiskCache::open(dir.path(), 100, 10).unwrap();
        let big = vec![0u8; 100];
        let hash = content_hash(&big);
        assert!(!cache.put(&hash, &big, None, 0, false).unwrap());
    }

    #[test]
    fn clock_eviction_respects_capacity_of_ten() {
        let dir = tempdir().unwrap();
        let cache = LocalDiskCache::open(dir.path(), 10, 10_000_000).unwrap();
        let hashes: Vec<String> = (0..10)
            .map(|i| {
                let content = format!("entry-{i}").into_bytes();
                let h = content_hash(&content);
                cache.put(&h, &content, None, 0, false).unwrap();
                h
            })
            .collect();
        assert!(cache.exists(&hashes[0], None));

        let eleventh = b"entry-10".to_vec();
        let h11 = content_hash(&eleventh);
        cache.put(&h11, &eleventh, None, 0, false).unwrap();

        assert!(!cache.exists(&hashes[0], None), "first entry should have been evicted");
        assert!(cache.exists(&h11, None));
        for h in &hashes[1..] {
            assert!(cache.exists(h, None));
        }
    }

    #[test]
    fn metadata_persists_across_reopen() {
        let dir = tempdir().unwrap();
        let hash = content_hash(b"persisted");
        {
            let cache = LocalDiskCache::open(dir.path(), 100, 1_000_000).unwrap();
            cache.put(&hash, b"persisted", None, 0, false).unwrap();
            cache.persist_metadata().unwrap();
        }
        let reopened = LocalDiskCache::open(dir.path(), 100, 1_000_000).unwrap();
        assert!(reopened.exists(&hash, None));
        assert_eq!(reopened.get(&hash, None), Some(b"persisted".to_vec()));
    }

    #[test]
    fn remove_then_absent() {
        let dir = tempdir().unwrap();
        let cache = LocalDiskCache::open(dir.path(), 100, 1_000_000).unwrap();
        let hash = content_hash(b"gone");
        cache.put(&hash, b"gone", None, 0, false).unwrap();
        assert!(cache.remove(&hash, None));
        assert!(!cache.exists(&hash, None));
        assert!(!cache.remove(&hash, None));
    }
}
