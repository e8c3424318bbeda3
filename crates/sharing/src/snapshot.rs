//! Workspace Snapshots: CAS-backed versioning for a named subtree.
//!
//! A snapshot's manifest is a sorted list of `(relative_path, content_hash,
//! size, mime_type)`; restoring a snapshot only repoints metadata at CAS
//! hashes already on disk, never copies bytes. Manifests serialize
//! deterministically (sorted, fixed field order) so two snapshots of an
//! identical tree hash identically.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use dashmap::DashMap;
use uuid::Uuid;

use nexus_core::{Error, Result};
use nexus_storage::{content_hash, LocalDiskCache};

/// One file's state within a workspace snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    /// Path relative to the workspace root.
    pub relative_path: String,
    /// Content hash of the file at snapshot time.
    pub content_hash: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, if known.
    pub mime_type: Option<String>,
}

/// A workspace's file listing at a point in time, sorted by path for
/// deterministic serialization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SnapshotManifest {
    /// Entries, always kept sorted by `relative_path`.
    pub entries: Vec<ManifestEntry>,
}

impl SnapshotManifest {
    /// Build a manifest from an unordered file listing, sorting it.
    pub fn from_files(mut entries: Vec<ManifestEntry>) -> Self {
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        SnapshotManifest { entries }
    }

    /// Deterministic serialized form: one `path\0hash\0size\0mime\n` line per
    /// entry in sorted order, fed into the content hash to identify the
    /// manifest's own CAS key.
    fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for entry in &self.entries {
            buf.extend_from_slice(entry.relative_path.as_bytes());
            buf.push(0);
            buf.extend_from_slice(entry.content_hash.as_bytes());
            buf.push(0);
            buf.extend_from_slice(entry.size.to_string().as_bytes());
            buf.push(0);
            buf.extend_from_slice(entry.mime_type.as_deref().unwrap_or("").as_bytes());
            buf.push(b'\n');
        }
        buf
    }

    fn deserialize(bytes: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(bytes).map_err(|e| Error::Internal(e.to_string()))?;
        let mut entries = Vec::new();
        for line in text.lines() {
            let mut fields = line.split('\0');
            let relative_path = fields.next().ok_or_else(|| Error::Internal("truncated manifest entry".to_string()))?;
            let content_hash = fields.next().ok_or_else(|| Error::Internal("truncated manifest entry".to_string()))?;
            let size: u64 = fields
                .next()
                .ok_or_else(|| Error::Internal("truncated manifest entry".to_string()))?
                .parse()
                .map_err(|_| Error::Internal("invalid manifest size field".to_string()))?;
            let mime_type = fields.next().filter(|s| !s.is_empty()).map(str::to_string);
            entries.push(ManifestEntry {
                relative_path: relative_path.to_string(),
                content_hash: content_hash.to_string(),
                size,
                mime_type,
            });
        }
        Ok(SnapshotManifest { entries })
    }

    /// The manifest's own content hash — identical trees always produce the
    /// same hash, satisfying the round-trip invariant.
    pub fn manifest_hash(&self) -> String {
        content_hash(&self.serialize())
    }
}

/// Metadata recorded for one snapshot, in addition to its manifest.
#[derive(Debug, Clone)]
pub struct SnapshotRecord {
    /// Unique id, also the CAS key lookup's index.
    pub snapshot_id: Uuid,
    /// The workspace subtree this snapshot covers.
    pub workspace_path: String,
    /// 1-based, monotonically increasing per workspace.
    pub snapshot_number: u64,
    /// Optional human description.
    pub description: Option<String>,
    /// Optional free-form tags.
    pub tags: Vec<String>,
    /// Unix millis of creation.
    pub created_at: i64,
    /// CAS hash of the serialized manifest.
    pub manifest_hash: String,
}

/// The result of comparing two snapshots' manifests.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiff {
    /// Paths present in `snap_b` but not `snap_a`.
    pub added: Vec<String>,
    /// Paths present in `snap_a` but not `snap_b`.
    pub removed: Vec<String>,
    /// Paths present in both with a different content hash.
    pub modified: Vec<String>,
    /// Paths present in both with an identical content hash.
    pub unchanged_count: u64,
}

/// One restore instruction: point `relative_path`'s metadata at a CAS hash,
/// or delete it because it is not present in the target manifest.
#[derive(Debug, Clone)]
pub enum RestoreAction {
    /// Repoint metadata for `relative_path` at `content_hash` (no byte copy).
    Restore { relative_path: String, content_hash: String },
    /// Delete a file not present in the restored manifest.
    Delete { relative_path: String },
}

/// Manages workspace snapshot lifecycle: creation, restoration, listing, diff.
pub struct SnapshotService {
    cas: std::sync::Arc<LocalDiskCache>,
    records: DashMap<Uuid, SnapshotRecord>,
    by_workspace: DashMap<String, Vec<Uuid>>,
    next_number: DashMap<String, AtomicU64>,
}

impl SnapshotService {
    /// Build a service backed by `cas` for manifest storage.
    pub fn new(cas: std::sync::Arc<LocalDiskCache>) -> Self {
        SnapshotService {
            cas,
            records: DashMap::new(),
            by_workspace: DashMap::new(),
            next_number: DashMap::new(),
        }
    }

    /// `create`: snapshot the given file listing as the workspace's next
    /// numbered snapshot. `files` is the caller's current listing of
    /// `(relative_path, content_hash, size, mime_type)` under the workspace;
    /// collecting it from the live filesystem index is the caller's job.
    pub fn create(
        &self,
        workspace_path: impl Into<String>,
        files: Vec<ManifestEntry>,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<Uuid> {
        let workspace_path = workspace_path.into();
        let manifest = SnapshotManifest::from_files(files);
        let serialized = manifest.serialize();
        let manifest_hash = content_hash(&serialized);
        self.cas.put(&manifest_hash, &serialized, None, 1, false)?;

        let counter = self.next_number.entry(workspace_path.clone()).or_insert_with(|| AtomicU64::new(1));
        let snapshot_number = counter.fetch_add(1, Ordering::SeqCst);

        let record = SnapshotRecord {
            snapshot_id: Uuid::new_v4(),
            workspace_path: workspace_path.clone(),
            snapshot_number,
            description,
            tags,
            created_at: Utc::now().timestamp_millis(),
            manifest_hash,
        };
        let snapshot_id = record.snapshot_id;
        self.records.insert(snapshot_id, record);
        self.by_workspace.entry(workspace_path).or_default().push(snapshot_id);
        Ok(snapshot_id)
    }

    fn load_manifest(&self, record: &SnapshotRecord) -> Result<SnapshotManifest> {
        let bytes = self
            .cas
            .get(&record.manifest_hash, None)
            .ok_or_else(|| Error::NotFound(format!("manifest for snapshot {}", record.snapshot_id)))?;
        SnapshotManifest::deserialize(&bytes)
    }

    /// `restore`: compute the restore plan for a snapshot given the
    /// workspace's current listing. The caller applies each
    /// [`RestoreAction`] against the live filesystem index; this service
    /// does not touch the index directly.
    pub fn restore(&self, snapshot_id: Uuid, current_files: &[ManifestEntry]) -> Result<Vec<RestoreAction>> {
        let record = self.records.get(&snapshot_id).ok_or_else(|| Error::NotFound(format!("snapshot {snapshot_id}")))?;
        let manifest = self.load_manifest(&record)?;

        let target: BTreeMap<&str, &ManifestEntry> = manifest.entries.iter().map(|e| (e.relative_path.as_str(), e)).collect();
        let current: BTreeMap<&str, &ManifestEntry> = current_files.iter().map(|e| (e.relative_path.as_str(), e)).collect();

        let mut actions = Vec::new();
        for path in current.keys() {
            if !target.contains_key(path) {
                actions.push(RestoreAction::Delete { relative_path: path.to_string() });
            }
        }
        for (path, entry) in &target {
            actions.push(RestoreAction::Restore {
                relative_path: path.to_string(),
                content_hash: entry.content_hash.clone(),
            });
        }
        Ok(actions)
    }

    /// Find a snapshot by its record's `(workspace_path, snapshot_number)`
    /// pair, the alternative lookup form to a bare `snapshot_id`.
    pub fn find_by_number(&self, workspace_path: &str, snapshot_number: u64) -> Option<Uuid> {
        self.by_workspace.get(workspace_path)?.iter().find_map(|id| {
            let record = self.records.get(id)?;
            (record.snapshot_number == snapshot_number).then_some(*id)
        })
    }

    /// `list`: the workspace's snapshots, newest first.
    pub fn list(&self, workspace_path: &str, limit: usize) -> Vec<SnapshotRecord> {
        let Some(ids) = self.by_workspace.get(workspace_path) else { return Vec::new() };
        let mut records: Vec<SnapshotRecord> = ids.iter().filter_map(|id| self.records.get(id).map(|r| r.clone())).collect();
        records.sort_by(|a, b| b.snapshot_number.cmp(&a.snapshot_number));
        records.truncate(limit);
        records
    }

    /// `diff`: compare two snapshots' manifests.
    pub fn diff(&self, snap_a: Uuid, snap_b: Uuid) -> Result<SnapshotDiff> {
        let record_a = self.records.get(&snap_a).ok_or_else(|| Error::NotFound(format!("snapshot {snap_a}")))?;
        let record_b = self.records.get(&snap_b).ok_or_else(|| Error::NotFound(format!("snapshot {snap_b}")))?;
        let manifest_a = self.load_manifest(&record_a)?;
        let manifest_b = self.load_manifest(&record_b)?;

        let a: BTreeMap<&str, &str> = manifest_a.entries.iter().map(|e| (e.relative_path.as_str(), e.content_hash.as_str())).collect();
        let b: BTreeMap<&str, &str> = manifest_b.entries.iter().map(|e| (e.relative_path.as_str(), e.content_hash.as_str())).collect();

        let mut diff = SnapshotDiff::default();
        for (path, hash_a) in &a {
            match b.get(path) {
                None => diff.removed.push(path.to_string()),
                Some(hash_b) if hash_b == hash_a => diff.unchanged_count += 1,
                Some(_) => diff.modified.push(path.to_string()),
            }
        }
        for path in b.keys() {
            if !a.contains_key(path) {
                diff.added.push(path.to_string());
            }
        }
        Ok(diff)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn entry(path: &str, content: &[u8]) -> ManifestEntry {
        ManifestEntry {
            relative_path: path.to_string(),
            content_hash: content_hash(content),
            size: content.len() as u64,
            mime_type: Some("text/plain".to_string()),
        }
    }

    fn service() -> SnapshotService {
        let dir = tempdir().unwrap();
        let cas = std::sync::Arc::new(LocalDiskCache::open(dir.path(), 1000, 10_000_000).unwrap());
        SnapshotService::new(cas)
    }

    #[test]
    fn snapshot_round_trip_hash_is_stable() {
        let svc = service();
        let files = vec![entry("/a.txt", b"alpha"), entry("/b.txt", b"beta")];
        let id = svc.create("/ws", files.clone(), None, vec![]).unwrap();

        // "mutate" then restore: current listing differs, but the manifest
        // hash for identical underlying file state must match.
        let mutated = vec![entry("/a.txt", b"alpha-mutated")];
        let actions = svc.restore(id, &mutated).unwrap();
        assert_eq!(actions.len(), 2); // a.txt + b.txt restored; nothing extra to delete

        let manifest = SnapshotManifest::from_files(files);
        assert_eq!(manifest.manifest_hash(), svc.records.get(&id).unwrap().manifest_hash);
    }

    #[test]
    fn restore_plan_deletes_files_absent_from_snapshot() {
        let svc = service();
        let id = svc.create("/ws", vec![entry("/a.txt", b"alpha")], None, vec![]).unwrap();
        let current = vec![entry("/a.txt", b"alpha"), entry("/extra.txt", b"extra")];
        let actions = svc.restore(id, &current).unwrap();
        let deletes: Vec<_> = actions
            .iter()
            .filter_map(|a| match a {
                RestoreAction::Delete { relative_path } => Some(relative_path.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(deletes, vec!["/extra.txt"]);
    }

    #[test]
    fn list_returns_newest_first() {
        let svc = service();
        svc.create("/ws", vec![entry("/a.txt", b"v1")], None, vec![]).unwrap();
        svc.create("/ws", vec![entry("/a.txt", b"v2")], None, vec![]).unwrap();
        let listed = svc.list("/ws", 10);
        assert_eq!(listed.len(), 2);
        assert!(listed[0].snapshot_number > listed[1].snapshot_number);
    }

    #[test]
    fn find_by_number_resolves_alternate_lookup() {
        let svc = service();
        let id = svc.create("/ws", vec![entry("/a.txt", b"v1")], None, vec![]).unwrap();
        let record = svc.records.get(&id).unwrap();
        assert_eq!(svc.find_by_number("/ws", record.snapshot_number), Some(id));
    }

    #[test]
    fn diff_reports_added_removed_modified_unchanged() {
        let svc = service();
        let id_a = svc.create("/ws", vec![entry("/a.txt", b"same"), entry("/b.txt", b"old")], None, vec![]).unwrap();
        let id_b = svc
            .create("/ws", vec![entry("/a.txt", b"same"), entry("/b.txt", b"new"), entry("/c.txt", b"added")], None, vec![])
            .unwrap();

        let diff = svc.diff(id_a, id_b).unwrap();
        assert_eq!(diff.added, vec!["/c.txt"]);
        assert_eq!(diff.modified, vec!["/b.txt"]);
        assert_eq!(diff.unchanged_count, 1);
        assert!(diff.removed.is_empty());
    }
}
