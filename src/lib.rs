//! Nexus: virtual filesystem core combining content-addressable storage,
//! Zanzibar-derived ReBAC authorization, chunked resumable uploads, capability
//! share links, workspace snapshots, and real-time event propagation behind
//! one `OperationContext`-threaded API.
//!
//! [`NexusCore`] is the entry point. It owns one instance each of the
//! authorization engine ([`nexus_authz::AuthzEngine`]), the local disk cache
//! ([`nexus_storage::LocalDiskCache`]), the WAL ([`nexus_durability::WalWriter`]),
//! the subscription manager ([`nexus_durability::SubscriptionManager`]), the
//! chunked upload service, the share link service, the snapshot service, and
//! the virtual filesystem's own in-memory path index ([`file_index::FileIndex`]).
//! Every mutating call appends an [`Event`] to the WAL before publishing it to
//! subscribers, matching the specification's "durable before observable"
//! ordering guarantee.

#![warn(missing_docs)]

pub mod config;
pub mod file_index;

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use uuid::Uuid;

use nexus_authz::AuthzEngine;
use nexus_core::{ConsistencyRequirement, Entity, Error, NamespaceConfig, NexusPath, OperationContext, Result, ZoneId};
use nexus_durability::{Event, EventSink, SubscriptionManager, WalWriter};
use nexus_sharing::{ManifestEntry, PermissionLevel, RestoreAction, ShareLink, ShareLinkService, SnapshotDiff, SnapshotRecord, SnapshotService};
use nexus_storage::{content_hash, glob::glob_match, LocalDiskCache};
use nexus_upload::{ChunkedUploadService, UploadSession};

pub use config::NexusConfig;
use file_index::{FileEntity, FileIndex};

fn now_ms() -> i64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_millis() as i64).unwrap_or(0)
}

/// Outcome of a successful `write`.
#[derive(Debug, Clone)]
pub struct WriteOutcome {
    /// The path's external display form.
    pub path: String,
    /// Content hash of the bytes just written.
    pub etag: String,
    /// The path's version after this write.
    pub version: u64,
    /// Size of the bytes written.
    pub size: u64,
}

/// Outcome of a successful `read`.
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    /// Plain content bytes, when `return_metadata` was not requested.
    Bytes(Vec<u8>),
    /// Content plus the fields the specification's `read` contract names
    /// when `return_metadata` was requested.
    WithMetadata {
        /// The file's bytes.
        content: Vec<u8>,
        /// The path's external display form.
        path: String,
        /// Content hash.
        etag: String,
        /// Size in bytes.
        size: u64,
        /// Alias of `path`, named separately to match the RPC field list.
        virtual_path: String,
    },
}

/// One entry returned by `list`.
#[derive(Debug, Clone)]
pub struct ListEntry {
    /// External display-form path.
    pub path: String,
    /// Content hash.
    pub etag: String,
    /// Size in bytes.
    pub size: u64,
    /// MIME type, guessed from the path's extension.
    pub mime_type: Option<String>,
    /// Whether this entry is a directory marker.
    pub is_directory: bool,
    /// Unix millis of the most recent write.
    pub modified_at: i64,
    /// Per-path version counter.
    pub version: u64,
}

/// One `grep` hit.
#[derive(Debug, Clone)]
pub struct GrepMatch {
    /// The file the match was found in.
    pub path: String,
    /// 1-based line number within the file.
    pub line_number: usize,
    /// The matching line's text.
    pub line: String,
}

fn guess_mime_type(path: &str) -> Option<String> {
    let ext = path.rsplit('.').next()?;
    let mime = match ext {
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "pdf" => "application/pdf",
        _ => return None,
    };
    Some(mime.to_string())
}

fn share_relation(level: PermissionLevel) -> &'static str {
    match level {
        PermissionLevel::Viewer => "shared-viewer",
        PermissionLevel::Editor => "shared-editor",
        PermissionLevel::Owner => "shared-owner",
    }
}

/// The composed Nexus engine: one instance per deployment (or per test).
pub struct NexusCore {
    authz: AuthzEngine,
    cas: Arc<LocalDiskCache>,
    wal: WalWriter,
    subscriptions: SubscriptionManager,
    uploads: ChunkedUploadService,
    share_links: ShareLinkService,
    snapshots: SnapshotService,
    files: FileIndex,
    revisions: DashMap<String, AtomicI64>,
}

impl NexusCore {
    /// Open a `NexusCore`, initializing the local disk cache and WAL at the
    /// directories named in `config`.
    pub fn open(config: NexusConfig) -> Result<Self> {
        let cas = Arc::new(LocalDiskCache::open(config.cache_dir.clone(), config.max_entries, config.max_size_bytes)?);
        let wal = WalWriter::open(config.wal_dir.clone())?;
        let uploads = ChunkedUploadService::new(config.upload.clone(), None, Arc::clone(&cas));
        let snapshots = SnapshotService::new(Arc::clone(&cas));
        Ok(NexusCore {
            authz: AuthzEngine::new(NamespaceConfig::default_nexus(), config.authz.clone()),
            cas,
            wal,
            subscriptions: SubscriptionManager::new(),
            uploads,
            share_links: ShareLinkService::new(),
            snapshots,
            files: FileIndex::new(),
            revisions: DashMap::new(),
        })
    }

    /// Direct access to the authorization engine, for callers that need a
    /// `rebac_*` operation this facade does not wrap directly.
    pub fn authz(&self) -> &AuthzEngine {
        &self.authz
    }

    /// Direct access to the chunked upload service.
    pub fn uploads(&self) -> &ChunkedUploadService {
        &self.uploads
    }

    /// Direct access to the share link service.
    pub fn share_links(&self) -> &ShareLinkService {
        &self.share_links
    }

    fn next_revision(&self, zone: &ZoneId) -> i64 {
        self.revisions
            .entry(zone.0.clone())
            .or_insert_with(|| AtomicI64::new(0))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    fn record_filesystem_event(&self, event_type: &str, path: &str, zone: &ZoneId) -> Result<()> {
        let revision = self.next_revision(zone);
        let event = Event::filesystem(event_type, path, zone.0.clone(), revision, now_ms());
        self.wal.append(&event)?;
        self.subscriptions.publish(&event);
        Ok(())
    }

    fn require_permission(&self, ctx: &OperationContext, permission: &str, object: &Entity) -> Result<()> {
        let allowed = self.authz.rebac_check(ctx, &ctx.subject, permission, object, ConsistencyRequirement::Eventual)?;
        if allowed {
            Ok(())
        } else {
            Err(Error::PermissionDenied(format!("{} lacks {permission} on {object}", ctx.subject)))
        }
    }

    fn grant_ownership(&self, ctx: &OperationContext, object: &Entity) -> Result<()> {
        self.authz
            .rebac_create(ctx, ctx.subject.clone(), "direct_owner", object.clone(), Some(ctx.zone.clone()), None, None)
            .map(|_| ())
    }

    // ---- filesystem primitives ---------------------------------------

    /// `write(path, content, if_match?, if_none_match?, force?)`.
    ///
    /// A write to a path with no existing entry bootstraps ownership: the
    /// writer is granted `direct_owner` on the new file, the way the
    /// underlying object-creation convention this namespace follows expects.
    /// `force` bypasses the `if_match`/`if_none_match` preconditions; it
    /// never bypasses the permission check on an existing file.
    pub fn write(
        &self,
        ctx: &OperationContext,
        path: &str,
        content: &[u8],
        if_match: Option<&str>,
        if_none_match: Option<&str>,
        force: bool,
    ) -> Result<WriteOutcome> {
        let npath = NexusPath::scoped(&ctx.zone.0, path);
        let object = Entity::new("file", npath.display());
        let existing = self.files.get(npath.storage());

        if !force {
            if let Some(expected) = if_match {
                match &existing {
                    Some(entry) if entry.etag == expected => {}
                    _ => return Err(Error::Conflict(format!("if_match {expected} does not match current state of {path}"))),
                }
            }
            if if_none_match == Some("*") && existing.is_some() {
                return Err(Error::Conflict(format!("if_none_match=* but {path} already exists")));
            }
        }

        match &existing {
            Some(_) => self.require_permission(ctx, "write", &object)?,
            None => self.grant_ownership(ctx, &object)?,
        }

        let hash = content_hash(content);
        self.cas.put(&hash, content, Some(&ctx.zone.0), 1, true)?;

        let version = existing.as_ref().map(|e| e.version + 1).unwrap_or(1);
        let entity = FileEntity {
            virtual_path: npath.display().to_string(),
            backend_id: None,
            physical_path: None,
            size: content.len() as u64,
            etag: hash.clone(),
            mime_type: guess_mime_type(npath.display()),
            zone_id: ctx.zone.0.clone(),
            version,
            modified_at: now_ms(),
            created_by: existing.map(|e| e.created_by).unwrap_or_else(|| ctx.subject.clone()),
            is_directory: false,
        };
        self.files.put(npath.storage().to_string(), entity);
        self.record_filesystem_event("write", npath.display(), &ctx.zone)?;

        Ok(WriteOutcome {
            path: npath.display().to_string(),
            etag: hash,
            version,
            size: content.len() as u64,
        })
    }

    /// `read(path, return_metadata?)`.
    pub fn read(&self, ctx: &OperationContext, path: &str, return_metadata: bool) -> Result<ReadOutcome> {
        let npath = NexusPath::scoped(&ctx.zone.0, path);
        let object = Entity::new("file", npath.display());
        let entry = self.files.get(npath.storage()).ok_or_else(|| Error::NotFound(path.to_string()))?;
        if entry.is_directory {
            return Err(Error::Validation(format!("{path} is a directory")));
        }
        self.require_permission(ctx, "read", &object)?;

        let content = self
            .cas
            .get(&entry.etag, Some(&ctx.zone.0))
            .ok_or_else(|| Error::Internal(format!("content for {path} missing from cache")))?;

        if return_metadata {
            Ok(ReadOutcome::WithMetadata {
                size: content.len() as u64,
                content,
                path: npath.display().to_string(),
                etag: entry.etag,
                virtual_path: npath.display().to_string(),
            })
        } else {
            Ok(ReadOutcome::Bytes(content))
        }
    }

    /// `list(path, recursive?, details?, prefix?, show_parsed?)`.
    ///
    /// When `details` is `false`, only `path`/`is_directory` are populated
    /// (the bare-listing mode); `show_parsed` is accepted for contract
    /// compatibility but never populates parsed-content fields —
    /// content-text extraction is an out-of-process collaborator this
    /// workspace does not embed.
    pub fn list(&self, ctx: &OperationContext, path: &str, recursive: bool, details: bool, prefix: Option<&str>, _show_parsed: bool) -> Result<Vec<ListEntry>> {
        let candidates = self.files.list_under(&ctx.zone, path, recursive);
        let mut out = Vec::new();
        for entry in candidates {
            if let Some(prefix) = prefix {
                if !entry.virtual_path.starts_with(prefix) {
                    continue;
                }
            }
            let object = Entity::new("file", entry.virtual_path.clone());
            if self.authz.rebac_check(ctx, &ctx.subject, "read", &object, ConsistencyRequirement::Eventual)? {
                out.push(if details {
                    ListEntry {
                        path: entry.virtual_path,
                        etag: entry.etag,
                        size: entry.size,
                        mime_type: entry.mime_type,
                        is_directory: entry.is_directory,
                        modified_at: entry.modified_at,
                        version: entry.version,
                    }
                } else {
                    ListEntry {
                        path: entry.virtual_path,
                        etag: String::new(),
                        size: 0,
                        mime_type: None,
                        is_directory: entry.is_directory,
                        modified_at: 0,
                        version: 0,
                    }
                });
            }
        }
        Ok(out)
    }

    /// `mkdir(path)`. Idempotent: an existing directory at `path` is
    /// returned unchanged rather than erroring.
    pub fn mkdir(&self, ctx: &OperationContext, path: &str) -> Result<()> {
        let npath = NexusPath::scoped(&ctx.zone.0, path);
        if self.files.contains(npath.storage()) {
            return Ok(());
        }
        let object = Entity::new("file", npath.display());
        self.grant_ownership(ctx, &object)?;
        let entity = FileEntity {
            virtual_path: npath.display().to_string(),
            backend_id: None,
            physical_path: None,
            size: 0,
            etag: content_hash(b""),
            mime_type: None,
            zone_id: ctx.zone.0.clone(),
            version: 1,
            modified_at: now_ms(),
            created_by: ctx.subject.clone(),
            is_directory: true,
        };
        self.files.put(npath.storage().to_string(), entity);
        self.record_filesystem_event("mkdir", npath.display(), &ctx.zone)
    }

    /// `delete(path)`.
    ///
    /// Removes the path from the index; the underlying CAS content is left
    /// in place, since other paths or snapshots may share the same hash and
    /// this workspace does not track a reference count per entry.
    pub fn delete(&self, ctx: &OperationContext, path: &str) -> Result<()> {
        let npath = NexusPath::scoped(&ctx.zone.0, path);
        let object = Entity::new("file", npath.display());
        if !self.files.contains(npath.storage()) {
            return Err(Error::NotFound(path.to_string()));
        }
        self.require_permission(ctx, "write", &object)?;
        self.files.remove(npath.storage());
        self.record_filesystem_event("delete", npath.display(), &ctx.zone)
    }

    /// `exists(path)`. Returns `false` both when the path is absent and when
    /// the caller lacks read permission on it, so existence cannot be probed
    /// by an unauthorized caller through timing or error-shape differences.
    pub fn exists(&self, ctx: &OperationContext, path: &str) -> Result<bool> {
        let npath = NexusPath::scoped(&ctx.zone.0, path);
        let Some(_entry) = self.files.get(npath.storage()) else { return Ok(false) };
        let object = Entity::new("file", npath.display());
        Ok(self.authz.rebac_check(ctx, &ctx.subject, "read", &object, ConsistencyRequirement::Eventual)?)
    }

    /// `glob(pattern, path) -> {matches}`.
    pub fn glob(&self, ctx: &OperationContext, pattern: &str, path: &str) -> Result<Vec<String>> {
        let candidates = self.files.list_under(&ctx.zone, path, true);
        let mut out = Vec::new();
        for entry in candidates {
            if entry.is_directory || !glob_match(pattern, &entry.virtual_path) {
                continue;
            }
            let object = Entity::new("file", entry.virtual_path.clone());
            if self.authz.rebac_check(ctx, &ctx.subject, "read", &object, ConsistencyRequirement::Eventual)? {
                out.push(entry.virtual_path);
            }
        }
        Ok(out)
    }

    /// `grep(pattern, path, ...) -> {results}`.
    ///
    /// Matches `pattern` as a literal substring, case-sensitively unless
    /// `case_insensitive` is set — this workspace carries no regex engine in
    /// its dependency stack.
    pub fn grep(&self, ctx: &OperationContext, pattern: &str, path: &str, case_insensitive: bool, max_results: usize) -> Result<Vec<GrepMatch>> {
        let needle = if case_insensitive { pattern.to_lowercase() } else { pattern.to_string() };
        let mut out = Vec::new();
        for entry in self.files.list_under(&ctx.zone, path, true) {
            if entry.is_directory || out.len() >= max_results {
                continue;
            }
            let object = Entity::new("file", entry.virtual_path.clone());
            if !self.authz.rebac_check(ctx, &ctx.subject, "read", &object, ConsistencyRequirement::Eventual)? {
                continue;
            }
            let Some(bytes) = self.cas.get(&entry.etag, Some(&ctx.zone.0)) else { continue };
            let Ok(text) = std::str::from_utf8(&bytes) else { continue };
            for (idx, line) in text.lines().enumerate() {
                let haystack = if case_insensitive { line.to_lowercase() } else { line.to_string() };
                if haystack.contains(&needle) {
                    out.push(GrepMatch {
                        path: entry.virtual_path.clone(),
                        line_number: idx + 1,
                        line: line.to_string(),
                    });
                    if out.len() >= max_results {
                        break;
                    }
                }
            }
        }
        Ok(out)
    }

    // ---- ReBAC passthrough ---------------------------------------------

    /// `rebac_create(subject, relation, object, zone_id, conditions?, expires_at?)`.
    #[allow(clippy::too_many_arguments)]
    pub fn rebac_create(
        &self,
        ctx: &OperationContext,
        subject: Entity,
        relation: impl Into<String>,
        object: Entity,
        object_zone: Option<ZoneId>,
        conditions: Option<nexus_core::Condition>,
        expires_at: Option<i64>,
    ) -> Result<nexus_core::WriteResult> {
        self.authz.rebac_create(ctx, subject, relation, object, object_zone, conditions, expires_at)
    }

    /// `rebac_check(subject, permission, object, zone_id, consistency?)`.
    pub fn rebac_check(&self, ctx: &OperationContext, subject: &Entity, permission: &str, object: &Entity, requirement: ConsistencyRequirement) -> Result<bool> {
        self.authz.rebac_check(ctx, subject, permission, object, requirement)
    }

    /// `rebac_check_bulk(list, zone_id)`.
    pub fn rebac_check_bulk(
        &self,
        ctx: &OperationContext,
        checks: Vec<(Entity, String, Entity)>,
        requirement: ConsistencyRequirement,
    ) -> Result<HashMap<String, bool>> {
        self.authz.rebac_check_bulk(ctx, checks, requirement)
    }

    /// `rebac_delete(tuple_id)`.
    pub fn rebac_delete(&self, ctx: &OperationContext, tuple_id: Uuid) -> Result<bool> {
        self.authz.rebac_delete(ctx, tuple_id)
    }

    /// `rebac_expand(permission, object)`.
    pub fn rebac_expand(&self, object: &Entity, permission: &str, zone: &ZoneId) -> Vec<nexus_core::Tuple> {
        self.authz.rebac_expand(object, permission, zone)
    }

    /// `rebac_list_tuples(filters)`.
    pub fn rebac_list_tuples(&self, relation: &str, zone: &ZoneId, object: Option<&Entity>) -> Vec<nexus_core::Tuple> {
        self.authz.rebac_list_tuples(relation, zone, object)
    }

    // ---- sharing --------------------------------------------------------

    /// `share_with_user`: grant `permission_level` on `resource` to one user.
    /// The caller must already hold `write` on `resource`.
    pub fn share_with_user(&self, ctx: &OperationContext, resource: Entity, user: Entity, permission_level: PermissionLevel) -> Result<()> {
        self.require_permission(ctx, "write", &resource)?;
        self.authz
            .rebac_create(ctx, user, share_relation(permission_level), resource, Some(ctx.zone.clone()), None, None)
            .map(|_| ())
    }

    /// `share_with_group`: grant `permission_level` on `resource` to every
    /// member of `group`. The caller must already hold `write` on `resource`.
    pub fn share_with_group(&self, ctx: &OperationContext, resource: Entity, group: Entity, permission_level: PermissionLevel) -> Result<()> {
        self.require_permission(ctx, "write", &resource)?;
        self.authz
            .rebac_create_userset(ctx, group, "member", share_relation(permission_level), resource, Some(ctx.zone.clone()), None, None)
            .map(|_| ())
    }

    /// `create_share_link`. The caller must already hold `write` on `resource`.
    pub fn create_share_link(
        &self,
        ctx: &OperationContext,
        resource: Entity,
        permission_level: PermissionLevel,
        expires_in_hours: Option<i64>,
        max_access_count: Option<u64>,
        password: Option<&str>,
    ) -> Result<Uuid> {
        self.require_permission(ctx, "write", &resource)?;
        self.share_links.create(ctx, resource, permission_level, expires_in_hours, max_access_count, password)
    }

    /// `access_share_link`. The link's token is the credential; no separate
    /// authorization check runs here, per the capability-URL pattern.
    pub fn access_share_link(
        &self,
        link_id: Uuid,
        password: Option<&str>,
        ip_address: Option<String>,
        user_agent: Option<String>,
        actor: Option<Entity>,
    ) -> Result<ShareLink> {
        self.share_links.access(link_id, password, ip_address, user_agent, actor)
    }

    /// `revoke_share_link`.
    pub fn revoke_share_link(&self, ctx: &OperationContext, link_id: Uuid) -> Result<()> {
        self.share_links.revoke(ctx, link_id)
    }

    // ---- snapshots --------------------------------------------------------

    fn manifest_entries_under(&self, zone: &ZoneId, workspace_path: &str) -> Vec<ManifestEntry> {
        self.files
            .list_under(zone, workspace_path, true)
            .into_iter()
            .filter(|f| !f.is_directory)
            .map(|f| {
                let relative_path = f.virtual_path.trim_start_matches(workspace_path).trim_start_matches('/').to_string();
                ManifestEntry {
                    relative_path,
                    content_hash: f.etag,
                    size: f.size,
                    mime_type: f.mime_type,
                }
            })
            .collect()
    }

    /// `create_snapshot`. The caller must hold `read` on `workspace_path`,
    /// when an entry for it exists (the workspace root itself may be an
    /// unmanaged path with no recorded permissions).
    pub fn create_snapshot(
        &self,
        ctx: &OperationContext,
        workspace_path: &str,
        description: Option<String>,
        tags: Vec<String>,
    ) -> Result<Uuid> {
        let root = Entity::new("file", workspace_path);
        if self.files.get(NexusPath::scoped(&ctx.zone.0, workspace_path).storage()).is_some() {
            self.require_permission(ctx, "read", &root)?;
        }
        let files = self.manifest_entries_under(&ctx.zone, workspace_path);
        self.snapshots.create(workspace_path, files, description, tags)
    }

    /// `restore_snapshot`: compute the restore plan and apply it directly
    /// against this instance's file index.
    pub fn restore_snapshot(&self, ctx: &OperationContext, snapshot_id: Uuid, workspace_path: &str) -> Result<Vec<RestoreAction>> {
        let root = Entity::new("file", workspace_path);
        if self.files.get(NexusPath::scoped(&ctx.zone.0, workspace_path).storage()).is_some() {
            self.require_permission(ctx, "write", &root)?;
        }
        let current = self.manifest_entries_under(&ctx.zone, workspace_path);
        let actions = self.snapshots.restore(snapshot_id, &current)?;

        for action in &actions {
            match action {
                RestoreAction::Restore { relative_path, content_hash } => {
                    let full_path = format!("{}/{}", workspace_path.trim_end_matches('/'), relative_path);
                    let npath = NexusPath::scoped(&ctx.zone.0, &full_path);
                    let size = self.cas.get(content_hash, Some(&ctx.zone.0)).map(|b| b.len() as u64).unwrap_or(0);
                    let version = self.files.get(npath.storage()).map(|e| e.version + 1).unwrap_or(1);
                    self.files.put(
                        npath.storage().to_string(),
                        FileEntity {
                            virtual_path: npath.display().to_string(),
                            backend_id: None,
                            physical_path: None,
                            size,
                            etag: content_hash.clone(),
                            mime_type: guess_mime_type(npath.display()),
                            zone_id: ctx.zone.0.clone(),
                            version,
                            modified_at: now_ms(),
                            created_by: ctx.subject.clone(),
                            is_directory: false,
                        },
                    );
                }
                RestoreAction::Delete { relative_path } => {
                    let full_path = format!("{}/{}", workspace_path.trim_end_matches('/'), relative_path);
                    let npath = NexusPath::scoped(&ctx.zone.0, &full_path);
                    self.files.remove(npath.storage());
                }
            }
        }
        self.record_filesystem_event("restore_snapshot", workspace_path, &ctx.zone)?;
        Ok(actions)
    }

    /// `list_snapshots`.
    pub fn list_snapshots(&self, workspace_path: &str, limit: usize) -> Vec<SnapshotRecord> {
        self.snapshots.list(workspace_path, limit)
    }

    /// `diff_snapshots`.
    pub fn diff_snapshots(&self, snap_a: Uuid, snap_b: Uuid) -> Result<SnapshotDiff> {
        self.snapshots.diff(snap_a, snap_b)
    }

    // ---- chunked uploads --------------------------------------------------

    /// Materialize a completed upload session as a virtual filesystem write,
    /// so the file becomes visible to `read`/`list`/`glob` the same as one
    /// written through [`NexusCore::write`].
    pub fn finalize_upload(&self, ctx: &OperationContext, session: &UploadSession) -> Result<WriteOutcome> {
        let hash = session.content_hash.clone().ok_or_else(|| Error::Internal(format!("upload session {} has no content hash", session.upload_id)))?;
        let npath = NexusPath::scoped(&ctx.zone.0, &session.target_path);
        let object = Entity::new("file", npath.display());
        let existing = self.files.get(npath.storage());
        match &existing {
            Some(_) => self.require_permission(ctx, "write", &object)?,
            None => self.grant_ownership(ctx, &object)?,
        }
        let version = existing.map(|e| e.version + 1).unwrap_or(1);
        let entity = FileEntity {
            virtual_path: npath.display().to_string(),
            backend_id: None,
            physical_path: None,
            size: session.upload_length,
            etag: hash.clone(),
            mime_type: guess_mime_type(npath.display()),
            zone_id: ctx.zone.0.clone(),
            version,
            modified_at: now_ms(),
            created_by: ctx.subject.clone(),
            is_directory: false,
        };
        self.files.put(npath.storage().to_string(), entity);
        self.record_filesystem_event("write", npath.display(), &ctx.zone)?;
        Ok(WriteOutcome {
            path: npath.display().to_string(),
            etag: hash,
            version,
            size: session.upload_length,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn core() -> (NexusCore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let core = NexusCore::open(NexusConfig::at(dir.path())).unwrap();
        (core, dir)
    }

    fn ctx(user: &str) -> OperationContext {
        OperationContext::new(Entity::new("user", user), ZoneId::new("z1"))
    }

    #[test]
    fn write_then_read_round_trips() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        let outcome = core.write(&alice, "/docs/readme.md", b"hello", None, None, false).unwrap();
        assert_eq!(outcome.version, 1);

        let content = match core.read(&alice, "/docs/readme.md", false).unwrap() {
            ReadOutcome::Bytes(b) => b,
            _ => panic!("expected bytes"),
        };
        assert_eq!(content, b"hello");
    }

    #[test]
    fn stranger_cannot_read_unshared_file() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        let bob = ctx("bob");
        core.write(&alice, "/docs/private.md", b"secret", None, None, false).unwrap();

        assert!(core.read(&bob, "/docs/private.md", false).is_err());
        assert!(!core.exists(&bob, "/docs/private.md").unwrap());
    }

    #[test]
    fn share_with_user_grants_read() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        let bob = ctx("bob");
        core.write(&alice, "/docs/shared.md", b"shared", None, None, false).unwrap();
        core.share_with_user(&alice, Entity::new("file", "/docs/shared.md"), Entity::new("user", "bob"), PermissionLevel::Viewer).unwrap();

        assert!(core.read(&bob, "/docs/shared.md", false).is_ok());
    }

    #[test]
    fn if_match_rejects_stale_etag() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        core.write(&alice, "/docs/versioned.md", b"v1", None, None, false).unwrap();
        let err = core.write(&alice, "/docs/versioned.md", b"v2", Some("stale-etag"), None, false).unwrap_err();
        assert!(matches!(err, Error::Conflict(_)));
    }

    #[test]
    fn glob_and_grep_filter_by_permission() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        let bob = ctx("bob");
        core.write(&alice, "/notes/a.txt", b"find me here", None, None, false).unwrap();
        core.write(&alice, "/notes/b.txt", b"nothing interesting", None, None, false).unwrap();

        let matches = core.glob(&alice, "/notes/*.txt", "/").unwrap();
        assert_eq!(matches.len(), 2);

        let hits = core.grep(&alice, "find me", "/", false, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].path, "/notes/a.txt");

        assert!(core.glob(&bob, "/notes/*.txt", "/").unwrap().is_empty());
    }

    #[test]
    fn snapshot_create_and_restore_round_trips() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        core.write(&alice, "/workspace/a.txt", b"one", None, None, false).unwrap();
        core.write(&alice, "/workspace/b.txt", b"two", None, None, false).unwrap();

        let snap = core.create_snapshot(&alice, "/workspace", Some("first".to_string()), vec![]).unwrap();
        core.write(&alice, "/workspace/b.txt", b"two-changed", None, None, true).unwrap();
        core.delete(&alice, "/workspace/a.txt").unwrap();

        core.restore_snapshot(&alice, snap, "/workspace").unwrap();

        let restored = match core.read(&alice, "/workspace/b.txt", false).unwrap() {
            ReadOutcome::Bytes(b) => b,
            _ => panic!("expected bytes"),
        };
        assert_eq!(restored, b"two");
        assert!(core.exists(&alice, "/workspace/a.txt").unwrap());
    }

    #[test]
    fn upload_completes_and_finalizes_into_index() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        let session = core.uploads().create("/uploads/big.bin", 5, "z1", "alice", HashMap::new(), None).unwrap();
        let session = core.uploads().receive_chunk(session.upload_id, 0, b"hello", None).unwrap();
        assert_eq!(session.status, nexus_upload::UploadStatus::Completed);

        let outcome = core.finalize_upload(&alice, &session).unwrap();
        assert_eq!(outcome.size, 5);
        assert!(core.exists(&alice, "/uploads/big.bin").unwrap());
    }

    #[test]
    fn mkdir_is_idempotent() {
        let (core, _dir) = core();
        let alice = ctx("alice");
        core.mkdir(&alice, "/workspace").unwrap();
        core.mkdir(&alice, "/workspace").unwrap();
    }
}
