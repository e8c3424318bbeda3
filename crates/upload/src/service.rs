//! `ChunkedUploadService`: tus.io-derived resumable upload sessions.
//!
//! Sessions are assembled either through a backend's [`MultipartBackend`]
//! capability, when configured, or by falling back to content-addressable
//! part storage via [`LocalDiskCache`] and concatenating parts on
//! completion. The global concurrency limit is enforced with a non-blocking
//! semaphore: `create` fails immediately rather than queuing, matching the
//! specification's 429-equivalent behavior under load.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::Mutex;
use tracing::debug;
use uuid::Uuid;

use nexus_core::{Error, Result};
use nexus_storage::{content_hash, LocalDiskCache, MultipartBackend};

use crate::checksum;
use crate::session::{PartRecord, UploadConfig, UploadSession, UploadStatus};

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// What the server is prepared to do, surfaced to clients as tus
/// `Tus-Resumable`/`Tus-Extension`-style capability advertisement.
#[derive(Debug, Clone)]
pub struct UploadCapabilities {
    /// Largest total upload length accepted.
    pub max_upload_size: u64,
    /// Recommended chunk size for clients that can choose.
    pub default_chunk_size: u64,
    /// Checksum algorithms the server can verify.
    pub checksum_algorithms: Vec<&'static str>,
    /// Whether a multipart-capable backend is configured.
    pub multipart_backend: bool,
}

/// The resumable chunked-upload service.
pub struct ChunkedUploadService {
    config: UploadConfig,
    backend: Option<Arc<dyn MultipartBackend>>,
    cas: Arc<LocalDiskCache>,
    sessions: DashMap<Uuid, Mutex<UploadSession>>,
    active_permits: AtomicUsize,
    last_cleanup_ms: AtomicI64,
}

impl ChunkedUploadService {
    /// Construct a service. `backend` is consulted for true multipart
    /// uploads; when `None`, every session uses the CAS-fallback path.
    pub fn new(config: UploadConfig, backend: Option<Arc<dyn MultipartBackend>>, cas: Arc<LocalDiskCache>) -> Self {
        ChunkedUploadService {
            config,
            backend,
            cas,
            sessions: DashMap::new(),
            active_permits: AtomicUsize::new(0),
            last_cleanup_ms: AtomicI64::new(0),
        }
    }

    /// What this service currently supports.
    pub fn capabilities(&self) -> UploadCapabilities {
        UploadCapabilities {
            max_upload_size: self.config.max_upload_size,
            default_chunk_size: self.config.default_chunk_size,
            checksum_algorithms: vec!["sha256", "md5", "crc32"],
            multipart_backend: self.backend.is_some(),
        }
    }

    fn try_acquire(&self) -> bool {
        loop {
            let current = self.active_permits.load(Ordering::SeqCst);
            if current >= self.config.max_concurrent_uploads {
                return false;
            }
            if self
                .active_permits
                .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self) {
        self.active_permits.fetch_sub(1, Ordering::SeqCst);
    }

    /// `create`: begin a new upload session.
    ///
    /// Fails immediately with [`Error::TooManyConcurrentUploads`] when the
    /// global semaphore has no free permit — never blocks waiting for one.
    pub fn create(
        &self,
        target_path: impl Into<String>,
        upload_length: u64,
        zone_id: impl Into<String>,
        user_id: impl Into<String>,
        metadata: HashMap<String, String>,
        checksum_algorithm: Option<String>,
    ) -> Result<UploadSession> {
        if upload_length == 0 || upload_length > self.config.max_upload_size {
            return Err(Error::Validation(format!(
                "upload_length {upload_length} outside accepted range (1..={})",
                self.config.max_upload_size
            )));
        }
        if !self.try_acquire() {
            return Err(Error::TooManyConcurrentUploads);
        }

        self.maybe_cleanup_expired();

        let target_path = target_path.into();
        let backend_upload_id = match &self.backend {
            Some(backend) => match backend.multipart_init(&target_path) {
                Ok(id) => Some(id),
                Err(e) => {
                    self.release();
                    return Err(e);
                }
            },
            None => None,
        };

        let now = now_ms();
        let session = UploadSession {
            upload_id: Uuid::new_v4(),
            target_path,
            upload_length,
            upload_offset: 0,
            status: UploadStatus::Created,
            zone_id: zone_id.into(),
            user_id: user_id.into(),
            metadata,
            checksum_algorithm,
            created_at: now,
            expires_at: now + self.config.session_ttl_hours * 3_600_000,
            backend_upload_id,
            parts_received: Vec::new(),
            content_hash: None,
        };
        let upload_id = session.upload_id;
        self.sessions.insert(upload_id, Mutex::new(session.clone()));
        Ok(session)
    }

    /// `receive_chunk`: append one `PATCH` of bytes at `offset`.
    ///
    /// The session's lock is held for the duration of the call so
    /// concurrent chunks to the same session serialize; concurrent chunks to
    /// different sessions do not contend. On the final chunk the parts are
    /// assembled (CAS fallback) or finalized (multipart backend) and the
    /// session transitions to [`UploadStatus::Completed`].
    pub fn receive_chunk(&self, upload_id: Uuid, offset: u64, data: &[u8], checksum_header: Option<&str>) -> Result<UploadSession> {
        let entry = self.sessions.get(&upload_id).ok_or_else(|| Error::NotFound(format!("upload session {upload_id}")))?;
        let mut session = entry.lock();

        if session.status.is_terminal() {
            return match session.status {
                UploadStatus::Expired => Err(Error::UploadExpired),
                _ => Err(Error::Conflict(format!("upload session {upload_id} is {:?}", session.status))),
            };
        }
        if now_ms() > session.expires_at {
            session.status = UploadStatus::Expired;
            self.release();
            debug!(%upload_id, expires_at = session.expires_at, "upload session expired on chunk arrival");
            return Err(Error::UploadExpired);
        }
        if offset != session.upload_offset {
            return Err(Error::UploadOffsetMismatch {
                expected: session.upload_offset,
                received: offset,
            });
        }

        let chunk_size = data.len() as u64;
        let remaining = session.remaining();
        if chunk_size > remaining {
            return Err(Error::Validation(format!(
                "chunk of {chunk_size} bytes exceeds the {remaining} bytes remaining on upload {upload_id}"
            )));
        }
        let is_last_chunk = chunk_size == remaining;
        if chunk_size > self.config.max_chunk_size || (!is_last_chunk && chunk_size < self.config.min_chunk_size) {
            return Err(Error::Validation(format!(
                "chunk of {chunk_size} bytes outside accepted range [{}..={}] (last-chunk exception only applies below the minimum)",
                self.config.min_chunk_size, self.config.max_chunk_size
            )));
        }

        if let Some(header) = checksum_header {
            checksum::verify(header, data)?;
        }

        let part_number = session.parts_received.len() as u32 + 1;
        let etag = match &self.backend {
            Some(backend) => {
                let backend_id = session.backend_upload_id.clone().ok_or_else(|| Error::Internal("missing backend upload id".to_string()))?;
                Some(backend.multipart_upload_part(&backend_id, part_number, data)?)
            }
            None => {
                let hash = content_hash(data);
                self.cas.put(&hash, data, Some(&session.zone_id), 0, false)?;
                Some(hash)
            }
        };
        session.parts_received.push(PartRecord {
            part_number,
            offset,
            size: data.len() as u64,
            etag,
        });
        session.upload_offset += data.len() as u64;
        session.status = UploadStatus::InProgress;

        if session.upload_offset >= session.upload_length {
            self.assemble_and_complete(&mut session)?;
            self.release();
        }

        Ok(session.clone())
    }

    fn assemble_and_complete(&self, session: &mut UploadSession) -> Result<()> {
        let content_hash_value = match &self.backend {
            Some(backend) => {
                let backend_id = session.backend_upload_id.clone().ok_or_else(|| Error::Internal("missing backend upload id".to_string()))?;
                let etags: Vec<String> = session.parts_received.iter().filter_map(|p| p.etag.clone()).collect();
                backend.multipart_complete(&backend_id, &etags)?;
                backend_id
            }
            None => {
                let mut assembled = Vec::with_capacity(session.upload_length as usize);
                for part in &session.parts_received {
                    let Some(hash) = &part.etag else {
                        return Err(Error::Internal(format!("part {} missing content hash", part.part_number)));
                    };
                    let bytes = self
                        .cas
                        .get(hash, Some(&session.zone_id))
                        .ok_or_else(|| Error::Internal(format!("part {} evicted before assembly", part.part_number)))?;
                    assembled.extend_from_slice(&bytes);
                }
                let hash = content_hash(&assembled);
                self.cas.put(&hash, &assembled, Some(&session.zone_id), 1, true)?;
                hash
            }
        };
        session.content_hash = Some(content_hash_value);
        session.status = UploadStatus::Completed;
        Ok(())
    }

    /// `get_status`: the current session state.
    pub fn get_status(&self, upload_id: Uuid) -> Result<UploadSession> {
        self.sessions
            .get(&upload_id)
            .map(|s| s.lock().clone())
            .ok_or_else(|| Error::NotFound(format!("upload session {upload_id}")))
    }

    /// `terminate`: explicitly abort a non-terminal session.
    pub fn terminate(&self, upload_id: Uuid) -> Result<()> {
        let entry = self.sessions.get(&upload_id).ok_or_else(|| Error::NotFound(format!("upload session {upload_id}")))?;
        let mut session = entry.lock();
        if session.status.is_terminal() {
            return Ok(());
        }
        if let (Some(backend), Some(backend_id)) = (&self.backend, &session.backend_upload_id) {
            backend.multipart_abort(backend_id)?;
        }
        session.status = UploadStatus::Terminated;
        self.release();
        Ok(())
    }

    /// Sweep sessions past their TTL, marking them expired and releasing
    /// their permits. Runs at most once per `cleanup_interval_ms`, triggered
    /// lazily from `create` rather than on a background timer.
    pub fn cleanup_expired(&self) -> usize {
        let now = now_ms();
        let mut expired = 0;
        for entry in self.sessions.iter() {
            let mut session = entry.value().lock();
            if !session.status.is_terminal() && now > session.expires_at {
                session.status = UploadStatus::Expired;
                self.release();
                expired += 1;
            }
        }
        if expired > 0 {
            debug!(expired, "upload session sweep expired sessions past their TTL");
        }
        expired
    }

    fn maybe_cleanup_expired(&self) {
        let now = now_ms();
        let last = self.last_cleanup_ms.load(Ordering::SeqCst);
        if now - last < self.config.cleanup_interval_ms {
            return;
        }
        if self.last_cleanup_ms.compare_exchange(last, now, Ordering::SeqCst, Ordering::SeqCst).is_ok() {
            self.cleanup_expired();
        }
    }
}
