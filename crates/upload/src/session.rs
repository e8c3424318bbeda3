//! Upload session state machine and configuration.

use std::collections::HashMap;

use uuid::Uuid;

/// Forward-only lifecycle state for one upload session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Session created, no chunk received yet.
    Created,
    /// At least one chunk received, upload not yet complete.
    InProgress,
    /// The final chunk landed; the assembled content is in the CAS.
    Completed,
    /// The caller explicitly aborted the session.
    Terminated,
    /// The session's TTL elapsed before completion.
    Expired,
}

impl UploadStatus {
    /// Terminal states never transition again.
    pub fn is_terminal(self) -> bool {
        matches!(self, UploadStatus::Completed | UploadStatus::Terminated | UploadStatus::Expired)
    }
}

/// One accepted chunk, tracked for fallback (non-multipart-backend) assembly.
#[derive(Debug, Clone)]
pub struct PartRecord {
    /// 1-based part number in upload order.
    pub part_number: u32,
    /// Byte offset this part started at.
    pub offset: u64,
    /// Size of this part in bytes.
    pub size: u64,
    /// Backend multipart ETag, or the part's own content hash in the CAS fallback.
    pub etag: Option<String>,
}

/// A tus.io resumable upload session.
#[derive(Debug, Clone)]
pub struct UploadSession {
    /// Unique session id, also the tus `{id}` in the resource URL.
    pub upload_id: Uuid,
    /// Destination virtual path once assembled.
    pub target_path: String,
    /// Total expected length (`Upload-Length`).
    pub upload_length: u64,
    /// Bytes received so far; monotonically nondecreasing while non-terminal.
    pub upload_offset: u64,
    /// Current lifecycle state.
    pub status: UploadStatus,
    /// Zone the eventual file belongs to.
    pub zone_id: String,
    /// Identity that created the session.
    pub user_id: String,
    /// Client-supplied key/value metadata (`Upload-Metadata`).
    pub metadata: HashMap<String, String>,
    /// Checksum algorithm the client intends to use on chunks, if any.
    pub checksum_algorithm: Option<String>,
    /// Unix millis the session was created.
    pub created_at: i64,
    /// Unix millis after which the session auto-expires.
    pub expires_at: i64,
    /// Backend-assigned multipart upload id, when the backend supports it.
    pub backend_upload_id: Option<String>,
    /// Chunks received so far, used by the CAS fallback to assemble the final content.
    pub parts_received: Vec<PartRecord>,
    /// Content hash of the assembled upload, set once `status == Completed`.
    pub content_hash: Option<String>,
}

impl UploadSession {
    /// Bytes left to receive before the upload is complete.
    pub fn remaining(&self) -> u64 {
        self.upload_length.saturating_sub(self.upload_offset)
    }
}

/// Tunable limits for a [`crate::service::ChunkedUploadService`].
#[derive(Debug, Clone)]
pub struct UploadConfig {
    /// Hours an idle session survives before auto-expiring.
    pub session_ttl_hours: i64,
    /// Global concurrent-upload semaphore capacity.
    pub max_concurrent_uploads: usize,
    /// Smallest chunk accepted (except the final chunk of an upload).
    pub min_chunk_size: u64,
    /// Largest chunk accepted in one `PATCH`.
    pub max_chunk_size: u64,
    /// Suggested chunk size surfaced to clients via capabilities.
    pub default_chunk_size: u64,
    /// Largest total upload length `create` will accept.
    pub max_upload_size: u64,
    /// Minimum interval between lazy cleanup sweeps triggered by `create`.
    pub cleanup_interval_ms: i64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            session_ttl_hours: 24,
            max_concurrent_uploads: 20,
            min_chunk_size: 256 * 1024,
            max_chunk_size: 64 * 1024 * 1024,
            default_chunk_size: 8 * 1024 * 1024,
            max_upload_size: 5 * 1024 * 1024 * 1024,
            cleanup_interval_ms: 60_000,
        }
    }
}
