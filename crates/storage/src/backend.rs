//! Backend capability traits.
//!
//! Concrete backends (local disk, S3/GCS, connector adapters) are out of
//! scope for this crate — only their interfaces matter. Expressed as
//! trait objects rather than a class hierarchy, per the specification's
//! design notes on dynamic dispatch over backends.

use nexus_core::Result;

/// File metadata as reported by a connector backend.
#[derive(Debug, Clone)]
pub struct FileInfo {
    /// Path relative to the backend's root.
    pub path: String,
    /// `true` if the entry is a directory.
    pub is_directory: bool,
    /// Size in bytes; meaningless for directories.
    pub size: u64,
    /// Backend-native version/etag string, used by the check-versions stage.
    pub backend_version: String,
    /// MIME type, if the backend can report one without reading content.
    pub mime_type: Option<String>,
}

/// The minimal capability set a sync-pipeline source backend must provide.
///
/// Mirrors the specification's `{read_content, write_content, delete_content,
/// list_dir, is_directory, stat, exists, get_file_info}` capability set.
pub trait ConnectorBackend: Send + Sync {
    /// List immediate children of `path`.
    fn list_dir(&self, path: &str) -> Result<Vec<FileInfo>>;
    /// Read the full content of `path`.
    fn read_content(&self, path: &str) -> Result<Vec<u8>>;
    /// Whether `path` is a directory.
    fn is_directory(&self, path: &str) -> Result<bool>;
    /// Whether `path` exists at all.
    fn exists(&self, path: &str) -> Result<bool>;
    /// Metadata for one path without reading its content.
    fn get_file_info(&self, path: &str) -> Result<FileInfo>;

    /// Batch version fetch, used by the check-versions stage when available
    /// to avoid one round-trip per candidate. Default falls back to
    /// per-path `get_file_info`.
    fn batch_versions(&self, paths: &[String]) -> Result<Vec<(String, String)>> {
        let mut out = Vec::with_capacity(paths.len());
        for path in paths {
            out.push((path.clone(), self.get_file_info(path)?.backend_version));
        }
        Ok(out)
    }
}

/// Optional multipart-upload capability a backend may additionally offer;
/// consulted by the chunked-upload service, not the sync pipeline.
pub trait MultipartBackend: Send + Sync {
    /// Begin a multipart upload, returning a backend-assigned identifier.
    fn multipart_init(&self, target_path: &str) -> Result<String>;
    /// Upload one part of a multipart upload.
    fn multipart_upload_part(&self, upload_id: &str, part_number: u32, data: &[u8]) -> Result<String>;
    /// Finalize a multipart upload given the ordered part identifiers.
    fn multipart_complete(&self, upload_id: &str, part_etags: &[String]) -> Result<()>;
    /// Abort an in-progress multipart upload.
    fn multipart_abort(&self, upload_id: &str) -> Result<()>;
}

/// Embedding generation, called by the sync pipeline's optional final stage.
///
/// Embedding and LLM providers are explicitly out of scope for this
/// workspace ("external collaborators, only their interfaces matter") — the
/// pipeline depends only on this trait, never a concrete provider.
pub trait EmbeddingProvider: Send + Sync {
    /// Produce an embedding vector for `content_text`.
    fn embed(&self, content_text: &str) -> Result<Vec<f32>>;
}
