//! Chunked upload service for Nexus: a tus.io-derived resumable upload
//! protocol over virtual filesystem paths.
//!
//! Sessions progress `Created -> InProgress -> Completed`, or are diverted
//! to `Terminated`/`Expired`. [`service::ChunkedUploadService`] is the entry
//! point; [`session`] holds the session/part types and [`checksum`]
//! verifies per-chunk integrity headers.

#![warn(missing_docs)]

pub mod checksum;
pub mod service;
pub mod session;

pub use service::{ChunkedUploadService, UploadCapabilities};
pub use session::{PartRecord, UploadConfig, UploadSession, UploadStatus};
