//! Filesystem-backed store for in-flight resumable uploads.
//!
//! Each session lives in a staging directory as two files: `<id>` (the
//! uploaded bytes) and `<id>.info` (a JSON sidecar with the declared size,
//! client metadata, and concatenation state). The store emits one
//! completion notification per session over an mpsc channel once all
//! bytes have arrived.

mod store;
mod types;

pub use store::{EVENT_BUFFER, UploadStore};
pub use types::{Concat, NewUpload, UploadComplete, UploadInfo};

/// Suffix of the per-session JSON sidecar file.
pub const INFO_SUFFIX: &str = ".info";

/// Errors produced by the upload store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("upload not found: {0}")]
    NotFound(String),

    #[error("invalid upload id: {0}")]
    InvalidId(String),

    #[error("offset mismatch: expected {expected}, got {got}")]
    OffsetMismatch { expected: u64, got: u64 },

    #[error("upload {id} would grow past its declared size {size}")]
    SizeExceeded { id: String, size: u64 },

    #[error("chunk checksum mismatch")]
    ChecksumMismatch,

    #[error("upload already complete: {0}")]
    AlreadyComplete(String),

    #[error("partial upload {0} is not complete")]
    PartialIncomplete(String),

    #[error("upload {0} is not a partial upload")]
    NotPartial(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("info sidecar error: {0}")]
    Json(#[from] serde_json::Error),
}
