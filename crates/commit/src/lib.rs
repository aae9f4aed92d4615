//! Commit pipeline for completed uploads.
//!
//! Listens for completion notifications from a user's upload store and
//! moves each finished upload out of the staging directory into its
//! destination in the user's storage tree: overwrite policy enforcement,
//! one atomic rename, then cleanup of every temporary artifact tied to
//! the session.

mod consumer;
mod finalizer;
mod metadata;
mod registry;
mod validation;

pub use finalizer::{Outcome, finalize};
pub use metadata::read_field;
pub use registry::{TMP_UPLOAD_DIR, UploadRegistry, UserHandler};
pub use validation::validate_destination;

use std::path::PathBuf;

/// Errors produced by the commit pipeline.
///
/// Every variant is scoped to a single session; none of them may
/// terminate the consumer loop.
#[derive(Debug, thiserror::Error)]
pub enum CommitError {
    #[error("metadata field {0} not found in upload")]
    MissingMetadata(String),

    #[error("invalid overwrite flag {value:?}")]
    InvalidOverwrite { value: String },

    #[error("destination {0} exists and overwrite is disabled")]
    DestinationExists(String),

    #[error("invalid destination: {0}")]
    InvalidDestination(String),

    #[error("uploaded file not found: {0}")]
    SourceMissing(PathBuf),

    #[error("failed to delete {failed} temporary file(s)")]
    Cleanup { failed: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CommitError {
    /// True for the user-correctable overwrite rejection, which callers
    /// must report distinctly from I/O faults and never retry.
    pub fn is_policy_rejection(&self) -> bool {
        matches!(self, CommitError::DestinationExists(_))
    }
}
