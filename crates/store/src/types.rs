use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a new upload session participates in concatenation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Concat {
    /// A plain single-part upload.
    None,
    /// A fragment whose bytes will later be concatenated into a final upload.
    Partial,
    /// The final upload, assembled from previously completed partials.
    Final { parts: Vec<String> },
}

/// Parameters for creating a new upload session.
#[derive(Debug, Clone)]
pub struct NewUpload {
    /// Declared total length in bytes. Ignored for [`Concat::Final`],
    /// where the size is the sum of the constituent partials.
    pub size: u64,
    /// Client-negotiated key/value metadata.
    pub metadata: HashMap<String, String>,
    pub concat: Concat,
}

/// Persistent per-session state, stored as the `<id>.info` sidecar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadInfo {
    pub id: String,
    /// Declared total length in bytes.
    pub size: u64,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    /// True for a concatenation fragment.
    #[serde(default)]
    pub is_partial: bool,
    /// True for a single-part upload or a concatenated final upload.
    #[serde(default)]
    pub is_final: bool,
    /// Ordered ids of the constituent partials (empty for single-part uploads).
    #[serde(default)]
    pub partial_ids: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl UploadInfo {
    /// Builds the completion notification for this session.
    pub(crate) fn completion(&self) -> UploadComplete {
        UploadComplete {
            id: self.id.clone(),
            is_final: self.is_final,
            metadata: self.metadata.clone(),
            partial_ids: self.partial_ids.clone(),
        }
    }
}

/// Event emitted once when a session's bytes are fully received.
///
/// Consumers see these for partial fragments too (`is_final = false`);
/// only final sessions are eligible for commitment.
#[derive(Debug, Clone)]
pub struct UploadComplete {
    pub id: String,
    pub is_final: bool,
    pub metadata: HashMap<String, String>,
    pub partial_ids: Vec<String>,
}
