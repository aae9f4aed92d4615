//! Upload feature settings.
//!
//! These are operator-facing knobs, persisted as part of the server
//! configuration and advertised to clients out of band.

use serde::{Deserialize, Serialize};

/// Default chunk size advertised to clients: 20 MB.
pub const DEFAULT_CHUNK_SIZE: u64 = 20 * 1000 * 1000;

/// Resumable upload settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadSettings {
    /// Whether resumable uploads are enabled at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Chunk size clients should use, in bytes. Also bounds the request
    /// body size the server accepts for a single chunk.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_chunk_size() -> u64 {
    DEFAULT_CHUNK_SIZE
}

impl Default for UploadSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            chunk_size: default_chunk_size(),
        }
    }
}
