use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;

use crate::types::{Concat, NewUpload, UploadComplete, UploadInfo};
use crate::{INFO_SUFFIX, StoreError};

/// Completion event buffer capacity.
///
/// Finalization can lag behind the request path (it does filesystem
/// renames), so completions are buffered. 64 covers far more in-flight
/// sessions than one user realistically holds open.
pub const EVENT_BUFFER: usize = 64;

/// Store for one user's in-flight uploads, rooted at a staging directory.
///
/// The paired receiver returned by [`open`](Self::open) delivers one
/// [`UploadComplete`] per session, in completion order.
pub struct UploadStore {
    dir: PathBuf,
    events: mpsc::Sender<UploadComplete>,
}

impl UploadStore {
    /// Opens a store rooted at `dir`, creating the directory if needed.
    ///
    /// Returns the store plus the completion event receiver. The receiver
    /// is handed to exactly one consumer; ordering is only defined with a
    /// single consumer per store.
    pub fn open(dir: impl Into<PathBuf>) -> std::io::Result<(Self, mpsc::Receiver<UploadComplete>)> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        let (events, rx) = mpsc::channel(EVENT_BUFFER);
        Ok((Self { dir, events }, rx))
    }

    /// The staging directory this store is rooted at.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates a new upload session and returns its persisted state.
    ///
    /// A zero-length non-partial upload is complete at creation and
    /// notifies immediately. [`Concat::Final`] assembles the listed
    /// completed partials into the new data file and also notifies
    /// immediately.
    pub async fn create(&self, new: NewUpload) -> Result<UploadInfo, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();

        let info = match new.concat {
            Concat::Final { parts } => self.assemble_final(&id, new.metadata, parts).await?,
            concat => {
                let is_partial = concat == Concat::Partial;
                let info = UploadInfo {
                    id: id.clone(),
                    size: new.size,
                    metadata: new.metadata,
                    is_partial,
                    is_final: !is_partial,
                    partial_ids: Vec::new(),
                    created_at: Utc::now(),
                };
                fs::File::create(self.data_path(&id)).await?;
                self.save_info(&info).await?;

                if info.size == 0 {
                    self.notify(info.completion()).await;
                }
                info
            }
        };

        tracing::debug!(
            upload = %info.id,
            size = info.size,
            partial = info.is_partial,
            "upload session created"
        );
        Ok(info)
    }

    /// Returns the persisted state of a session.
    pub async fn info(&self, id: &str) -> Result<UploadInfo, StoreError> {
        validate_id(id)?;
        let raw = match fs::read(self.info_path(id)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_slice(&raw)?)
    }

    /// Returns the current byte offset of a session (the data file length).
    pub async fn offset(&self, id: &str) -> Result<u64, StoreError> {
        validate_id(id)?;
        match fs::metadata(self.data_path(id)).await {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StoreError::NotFound(id.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Appends a chunk at `offset`, which must equal the current offset.
    ///
    /// `checksum` is an optional expected SHA-256 hex digest of `data`,
    /// verified before anything is written. Returns the new offset. When
    /// the session reaches its declared size a completion notification is
    /// emitted (with `is_final = false` for partials).
    pub async fn append(
        &self,
        id: &str,
        offset: u64,
        data: &[u8],
        checksum: Option<&str>,
    ) -> Result<u64, StoreError> {
        let info = self.info(id).await?;
        let current = self.offset(id).await?;

        if current >= info.size && info.size > 0 {
            return Err(StoreError::AlreadyComplete(id.to_string()));
        }
        if offset != current {
            return Err(StoreError::OffsetMismatch {
                expected: current,
                got: offset,
            });
        }
        if current + data.len() as u64 > info.size {
            return Err(StoreError::SizeExceeded {
                id: id.to_string(),
                size: info.size,
            });
        }
        if let Some(expected) = checksum {
            let actual = hex::encode(Sha256::digest(data));
            if !actual.eq_ignore_ascii_case(expected) {
                return Err(StoreError::ChecksumMismatch);
            }
        }

        let mut file = fs::OpenOptions::new()
            .append(true)
            .open(self.data_path(id))
            .await?;
        file.write_all(data).await?;

        let new_offset = current + data.len() as u64;
        if new_offset == info.size {
            tracing::debug!(upload = %id, size = info.size, "upload complete");
            self.notify(info.completion()).await;
        }
        Ok(new_offset)
    }

    /// Removes a session's data file and sidecar.
    pub async fn remove(&self, id: &str) -> Result<(), StoreError> {
        // Read the sidecar first so a missing session reports NotFound.
        let _ = self.info(id).await?;
        fs::remove_file(self.data_path(id)).await?;
        fs::remove_file(self.info_path(id)).await?;
        Ok(())
    }

    /// Concatenates completed partials into a new final session.
    async fn assemble_final(
        &self,
        id: &str,
        metadata: std::collections::HashMap<String, String>,
        parts: Vec<String>,
    ) -> Result<UploadInfo, StoreError> {
        // Verify every part before writing anything.
        let mut total = 0u64;
        for part in &parts {
            let part_info = self.info(part).await?;
            if !part_info.is_partial {
                return Err(StoreError::NotPartial(part.clone()));
            }
            if self.offset(part).await? < part_info.size {
                return Err(StoreError::PartialIncomplete(part.clone()));
            }
            total += part_info.size;
        }

        let mut out = fs::File::create(self.data_path(id)).await?;
        for part in &parts {
            let bytes = fs::read(self.data_path(part)).await?;
            out.write_all(&bytes).await?;
        }

        let info = UploadInfo {
            id: id.to_string(),
            size: total,
            metadata,
            is_partial: false,
            is_final: true,
            partial_ids: parts,
            created_at: Utc::now(),
        };
        self.save_info(&info).await?;
        self.notify(info.completion()).await;
        Ok(info)
    }

    async fn save_info(&self, info: &UploadInfo) -> Result<(), StoreError> {
        let raw = serde_json::to_vec(info)?;
        fs::write(self.info_path(&info.id), raw).await?;
        Ok(())
    }

    async fn notify(&self, event: UploadComplete) {
        if self.events.send(event).await.is_err() {
            tracing::warn!("completion consumer is gone, dropping event");
        }
    }

    fn data_path(&self, id: &str) -> PathBuf {
        self.dir.join(id)
    }

    fn info_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{id}{INFO_SUFFIX}"))
    }
}

/// Rejects ids that could escape the staging directory when joined.
fn validate_id(id: &str) -> Result<(), StoreError> {
    if id.is_empty() || id == "." || id == ".." || id.contains('/') || id.contains('\\') {
        return Err(StoreError::InvalidId(id.to_string()));
    }
    Ok(())
}
