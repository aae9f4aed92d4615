//! Moves a completed upload out of the staging directory and into the
//! user's storage tree.

use std::path::{Path, PathBuf};

use dockhand_store::UploadComplete;
use tokio::fs;

use crate::CommitError;
use crate::metadata::read_field;
use crate::validation::validate_destination;

/// Result of a finalization attempt.
#[derive(Debug)]
pub enum Outcome {
    /// The upload was moved to the returned destination and its
    /// temporary artifacts were cleaned up.
    Committed(PathBuf),
    /// The notification was for a partial fragment; nothing was done.
    Skipped,
}

/// Finalizes a completed upload session.
///
/// Preconditions (no filesystem mutation before the rename):
/// 1. Non-final sessions are skipped, not errors.
/// 2. `filename`, `destination` and `overwrite` must all be present.
/// 3. The destination must be a safe relative path.
/// 4. If the destination exists, `overwrite` decides; `"false"` is a
///    policy rejection that leaves the staged upload in place.
///
/// The rename is the single externally visible commit point. Cleanup of
/// the session's temporary files (and the staging directory itself, once
/// empty) happens afterwards and never rolls the commit back.
pub async fn finalize(
    user_root: &Path,
    tmp_dir: &Path,
    upload: &UploadComplete,
) -> Result<Outcome, CommitError> {
    // Only finalized uploads are committed; fragments of a concatenated
    // upload complete individually and are consumed by the final one.
    if !upload.is_final {
        return Ok(Outcome::Skipped);
    }

    let filename = read_field(&upload.metadata, "filename")?;
    let destination = read_field(&upload.metadata, "destination")?;
    let overwrite_raw = read_field(&upload.metadata, "overwrite")?;
    validate_destination(destination)?;

    let uploaded = tmp_dir.join(&upload.id);
    let full_destination = user_root.join(destination);

    if !fs::try_exists(&uploaded).await? {
        return Err(CommitError::SourceMissing(uploaded));
    }

    if fs::try_exists(&full_destination).await? {
        let overwrite: bool =
            overwrite_raw
                .parse()
                .map_err(|_| CommitError::InvalidOverwrite {
                    value: overwrite_raw.to_string(),
                })?;
        if !overwrite {
            return Err(CommitError::DestinationExists(destination.to_string()));
        }
    }

    tracing::info!(
        filename,
        from = %uploaded.display(),
        to = %full_destination.display(),
        "upload finished, moving into place"
    );

    if let Some(parent) = full_destination.parent() {
        fs::create_dir_all(parent).await?;
    }
    // Single rename, never copy+delete: readers of the destination tree
    // see either the old entry or the complete new file.
    fs::rename(&uploaded, &full_destination).await?;

    let failed = cleanup_session_files(tmp_dir, upload).await?;
    remove_dir_if_empty(tmp_dir).await;

    if failed > 0 {
        return Err(CommitError::Cleanup { failed });
    }
    Ok(Outcome::Committed(full_destination))
}

/// Deletes every staging file belonging to the session: for each partial
/// id plus the session id itself, every entry whose name starts with that
/// id (data files and `.info` sidecars alike).
///
/// Best-effort batch: a failed deletion is logged and counted, and the
/// remaining deletions are still attempted.
async fn cleanup_session_files(
    tmp_dir: &Path,
    upload: &UploadComplete,
) -> Result<usize, CommitError> {
    let mut failed = 0usize;
    let mut entries = fs::read_dir(tmp_dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        let name = name.to_string_lossy();

        let owned = upload
            .partial_ids
            .iter()
            .chain(std::iter::once(&upload.id))
            .any(|id| name.starts_with(id.as_str()));
        if !owned {
            continue;
        }

        if let Err(e) = fs::remove_file(entry.path()).await {
            tracing::warn!(
                file = %entry.path().display(),
                error = %e,
                "failed to delete temporary upload file"
            );
            failed += 1;
        }
    }

    Ok(failed)
}

/// Removes the staging directory if it holds no entries.
///
/// `remove_dir` refuses non-empty directories, so a concurrent upload
/// repopulating the directory between the emptiness check and the
/// removal loses nothing.
async fn remove_dir_if_empty(tmp_dir: &Path) {
    let empty = match fs::read_dir(tmp_dir).await {
        Ok(mut entries) => matches!(entries.next_entry().await, Ok(None)),
        Err(e) => {
            tracing::warn!(dir = %tmp_dir.display(), error = %e, "failed to list staging directory");
            return;
        }
    };

    if empty {
        if let Err(e) = fs::remove_dir(tmp_dir).await {
            tracing::debug!(dir = %tmp_dir.display(), error = %e, "staging directory not removed");
        }
    }
}
