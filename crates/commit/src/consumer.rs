//! Per-user completion consumer.

use std::path::PathBuf;

use dockhand_store::UploadComplete;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::finalizer::{Outcome, finalize};

/// Drains completion notifications for one user and finalizes each.
///
/// Notifications are processed strictly in arrival order. Every error is
/// scoped to its session: it is logged and the loop keeps listening, so
/// one bad session never stalls the ones behind it. The loop ends only
/// on cancellation or when the store side of the channel is dropped.
pub(crate) async fn run(
    user_root: PathBuf,
    tmp_dir: PathBuf,
    mut events: mpsc::Receiver<UploadComplete>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(root = %user_root.display(), "completion consumer cancelled");
                break;
            }
            event = events.recv() => {
                let Some(event) = event else {
                    tracing::debug!(root = %user_root.display(), "completion channel closed");
                    break;
                };
                match finalize(&user_root, &tmp_dir, &event).await {
                    Ok(Outcome::Committed(dest)) => {
                        tracing::info!(upload = %event.id, dest = %dest.display(), "upload committed");
                    }
                    Ok(Outcome::Skipped) => {
                        tracing::debug!(upload = %event.id, "ignoring completion of partial fragment");
                    }
                    Err(e) if e.is_policy_rejection() => {
                        tracing::warn!(upload = %event.id, error = %e, "upload rejected");
                    }
                    Err(e) => {
                        tracing::error!(upload = %event.id, error = %e, "failed to finalize upload");
                    }
                }
            }
        }
    }
}
