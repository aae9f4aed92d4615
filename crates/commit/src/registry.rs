//! Lazy per-user handler registry.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dockhand_store::UploadStore;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::consumer;

/// Name of the per-user staging directory, under the user's root.
pub const TMP_UPLOAD_DIR: &str = ".tmp_upload";

/// One user's upload machinery: the store plus its completion consumer.
///
/// Created lazily by [`UploadRegistry::get_or_create`] and shared for the
/// registry's lifetime. The consumer task is bound to the handler through
/// a cancellation token and joined on shutdown.
pub struct UserHandler {
    store: UploadStore,
    tmp_dir: PathBuf,
    cancel: CancellationToken,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

impl UserHandler {
    /// The upload store rooted at this user's staging directory.
    pub fn store(&self) -> &UploadStore {
        &self.store
    }

    /// The user's staging directory.
    pub fn tmp_dir(&self) -> &Path {
        &self.tmp_dir
    }

    /// Cancels the consumer and waits for it to drain.
    async fn shutdown(&self) {
        self.cancel.cancel();
        let handle = self.consumer.lock().unwrap().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Process-wide map of user id to handler instance.
///
/// Guarantees at most one handler (and therefore one completion
/// consumer) per user: duplicate consumers would race to finalize the
/// same sessions. Entries are never evicted; the map grows with the set
/// of users seen by this process.
#[derive(Default)]
pub struct UploadRegistry {
    handlers: Mutex<HashMap<u64, Arc<UserHandler>>>,
}

impl UploadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the user's handler, creating it on first use.
    ///
    /// The lock covers only this lookup-or-insert; request handling never
    /// runs under it, so unrelated users' traffic is not serialized.
    /// Must be called from within a tokio runtime (spawns the consumer).
    pub fn get_or_create(
        &self,
        user_id: u64,
        user_root: &Path,
    ) -> std::io::Result<Arc<UserHandler>> {
        let mut handlers = self.handlers.lock().unwrap();
        if let Some(handler) = handlers.get(&user_id) {
            return Ok(handler.clone());
        }

        tracing::info!(user = user_id, "creating upload handler");
        let tmp_dir = user_root.join(TMP_UPLOAD_DIR);
        let (store, events) = UploadStore::open(&tmp_dir)?;
        let cancel = CancellationToken::new();
        let task = tokio::spawn(consumer::run(
            user_root.to_path_buf(),
            tmp_dir.clone(),
            events,
            cancel.child_token(),
        ));

        let handler = Arc::new(UserHandler {
            store,
            tmp_dir,
            cancel,
            consumer: Mutex::new(Some(task)),
        });
        handlers.insert(user_id, handler.clone());
        Ok(handler)
    }

    /// Number of handler instances created so far.
    pub fn len(&self) -> usize {
        self.handlers.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Cancels every consumer and waits for each to drain its in-flight
    /// notifications. The registry is empty afterwards.
    pub async fn shutdown(&self) {
        let handlers: Vec<Arc<UserHandler>> = {
            let mut map = self.handlers.lock().unwrap();
            map.drain().map(|(_, handler)| handler).collect()
        };
        for handler in handlers {
            handler.shutdown().await;
        }
    }
}
