//! Per-path async mutex table (spec §4.1).
//!
//! `acquire(path, fn)` serializes all `fn` invocations keyed by `path` while
//! permitting full parallelism across distinct paths. Requests on the same
//! key run in FIFO arrival order because `tokio::sync::Mutex` queues fairly;
//! if `fn` fails the guard is simply dropped at the end of the async block,
//! releasing the lock for the next waiter. `acquire` never recurses on the
//! same key from within `fn`, so there is no deadlock path.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

#[derive(Debug, Default)]
pub struct FileLockTable {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

impl FileLockTable {
    pub fn new() -> Self {
        FileLockTable { locks: Mutex::new(HashMap::new()) }
    }

    async fn lock_for(&self, path: &Path) -> Arc<Mutex<()>> {
        let mut table = self.locks.lock().await;
        table
            .entry(path.to_path_buf())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Run `f` with exclusive access to `path`. Distinct paths run fully in
    /// parallel; same-path callers queue in FIFO order.
    pub async fn acquire<F, Fut, T>(&self, path: &Path, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let key_lock = self.lock_for(path).await;
        let _guard = key_lock.lock().await;
        f().await
    }
}
