//! The Store: crash-safe persistence of the program index, queue, IDL
//! cache, and documentation (spec §4.2).
//!
//! Reads never lock — they tolerate the fact that every write is atomic
//! (§4.2's tmp+rename discipline lives in [`super::atomic`]) so a reader
//! observes either the pre- or post-write content of a file, never a
//! truncation. Every mutating operation has a `*_safe` variant that takes
//! the file lock for the file it touches; the non-`safe` variants exist for
//! single-threaded contexts such as startup recovery and tests.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::{
    Documentation, IdlCache, ProgramId, ProgramMetadata, ProgramStatus, QueueItem, QueueStatus,
    Stats,
};
use crate::error::StoreError;
use crate::storage::atomic::{read_json_optional, read_json_or_recover, write_json_atomic};
use crate::storage::file_lock::FileLockTable;

/// What happened when `add_to_queue` was called for an id already known to
/// the queue (spec §6's POST /api/programs status-code contract needs this
/// distinction: 202 new vs 200 re-queued-from-failed vs 200 already present).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddOutcome {
    New,
    RequeuedFromFailed,
    AlreadyPresent,
}

pub struct Store {
    pub data_dir: PathBuf,
    locks: FileLockTable,
}

impl Store {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let data_dir = data_dir.into();
        fs::create_dir_all(&data_dir)?;
        fs::create_dir_all(data_dir.join("docs"))?;
        fs::create_dir_all(data_dir.join("idls"))?;
        Ok(Store { data_dir, locks: FileLockTable::new() })
    }

    fn programs_path(&self) -> PathBuf {
        self.data_dir.join("programs.json")
    }

    fn queue_path(&self) -> PathBuf {
        self.data_dir.join("queue.json")
    }

    fn doc_path(&self, id: &ProgramId) -> PathBuf {
        self.data_dir.join("docs").join(format!("{id}.json"))
    }

    fn idl_path(&self, id: &ProgramId) -> PathBuf {
        self.data_dir.join("idls").join(format!("{id}.json"))
    }

    // ===== Program index =====

    pub fn list_programs(&self) -> Vec<ProgramMetadata> {
        read_json_or_recover(&self.programs_path(), Vec::new)
    }

    pub fn get_program(&self, id: &ProgramId) -> Option<ProgramMetadata> {
        self.list_programs().into_iter().find(|p| &p.program_id == id)
    }

    pub fn upsert_program(&self, meta: ProgramMetadata) -> Result<(), StoreError> {
        let mut all = self.list_programs();
        if let Some(existing) = all.iter_mut().find(|p| p.program_id == meta.program_id) {
            *existing = meta;
        } else {
            all.push(meta);
        }
        write_json_atomic(&self.programs_path(), &all)?;
        Ok(())
    }

    pub async fn upsert_program_safe(&self, meta: ProgramMetadata) -> Result<(), StoreError> {
        let path = self.programs_path();
        self.locks.acquire(&path, || async { self.upsert_program(meta) }).await
    }

    pub fn remove_program(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let mut all = self.list_programs();
        let before = all.len();
        all.retain(|p| &p.program_id != id);
        let removed = all.len() != before;
        write_json_atomic(&self.programs_path(), &all)?;
        Ok(removed)
    }

    pub async fn remove_program_safe(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let path = self.programs_path();
        self.locks.acquire(&path, || async { self.remove_program(id) }).await
    }

    pub fn stats(&self) -> Stats {
        let all = self.list_programs();
        let documented = all.iter().filter(|p| p.status == ProgramStatus::Documented).count() as u64;
        let failed = all.iter().filter(|p| p.status == ProgramStatus::Failed).count() as u64;
        Stats { documented, failed, total: all.len() as u64 }
    }

    // ===== Queue =====

    pub fn list_queue(&self) -> Vec<QueueItem> {
        read_json_or_recover(&self.queue_path(), Vec::new)
    }

    pub fn list_pending(&self) -> Vec<QueueItem> {
        self.list_queue().into_iter().filter(|q| q.status == QueueStatus::Pending).collect()
    }

    pub fn get_queue_item(&self, id: &ProgramId) -> Option<QueueItem> {
        self.list_queue().into_iter().find(|q| &q.program_id == id)
    }

    /// Add a program to the queue, enforcing "at most one QueueItem per
    /// programId" (spec §3, §8). Reviving a failed item resets its retry
    /// budget (spec §4.7).
    pub fn add_to_queue(&self, id: &ProgramId) -> Result<(QueueItem, AddOutcome), StoreError> {
        let mut all = self.list_queue();
        if let Some(existing) = all.iter_mut().find(|q| &q.program_id == id) {
            let outcome = match existing.status {
                QueueStatus::Failed => {
                    existing.status = QueueStatus::Pending;
                    existing.attempts = 0;
                    existing.last_error = None;
                    AddOutcome::RequeuedFromFailed
                }
                QueueStatus::Pending | QueueStatus::Processing => AddOutcome::AlreadyPresent,
            };
            let item = existing.clone();
            write_json_atomic(&self.queue_path(), &all)?;
            return Ok((item, outcome));
        }
        let item = QueueItem::new(id.clone());
        all.push(item.clone());
        write_json_atomic(&self.queue_path(), &all)?;
        Ok((item, AddOutcome::New))
    }

    pub async fn add_to_queue_safe(
        &self,
        id: &ProgramId,
    ) -> Result<(QueueItem, AddOutcome), StoreError> {
        let path = self.queue_path();
        self.locks.acquire(&path, || async { self.add_to_queue(id) }).await
    }

    /// Partial merge update of an existing queue item; returns `None` if
    /// the program has no queue entry.
    pub fn update_queue_item(
        &self,
        id: &ProgramId,
        patch: impl FnOnce(&mut QueueItem),
    ) -> Result<Option<QueueItem>, StoreError> {
        let mut all = self.list_queue();
        let mut result = None;
        if let Some(item) = all.iter_mut().find(|q| &q.program_id == id) {
            patch(item);
            result = Some(item.clone());
        }
        write_json_atomic(&self.queue_path(), &all)?;
        Ok(result)
    }

    pub async fn update_queue_item_safe(
        &self,
        id: &ProgramId,
        patch: impl FnOnce(&mut QueueItem),
    ) -> Result<Option<QueueItem>, StoreError> {
        let path = self.queue_path();
        self.locks.acquire(&path, || async { self.update_queue_item(id, patch) }).await
    }

    pub fn remove_from_queue(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let mut all = self.list_queue();
        let before = all.len();
        all.retain(|q| &q.program_id != id);
        let removed = all.len() != before;
        write_json_atomic(&self.queue_path(), &all)?;
        Ok(removed)
    }

    pub async fn remove_from_queue_safe(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let path = self.queue_path();
        self.locks.acquire(&path, || async { self.remove_from_queue(id) }).await
    }

    /// Any item left `processing` from a crashed run goes back to
    /// `pending` (spec §4.1/§4.7). Called once at agent startup, before
    /// concurrent access begins, so it does not take the file lock.
    pub fn recover_stuck_items(&self) -> Result<usize, StoreError> {
        let mut all = self.list_queue();
        let mut recovered = 0;
        for item in all.iter_mut() {
            if item.status == QueueStatus::Processing {
                item.status = QueueStatus::Pending;
                recovered += 1;
            }
        }
        if recovered > 0 {
            write_json_atomic(&self.queue_path(), &all)?;
        }
        Ok(recovered)
    }

    // ===== IDL cache =====

    pub fn get_idl(&self, id: &ProgramId) -> Option<IdlCache> {
        read_json_optional(&self.idl_path(id))
    }

    pub fn save_idl(&self, id: &ProgramId, idl: Value) -> Result<IdlCache, StoreError> {
        let hash = hash_idl(&idl);
        let record = IdlCache { program_id: id.clone(), idl, hash, fetched_at: Utc::now() };
        write_json_atomic(&self.idl_path(id), &record)?;
        Ok(record)
    }

    pub async fn save_idl_safe(&self, id: &ProgramId, idl: Value) -> Result<IdlCache, StoreError> {
        let path = self.idl_path(id);
        self.locks.acquire(&path, || async { self.save_idl(id, idl) }).await
    }

    pub fn remove_idl(&self, id: &ProgramId) -> Result<bool, StoreError> {
        remove_file_if_exists(&self.idl_path(id))
    }

    pub async fn remove_idl_safe(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let path = self.idl_path(id);
        self.locks.acquire(&path, || async { self.remove_idl(id) }).await
    }

    // ===== Documentation =====

    pub fn get_doc(&self, id: &ProgramId) -> Option<Documentation> {
        read_json_optional(&self.doc_path(id))
    }

    pub fn save_doc(&self, doc: &Documentation) -> Result<(), StoreError> {
        write_json_atomic(&self.doc_path(&doc.program_id), doc)?;
        Ok(())
    }

    pub async fn save_doc_safe(&self, doc: Documentation) -> Result<(), StoreError> {
        let path = self.doc_path(&doc.program_id);
        self.locks.acquire(&path, || async { self.save_doc(&doc) }).await
    }

    pub fn remove_doc(&self, id: &ProgramId) -> Result<bool, StoreError> {
        remove_file_if_exists(&self.doc_path(id))
    }

    pub async fn remove_doc_safe(&self, id: &ProgramId) -> Result<bool, StoreError> {
        let path = self.doc_path(id);
        self.locks.acquire(&path, || async { self.remove_doc(id) }).await
    }
}

fn remove_file_if_exists(path: &Path) -> Result<bool, StoreError> {
    if !path.exists() {
        return Ok(false);
    }
    fs::remove_file(path)?;
    Ok(true)
}

/// SHA-256 over the canonical JSON serialization of `idl` (spec §4.2). This
/// crate's `serde_json::Value` object map is backed by a `BTreeMap` (the
/// `preserve_order` feature is not enabled), so key order is already a pure
/// function of the key set at every nesting level — `to_string` is the
/// canonical form without any extra sorting pass.
pub fn hash_idl(idl: &Value) -> String {
    let canonical = serde_json::to_string(idl).expect("Value serialization cannot fail");
    let digest = Sha256::digest(canonical.as_bytes());
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn id(s: &str) -> ProgramId {
        ProgramId::parse(s).unwrap()
    }

    fn sample_id() -> ProgramId {
        id("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH")
    }

    #[test]
    fn hash_is_deterministic_and_order_independent() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(hash_idl(&a), hash_idl(&b));

        let c = json!({"a": 3, "b": 1});
        assert_ne!(hash_idl(&a), hash_idl(&c));
    }

    #[test]
    fn add_to_queue_is_idempotent_per_id() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let pid = sample_id();

        let (_, outcome1) = store.add_to_queue(&pid).unwrap();
        assert_eq!(outcome1, AddOutcome::New);

        let (_, outcome2) = store.add_to_queue(&pid).unwrap();
        assert_eq!(outcome2, AddOutcome::AlreadyPresent);

        assert_eq!(store.list_queue().len(), 1);
    }

    #[test]
    fn add_to_queue_resets_failed_item() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let pid = sample_id();

        store.add_to_queue(&pid).unwrap();
        store
            .update_queue_item(&pid, |item| {
                item.status = QueueStatus::Failed;
                item.attempts = 4;
                item.last_error = Some("boom".to_string());
            })
            .unwrap();

        let (item, outcome) = store.add_to_queue(&pid).unwrap();
        assert_eq!(outcome, AddOutcome::RequeuedFromFailed);
        assert_eq!(item.attempts, 0);
        assert!(item.last_error.is_none());
        assert_eq!(item.status, QueueStatus::Pending);
    }

    #[test]
    fn recover_stuck_items_resets_processing_to_pending() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let pid = sample_id();
        store.add_to_queue(&pid).unwrap();
        store
            .update_queue_item(&pid, |item| item.status = QueueStatus::Processing)
            .unwrap();

        let recovered = store.recover_stuck_items().unwrap();
        assert_eq!(recovered, 1);
        assert_eq!(store.get_queue_item(&pid).unwrap().status, QueueStatus::Pending);
    }

    #[test]
    fn stats_fold_program_index() {
        let dir = tempdir().unwrap();
        let store = Store::new(dir.path()).unwrap();
        let now = Utc::now();
        store
            .upsert_program(ProgramMetadata {
                program_id: sample_id(),
                name: "a".into(),
                description: String::new(),
                instruction_count: 1,
                account_count: 0,
                status: ProgramStatus::Documented,
                idl_hash: "h".into(),
                created_at: now,
                updated_at: now,
                error_message: None,
            })
            .unwrap();

        let stats = store.stats();
        assert_eq!(stats.total, 1);
        assert_eq!(stats.documented, 1);
        assert_eq!(stats.failed, 0);
    }

    #[tokio::test]
    async fn concurrent_add_to_queue_distinct_ids_all_land() {
        let dir = tempdir().unwrap();
        let store = std::sync::Arc::new(Store::new(dir.path()).unwrap());

        let ids: Vec<ProgramId> = (0..10).map(|i| id(&format!("{}{}", "A".repeat(31), i))).collect();

        let mut handles = Vec::new();
        for pid in ids.clone() {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.add_to_queue_safe(&pid).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        assert_eq!(store.list_queue().len(), ids.len());
    }
}
