//! Agent core: the main loop, queue state machine, and upgrade check
//! (spec §4.7).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::chain::ChainClient;
use crate::discovery;
use crate::docgen;
use crate::domain::{
    AgentState, ErrorRing, ProgramId, ProgramMetadata, ProgramStatus, QueueStatus, Stats,
    MAX_ATTEMPTS,
};
use crate::error::{AgentLoopError, ChainError};
use crate::llm::LlmClient;
use crate::storage::store::hash_idl;
use crate::storage::Store;
use crate::webhook;

/// Every 12th main-loop iteration triggers an upgrade check (chosen so that
/// at the default 5-minute discovery interval, upgrade checks run roughly
/// once an hour).
const UPGRADE_CHECK_EVERY: u32 = 12;

pub struct AgentConfig {
    pub discovery_interval: Duration,
    pub concurrency: usize,
    pub webhook_url: Option<String>,
}

struct RuntimeState {
    started_at: Option<chrono::DateTime<Utc>>,
    last_run_at: Option<chrono::DateTime<Utc>>,
    upgrade_check_counter: u32,
    errors: ErrorRing,
}

pub struct Agent {
    store: Arc<Store>,
    chain: Arc<dyn ChainClient>,
    llm: Arc<dyn LlmClient>,
    config: AgentConfig,
    running: AtomicBool,
    notify: Notify,
    programs_documented: AtomicU64,
    programs_failed: AtomicU64,
    total_processed: AtomicU64,
    runtime: Mutex<RuntimeState>,
}

impl Agent {
    pub fn new(
        store: Arc<Store>,
        chain: Arc<dyn ChainClient>,
        llm: Arc<dyn LlmClient>,
        config: AgentConfig,
    ) -> Self {
        Agent {
            store,
            chain,
            llm,
            config,
            running: AtomicBool::new(false),
            notify: Notify::new(),
            programs_documented: AtomicU64::new(0),
            programs_failed: AtomicU64::new(0),
            total_processed: AtomicU64::new(0),
            runtime: Mutex::new(RuntimeState {
                started_at: None,
                last_run_at: None,
                upgrade_check_counter: 0,
                errors: ErrorRing::new(),
            }),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Main loop (spec §4.7). Runs until `stop()` is called.
    pub async fn start(&self) {
        self.running.store(true, Ordering::SeqCst);
        {
            let mut runtime = self.runtime.lock().unwrap();
            runtime.started_at = Some(Utc::now());
        }

        if let Err(e) = self.store.recover_stuck_items() {
            error!("failed to recover stuck queue items at startup: {e}");
        }

        if self.store.list_queue().is_empty() && self.store.list_programs().is_empty() {
            match discovery::seed_if_empty(&self.store) {
                Ok(n) if n > 0 => info!("🌱 seeded {n} well-known program(s) on first run"),
                Ok(_) => {}
                Err(e) => error!("seeding failed: {e}"),
            }
        }

        while self.is_running() {
            self.process_queue().await;

            let mut should_check_upgrades = false;
            {
                let mut runtime = self.runtime.lock().unwrap();
                runtime.last_run_at = Some(Utc::now());
                runtime.upgrade_check_counter += 1;
                if runtime.upgrade_check_counter >= UPGRADE_CHECK_EVERY {
                    runtime.upgrade_check_counter = 0;
                    should_check_upgrades = true;
                }
            }
            if should_check_upgrades {
                self.upgrade_check().await;
            }

            if self.is_running() {
                tokio::select! {
                    _ = tokio::time::sleep(self.config.discovery_interval) => {}
                    _ = self.notify.notified() => {}
                }
            }
        }
    }

    /// Sets `running = false` and wakes the loop immediately from its sleep.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Runs a single queue-draining pass without entering the main loop.
    /// Used by tests and by anything that wants one-shot, non-looping
    /// processing. `process_queue` checks `running` between batches, so
    /// this flips it on for the duration of the call if it wasn't already.
    pub async fn process_once(&self) {
        let was_running = self.running.swap(true, Ordering::SeqCst);
        self.process_queue().await;
        if !was_running {
            self.running.store(false, Ordering::SeqCst);
        }
    }

    async fn process_queue(&self) {
        let pending = self.store.list_pending();
        for batch in pending.chunks(self.config.concurrency.max(1)) {
            if !self.is_running() {
                break;
            }
            let futures = batch.iter().map(|item| self.process_program_safe(item.program_id.clone()));
            join_all(futures).await;
        }
    }

    /// Wraps `process_program`; on error, records failure into the queue
    /// item, the program index, and the error ring (spec §4.7).
    async fn process_program_safe(&self, id: ProgramId) {
        self.total_processed.fetch_add(1, Ordering::SeqCst);

        if let Err(err) = self.process_program(&id).await {
            let message = err.to_string();
            warn!("processing {id} failed: {message}");

            if let Err(e) = self
                .store
                .update_queue_item_safe(&id, |item| {
                    item.status = QueueStatus::Failed;
                    item.attempts += 1;
                    item.last_error = Some(message.clone());
                })
                .await
            {
                warn!("failed to record queue failure for {id}: {e}");
            }

            let existing = self.store.get_program(&id);
            let created_at = existing.as_ref().map(|p| p.created_at).unwrap_or_else(Utc::now);
            let short_name = format!("{}…", &id.as_str()[..8.min(id.as_str().len())]);
            let meta = ProgramMetadata {
                program_id: id.clone(),
                name: existing.as_ref().map(|p| p.name.clone()).unwrap_or(short_name),
                description: existing.map(|p| p.description).unwrap_or_default(),
                instruction_count: 0,
                account_count: 0,
                status: ProgramStatus::Failed,
                idl_hash: String::new(),
                created_at,
                updated_at: Utc::now(),
                error_message: Some(message.clone()),
            };
            if let Err(e) = self.store.upsert_program_safe(meta).await {
                warn!("failed to record program failure for {id}: {e}");
            }

            self.programs_failed.fetch_add(1, Ordering::SeqCst);
            self.runtime.lock().unwrap().errors.push(id.as_str().to_string(), message);
        }
    }

    async fn process_program(&self, id: &ProgramId) -> Result<(), AgentLoopError> {
        let queue_item = self.store.get_queue_item(id);

        if let Some(item) = &queue_item {
            if item.attempts >= MAX_ATTEMPTS {
                self.store.remove_from_queue_safe(id).await?;
                let existing = self.store.get_program(id);
                let created_at = existing.as_ref().map(|p| p.created_at).unwrap_or_else(Utc::now);
                let message = format!(
                    "Permanently failed after {MAX_ATTEMPTS} attempts: {}",
                    item.last_error.clone().unwrap_or_default()
                );
                let meta = ProgramMetadata {
                    program_id: id.clone(),
                    name: existing.as_ref().map(|p| p.name.clone()).unwrap_or_else(|| id.to_string()),
                    description: existing.map(|p| p.description).unwrap_or_default(),
                    instruction_count: 0,
                    account_count: 0,
                    status: ProgramStatus::Failed,
                    idl_hash: String::new(),
                    created_at,
                    updated_at: Utc::now(),
                    error_message: Some(message.clone()),
                };
                self.store.upsert_program_safe(meta).await?;
                self.programs_failed.fetch_add(1, Ordering::SeqCst);
                self.runtime.lock().unwrap().errors.push(id.as_str().to_string(), message);
                return Ok(());
            }
        }

        self.store
            .update_queue_item_safe(id, |item| item.status = QueueStatus::Processing)
            .await?;

        let prior_cache = self.store.get_idl(id);
        let prior_doc = self.store.get_doc(id);

        let idl: Value = if let Some(cached) = &prior_cache {
            cached.idl.clone()
        } else {
            let account = crate::chain::with_retry(|| self.chain.get_account(id.as_str()))
                .await?
                .ok_or(ChainError::NotFound)?;
            if !account.executable {
                return Err(ChainError::NotExecutable.into());
            }
            crate::chain::fetch_idl(self.chain.as_ref(), id.as_str())
                .await?
                .ok_or(ChainError::IdlNotFound)?
        };

        let new_cache = self.store.save_idl_safe(id, idl.clone()).await?;

        if let (Some(prior_cache), Some(_)) = (&prior_cache, &prior_doc) {
            if prior_cache.hash == new_cache.hash {
                self.store.remove_from_queue_safe(id).await?;
                return Ok(());
            }
        }

        let doc = docgen::generate(self.llm.as_ref(), &idl, id, &new_cache.hash).await?;
        self.store.save_doc_safe(doc.clone()).await?;

        let name = docgen::program_name(&idl);
        let description = doc
            .overview
            .trim_start_matches(['#', '*', '\n'])
            .trim()
            .chars()
            .take(200)
            .collect::<String>();
        let instruction_count = idl.get("instructions").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
        let account_count = idl.get("accounts").and_then(|v| v.as_array()).map(|a| a.len()).unwrap_or(0);
        let existing = self.store.get_program(id);
        let created_at = existing.map(|p| p.created_at).unwrap_or_else(Utc::now);

        let meta = ProgramMetadata {
            program_id: id.clone(),
            name,
            description,
            instruction_count,
            account_count,
            status: ProgramStatus::Documented,
            idl_hash: new_cache.hash.clone(),
            created_at,
            updated_at: Utc::now(),
            error_message: None,
        };
        self.store.upsert_program_safe(meta).await?;
        self.programs_documented.fetch_add(1, Ordering::SeqCst);

        if let Some(webhook_url) = &self.config.webhook_url {
            if let Err(e) = webhook::notify_completion(webhook_url, &doc).await {
                warn!("webhook notification failed for {id}: {e}");
            }
        }

        self.store.remove_from_queue_safe(id).await?;
        Ok(())
    }

    /// For each documented program, re-fetch its on-chain IDL; if the hash
    /// differs from the cached one, drop the stale cache entry and
    /// re-enqueue so the next `process_program` call performs a full
    /// chain re-fetch and regenerates documentation.
    async fn upgrade_check(&self) {
        for id in discovery::programs_needing_upgrade_check(&self.store) {
            let fresh_idl = match crate::chain::fetch_idl(self.chain.as_ref(), id.as_str()).await {
                Ok(Some(idl)) => idl,
                Ok(None) => continue,
                Err(e) => {
                    warn!("upgrade check: failed to fetch idl for {id}: {e}");
                    continue;
                }
            };

            let fresh_hash = hash_idl(&fresh_idl);
            let cached = self.store.get_idl(&id);
            let changed = cached.map(|c| c.hash != fresh_hash).unwrap_or(true);

            if changed {
                info!("🔄 upgrade detected for {id}, re-queueing");
                let _ = self.store.remove_idl_safe(&id).await;
                let _ = self.store.add_to_queue_safe(&id).await;
            }
        }
    }

    /// A live, deep-copied view of agent state (spec §4.7).
    pub fn get_state(&self) -> AgentState {
        let runtime = self.runtime.lock().unwrap();
        let stats: Stats = self.store.stats();
        AgentState {
            running: self.is_running(),
            programs_documented: stats.documented,
            programs_failed: stats.failed,
            total_processed: self.total_processed.load(Ordering::SeqCst),
            queue_length: self.store.list_pending().len(),
            started_at: runtime.started_at,
            last_run_at: runtime.last_run_at,
            errors: runtime.errors.to_vec(),
        }
    }
}

