//! The six literal agent scenarios, run against the library's `Agent`
//! directly with mock chain/LLM clients substituted at the trait boundary.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tempfile::tempdir;

use soldocs::agent::{Agent, AgentConfig};
use soldocs::chain::{AccountInfo, ChainClient};
use soldocs::domain::{ProgramId, ProgramStatus, QueueStatus, MAX_ATTEMPTS};
use soldocs::error::{ChainError, LlmError};
use soldocs::llm::LlmClient;
use soldocs::storage::Store;

fn pid(s: &str) -> ProgramId {
    ProgramId::parse(s).unwrap()
}

fn two_instruction_idl() -> Value {
    json!({
        "name": "test_program",
        "instructions": [{"name": "init"}, {"name": "update"}],
        "accounts": [{"name": "State"}],
    })
}

struct MockChain {
    accounts: StdMutex<HashMap<String, AccountInfo>>,
    always_fails: bool,
}

impl MockChain {
    fn empty() -> Self {
        MockChain { accounts: StdMutex::new(HashMap::new()), always_fails: false }
    }

    fn always_failing() -> Self {
        MockChain { accounts: StdMutex::new(HashMap::new()), always_fails: true }
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>, ChainError> {
        if self.always_fails {
            return Err(ChainError::Transport("connection refused (test)".to_string()));
        }
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn get_version(&self) -> Result<(), ChainError> {
        Ok(())
    }
}

struct CannedLlm {
    calls: AtomicUsize,
    responses: StdMutex<Vec<String>>,
}

impl CannedLlm {
    fn new(responses: Vec<&str>) -> Self {
        CannedLlm {
            calls: AtomicUsize::new(0),
            responses: StdMutex::new(responses.into_iter().map(String::from).rev().collect()),
        }
    }
}

#[async_trait]
impl LlmClient for CannedLlm {
    async fn generate(&self, _prompt: &str, _max_tokens: usize) -> Result<String, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.responses.lock().unwrap().pop().unwrap_or_default())
    }
}

fn agent_config(concurrency: usize, webhook_url: Option<String>) -> AgentConfig {
    AgentConfig { discovery_interval: Duration::from_millis(20), concurrency, webhook_url }
}

/// Scenario 1: happy path with a bundled IDL already in cache.
pub async fn happy_path_bundled_idl() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    store.save_idl(&id, two_instruction_idl()).unwrap();
    store.add_to_queue(&id).unwrap();

    let llm = Arc::new(CannedLlm::new(vec![
        "This program manages on-chain state.",
        "### init\nInitializes state.\n```rust\nfn init() {}\n```",
        "### update\nUpdates state.\n```rust\nfn update() {}\n```",
        "State account holds counters.",
        "No obvious issues from static IDL analysis only.",
    ]));
    let agent = Agent::new(store.clone(), Arc::new(MockChain::empty()), llm.clone(), agent_config(1, None));

    agent.process_once().await;

    assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    let doc = store.get_doc(&id).expect("documentation persisted");
    assert!(!doc.overview.is_empty());
    assert!(!doc.instructions.is_empty());
    assert!(!doc.accounts.is_empty());
    assert!(!doc.security.is_empty());
    let meta = store.get_program(&id).expect("program metadata recorded");
    assert_eq!(meta.status, ProgramStatus::Documented);
    assert!(store.get_queue_item(&id).is_none());
}

/// Scenario 2: re-enqueuing the same program with an unchanged IDL makes
/// zero further LLM calls and leaves the existing documentation in place.
pub async fn idempotent_reprocess() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    store.save_idl(&id, two_instruction_idl()).unwrap();
    store.add_to_queue(&id).unwrap();

    let llm = Arc::new(CannedLlm::new(vec!["overview", "instr a", "instr b", "accounts", "security"]));
    let agent = Agent::new(store.clone(), Arc::new(MockChain::empty()), llm.clone(), agent_config(1, None));
    agent.process_once().await;
    assert_eq!(llm.calls.load(Ordering::SeqCst), 4);
    let markdown_before = store.get_doc(&id).unwrap().full_markdown;

    store.add_to_queue(&id).unwrap();
    agent.process_once().await;

    assert_eq!(llm.calls.load(Ordering::SeqCst), 4, "idempotent re-process must not call the LLM again");
    assert_eq!(store.get_doc(&id).unwrap().full_markdown, markdown_before);
    assert!(store.get_queue_item(&id).is_none());
}

/// Scenario 3: a program whose chain fetch always fails accumulates
/// attempts, then is permanently failed once it crosses the retry budget.
pub async fn failure_then_permanent_failure() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    store.add_to_queue(&id).unwrap();

    let llm = Arc::new(CannedLlm::new(vec![]));
    let agent = Agent::new(store.clone(), Arc::new(MockChain::always_failing()), llm.clone(), agent_config(1, None));

    agent.process_once().await;
    let item = store.get_queue_item(&id).unwrap();
    assert_eq!(item.status, QueueStatus::Failed);
    assert_eq!(item.attempts, 1);

    store.update_queue_item(&id, |item| item.attempts = MAX_ATTEMPTS).unwrap();
    agent.process_once().await;

    assert!(store.get_queue_item(&id).is_none());
    let meta = store.get_program(&id).unwrap();
    assert_eq!(meta.status, ProgramStatus::Failed);
    assert!(meta.error_message.as_ref().unwrap().contains("Permanently failed after 10 attempts"));
    assert_eq!(llm.calls.load(Ordering::SeqCst), 0);
}

/// Scenario 4: a concurrency-3 batch with mixed outcomes documents the
/// programs that succeed and fails only the one that can't fetch its IDL.
pub async fn concurrent_batch_mixed_outcomes() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let good_a = pid("AaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaA");
    let bad_b = pid("BbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbB");
    let good_c = pid("CcccccccccccccccccccccccccccccccccccccccccC");

    store.save_idl(&good_a, two_instruction_idl()).unwrap();
    store.save_idl(&good_c, two_instruction_idl()).unwrap();
    store.add_to_queue(&good_a).unwrap();
    store.add_to_queue(&bad_b).unwrap();
    store.add_to_queue(&good_c).unwrap();

    let llm = Arc::new(CannedLlm::new(vec![
        "o1", "i1", "a1", "s1",
        "o2", "i2", "a2", "s2",
    ]));
    let agent = Agent::new(store.clone(), Arc::new(MockChain::empty()), llm, agent_config(3, None));

    agent.process_once().await;

    assert_eq!(store.get_program(&good_a).unwrap().status, ProgramStatus::Documented);
    assert_eq!(store.get_program(&good_c).unwrap().status, ProgramStatus::Documented);
    let bad_item = store.get_queue_item(&bad_b).unwrap();
    assert_eq!(bad_item.status, QueueStatus::Failed);
    assert_eq!(bad_item.attempts, 1);
    assert_eq!(store.list_pending().len(), 0);
}

/// Scenario 5: on successful documentation, the completion webhook fires
/// exactly once with the expected body shape.
pub async fn webhook_fires_once_on_completion() {
    let received: Arc<StdMutex<Vec<Value>>> = Arc::new(StdMutex::new(Vec::new()));
    let recorder_state = received.clone();

    let app = axum::Router::new().route(
        "/hook",
        axum::routing::post(move |axum::Json(body): axum::Json<Value>| {
            let recorder_state = recorder_state.clone();
            async move {
                recorder_state.lock().unwrap().push(body);
                axum::http::StatusCode::OK
            }
        }),
    );
    let listener = tokio::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    let idl = two_instruction_idl();
    store.save_idl(&id, idl.clone()).unwrap();
    store.add_to_queue(&id).unwrap();

    let llm = Arc::new(CannedLlm::new(vec!["overview text", "instr", "accounts", "security"]));
    let webhook_url = format!("http://{addr}/hook");
    let agent = Agent::new(store.clone(), Arc::new(MockChain::empty()), llm, agent_config(1, Some(webhook_url)));

    agent.process_once().await;

    tokio::time::sleep(Duration::from_millis(50)).await;

    let posts = received.lock().unwrap();
    assert_eq!(posts.len(), 1, "webhook must fire exactly once");
    let body = &posts[0];
    assert_eq!(body["event"], "doc.completed");
    assert_eq!(body["programId"], id.as_str());
    let expected_hash = soldocs::storage::store::hash_idl(&idl);
    assert_eq!(body["documentation"]["idlHash"], expected_hash);
    assert!(body["documentation"]["overview"].as_str().unwrap().chars().count() <= 500);
}

/// Scenario 6: a queue item left `processing` by a crashed run is reset to
/// `pending` before the agent's first processing pass.
pub async fn crash_recovery_resets_processing_to_pending() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    store.save_idl(&id, two_instruction_idl()).unwrap();
    store.add_to_queue(&id).unwrap();
    store.update_queue_item(&id, |item| item.status = QueueStatus::Processing).unwrap();

    assert_eq!(store.get_queue_item(&id).unwrap().status, QueueStatus::Processing);
    let recovered = store.recover_stuck_items().unwrap();
    assert_eq!(recovered, 1);
    assert_eq!(store.get_queue_item(&id).unwrap().status, QueueStatus::Pending);
}

/// Scenario 6 (agent-level): `Agent::start()` itself must recover a
/// crashed-run's `processing` item to `pending` before its first
/// `processQueue` pass, not just the `Store` primitive it calls.
pub async fn agent_start_recovers_stuck_items() {
    let dir = tempdir().unwrap();
    let store = Arc::new(Store::new(dir.path()).unwrap());
    let id = pid("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH");
    store.save_idl(&id, two_instruction_idl()).unwrap();
    store.add_to_queue(&id).unwrap();
    store.update_queue_item(&id, |item| item.status = QueueStatus::Processing).unwrap();
    assert_eq!(store.get_queue_item(&id).unwrap().status, QueueStatus::Processing);

    let llm = Arc::new(CannedLlm::new(vec!["overview", "instr", "accounts", "security"]));
    let agent = Arc::new(Agent::new(store.clone(), Arc::new(MockChain::empty()), llm, agent_config(1, None)));

    let agent_for_loop = agent.clone();
    let handle = tokio::spawn(async move { agent_for_loop.start().await });

    // Give the loop time to run its startup recovery and at least one
    // processQueue pass before we ask it to stop.
    tokio::time::sleep(Duration::from_millis(100)).await;
    agent.stop();
    tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();

    // The crashed item was never left `processing` by `start()`'s recovery
    // step; with a cached IDL and a working mock LLM it went on to
    // complete, so the queue entry is gone and the program is documented.
    assert!(store.get_queue_item(&id).is_none());
    assert_eq!(store.get_program(&id).unwrap().status, ProgramStatus::Documented);
}
