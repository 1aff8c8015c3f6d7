//! Shared application state: the persistence layer, the background agent,
//! and the configuration they were built from, wired together once at
//! startup and handed to the HTTP layer behind an `Arc` (spec §4.1, §6).

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::agent::{Agent, AgentConfig};
use crate::chain::{ChainClient, SolanaRpcClient};
use crate::config::Config;
use crate::error::AppError;
use crate::llm::{AnthropicClient, LlmClient};
use crate::storage::Store;

pub struct AppState {
    pub config: Config,
    pub store: Arc<Store>,
    pub agent: Arc<Agent>,
}

impl AppState {
    /// Build the store and agent from a loaded `Config`. The chain and LLM
    /// clients are constructed here as their concrete, network-backed
    /// implementations; tests build an `Agent` directly with mocks instead
    /// of going through this constructor.
    pub fn new(config: Config) -> Result<Arc<Self>, AppError> {
        let data_dir = PathBuf::from(&config.data_dir);
        let store = Arc::new(Store::new(&data_dir)?);

        let chain: Arc<dyn ChainClient> = Arc::new(SolanaRpcClient::new(config.solana_rpc_url.clone()));
        let llm: Arc<dyn LlmClient> = Arc::new(AnthropicClient::new(config.anthropic_api_key.clone()));

        let agent_config = AgentConfig {
            discovery_interval: Duration::from_millis(config.agent_discovery_interval_ms),
            concurrency: config.agent_concurrency,
            webhook_url: config.webhook_url.clone(),
        };
        let agent = Arc::new(Agent::new(store.clone(), chain, llm, agent_config));

        Ok(Arc::new(AppState { config, store, agent }))
    }
}
