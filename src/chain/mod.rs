//! Solana RPC chain client: account fetching with retry, and Anchor IDL
//! decoding built on top (spec §4.3).
//!
//! `ChainClient` is a trait, not a concrete struct, for the same reason the
//! LLM client is (see `llm`): it is an external collaborator whose contract
//! — not its wire format — is what the rest of the agent depends on, so
//! tests substitute an in-memory mock instead of hitting a real RPC
//! endpoint.

pub mod idl;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use crate::error::ChainError;

pub use idl::fetch_idl;

/// Raw account payload as returned by `getAccountInfo`.
#[derive(Debug, Clone)]
pub struct AccountInfo {
    pub data: Vec<u8>,
    pub owner: String,
    pub executable: bool,
}

#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>, ChainError>;
    async fn get_version(&self) -> Result<(), ChainError>;
}

/// Thin JSON-RPC client over `reqwest`.
pub struct SolanaRpcClient {
    http: reqwest::Client,
    rpc_url: String,
}

impl SolanaRpcClient {
    pub fn new(rpc_url: impl Into<String>) -> Self {
        SolanaRpcClient { http: reqwest::Client::new(), rpc_url: rpc_url.into() }
    }
}

#[derive(Deserialize)]
struct RpcEnvelope<T> {
    result: Option<T>,
    error: Option<RpcErrorBody>,
}

#[derive(Deserialize)]
struct RpcErrorBody {
    message: String,
}

#[derive(Deserialize)]
struct GetAccountInfoResult {
    value: Option<AccountInfoValue>,
}

#[derive(Deserialize)]
struct AccountInfoValue {
    /// `[base64_data, encoding]` pair per the Solana JSON-RPC schema.
    data: (String, String),
    owner: String,
    executable: bool,
}

#[async_trait]
impl ChainClient for SolanaRpcClient {
    async fn get_account(&self, address: &str) -> Result<Option<AccountInfo>, ChainError> {
        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "getAccountInfo",
            "params": [address, {"encoding": "base64"}],
        });

        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let envelope: RpcEnvelope<GetAccountInfoResult> = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc(err.message));
        }

        let Some(result) = envelope.result else {
            return Ok(None);
        };
        let Some(value) = result.value else {
            return Ok(None);
        };

        let data = base64::Engine::decode(&base64::engine::general_purpose::STANDARD, &value.data.0)
            .map_err(|e| ChainError::Rpc(format!("invalid base64 account data: {e}")))?;

        Ok(Some(AccountInfo { data, owner: value.owner, executable: value.executable }))
    }

    async fn get_version(&self) -> Result<(), ChainError> {
        let body = json!({"jsonrpc": "2.0", "id": 1, "method": "getVersion", "params": []});
        let response = self
            .http
            .post(&self.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        let envelope: RpcEnvelope<serde_json::Value> = response
            .json()
            .await
            .map_err(|e| ChainError::Transport(e.to_string()))?;

        if let Some(err) = envelope.error {
            return Err(ChainError::Rpc(err.message));
        }
        if envelope.result.is_none() {
            return Err(ChainError::Rpc("empty getVersion response".to_string()));
        }
        Ok(())
    }
}

const MAX_RETRIES: u32 = 3;

fn is_retryable(message: &str) -> bool {
    ["429", "502", "503"].iter().any(|code| message.contains(code))
}

/// Retry wrapper for chain calls (spec §4.3): up to 3 attempts, retrying
/// only on errors whose `Display` mentions 429/502/503, with jittered
/// exponential backoff between tries.
pub async fn with_retry<T, F, Fut>(mut call: F) -> Result<T, ChainError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ChainError>>,
{
    let mut attempt = 0;
    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                attempt += 1;
                if attempt >= MAX_RETRIES || !is_retryable(&err.to_string()) {
                    return Err(err);
                }
                let jitter_ms = rand::thread_rng().gen_range(0..500);
                let backoff = Duration::from_millis(2u64.pow(attempt) * 1000 + jitter_ms);
                warn!("chain call failed (attempt {attempt}), retrying in {backoff:?}: {err}");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
