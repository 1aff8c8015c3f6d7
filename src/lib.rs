//! SolDocs — an autonomous documentation agent for on-chain Solana
//! programs. The binary in `main.rs` is a thin wrapper around this
//! library so integration tests can substitute mock chain/LLM clients at
//! the trait boundary (see `chain::ChainClient`, `llm::LlmClient`).

pub mod agent;
pub mod app_state;
pub mod chain;
pub mod config;
pub mod discovery;
pub mod docgen;
pub mod domain;
pub mod error;
pub mod llm;
pub mod logging;
pub mod server;
pub mod storage;
pub mod webhook;
