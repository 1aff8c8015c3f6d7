//! Error types for the SolDocs agent.

use thiserror::Error;

use crate::domain::InvalidProgramId;

/// Configuration loading errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingVar(String),

    #[error("failed to read config override file {0}: {1}")]
    OverrideFile(String, String),
}

/// Store (persistence layer) errors.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("invalid program id: {0}")]
    InvalidId(#[from] InvalidProgramId),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Chain (Solana RPC) client errors.
#[derive(Error, Debug)]
pub enum ChainError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("rpc error: {0}")]
    Rpc(String),

    #[error("account not found")]
    NotFound,

    #[error("account is not executable")]
    NotExecutable,

    #[error("idl not found")]
    IdlNotFound,
}

/// LLM provider errors.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("provider error: {0}")]
    Provider(String),
}

/// Doc generator errors.
#[derive(Error, Debug)]
pub enum DocGenError {
    #[error("llm error: {0}")]
    Llm(#[from] LlmError),

    #[error("program name would be unknown_program")]
    UnknownProgramName,
}

/// Webhook notifier errors.
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("webhook returned HTTP {0}")]
    BadStatus(u16),

    #[error("transport error: {0}")]
    Transport(String),
}

/// Agent main-loop internal errors (distinct from the `AgentErrorEntry`
/// value recorded into the error ring, which is a data type from spec §3).
#[derive(Error, Debug)]
pub enum AgentLoopError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Chain(#[from] ChainError),

    #[error(transparent)]
    DocGen(#[from] DocGenError),

    #[error("{0}")]
    Other(String),
}

/// Top-level startup/fatal error surfaced by `main.rs`.
#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("startup validation failed: {0}")]
    StartupValidation(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
