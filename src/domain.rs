//! Core data model: ProgramId, ProgramMetadata, QueueItem, IDLCache,
//! Documentation, and the in-memory AgentState/AgentError types.
//!
//! `ProgramId` is the single point of validation for the base58 program
//! address contract: every Store operation that takes a program identifier
//! takes a `&ProgramId`, never a raw `&str`, so the "ID safety" property in
//! spec §8 is enforced once at construction rather than re-checked per call.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

static PROGRAM_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[1-9A-HJ-NP-Za-km-z]{32,44}$").unwrap());

/// Bounded error ring capacity (spec §3, §4.7, §8).
pub const ERROR_RING_CAP: usize = 50;

/// Agent retry budget before permanent failure (spec §4.7).
pub const MAX_ATTEMPTS: u32 = 10;

/// Per-pass instruction batch size for the doc generator (spec §4.5).
pub const BATCH_SIZE: usize = 5;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("invalid program id: {0:?}")]
pub struct InvalidProgramId(pub String);

/// A validated base58 Solana program address, 32-44 characters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ProgramId(String);

impl ProgramId {
    pub fn parse(raw: &str) -> Result<Self, InvalidProgramId> {
        if PROGRAM_ID_RE.is_match(raw) {
            Ok(ProgramId(raw.to_string()))
        } else {
            Err(InvalidProgramId(raw.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ProgramId {
    type Error = InvalidProgramId;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        ProgramId::parse(&value)
    }
}

impl From<ProgramId> for String {
    fn from(value: ProgramId) -> Self {
        value.0
    }
}

impl fmt::Display for ProgramId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ProgramId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgramStatus {
    Pending,
    Processing,
    Documented,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramMetadata {
    pub program_id: ProgramId,
    pub name: String,
    pub description: String,
    pub instruction_count: usize,
    pub account_count: usize,
    pub status: ProgramStatus,
    pub idl_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Processing,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub program_id: ProgramId,
    pub status: QueueStatus,
    pub added_at: DateTime<Utc>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

impl QueueItem {
    pub fn new(program_id: ProgramId) -> Self {
        QueueItem {
            program_id,
            status: QueueStatus::Pending,
            added_at: Utc::now(),
            attempts: 0,
            last_error: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdlCache {
    pub program_id: ProgramId,
    pub idl: serde_json::Value,
    pub hash: String,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Documentation {
    pub program_id: ProgramId,
    pub name: String,
    pub overview: String,
    pub instructions: String,
    pub accounts: String,
    pub security: String,
    pub full_markdown: String,
    pub generated_at: DateTime<Utc>,
    pub idl_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentErrorEntry {
    pub program_id: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Append-only ring of the most recent agent errors, capped at
/// [`ERROR_RING_CAP`] (spec §4.7, §8 "error-ring cap").
#[derive(Debug, Default)]
pub struct ErrorRing {
    entries: VecDeque<AgentErrorEntry>,
}

impl ErrorRing {
    pub fn new() -> Self {
        ErrorRing { entries: VecDeque::new() }
    }

    pub fn push(&mut self, program_id: impl Into<String>, message: impl Into<String>) {
        self.entries.push_back(AgentErrorEntry {
            program_id: program_id.into(),
            message: message.into(),
            timestamp: Utc::now(),
        });
        while self.entries.len() > ERROR_RING_CAP {
            self.entries.pop_front();
        }
    }

    pub fn to_vec(&self) -> Vec<AgentErrorEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentState {
    pub running: bool,
    pub programs_documented: u64,
    pub programs_failed: u64,
    pub total_processed: u64,
    pub queue_length: usize,
    pub started_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
    pub errors: Vec<AgentErrorEntry>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Stats {
    pub documented: u64,
    pub failed: u64,
    pub total: u64,
}
