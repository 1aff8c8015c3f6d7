//! Storage layer
//!
//! Crash-safe, file-backed persistence for the program index, the queue,
//! the IDL cache, and generated documentation. The agent's worker pool and
//! the HTTP handlers both mutate this state concurrently; the layer is kept
//! safe for that by serializing read-modify-write sequences per file (see
//! [`file_lock`]) and by writing every JSON file atomically (see [`atomic`]).
//!
//! ## Components
//!
//! - [`file_lock`]: per-path async mutex table (spec §4.1).
//! - [`atomic`]: atomic tmp+rename writes and corrupt-file recovery (spec §4.2).
//! - [`store`]: the `Store` type itself — program index, queue, IDL cache,
//!   documentation, and stats (spec §4.2).

pub mod atomic;
pub mod file_lock;
pub mod store;

pub use file_lock::FileLockTable;
pub use store::Store;
