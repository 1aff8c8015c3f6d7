//! HTTP surface: the route table (spec §6), the per-IP rate limiter, and
//! server lifecycle (listener setup, graceful shutdown).

pub mod http_api;
pub mod rate_limit;
pub mod server;

pub use server::run_server_with_duration;
