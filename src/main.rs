//! SolDocs — autonomous documentation agent for on-chain Solana programs.
//!
//! Starts the background agent loop (spec §4.7) and the HTTP API (spec §6)
//! side by side, sharing one `Store`. Configuration is environment-variable
//! based (spec §6); see `config.rs` for the full list. `--config <path>`
//! layers an optional `.env`-style override file underneath the real
//! environment, and `--port`/`--data-dir` override the loaded values
//! directly, for "CLI override > env > file > default" precedence.

use std::path::Path;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};

use soldocs::app_state::AppState;
use soldocs::chain::{self, ChainClient};
use soldocs::config::{self, Config};
use soldocs::logging::init_logging;
use soldocs::server;

#[derive(Parser, Debug)]
#[command(author, version, about = "Autonomous documentation agent for on-chain Solana programs", long_about = None)]
struct Args {
    /// Override DATA_DIR from the environment.
    #[arg(long)]
    data_dir: Option<String>,

    /// Override API_PORT from the environment.
    #[arg(long)]
    port: Option<u16>,

    /// Optional `.env`-style override file, consulted before the real
    /// environment (which always wins on conflict).
    #[arg(long)]
    config: Option<String>,

    /// Run for a specific duration in seconds, then shut down (for testing).
    #[arg(long)]
    duration: Option<u64>,
}

fn main() -> std::process::ExitCode {
    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("failed to create tokio runtime: {e}");
            return std::process::ExitCode::FAILURE;
        }
    };

    let result = runtime.block_on(async_main());
    runtime.shutdown_timeout(Duration::from_secs(2));

    match result {
        Ok(()) => std::process::ExitCode::SUCCESS,
        Err(message) => {
            error!("{message}");
            std::process::ExitCode::FAILURE
        }
    }
}

async fn async_main() -> Result<(), String> {
    let args = Args::parse();
    init_logging();

    if let Some(path) = &args.config {
        config::apply_file_overrides(Path::new(path)).map_err(|e| e.to_string())?;
        info!("📄 applied config overrides from {path}");
    }

    let mut config = Config::load_from_env().map_err(|e| e.to_string())?;
    if let Some(data_dir) = args.data_dir {
        config.data_dir = data_dir;
    }
    if let Some(port) = args.port {
        config.api_port = port;
    }

    if !config.looks_like_anthropic_key() {
        warn!("ANTHROPIC_API_KEY does not start with sk-ant- — continuing, but generation calls will likely fail");
    }

    let probe_client = chain::SolanaRpcClient::new(config.solana_rpc_url.clone());
    if let Err(e) = chain::with_retry(|| probe_client.get_version()).await {
        return Err(format!(
            "startup validation failed: could not reach Solana RPC endpoint {}: {e}",
            config.solana_rpc_url
        ));
    }
    info!("🔌 Solana RPC endpoint {} is reachable", config.solana_rpc_url);

    let app_state = AppState::new(config).map_err(|e| e.to_string())?;
    info!("📁 data directory: {}", app_state.store.data_dir.display());

    let agent_handle = {
        let agent = app_state.agent.clone();
        tokio::spawn(async move { agent.start().await })
    };

    // `server::run_server_with_duration` owns the HTTP handler-drain grace
    // period (spec §5); once it returns, the server has either stopped
    // cleanly or forced its own exit, so this timeout only bounds the
    // agent loop's own shutdown.
    server::run_server_with_duration(app_state.clone(), args.duration)
        .await
        .map_err(|e| e.to_string())?;

    app_state.agent.stop();
    if tokio::time::timeout(Duration::from_secs(5), agent_handle).await.is_err() {
        warn!("agent loop did not stop within 5s of shutdown; exiting anyway");
    }

    info!("🧹 soldocs shutdown complete");
    Ok(())
}
