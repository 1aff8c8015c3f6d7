//! Server lifecycle: listener setup, the rate-limit and body-size layers,
//! and graceful shutdown (spec §5, §6).

use std::error::Error;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::middleware;
use tokio::sync::Notify;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info};

use crate::app_state::AppState;
use crate::server::http_api::create_router;
use crate::server::rate_limit::{enforce, RateLimiter};

const MAX_BODY_BYTES: usize = 5 * 1024 * 1024;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Binds the listener, wires the route table behind the body-size and
/// rate-limit layers, and serves until `duration` elapses or the process
/// receives SIGINT — whichever comes first. Used by both `main.rs` and the
/// `--duration`-bounded test harness mode.
///
/// Once a shutdown is triggered, in-flight handlers get up to
/// [`SHUTDOWN_GRACE`] to finish (spec §5); if they haven't by then this
/// forces the process to exit rather than hang.
pub async fn run_server_with_duration(
    app_state: Arc<AppState>,
    duration: Option<u64>,
) -> Result<(), Box<dyn Error + Send + Sync>> {
    let start_time = Instant::now();

    let port = app_state.config.api_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let limiter = Arc::new(RateLimiter::new());
    limiter.spawn_sweeper();

    let router = create_router(app_state.clone())
        .layer(middleware::from_fn_with_state(limiter, enforce))
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES));

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| format!("failed to bind {addr}: {e}"))?;
    info!("🚀 soldocs listening on {addr}");

    let make_service = router.into_make_service_with_connect_info::<SocketAddr>();

    let drain_signal = Arc::new(Notify::new());
    let drain_signal_for_serve = drain_signal.clone();
    let serve_task = tokio::spawn(async move {
        axum::serve(listener, make_service)
            .with_graceful_shutdown(async move { drain_signal_for_serve.notified().await })
            .await
    });

    shutdown_signal(duration).await;
    drain_signal.notify_one();
    info!("received shutdown signal, waiting up to {:?} for in-flight handlers to drain", SHUTDOWN_GRACE);

    match tokio::time::timeout(SHUTDOWN_GRACE, serve_task).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => error!("server error: {e}"),
        Ok(Err(e)) => error!("server task panicked: {e}"),
        Err(_) => {
            error!("in-flight handlers did not drain within {:?}; forcing exit", SHUTDOWN_GRACE);
            std::process::exit(1);
        }
    }

    info!("🛑 server stopped after {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}

async fn shutdown_signal(duration: Option<u64>) {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    match duration {
        Some(secs) => {
            tokio::select! {
                _ = ctrl_c => info!("received ctrl-c"),
                _ = tokio::time::sleep(Duration::from_secs(secs)) => info!("duration limit reached, shutting down"),
            }
        }
        None => {
            ctrl_c.await;
            info!("received ctrl-c");
        }
    }
}
