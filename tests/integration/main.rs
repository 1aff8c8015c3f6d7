// tests/integration/main.rs
//
// Integration test suite entry point. All integration tests are compiled
// as a single binary to avoid per-file dead-code warnings.

mod agent_scenarios;

#[tokio::test]
async fn happy_path_bundled_idl() {
    agent_scenarios::happy_path_bundled_idl().await;
}

#[tokio::test]
async fn idempotent_reprocess() {
    agent_scenarios::idempotent_reprocess().await;
}

#[tokio::test]
async fn failure_then_permanent_failure() {
    agent_scenarios::failure_then_permanent_failure().await;
}

#[tokio::test]
async fn concurrent_batch_mixed_outcomes() {
    agent_scenarios::concurrent_batch_mixed_outcomes().await;
}

#[tokio::test]
async fn webhook_fires_once_on_completion() {
    agent_scenarios::webhook_fires_once_on_completion().await;
}

#[tokio::test]
async fn crash_recovery_resets_processing_to_pending() {
    agent_scenarios::crash_recovery_resets_processing_to_pending().await;
}

#[tokio::test]
async fn agent_start_recovers_stuck_items() {
    agent_scenarios::agent_start_recovers_stuck_items().await;
}
