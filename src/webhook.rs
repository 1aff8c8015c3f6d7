//! Fire-and-forget completion webhook (spec §4.8).

use std::time::Duration;

use chrono::Utc;
use serde_json::json;

use crate::domain::Documentation;
use crate::error::WebhookError;

const TIMEOUT: Duration = Duration::from_secs(10);

/// POST the completion payload. The caller (the agent) is responsible for
/// swallowing the error — this function only reports it.
pub async fn notify_completion(webhook_url: &str, doc: &Documentation) -> Result<(), WebhookError> {
    let overview: String = doc.overview.chars().take(500).collect();
    let instruction_count = {
        let count = doc.instructions.matches("###").count();
        if count == 0 {
            1
        } else {
            count
        }
    };

    let body = json!({
        "event": "doc.completed",
        "programId": doc.program_id.as_str(),
        "name": doc.name,
        "timestamp": Utc::now().to_rfc3339(),
        "documentation": {
            "overview": overview,
            "instructionCount": instruction_count,
            "idlHash": doc.idl_hash,
            "generatedAt": doc.generated_at.to_rfc3339(),
        },
    });

    let client = reqwest::Client::builder()
        .timeout(TIMEOUT)
        .build()
        .map_err(|e| WebhookError::Transport(e.to_string()))?;

    let response = client
        .post(webhook_url)
        .json(&body)
        .send()
        .await
        .map_err(|e| WebhookError::Transport(e.to_string()))?;

    if !response.status().is_success() {
        return Err(WebhookError::BadStatus(response.status().as_u16()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ProgramId;

    fn sample_doc() -> Documentation {
        Documentation {
            program_id: ProgramId::parse("dRiftyHA39MWEi3m9aunc5MzRF1JYuBsbn6VPcn33UH").unwrap(),
            name: "test_program".to_string(),
            overview: "x".repeat(600),
            instructions: "### a\n### b".to_string(),
            accounts: "accounts".to_string(),
            security: "security".to_string(),
            full_markdown: "full".to_string(),
            generated_at: Utc::now(),
            idl_hash: "hash".to_string(),
        }
    }

    #[tokio::test]
    async fn transport_error_on_unreachable_host() {
        let doc = sample_doc();
        let result = notify_completion("http://127.0.0.1:1", &doc).await;
        assert!(result.is_err());
    }

    #[test]
    fn overview_is_capped_at_500_chars_before_send() {
        let doc = sample_doc();
        let truncated: String = doc.overview.chars().take(500).collect();
        assert_eq!(truncated.len(), 500);
    }

    #[test]
    fn instruction_count_floors_at_one_when_no_markers() {
        let mut doc = sample_doc();
        doc.instructions = "no markers here".to_string();
        let count = doc.instructions.matches("###").count();
        let floored = if count == 0 { 1 } else { count };
        assert_eq!(floored, 1);
    }
}
