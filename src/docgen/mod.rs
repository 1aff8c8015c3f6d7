//! Four-pass documentation pipeline (spec §4.5).

pub mod prompts;

use chrono::Utc;
use serde_json::Value;
use tracing::warn;

use crate::domain::{Documentation, ProgramId, BATCH_SIZE};
use crate::error::DocGenError;
use crate::llm::LlmClient;
use prompts::IdlCounts;

const NO_ACCOUNT_TYPES: &str = "No account types, events, or errors are defined in this program's IDL.";
const MAX_TOKENS: usize = 4096;

/// `idl.name ?? idl.metadata.name ?? "unknown_program"` (spec §4.5).
pub fn program_name(idl: &Value) -> String {
    idl.get("name")
        .and_then(|v| v.as_str())
        .or_else(|| idl.get("metadata").and_then(|m| m.get("name")).and_then(|v| v.as_str()))
        .unwrap_or("unknown_program")
        .to_string()
}

fn array_len(idl: &Value, key: &str) -> usize {
    idl.get(key).and_then(|v| v.as_array()).map(|arr| arr.len()).unwrap_or(0)
}

fn counts(idl: &Value) -> IdlCounts {
    IdlCounts {
        instructions: array_len(idl, "instructions"),
        accounts: array_len(idl, "accounts"),
        types: array_len(idl, "types"),
        events: array_len(idl, "events"),
        errors: array_len(idl, "errors"),
    }
}

async fn generate_instructions_section(
    llm: &dyn LlmClient,
    name: &str,
    idl: &Value,
) -> Result<String, DocGenError> {
    let Some(instructions) = idl.get("instructions").and_then(|v| v.as_array()) else {
        return Ok(String::new());
    };
    if instructions.is_empty() {
        return Ok(String::new());
    }

    let mut batch_outputs = Vec::new();
    for chunk in instructions.chunks(BATCH_SIZE) {
        let batch_value = Value::Array(chunk.to_vec());
        let prompt = prompts::instructions_prompt(name, &batch_value);
        let output = llm.generate(&prompt, MAX_TOKENS).await?;
        batch_outputs.push(output);
    }
    Ok(batch_outputs.join("\n\n---\n\n"))
}

async fn generate_accounts_section(llm: &dyn LlmClient, idl: &Value, counts: &IdlCounts) -> Result<String, DocGenError> {
    if counts.accounts == 0 && counts.types == 0 && counts.events == 0 && counts.errors == 0 {
        return Ok(NO_ACCOUNT_TYPES.to_string());
    }

    let empty = Value::Array(Vec::new());
    let accounts = idl.get("accounts").unwrap_or(&empty);
    let types = idl.get("types").unwrap_or(&empty);
    let events = if counts.events > 0 { idl.get("events") } else { None };
    let errors = if counts.errors > 0 { idl.get("errors") } else { None };

    let prompt = prompts::accounts_prompt(accounts, types, events, errors);
    llm.generate(&prompt, MAX_TOKENS).await.map_err(DocGenError::from)
}

/// Run the four-pass pipeline and produce a `Documentation` record.
pub async fn generate(
    llm: &dyn LlmClient,
    idl: &Value,
    program_id: &ProgramId,
    idl_hash: &str,
) -> Result<Documentation, DocGenError> {
    let name = program_name(idl);
    if name == "unknown_program" {
        return Err(DocGenError::UnknownProgramName);
    }

    let idl_counts = counts(idl);

    let overview = llm.generate(&prompts::overview_prompt(&name, &idl_counts, idl), MAX_TOKENS).await?;
    let instructions = generate_instructions_section(llm, &name, idl).await?;
    let accounts = generate_accounts_section(llm, idl, &idl_counts).await?;
    let security = llm.generate(&prompts::security_prompt(idl), MAX_TOKENS).await?;

    let generated_at = Utc::now();
    let full_markdown =
        assemble_markdown(&name, program_id, generated_at, &overview, &instructions, &accounts, &security);

    validate(&full_markdown);

    Ok(Documentation {
        program_id: program_id.clone(),
        name,
        overview,
        instructions,
        accounts,
        security,
        full_markdown,
        generated_at,
        idl_hash: idl_hash.to_string(),
    })
}

fn assemble_markdown(
    name: &str,
    program_id: &ProgramId,
    generated_at: chrono::DateTime<Utc>,
    overview: &str,
    instructions: &str,
    accounts: &str,
    security: &str,
) -> String {
    let header = format!(
        "# {name}\n`{program_id}`\nGenerated at: {generated_at}\nGenerated by SolDocs",
        name = name,
        program_id = program_id,
        generated_at = generated_at.to_rfc3339(),
    );
    let footer = "Documentation generated autonomously by SolDocs. Review before relying on it.";

    [header.as_str(), overview, instructions, accounts, security, footer].join("\n---\n")
}

/// Structural validation — warnings only, never errors (spec §4.5).
fn validate(full_markdown: &str) {
    if full_markdown.len() < 500 {
        warn!("generated documentation is unusually short ({} bytes)", full_markdown.len());
    }
    if !full_markdown.contains("```") {
        warn!("generated documentation has no fenced code block");
    }
}
