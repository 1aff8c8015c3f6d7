//! Prompt-template builders for the four documentation passes (spec §4.5).
//!
//! Kept as small named functions rather than inline format strings, the way
//! the teacher favors focused helper functions over monolithic string
//! building (see `utils.rs`'s `parse_datetime`/`parse_properties` style).

use serde_json::Value;

pub const IDL_TRUNCATE_LEN: usize = 15_000;

pub fn truncate_json(idl: &Value) -> String {
    let serialized = serde_json::to_string_pretty(idl).unwrap_or_default();
    if serialized.len() > IDL_TRUNCATE_LEN {
        serialized.chars().take(IDL_TRUNCATE_LEN).collect()
    } else {
        serialized
    }
}

pub struct IdlCounts {
    pub instructions: usize,
    pub accounts: usize,
    pub types: usize,
    pub events: usize,
    pub errors: usize,
}

pub fn overview_prompt(name: &str, counts: &IdlCounts, idl: &Value) -> String {
    format!(
        "You are documenting the Solana program \"{name}\".\n\
         It defines {instr} instruction(s), {accts} account type(s), {types} custom type(s), \
         {events} event(s), and {errors} error code(s).\n\n\
         Write a concise overview of what this program does, in prose, based on the IDL below:\n\n{idl}",
        name = name,
        instr = counts.instructions,
        accts = counts.accounts,
        types = counts.types,
        events = counts.events,
        errors = counts.errors,
        idl = truncate_json(idl),
    )
}

pub fn instructions_prompt(name: &str, batch: &Value) -> String {
    format!(
        "You are documenting instructions of the Solana program \"{name}\".\n\
         For each instruction in the JSON batch below, produce: a one-paragraph description, \
         a table of its accounts (name, mutability, signer), a table of its arguments \
         (name, type), and a short usage example.\n\n{batch}",
        name = name,
        batch = serde_json::to_string_pretty(batch).unwrap_or_default(),
    )
}

pub fn accounts_prompt(accounts: &Value, types: &Value, events: Option<&Value>, errors: Option<&Value>) -> String {
    let mut sections = vec![
        format!("Account layouts:\n{}", serde_json::to_string_pretty(accounts).unwrap_or_default()),
        format!("Custom types:\n{}", serde_json::to_string_pretty(types).unwrap_or_default()),
    ];
    if let Some(events) = events {
        sections.push(format!("Events:\n{}", serde_json::to_string_pretty(events).unwrap_or_default()));
    }
    if let Some(errors) = errors {
        sections.push(format!("Error codes:\n{}", serde_json::to_string_pretty(errors).unwrap_or_default()));
    }
    format!(
        "Document the following account types, custom types, events, and error codes for this \
         Solana program. For each account, describe its fields and purpose.\n\n{}",
        sections.join("\n\n"),
    )
}

pub fn security_prompt(idl: &Value) -> String {
    format!(
        "Perform a static IDL analysis only (you have no access to the program's actual \
         bytecode) of the Solana program described below. Call out any account validation, \
         signer checks, or authority patterns that are visible from the IDL shape alone, and \
         note where a reader would need the source to verify safety.\n\n{}",
        truncate_json(idl),
    )
}
