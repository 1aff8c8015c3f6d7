//! One-time seeding of well-known programs, and upgrade-candidate
//! enumeration (spec §4.6).

use serde_json::Value;
use tracing::{info, warn};

use crate::domain::{ProgramId, ProgramStatus};
use crate::error::StoreError;
use crate::storage::Store;

pub struct SeedEntry {
    pub program_id: &'static str,
    pub label: &'static str,
    pub idl_json: &'static str,
}

/// Seven bundled `{programId, label, idlFile}` entries (spec §4.6), bundled
/// at build time via `include_str!` — this crate's equivalent of shipping
/// the IDL assets inside the binary.
pub static SEED_PROGRAMS: [SeedEntry; 7] = [
    SeedEntry {
        program_id: "11111111111111111111111111111111",
        label: "System Program",
        idl_json: include_str!("../assets/seed/system_program.json"),
    },
    SeedEntry {
        program_id: "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
        label: "Token Program",
        idl_json: include_str!("../assets/seed/token_program.json"),
    },
    SeedEntry {
        program_id: "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb",
        label: "Token Extensions Program",
        idl_json: include_str!("../assets/seed/token_extensions.json"),
    },
    SeedEntry {
        program_id: "ATokenGPvbdGVxr1b2hvZbsiqW5xWH25efTNsLJA8knL",
        label: "Associated Token Account Program",
        idl_json: include_str!("../assets/seed/associated_token_account.json"),
    },
    SeedEntry {
        program_id: "MemoSq4gqABAXKb96qnH8TysNcWxMyWCqXgDLGmfcHr",
        label: "Memo Program",
        idl_json: include_str!("../assets/seed/memo_program.json"),
    },
    SeedEntry {
        program_id: "namesLPneVptA9Z5rqUDD9tMTWEJwofgaYwp8cawRkX",
        label: "Name Service Program",
        idl_json: include_str!("../assets/seed/name_service.json"),
    },
    SeedEntry {
        program_id: "metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s",
        label: "NFT Metadata Program",
        idl_json: include_str!("../assets/seed/nft_metadata.json"),
    },
];

/// If both the queue and the program index are empty, enqueue the bundled
/// seed list and cache each program's IDL. Returns the count seeded.
pub fn seed_if_empty(store: &Store) -> Result<usize, StoreError> {
    if !store.list_queue().is_empty() || !store.list_programs().is_empty() {
        return Ok(0);
    }

    let mut seeded = 0;
    for entry in SEED_PROGRAMS.iter() {
        let program_id = match ProgramId::parse(entry.program_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("skipping seed entry {}: {}", entry.label, e);
                continue;
            }
        };

        let idl: Value = match serde_json::from_str(entry.idl_json) {
            Ok(value) => value,
            Err(e) => {
                warn!("skipping seed entry {}: bundled IDL is not valid JSON: {}", entry.label, e);
                continue;
            }
        };

        store.save_idl(&program_id, idl)?;
        store.add_to_queue(&program_id)?;
        seeded += 1;
    }

    info!("🌱 seeded {seeded} well-known program(s)");
    Ok(seeded)
}

/// Program ids whose index status is `documented` — candidates for the
/// agent's periodic upgrade check (spec §4.6).
pub fn programs_needing_upgrade_check(store: &Store) -> Vec<ProgramId> {
    store
        .list_programs()
        .into_iter()
        .filter(|p| p.status == ProgramStatus::Documented)
        .map(|p| p.program_id)
        .collect()
}
