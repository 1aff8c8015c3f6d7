//! Anchor IDL account decoding (spec §4.3).
//!
//! The on-chain IDL account address is the PDA for seeds
//! `["anchor:idl", program_id]`. Its payload is a header of unknown width
//! followed by a little-endian u32 length and a zlib-deflated JSON
//! document; the header width has changed across Anchor CLI versions, so
//! this tries each known offset in turn rather than assuming one.

use std::io::Read;
use std::str::FromStr;

use flate2::read::ZlibDecoder;
use serde_json::Value;
use solana_sdk::pubkey::Pubkey;

use super::{AccountInfo, ChainClient};
use crate::error::ChainError;

const HEADER_OFFSETS: [usize; 3] = [44, 12, 8];
const MAX_DECLARED_LENGTH: usize = 10_000_000;

fn derive_idl_pda(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"anchor:idl", program_id.as_ref()], program_id).0
}

fn try_decode_at_offset(data: &[u8], offset: usize) -> Option<Value> {
    if data.len() < offset + 4 {
        return None;
    }
    let len_bytes: [u8; 4] = data[offset..offset + 4].try_into().ok()?;
    let declared_len = u32::from_le_bytes(len_bytes) as usize;

    let available = data.len().checked_sub(offset + 4)?;
    if declared_len == 0 || declared_len > available || declared_len > MAX_DECLARED_LENGTH {
        return None;
    }

    let compressed = &data[offset + 4..offset + 4 + declared_len];
    let mut decoder = ZlibDecoder::new(compressed);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed).ok()?;

    let value: Value = serde_json::from_slice(&decompressed).ok()?;
    let has_instructions = value
        .get("instructions")
        .and_then(|v| v.as_array())
        .map(|arr| !arr.is_empty())
        .unwrap_or(false);

    if has_instructions {
        Some(value)
    } else {
        None
    }
}

/// Decode the IDL from a raw IDL-account payload, trying header offsets in
/// the order the spec names (new format, old format, minimal).
pub fn decode_idl_account_data(data: &[u8]) -> Option<Value> {
    HEADER_OFFSETS.iter().find_map(|&offset| try_decode_at_offset(data, offset))
}

/// Fetch and decode a program's IDL from chain: derive the PDA, fetch the
/// account, decode. Returns `Ok(None)` when the account or a parseable IDL
/// isn't found (spec §4.3's "on all-fail, return null").
pub async fn fetch_idl(
    client: &dyn ChainClient,
    program_id: &str,
) -> Result<Option<Value>, ChainError> {
    let pubkey = Pubkey::from_str(program_id)
        .map_err(|e| ChainError::Rpc(format!("invalid program id for PDA derivation: {e}")))?;
    let idl_pda = derive_idl_pda(&pubkey);

    let account: Option<AccountInfo> =
        super::with_retry(|| client.get_account(&idl_pda.to_string())).await?;

    Ok(account.and_then(|info| decode_idl_account_data(&info.data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn deflate(json: &str) -> Vec<u8> {
        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(json.as_bytes()).unwrap();
        encoder.finish().unwrap()
    }

    fn framed_account(header_len: usize, json: &str) -> Vec<u8> {
        let compressed = deflate(json);
        let mut data = vec![0u8; header_len];
        data.extend_from_slice(&(compressed.len() as u32).to_le_bytes());
        data.extend_from_slice(&compressed);
        data
    }

    #[test]
    fn decodes_new_format_header() {
        let json = r#"{"name":"test","instructions":[{"name":"init"}]}"#;
        let data = framed_account(44, json);
        let decoded = decode_idl_account_data(&data).unwrap();
        assert_eq!(decoded["name"], "test");
    }

    #[test]
    fn decodes_old_format_header() {
        let json = r#"{"name":"test","instructions":[{"name":"init"}]}"#;
        let data = framed_account(12, json);
        let decoded = decode_idl_account_data(&data).unwrap();
        assert_eq!(decoded["instructions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn rejects_empty_instructions() {
        let json = r#"{"name":"test","instructions":[]}"#;
        let data = framed_account(44, json);
        assert!(decode_idl_account_data(&data).is_none());
    }

    #[test]
    fn rejects_garbage_data() {
        let data = vec![0u8; 100];
        assert!(decode_idl_account_data(&data).is_none());
    }

    #[test]
    fn rejects_declared_length_overflowing_buffer() {
        let mut data = vec![0u8; 44];
        data.extend_from_slice(&(u32::MAX).to_le_bytes());
        assert!(decode_idl_account_data(&data).is_none());
    }
}
