// SPDX-License-Identifier: Apache-2.0

//! Binary plan payloads.
//!
//! Layout: a big-endian `u16` format version followed by an LZ4 block
//! (uncompressed size prepended) holding the MessagePack encoding of the
//! body. Unknown versions are rejected instead of being guessed at.

use serde::de::DeserializeOwned;
use serde::Serialize;

use polyfed_core::{EngineError, EngineResult};

use super::Plan;

pub const PAYLOAD_VERSION: u16 = 1;
const HEADER_LEN: usize = 2;

pub fn encode<T: Serialize>(body: &T) -> EngineResult<Vec<u8>> {
    let packed = rmp_serde::to_vec_named(body).map_err(|e| EngineError::payload(e.to_string()))?;
    let compressed = lz4_flex::compress_prepend_size(&packed);
    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(&PAYLOAD_VERSION.to_be_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> EngineResult<T> {
    let (header, body) = match bytes {
        [a, b, rest @ ..] => (u16::from_be_bytes([*a, *b]), rest),
        _ => return Err(EngineError::payload("payload shorter than its header")),
    };
    if header != PAYLOAD_VERSION {
        return Err(EngineError::payload(format!(
            "unsupported payload version {header} (expected {PAYLOAD_VERSION})"
        )));
    }
    let packed = lz4_flex::decompress_size_prepended(body).map_err(|e| EngineError::payload(e.to_string()))?;
    rmp_serde::from_slice(&packed).map_err(|e| EngineError::payload(e.to_string()))
}

pub fn encode_plan(plan: &Plan) -> EngineResult<Vec<u8>> {
    encode(plan)
}

/// Decodes a plan. The result still carries its original cluster and must
/// be rebound before use.
pub fn decode_plan(bytes: &[u8]) -> EngineResult<Plan> {
    decode(bytes)
}
