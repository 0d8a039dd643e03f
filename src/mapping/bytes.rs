// SPDX-License-Identifier: Apache-2.0

//! Byte-oriented inputs for binary and multimedia values.

use std::fmt;
use std::io::Read;

use polyfed_core::{ByteString, EngineError, EngineResult};

/// Where the bytes of a binary value come from.
///
/// The canonical [`ByteString`] is not streaming, so every source is
/// drained completely by [`ByteSource::drain`].
pub enum ByteSource {
    Bytes(Vec<u8>),
    Base64(String),
    Reader(Box<dyn Read + Send>),
}

impl ByteSource {
    pub fn drain(self) -> EngineResult<ByteString> {
        match self {
            ByteSource::Bytes(bytes) => Ok(ByteString(bytes)),
            ByteSource::Base64(text) => ByteString::from_base64(&text),
            ByteSource::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .map_err(|e| EngineError::execution_error(format!("Failed to read byte stream: {e}")))?;
                Ok(ByteString(buf))
            }
        }
    }
}

impl fmt::Debug for ByteSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteSource::Bytes(b) => write!(f, "Bytes({} bytes)", b.len()),
            ByteSource::Base64(s) => write!(f, "Base64({} chars)", s.len()),
            ByteSource::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}
