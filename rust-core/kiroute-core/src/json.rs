//! # JSON Serialization Module
//!
//! Request bodies are parsed with simd-json; responses are written with
//! serde_json.
//!
//! ## Design Principles (SOLID)
//!
//! - **S**: Only handles JSON serialization/deserialization
//! - **O**: Extensible via serde traits
//! - **D**: Depends on serde abstractions, not concrete parsers

use crate::error::{Error, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Parse a JSON body into a typed value using simd-json
///
/// simd-json parses in place, so the bytes are copied into a scratch buffer.
///
/// # Errors
///
/// Returns `Error::Decode` if the body is empty or not valid JSON for `T`.
pub fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    if body.is_empty() {
        return Err(Error::Decode {
            reason: "empty body".to_string(),
        });
    }
    let mut scratch = body.to_vec();
    parse_json_bytes(&mut scratch)
}

/// Parse JSON bytes in place using simd-json
///
/// Avoids the copy `parse_json` makes; `bytes` is clobbered.
///
/// # Errors
///
/// Returns `Error::Decode` if parsing fails.
pub fn parse_json_bytes<T: DeserializeOwned>(bytes: &mut [u8]) -> Result<T> {
    simd_json::from_slice(bytes).map_err(|e| Error::Decode {
        reason: format!("Parse error: {e}"),
    })
}

/// Serialize a value into a JSON response body
///
/// The body ends with a newline, like a streaming encoder would write it.
///
/// # Errors
///
/// Returns `Error::Json` if `value` cannot be serialized.
pub fn to_json_body<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let mut body = serde_json::to_vec(value)?;
    body.push(b'\n');
    Ok(body)
}
