//! Opaque pagination cursors
//!
//! A cursor is the base64 text of the JSON-serialized continuation key the
//! backend returned. Callers treat it as opaque and hand it back verbatim.

use crate::error::{CriError, Result};
use crate::Item;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value as JsonValue;

/// Encode a continuation key as an opaque offset
pub fn encode(key: &Item) -> Result<String> {
    let json = serde_json::to_string(key)?;
    Ok(STANDARD.encode(json))
}

/// Decode an offset produced by [`encode`]
pub fn decode(offset: &str) -> Result<Item> {
    let bytes = STANDARD
        .decode(offset)
        .map_err(|e| CriError::invalid_cursor(format!("not base64: {e}")))?;
    let value: JsonValue = serde_json::from_slice(&bytes)
        .map_err(|e| CriError::invalid_cursor(format!("not JSON: {e}")))?;
    match value {
        JsonValue::Object(map) => Ok(map),
        other => Err(CriError::invalid_cursor(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}
