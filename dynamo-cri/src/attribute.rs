//! Decoding of typed attribute envelopes
//!
//! Change-log images carry every value wrapped in a single-key object naming
//! its type, e.g. `{"S": "Ana"}`, `{"N": "42"}` or `{"M": {...}}`. This module
//! turns those envelopes into plain JSON values.

use crate::error::{CriError, Result};
use crate::Item;
use serde_json::{Number, Value as JsonValue};

/// One typed attribute value
#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    S(String),
    /// Number, kept as its decimal text until decoded
    N(String),
    SS(Vec<String>),
    NS(Vec<String>),
    /// Binary, as base64 text
    B(String),
    BS(Vec<String>),
    Bool(bool),
    Null(bool),
    L(Vec<AttributeValue>),
    M(Vec<(String, AttributeValue)>),
}

fn malformed(value: &JsonValue) -> CriError {
    CriError::malformed_attribute(value.to_string())
}

fn string_of(payload: &JsonValue, envelope: &JsonValue) -> Result<String> {
    payload
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| malformed(envelope))
}

fn strings_of(payload: &JsonValue, envelope: &JsonValue) -> Result<Vec<String>> {
    payload
        .as_array()
        .ok_or_else(|| malformed(envelope))?
        .iter()
        .map(|element| string_of(element, envelope))
        .collect()
}

fn bool_of(payload: &JsonValue, envelope: &JsonValue) -> Result<bool> {
    payload.as_bool().ok_or_else(|| malformed(envelope))
}

/// Integer when the text is one, otherwise a finite float.
fn parse_number(text: &str) -> Result<JsonValue> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(JsonValue::from(i));
    }
    if let Ok(u) = text.parse::<u64>() {
        return Ok(JsonValue::from(u));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(JsonValue::Number)
        .ok_or_else(|| CriError::malformed_attribute(format!("{{\"N\":\"{text}\"}}")))
}

impl AttributeValue {
    /// Parse one envelope.
    ///
    /// Fails with `MalformedAttribute` unless `value` is an object with exactly
    /// one key holding a payload of the right shape, and with `NoDatatype`
    /// when that key is not a known type tag.
    pub fn from_json(value: &JsonValue) -> Result<Self> {
        let envelope = value.as_object().ok_or_else(|| malformed(value))?;
        let mut entries = envelope.iter();
        let (tag, payload) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            _ => return Err(malformed(value)),
        };

        Ok(match tag.as_str() {
            "S" => AttributeValue::S(string_of(payload, value)?),
            "N" => AttributeValue::N(string_of(payload, value)?),
            "B" => AttributeValue::B(string_of(payload, value)?),
            "SS" => AttributeValue::SS(strings_of(payload, value)?),
            "NS" => AttributeValue::NS(strings_of(payload, value)?),
            "BS" => AttributeValue::BS(strings_of(payload, value)?),
            "BOOL" => AttributeValue::Bool(bool_of(payload, value)?),
            "NULL" => AttributeValue::Null(bool_of(payload, value)?),
            "L" => AttributeValue::L(
                payload
                    .as_array()
                    .ok_or_else(|| malformed(value))?
                    .iter()
                    .map(AttributeValue::from_json)
                    .collect::<Result<_>>()?,
            ),
            "M" => AttributeValue::M(
                payload
                    .as_object()
                    .ok_or_else(|| malformed(value))?
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), AttributeValue::from_json(v)?)))
                    .collect::<Result<_>>()?,
            ),
            other => return Err(CriError::no_datatype(other)),
        })
    }

    /// Convert into a plain JSON value
    pub fn into_json(self) -> Result<JsonValue> {
        Ok(match self {
            AttributeValue::S(s) | AttributeValue::B(s) => JsonValue::String(s),
            AttributeValue::N(n) => parse_number(&n)?,
            AttributeValue::SS(set) | AttributeValue::BS(set) => {
                JsonValue::Array(set.into_iter().map(JsonValue::String).collect())
            }
            AttributeValue::NS(set) => JsonValue::Array(
                set.iter()
                    .map(|n| parse_number(n))
                    .collect::<Result<_>>()?,
            ),
            AttributeValue::Bool(b) => JsonValue::Bool(b),
            AttributeValue::Null(_) => JsonValue::Null,
            AttributeValue::L(list) => JsonValue::Array(
                list.into_iter()
                    .map(AttributeValue::into_json)
                    .collect::<Result<_>>()?,
            ),
            AttributeValue::M(map) => JsonValue::Object(
                map.into_iter()
                    .map(|(k, v)| Ok((k, v.into_json()?)))
                    .collect::<Result<Item>>()?,
            ),
        })
    }
}

/// Decode one envelope into its plain value
pub fn unwrap_attribute(value: &JsonValue) -> Result<JsonValue> {
    AttributeValue::from_json(value)?.into_json()
}

/// Decode every field of a change-log image, skipping null fields
pub fn unwrap_attributes(image: &Item) -> Result<Item> {
    image
        .iter()
        .filter(|(_, v)| !v.is_null())
        .map(|(k, v)| Ok((k.clone(), unwrap_attribute(v)?)))
        .collect()
}
