//! Error types for dynamo-cri

use thiserror::Error;

/// Result type alias using [`CriError`]
pub type Result<T> = std::result::Result<T, CriError>;

/// Errors surfaced by models, codecs and the stream reconciler
#[derive(Error, Debug)]
pub enum CriError {
    /// A required configuration field is missing or empty
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A required field is missing from a request body
    #[error("The value of {0} can't be undefined")]
    MissingField(String),

    /// An update body carried nothing to set
    #[error("Can't construct UpdateExpression from the body")]
    EmptyUpdate,

    /// A change-log record names an entity no model is registered for
    #[error("No Model provided for this entity: {0}")]
    NoModelForEntity(String),

    /// A change-log record is missing required key fields
    #[error("Malformed stream record: {0}")]
    MalformedRecord(String),

    /// A typed attribute envelope does not have exactly one well-formed type key
    #[error("Unexpected DynamoDB AttributeValue: {0}")]
    MalformedAttribute(String),

    /// A typed attribute envelope names an unknown type
    #[error("No data type (B, BS, N, NS, S, SS): {0}")]
    NoDatatype(String),

    /// A pagination offset could not be decoded
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// Storage backend failure
    #[error("Backend error: {0}")]
    Backend(String),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CriError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        CriError::InvalidConfig(msg.into())
    }

    /// Create a missing field error
    pub fn missing_field(field: impl Into<String>) -> Self {
        CriError::MissingField(field.into())
    }

    /// Create a no-model-for-entity error
    pub fn no_model(entity: impl Into<String>) -> Self {
        CriError::NoModelForEntity(entity.into())
    }

    /// Create a malformed record error
    pub fn malformed_record(msg: impl Into<String>) -> Self {
        CriError::MalformedRecord(msg.into())
    }

    /// Create a malformed attribute error
    pub fn malformed_attribute(msg: impl Into<String>) -> Self {
        CriError::MalformedAttribute(msg.into())
    }

    /// Create a no-datatype error
    pub fn no_datatype(tag: impl Into<String>) -> Self {
        CriError::NoDatatype(tag.into())
    }

    /// Create an invalid cursor error
    pub fn invalid_cursor(msg: impl Into<String>) -> Self {
        CriError::InvalidCursor(msg.into())
    }

    /// Create a backend error
    pub fn backend(msg: impl Into<String>) -> Self {
        CriError::Backend(msg.into())
    }
}
