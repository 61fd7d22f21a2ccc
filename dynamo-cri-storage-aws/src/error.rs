//! Error types for the AWS backend

use dynamo_cri::CriError;
use thiserror::Error;

/// Errors from AWS storage operations
#[derive(Debug, Error)]
pub enum AwsStorageError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// DynamoDB SDK error
    #[cfg(feature = "dynamodb")]
    #[error("DynamoDB error: {0}")]
    DynamoDB(String),

    /// A stored attribute could not be converted to JSON
    #[error("Unsupported attribute value: {0}")]
    UnsupportedValue(String),
}

impl AwsStorageError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    #[cfg(feature = "dynamodb")]
    pub fn dynamodb(msg: impl Into<String>) -> Self {
        Self::DynamoDB(msg.into())
    }

    pub fn unsupported_value(msg: impl Into<String>) -> Self {
        Self::UnsupportedValue(msg.into())
    }
}

/// Result type for AWS storage operations
pub type Result<T> = std::result::Result<T, AwsStorageError>;

impl From<AwsStorageError> for CriError {
    fn from(err: AwsStorageError) -> Self {
        CriError::backend(err.to_string())
    }
}
