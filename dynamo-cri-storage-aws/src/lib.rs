//! Amazon DynamoDB backend for dynamo-cri
//!
//! - **DynamoDB table** (`dynamodb` feature, on by default): a
//!   [`TableBackend`](dynamo_cri::TableBackend) that issues GetItem, PutItem,
//!   DeleteItem, UpdateItem and Query against one single-table layout, plus
//!   table provisioning for that layout.
//!
//! ## Usage
//!
//! ```ignore
//! use dynamo_cri::{Defaults, GlobalConfig};
//! use dynamo_cri_storage_aws::{DynamoDbConfig, DynamoDbTable};
//! use std::sync::Arc;
//!
//! let sdk_config = aws_config::load_defaults(BehaviorVersion::latest()).await;
//! let table = DynamoDbTable::new(&sdk_config, DynamoDbConfig::default()).await?;
//! table.ensure_table("Main", "byGSIK").await?;
//!
//! let defaults = Defaults::new(
//!     GlobalConfig::new()
//!         .with_table_name("Main")
//!         .with_backend(Arc::new(table)),
//! );
//! ```

pub mod error;

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub use error::{AwsStorageError, Result};

#[cfg(feature = "dynamodb")]
pub use dynamodb::{DynamoDbConfig, DynamoDbTable};
#[cfg(feature = "dynamodb")]
pub use aws_sdk_dynamodb::types::ScalarAttributeType;
