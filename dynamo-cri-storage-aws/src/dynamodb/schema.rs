//! Physical table definition for the single-table layout
//!
//! ## Table Schema
//!
//! ```text
//! Primary Key:
//!   - pk (String, Partition Key)
//!   - sk (String, Sort Key)
//!
//! Global Secondary Index (name configurable, "byGSIK" by default):
//!   - sk (String, Partition Key)
//!   - gk (String by default, Sort Key)
//!   - Projection: ALL
//!
//! Billing: PAY_PER_REQUEST
//! ```
//!
//! `gk` holds every entity's key and index values, so it has one scalar type
//! per table. Tables whose indexed values are numeric are provisioned with
//! [`ensure_table_with_gk_type`](super::DynamoDbTable::ensure_table_with_gk_type).

use crate::error::{AwsStorageError, Result};
use aws_sdk_dynamodb::types::{
    AttributeDefinition, GlobalSecondaryIndex, KeySchemaElement, KeyType, Projection,
    ProjectionType, ScalarAttributeType,
};
use dynamo_cri::schema::{ATTR_GK, ATTR_PK, ATTR_SK};

fn schema_error(e: impl std::fmt::Display) -> AwsStorageError {
    AwsStorageError::invalid_config(format!("table schema: {e}"))
}

fn key(attribute: &str, key_type: KeyType) -> Result<KeySchemaElement> {
    KeySchemaElement::builder()
        .attribute_name(attribute)
        .key_type(key_type)
        .build()
        .map_err(schema_error)
}

fn attribute(attribute: &str, attribute_type: ScalarAttributeType) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(attribute)
        .attribute_type(attribute_type)
        .build()
        .map_err(schema_error)
}

/// `pk` and `sk` as strings, `gk` as `gk_type`
pub fn attribute_definitions(gk_type: ScalarAttributeType) -> Result<Vec<AttributeDefinition>> {
    Ok(vec![
        attribute(ATTR_PK, ScalarAttributeType::S)?,
        attribute(ATTR_SK, ScalarAttributeType::S)?,
        attribute(ATTR_GK, gk_type)?,
    ])
}

/// `pk` HASH, `sk` RANGE
pub fn table_key_schema() -> Result<Vec<KeySchemaElement>> {
    Ok(vec![key(ATTR_PK, KeyType::Hash)?, key(ATTR_SK, KeyType::Range)?])
}

/// The GSI every model queries: `sk` HASH, `gk` RANGE, all attributes projected
pub fn global_index(index_name: &str) -> Result<GlobalSecondaryIndex> {
    GlobalSecondaryIndex::builder()
        .index_name(index_name)
        .key_schema(key(ATTR_SK, KeyType::Hash)?)
        .key_schema(key(ATTR_GK, KeyType::Range)?)
        .projection(
            Projection::builder()
                .projection_type(ProjectionType::All)
                .build(),
        )
        .build()
        .map_err(schema_error)
}
