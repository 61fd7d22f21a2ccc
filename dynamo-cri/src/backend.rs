//! Storage backend contract
//!
//! Models never talk to a database directly; they issue these five
//! operations against an injected [`TableBackend`]. The request shapes mirror
//! the DynamoDB API closely enough that an SDK-backed implementation is a
//! field-by-field translation.
//!
//! ## Implementations
//!
//! - [`MemoryTable`](crate::memory::MemoryTable): in-process table for tests
//! - `dynamo-cri-storage-aws`: Amazon DynamoDB via `aws-sdk-dynamodb`

use crate::error::Result;
use crate::keys::ItemKey;
use crate::Item;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// Expression attribute name placeholders (`#name` -> attribute name)
pub type AttributeNames = BTreeMap<String, String>;

/// Partial update of one record
#[derive(Clone, Debug, PartialEq)]
pub struct UpdateRequest {
    pub table_name: String,
    pub key: ItemKey,
    pub update_expression: String,
    pub expression_attribute_names: AttributeNames,
    /// Placeholder values (`:name` -> value), in expression order
    pub expression_attribute_values: Item,
}

/// Query against the global secondary index
#[derive(Clone, Debug, PartialEq)]
pub struct QueryRequest {
    pub table_name: String,
    pub index_name: String,
    pub key_condition_expression: String,
    pub expression_attribute_names: AttributeNames,
    pub expression_attribute_values: Item,
    pub limit: u32,
    pub exclusive_start_key: Option<Item>,
    pub scan_index_forward: Option<bool>,
    pub filter_expression: Option<String>,
}

/// One page of query results
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOutput {
    pub items: Vec<Item>,
    pub count: usize,
    /// Resume point; present when more results may follow
    pub last_evaluated_key: Option<Item>,
}

/// Key-value table with one global secondary index
#[async_trait]
pub trait TableBackend: Debug + Send + Sync {
    /// Read one record; `Ok(None)` when absent
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>>;

    /// Write one record unconditionally (overwrite semantics)
    async fn put(&self, table: &str, item: Item) -> Result<()>;

    /// Delete one record; deleting an absent record is not an error
    async fn delete(&self, table: &str, key: &ItemKey) -> Result<()>;

    /// Apply an update expression to one record (creating it if absent)
    async fn update(&self, request: UpdateRequest) -> Result<()>;

    /// Query one page from the secondary index
    async fn query(&self, request: QueryRequest) -> Result<QueryOutput>;
}
