//! # dynamo-cri
//!
//! Single-table entity access for DynamoDB-style stores.
//!
//! Any number of entities, each with any number of declared secondary
//! indexes and an optional tenant, share one physical table and one global
//! secondary index. Every record is addressed by:
//!
//! - `pk`: the entity instance id
//! - `sk`: `{tenant}|{entity}` for primary records, `{tenant}|{entity}|{index}`
//!   for the records derived for each index
//! - `gk`: the indexed value, the GSI sort key
//!
//! A [`Model`] hides that layout behind create/get/update/delete/query and
//! keeps the derived index records in step, either inline (`track_indexes`)
//! or later from the table's change stream via [`process_records`].
//!
//! ## Example
//!
//! ```ignore
//! use dynamo_cri::{Defaults, GlobalConfig, IndexSpec, MemoryTable, ModelConfig};
//! use std::sync::Arc;
//!
//! let defaults = Defaults::new(
//!     GlobalConfig::new()
//!         .with_table_name("Main")
//!         .with_tenant("acme")
//!         .with_backend(Arc::new(MemoryTable::new())),
//! );
//! let users = defaults.model(
//!     ModelConfig::new("user", "name")
//!         .with_index(IndexSpec::new("email").with_projections(["document"]))
//!         .track_indexes(true),
//! )?;
//! let created = users.create(attributes).await?;
//! ```

pub mod attribute;
pub mod backend;
pub mod config;
pub mod cursor;
pub mod error;
pub mod keys;
pub mod memory;
pub mod model;
pub mod schema;
pub mod stream;

/// A stored record or caller-facing item: an insertion-ordered JSON object
pub type Item = serde_json::Map<String, serde_json::Value>;

pub use attribute::{unwrap_attribute, unwrap_attributes, AttributeValue};
pub use backend::{AttributeNames, QueryOutput, QueryRequest, TableBackend, UpdateRequest};
pub use config::{
    BackendRef, Defaults, GlobalConfig, IndexMaintenance, IndexSpec, ModelConfig, ResolvedConfig,
};
pub use error::{CriError, Result};
pub use keys::{secondary_key, EntityKey, ItemKey};
pub use memory::MemoryTable;
pub use model::{unwrap_item, KeyCondition, Model, QueryOptions, QueryResult};
pub use stream::{
    process_event, process_records, EventName, IndexMaintainer, StreamEvent, StreamRecord,
};
