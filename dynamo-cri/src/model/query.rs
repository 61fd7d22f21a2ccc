//! Query options and request construction

use crate::backend::{AttributeNames, QueryRequest};
use crate::cursor;
use crate::error::Result;
use crate::schema::{ATTR_GK, ATTR_SK, DEFAULT_QUERY_LIMIT};
use crate::Item;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Range condition on `gk` within one sort-key partition.
///
/// The expression refers to the index sort key as `#key` and to the bound
/// value as `:key`, e.g. `#key >= :key` or `begins_with(#key, :key)`.
#[derive(Clone, Debug, PartialEq)]
pub struct KeyCondition {
    pub expression: String,
    pub key: JsonValue,
}

impl KeyCondition {
    pub fn new(expression: impl Into<String>, key: impl Into<JsonValue>) -> Self {
        Self {
            expression: expression.into(),
            key: key.into(),
        }
    }

    pub fn eq(key: impl Into<JsonValue>) -> Self {
        Self::new("#key = :key", key)
    }

    pub fn lt(key: impl Into<JsonValue>) -> Self {
        Self::new("#key < :key", key)
    }

    pub fn le(key: impl Into<JsonValue>) -> Self {
        Self::new("#key <= :key", key)
    }

    pub fn gt(key: impl Into<JsonValue>) -> Self {
        Self::new("#key > :key", key)
    }

    pub fn ge(key: impl Into<JsonValue>) -> Self {
        Self::new("#key >= :key", key)
    }

    pub fn begins_with(prefix: impl Into<String>) -> Self {
        Self::new("begins_with(#key, :key)", JsonValue::String(prefix.into()))
    }
}

/// Options for [`Model::query`](crate::Model::query)
#[derive(Clone, Debug, Default, PartialEq)]
pub struct QueryOptions {
    /// Query the records derived for this index instead of primary records
    pub index: Option<String>,
    pub key_condition: Option<KeyCondition>,
    /// Attribute equality filter applied after the key condition
    pub filter: Option<Item>,
    /// Page size; 100 when unset
    pub limit: Option<u32>,
    pub scan_index_forward: Option<bool>,
    /// Offset returned by a previous page
    pub offset: Option<String>,
    /// For index queries, replace each result with its primary record
    pub unwrap_index_items: bool,
}

impl QueryOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn key_condition(mut self, condition: KeyCondition) -> Self {
        self.key_condition = Some(condition);
        self
    }

    pub fn filter(mut self, attribute: impl Into<String>, value: impl Into<JsonValue>) -> Self {
        self.filter
            .get_or_insert_with(Item::new)
            .insert(attribute.into(), value.into());
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn scan_index_forward(mut self, forward: bool) -> Self {
        self.scan_index_forward = Some(forward);
        self
    }

    pub fn offset(mut self, offset: impl Into<String>) -> Self {
        self.offset = Some(offset.into());
        self
    }

    pub fn unwrap_index_items(mut self, enabled: bool) -> Self {
        self.unwrap_index_items = enabled;
        self
    }
}

/// One page of unwrapped query results
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueryResult {
    pub items: Vec<Item>,
    pub count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<String>,
}

/// Build the backend request for `options` within partition `sk`.
pub(crate) fn build_request(
    table_name: &str,
    index_name: &str,
    sk: String,
    options: &QueryOptions,
) -> Result<QueryRequest> {
    let mut names = AttributeNames::new();
    let mut values = Item::new();

    names.insert("#sk".to_string(), ATTR_SK.to_string());
    values.insert(":sk".to_string(), JsonValue::String(sk.clone()));
    let mut key_condition = "#sk = :sk".to_string();

    if let Some(condition) = &options.key_condition {
        names.insert("#key".to_string(), ATTR_GK.to_string());
        values.insert(":key".to_string(), condition.key.clone());
        key_condition = format!("{key_condition} and {}", condition.expression);
    }

    let filter_expression = options
        .filter
        .as_ref()
        .filter(|f| !f.is_empty())
        .map(|filter| {
            filter
                .iter()
                .map(|(attribute, value)| {
                    names.insert(format!("#f_{attribute}"), attribute.clone());
                    values.insert(format!(":f_{attribute}"), value.clone());
                    format!("#f_{attribute} = :f_{attribute}")
                })
                .collect::<Vec<_>>()
                .join(" AND ")
        });

    let exclusive_start_key = options
        .offset
        .as_deref()
        .map(|offset| -> Result<Item> {
            let mut start = cursor::decode(offset)?;
            start.insert(ATTR_SK.to_string(), JsonValue::String(sk.clone()));
            Ok(start)
        })
        .transpose()?;

    Ok(QueryRequest {
        table_name: table_name.to_string(),
        index_name: index_name.to_string(),
        key_condition_expression: key_condition,
        expression_attribute_names: names,
        expression_attribute_values: values,
        limit: options.limit.unwrap_or(DEFAULT_QUERY_LIMIT),
        exclusive_start_key,
        scan_index_forward: options.scan_index_forward,
        filter_expression,
    })
}
