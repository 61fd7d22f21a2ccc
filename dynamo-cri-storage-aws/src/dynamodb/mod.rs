//! DynamoDB table backend
//!
//! Provides `DynamoDbTable`, which implements [`TableBackend`] by translating
//! each request field-for-field into the matching DynamoDB API call.

pub mod schema;

use crate::error::{AwsStorageError, Result};
use async_trait::async_trait;
use aws_sdk_dynamodb::error::SdkError;
use aws_sdk_dynamodb::operation::create_table::CreateTableError;
use aws_sdk_dynamodb::types::{AttributeValue, BillingMode, ScalarAttributeType};
use aws_sdk_dynamodb::Client;
use aws_smithy_types::timeout::TimeoutConfig;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use dynamo_cri::backend::{AttributeNames, QueryOutput, QueryRequest, TableBackend, UpdateRequest};
use dynamo_cri::schema::{ATTR_PK, ATTR_SK};
use dynamo_cri::{Item, ItemKey};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::time::Duration;

type DynamoItem = HashMap<String, AttributeValue>;

/// DynamoDB client configuration
#[derive(Debug, Clone, Default)]
pub struct DynamoDbConfig {
    /// AWS region (optional, uses SDK default if not specified)
    pub region: Option<String>,
    /// Optional endpoint override (e.g. LocalStack)
    pub endpoint: Option<String>,
    /// Timeout in milliseconds
    pub timeout_ms: Option<u64>,
}

/// DynamoDB-backed table
///
/// One client serves every table; the table name travels with each request.
#[derive(Clone)]
pub struct DynamoDbTable {
    client: Client,
}

impl std::fmt::Debug for DynamoDbTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamoDbTable")
            .field("region", &self.client.config().region())
            .finish()
    }
}

impl DynamoDbTable {
    /// Create a new DynamoDB backend
    ///
    /// Configuration:
    /// - `region`: Override SDK region (uses SDK default if not specified)
    /// - `endpoint`: Override the service endpoint
    /// - `timeout_ms`: Operation timeout in milliseconds
    pub async fn new(sdk_config: &aws_config::SdkConfig, config: DynamoDbConfig) -> Result<Self> {
        // Inherit from SdkConfig (HTTP client, retry config, credentials), then apply overrides
        let mut builder = aws_sdk_dynamodb::config::Builder::from(sdk_config);

        if let Some(region) = config.region {
            builder = builder.region(aws_sdk_dynamodb::config::Region::new(region));
        }

        if let Some(endpoint) = config.endpoint {
            builder = builder.endpoint_url(endpoint);
        }

        if let Some(timeout_ms) = config.timeout_ms {
            if timeout_ms == 0 {
                return Err(AwsStorageError::invalid_config("timeout_ms must be positive"));
            }
            let timeout_config = TimeoutConfig::builder()
                .operation_timeout(Duration::from_millis(timeout_ms))
                .build();
            builder = builder.timeout_config(timeout_config);
        }

        Ok(Self {
            client: Client::from_conf(builder.build()),
        })
    }

    /// Create from a pre-built client (for testing)
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Create `table_name` with the single-table layout and its GSI, with
    /// string `gk` values.
    ///
    /// Succeeds without changes when the table already exists.
    pub async fn ensure_table(&self, table_name: &str, index_name: &str) -> Result<()> {
        self.ensure_table_with_gk_type(table_name, index_name, ScalarAttributeType::S)
            .await
    }

    /// [`ensure_table`](Self::ensure_table) with `gk` declared as `gk_type`.
    ///
    /// Every key and index value written to the table must then be of that
    /// type; DynamoDB rejects the write otherwise.
    pub async fn ensure_table_with_gk_type(
        &self,
        table_name: &str,
        index_name: &str,
        gk_type: ScalarAttributeType,
    ) -> Result<()> {
        let result = self
            .client
            .create_table()
            .table_name(table_name)
            .set_attribute_definitions(Some(schema::attribute_definitions(gk_type.clone())?))
            .set_key_schema(Some(schema::table_key_schema()?))
            .global_secondary_indexes(schema::global_index(index_name)?)
            .billing_mode(BillingMode::PayPerRequest)
            .send()
            .await;

        match result {
            Ok(_) => {
                tracing::debug!(
                    table = %table_name,
                    index = %index_name,
                    gk_type = %gk_type.as_str(),
                    "created table"
                );
                Ok(())
            }
            Err(e) if Self::is_resource_in_use(&e) => {
                tracing::debug!(table = %table_name, "table already exists");
                Ok(())
            }
            Err(e) => Err(AwsStorageError::dynamodb(format!(
                "DynamoDB CreateTable failed: {}",
                e
            ))),
        }
    }

    /// Check if a CreateTable error means the table already exists
    fn is_resource_in_use(err: &SdkError<CreateTableError>) -> bool {
        match err {
            SdkError::ServiceError(service_err) => {
                matches!(
                    service_err.err(),
                    CreateTableError::ResourceInUseException(_)
                )
            }
            _ => false,
        }
    }

    fn key_attributes(key: &ItemKey) -> DynamoItem {
        HashMap::from([
            (ATTR_PK.to_string(), AttributeValue::S(key.pk.clone())),
            (ATTR_SK.to_string(), AttributeValue::S(key.sk.clone())),
        ])
    }

    fn names_map(names: &AttributeNames) -> Option<HashMap<String, String>> {
        (!names.is_empty()).then(|| names.clone().into_iter().collect())
    }

    fn values_map(values: &Item) -> Option<DynamoItem> {
        (!values.is_empty()).then(|| json_map_to_dynamo(values))
    }
}

#[async_trait]
impl TableBackend for DynamoDbTable {
    async fn get(&self, table: &str, key: &ItemKey) -> dynamo_cri::Result<Option<Item>> {
        let response = self
            .client
            .get_item()
            .table_name(table)
            .set_key(Some(Self::key_attributes(key)))
            .send()
            .await
            .map_err(|e| AwsStorageError::dynamodb(format!("DynamoDB GetItem failed: {}", e)))?;

        Ok(response.item().map(dynamo_to_json_map).transpose()?)
    }

    async fn put(&self, table: &str, item: Item) -> dynamo_cri::Result<()> {
        self.client
            .put_item()
            .table_name(table)
            .set_item(Some(json_map_to_dynamo(&item)))
            .send()
            .await
            .map_err(|e| AwsStorageError::dynamodb(format!("DynamoDB PutItem failed: {}", e)))?;
        Ok(())
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> dynamo_cri::Result<()> {
        self.client
            .delete_item()
            .table_name(table)
            .set_key(Some(Self::key_attributes(key)))
            .send()
            .await
            .map_err(|e| {
                AwsStorageError::dynamodb(format!("DynamoDB DeleteItem failed: {}", e))
            })?;
        Ok(())
    }

    async fn update(&self, request: UpdateRequest) -> dynamo_cri::Result<()> {
        self.client
            .update_item()
            .table_name(&request.table_name)
            .set_key(Some(Self::key_attributes(&request.key)))
            .update_expression(&request.update_expression)
            .set_expression_attribute_names(Self::names_map(&request.expression_attribute_names))
            .set_expression_attribute_values(Self::values_map(
                &request.expression_attribute_values,
            ))
            .send()
            .await
            .map_err(|e| {
                AwsStorageError::dynamodb(format!("DynamoDB UpdateItem failed: {}", e))
            })?;
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> dynamo_cri::Result<QueryOutput> {
        let response = self
            .client
            .query()
            .table_name(&request.table_name)
            .index_name(&request.index_name)
            .key_condition_expression(&request.key_condition_expression)
            .set_expression_attribute_names(Self::names_map(&request.expression_attribute_names))
            .set_expression_attribute_values(Self::values_map(
                &request.expression_attribute_values,
            ))
            .limit(i32::try_from(request.limit).unwrap_or(i32::MAX))
            .set_exclusive_start_key(request.exclusive_start_key.as_ref().map(json_map_to_dynamo))
            .set_scan_index_forward(request.scan_index_forward)
            .set_filter_expression(request.filter_expression.clone())
            .send()
            .await
            .map_err(|e| AwsStorageError::dynamodb(format!("DynamoDB Query failed: {}", e)))?;

        let items = response
            .items()
            .iter()
            .map(dynamo_to_json_map)
            .collect::<Result<Vec<_>>>()?;
        let last_evaluated_key = match response.last_evaluated_key() {
            Some(key) if !key.is_empty() => Some(dynamo_to_json_map(key)?),
            _ => None,
        };

        tracing::trace!(
            table = %request.table_name,
            count = response.count(),
            more = last_evaluated_key.is_some(),
            "query page"
        );
        Ok(QueryOutput {
            count: items.len(),
            items,
            last_evaluated_key,
        })
    }
}

/// Convert a DynamoDB item to a JSON object
///
/// Key order is not preserved by DynamoDB, so the result is sorted by name.
fn dynamo_to_json_map(map: &DynamoItem) -> Result<Item> {
    let mut entries: Vec<(&String, &AttributeValue)> = map.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    entries
        .into_iter()
        .map(|(k, v)| Ok((k.clone(), dynamo_attr_to_json(v)?)))
        .collect()
}

fn number_to_json(n: &str) -> Result<JsonValue> {
    if let Ok(i) = n.parse::<i64>() {
        Ok(JsonValue::Number(i.into()))
    } else if let Ok(u) = n.parse::<u64>() {
        Ok(JsonValue::Number(u.into()))
    } else {
        n.parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(JsonValue::Number)
            .ok_or_else(|| AwsStorageError::unsupported_value(format!("N({n})")))
    }
}

/// Convert a single DynamoDB AttributeValue to JSON
///
/// Sets become arrays; binary values become standard base64 text.
fn dynamo_attr_to_json(attr: &AttributeValue) -> Result<JsonValue> {
    Ok(match attr {
        AttributeValue::S(s) => JsonValue::String(s.clone()),
        AttributeValue::N(n) => number_to_json(n)?,
        AttributeValue::Bool(b) => JsonValue::Bool(*b),
        AttributeValue::Null(_) => JsonValue::Null,
        AttributeValue::B(blob) => JsonValue::String(STANDARD.encode(blob.as_ref())),
        AttributeValue::Ss(set) => JsonValue::Array(set.iter().cloned().map(JsonValue::String).collect()),
        AttributeValue::Ns(set) => JsonValue::Array(
            set.iter()
                .map(|n| number_to_json(n))
                .collect::<Result<_>>()?,
        ),
        AttributeValue::Bs(set) => JsonValue::Array(
            set.iter()
                .map(|blob| JsonValue::String(STANDARD.encode(blob.as_ref())))
                .collect(),
        ),
        AttributeValue::L(list) => JsonValue::Array(
            list.iter()
                .map(dynamo_attr_to_json)
                .collect::<Result<_>>()?,
        ),
        AttributeValue::M(map) => JsonValue::Object(dynamo_to_json_map(map)?),
        other => {
            return Err(AwsStorageError::unsupported_value(format!("{other:?}")));
        }
    })
}

/// Convert a JSON object to a DynamoDB item
fn json_map_to_dynamo(map: &Item) -> DynamoItem {
    map.iter()
        .map(|(k, v)| (k.clone(), json_to_dynamo_attr(v)))
        .collect()
}

/// Convert a single JSON value to a DynamoDB AttributeValue
fn json_to_dynamo_attr(val: &JsonValue) -> AttributeValue {
    match val {
        JsonValue::Null => AttributeValue::Null(true),
        JsonValue::Bool(b) => AttributeValue::Bool(*b),
        JsonValue::Number(n) => AttributeValue::N(n.to_string()),
        JsonValue::String(s) => AttributeValue::S(s.clone()),
        JsonValue::Array(arr) => AttributeValue::L(arr.iter().map(json_to_dynamo_attr).collect()),
        JsonValue::Object(obj) => AttributeValue::M(json_map_to_dynamo(obj)),
    }
}
