//! Entity accessor over the single-table layout
//!
//! A [`Model`] binds one entity's configuration to a storage backend and
//! exposes create/get/update/delete/query plus the three index-maintenance
//! primitives ([`Model::put_index_items`], [`Model::delete_index_items`],
//! [`Model::update_indexes_items`]) that the stream reconciler replays.
//!
//! ## Record layout
//!
//! A primary record stores the entity's key attribute (`gsik`) in `gk` and
//! every other business field flat. Each declared index gets one derived
//! record under the same `pk`, with the indexed value in `gk` and optional
//! projected fields serialized into `__p`.

mod query;
mod unwrap;

pub use query::{KeyCondition, QueryOptions, QueryResult};
pub use unwrap::unwrap_item;

use crate::backend::{AttributeNames, TableBackend, UpdateRequest};
use crate::config::{IndexMaintenance, IndexSpec, ModelConfig, ResolvedConfig};
use crate::cursor;
use crate::error::{CriError, Result};
use crate::keys::{secondary_key, EntityKey, ItemKey};
use crate::schema::{
    ATTR_CREATED_AT, ATTR_GK, ATTR_ID, ATTR_PK, ATTR_PROJECTION, ATTR_SK, ATTR_UPDATED_AT,
    ATTR_VERSION,
};
use crate::Item;
use chrono::{SecondsFormat, Utc};
use serde_json::Value as JsonValue;
use std::sync::Arc;

/// Index fan-out deferred by `delete` and `update`
#[derive(Debug)]
enum Maintenance {
    DeleteIndexes(EntityKey),
    UpdateIndexes(Item),
}

/// Where deferred index maintenance runs, settled before the primary write
enum Runner {
    Inline,
    Spawn(tokio::runtime::Handle),
}

/// Accessor for one entity
#[derive(Clone, Debug)]
pub struct Model {
    config: Arc<ResolvedConfig>,
}

fn key_string(body: &Item, attr: &str) -> Option<String> {
    match body.get(attr)? {
        JsonValue::String(s) if !s.is_empty() => Some(s.clone()),
        JsonValue::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Identity carried by a body: `id`, falling back to `pk`.
fn identity_of(body: &Item) -> Option<String> {
    key_string(body, ATTR_ID).or_else(|| key_string(body, ATTR_PK))
}

/// Value of `attribute` on a body.
///
/// Stored primary records keep the key attribute under `gk`, named by `__v`,
/// so that location is consulted when the attribute itself is absent.
fn source_value<'a>(body: &'a Item, attribute: &str) -> Option<&'a JsonValue> {
    body.get(attribute).or_else(|| {
        match body.get(ATTR_VERSION).and_then(JsonValue::as_str) {
            Some(source) if source == attribute => body.get(ATTR_GK),
            _ => None,
        }
    })
}

fn generate_id() -> String {
    ulid::Ulid::new().to_string().to_lowercase()
}

/// `SET #a = :a, #b = :b` over every field but `id`, in body order.
fn update_expression(body: &Item) -> Result<(String, AttributeNames, Item)> {
    let mut clauses = Vec::new();
    let mut names = AttributeNames::new();
    let mut values = Item::new();

    for (field, value) in body.iter().filter(|(k, _)| k.as_str() != ATTR_ID) {
        clauses.push(format!("#{field} = :{field}"));
        names.insert(format!("#{field}"), field.clone());
        values.insert(format!(":{field}"), value.clone());
    }

    if clauses.is_empty() {
        return Err(CriError::EmptyUpdate);
    }
    Ok((format!("SET {}", clauses.join(", ")), names, values))
}

impl Model {
    /// Build a model from a resolved configuration, validating it first
    pub fn new(config: ResolvedConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
        })
    }

    /// Build a model from `config` with no shared defaults
    pub fn from_config(config: ModelConfig) -> Result<Self> {
        Self::new(config.resolve(&Default::default())?)
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn entity(&self) -> &str {
        &self.config.entity
    }

    pub fn indexes(&self) -> &[IndexSpec] {
        &self.config.indexes
    }

    fn backend(&self) -> &dyn TableBackend {
        self.config.backend.as_ref()
    }

    fn table(&self) -> &str {
        &self.config.table_name
    }

    /// Sort key of this entity's primary records, or of the records derived for `index`
    pub fn secondary_key(&self, index: Option<&str>) -> String {
        secondary_key(self.config.tenant.as_deref(), &self.config.entity, index)
    }

    fn key_for(&self, id: &str, index: Option<&str>) -> ItemKey {
        ItemKey::new(id, self.secondary_key(index))
    }

    /// `createdAt`/`updatedAt` to merge into a body; empty unless date tracking is on.
    fn track_changes(&self, attributes: &Item) -> Item {
        let mut track = Item::new();
        if !self.config.track_dates {
            return track;
        }
        let now = JsonValue::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        track.insert(ATTR_UPDATED_AT.to_string(), now.clone());
        if !attributes.contains_key(ATTR_CREATED_AT) {
            track.insert(ATTR_CREATED_AT.to_string(), now);
        }
        track
    }

    fn needs_index_update(&self, body: &Item) -> bool {
        let tracked = self.config.tracked_fields();
        body.keys().any(|k| tracked.contains(&k.as_str()))
    }

    /// Store a new primary record and return the caller-facing item.
    ///
    /// `attributes.id` is used as the record id when present; otherwise a
    /// fresh ULID is generated. Writes unconditionally.
    pub async fn create(&self, attributes: Item) -> Result<Item> {
        let track = self.track_changes(&attributes);
        let pk = identity_of(&attributes).unwrap_or_else(generate_id);
        let gsik = self.config.gsik.as_str();

        let mut record = Item::new();
        record.insert(ATTR_PK.to_string(), JsonValue::String(pk.clone()));
        record.insert(
            ATTR_SK.to_string(),
            JsonValue::String(self.secondary_key(None)),
        );
        if let Some(gk) = attributes.get(gsik) {
            record.insert(ATTR_GK.to_string(), gk.clone());
        }
        record.insert(ATTR_VERSION.to_string(), JsonValue::String(gsik.to_string()));
        for (field, value) in &attributes {
            if field != ATTR_ID && field != gsik {
                record.insert(field.clone(), value.clone());
            }
        }
        record.extend(track.clone());

        tracing::debug!(entity = %self.entity(), pk = %pk, "create: writing primary record");
        self.backend().put(self.table(), record.clone()).await?;

        if self.config.track_indexes {
            self.put_index_items(&record).await?;
        }

        let mut item = Item::new();
        item.insert(ATTR_ID.to_string(), JsonValue::String(pk));
        item.extend(attributes);
        item.extend(track);
        Ok(item)
    }

    /// Read one record; `Ok(None)` when it does not exist.
    pub async fn get(&self, key: impl Into<EntityKey>) -> Result<Option<Item>> {
        let key = key.into();
        let item_key = self.key_for(&key.id, key.index.as_deref());
        tracing::debug!(entity = %self.entity(), pk = %item_key.pk, sk = %item_key.sk, "get");
        self.backend()
            .get(self.table(), &item_key)
            .await?
            .map(unwrap_item)
            .transpose()
    }

    /// Delete one record, then (with index tracking) its index records.
    pub async fn delete(&self, key: impl Into<EntityKey>) -> Result<()> {
        let key = key.into();
        let item_key = self.key_for(&key.id, key.index.as_deref());
        let runner = self
            .config
            .track_indexes
            .then(|| self.runner())
            .transpose()?;
        tracing::debug!(entity = %self.entity(), pk = %item_key.pk, sk = %item_key.sk, "delete");
        self.backend().delete(self.table(), &item_key).await?;

        if let Some(runner) = runner {
            self.maintain(runner, Maintenance::DeleteIndexes(EntityKey::new(key.id)))
                .await?;
        }
        Ok(())
    }

    /// Set the fields of `body` on the primary record identified by `body.id`.
    pub async fn update(&self, body: Item) -> Result<Item> {
        self.update_at(body, None).await
    }

    /// Set the fields of `body` on the record for `index` (the primary record when `None`).
    ///
    /// Returns the body as sent, plus tracking fields; the stored record is
    /// not re-read.
    pub async fn update_at(&self, mut body: Item, index: Option<&str>) -> Result<Item> {
        let id = key_string(&body, ATTR_ID).ok_or_else(|| CriError::missing_field(ATTR_ID))?;

        if self.config.track_dates {
            let track = self.track_changes(&body);
            body.extend(track);
        }

        let (update_expression, names, values) = update_expression(&body)?;
        let runner = (self.config.track_indexes && self.needs_index_update(&body))
            .then(|| self.runner())
            .transpose()?;
        let key = self.key_for(&id, index);
        tracing::debug!(
            entity = %self.entity(),
            pk = %key.pk,
            sk = %key.sk,
            expression = %update_expression,
            "update"
        );
        self.backend()
            .update(UpdateRequest {
                table_name: self.table().to_string(),
                key,
                update_expression,
                expression_attribute_names: names,
                expression_attribute_values: values,
            })
            .await?;

        if let Some(runner) = runner {
            self.maintain(runner, Maintenance::UpdateIndexes(body.clone()))
                .await?;
        }
        Ok(body)
    }

    /// Query one page of this entity's primary records, or of one index.
    pub async fn query(&self, options: QueryOptions) -> Result<QueryResult> {
        let sk = self.secondary_key(options.index.as_deref());
        let request = query::build_request(self.table(), &self.config.index_name, sk, &options)?;
        tracing::debug!(
            entity = %self.entity(),
            index = ?options.index,
            key_condition = %request.key_condition_expression,
            limit = request.limit,
            "query"
        );
        let output = self.backend().query(request).await?;

        let records = if options.unwrap_index_items && options.index.is_some() {
            self.primary_records(&output.items).await?
        } else {
            output.items
        };

        let items = records
            .into_iter()
            .map(unwrap_item)
            .collect::<Result<Vec<_>>>()?;
        let offset = output
            .last_evaluated_key
            .as_ref()
            .map(cursor::encode)
            .transpose()?;

        Ok(QueryResult {
            items,
            count: output.count,
            offset,
        })
    }

    /// Fetch the primary record behind each index record, concurrently.
    ///
    /// Index records whose primary record is gone are dropped.
    async fn primary_records(&self, index_items: &[Item]) -> Result<Vec<Item>> {
        let lookups = index_items.iter().map(|item| async move {
            match item.get(ATTR_PK).and_then(JsonValue::as_str) {
                Some(pk) => self.backend().get(self.table(), &self.key_for(pk, None)).await,
                None => Ok(None),
            }
        });
        let fetched = futures::future::try_join_all(lookups).await?;

        Ok(fetched
            .into_iter()
            .zip(index_items)
            .filter_map(|(primary, index_item)| {
                if primary.is_none() {
                    tracing::debug!(
                        entity = %self.entity(),
                        pk = ?index_item.get(ATTR_PK),
                        "query: index record without primary record"
                    );
                }
                primary
            })
            .collect())
    }

    /// Write one index record per declared index, in declaration order.
    ///
    /// `body` is either a primary record (`pk`) or a caller-shaped item (`id`).
    pub async fn put_index_items(&self, body: &Item) -> Result<()> {
        let pk = identity_of(body).ok_or_else(|| CriError::missing_field(ATTR_PK))?;

        for index in &self.config.indexes {
            let name = index.index_name.as_str();
            let mut item = Item::new();
            item.insert(ATTR_PK.to_string(), JsonValue::String(pk.clone()));
            item.insert(
                ATTR_SK.to_string(),
                JsonValue::String(self.secondary_key(Some(name))),
            );
            if let Some(gk) = source_value(body, name) {
                item.insert(ATTR_GK.to_string(), gk.clone());
            }
            item.insert(ATTR_VERSION.to_string(), JsonValue::String(name.to_string()));

            let projections = index.projected_fields();
            if !projections.is_empty() {
                let projected: Item = projections
                    .iter()
                    .filter_map(|field| {
                        source_value(body, field).map(|v| (field.clone(), v.clone()))
                    })
                    .collect();
                item.insert(
                    ATTR_PROJECTION.to_string(),
                    JsonValue::String(serde_json::to_string(&projected)?),
                );
            }

            tracing::debug!(entity = %self.entity(), pk = %pk, index = %name, "put index record");
            self.backend().put(self.table(), item).await?;
        }
        Ok(())
    }

    /// Delete every declared index record for `key.id`, in declaration order.
    pub async fn delete_index_items(&self, key: impl Into<EntityKey>) -> Result<()> {
        let key = key.into();
        for index in &self.config.indexes {
            let item_key = self.key_for(&key.id, Some(&index.index_name));
            tracing::debug!(entity = %self.entity(), pk = %key.id, index = %index.index_name, "delete index record");
            self.backend().delete(self.table(), &item_key).await?;
        }
        Ok(())
    }

    /// Rewrite all index records from the stored primary record when `body`
    /// touches an indexed or projected field; otherwise do nothing.
    pub async fn update_indexes_items(&self, body: &Item) -> Result<()> {
        if !self.needs_index_update(body) {
            return Ok(());
        }
        let id = identity_of(body).ok_or_else(|| CriError::missing_field(ATTR_ID))?;

        match self.backend().get(self.table(), &self.key_for(&id, None)).await? {
            Some(record) => self.put_index_items(&record).await,
            None => {
                tracing::debug!(entity = %self.entity(), pk = %id, "primary record gone; index records left as is");
                Ok(())
            }
        }
    }

    async fn run(&self, task: Maintenance) -> Result<()> {
        match task {
            Maintenance::DeleteIndexes(key) => self.delete_index_items(key).await,
            Maintenance::UpdateIndexes(body) => self.update_indexes_items(&body).await,
        }
    }

    /// Background maintenance needs a Tokio runtime to spawn onto.
    fn runner(&self) -> Result<Runner> {
        match self.config.maintenance {
            IndexMaintenance::Awaited => Ok(Runner::Inline),
            IndexMaintenance::Background => tokio::runtime::Handle::try_current()
                .map(Runner::Spawn)
                .map_err(|_| {
                    CriError::invalid_config("background index maintenance requires a Tokio runtime")
                }),
        }
    }

    async fn maintain(&self, runner: Runner, task: Maintenance) -> Result<()> {
        match runner {
            Runner::Inline => self.run(task).await,
            Runner::Spawn(handle) => {
                let model = self.clone();
                handle.spawn(async move {
                    if let Err(e) = model.run(task).await {
                        tracing::warn!(
                            entity = %model.entity(),
                            error = %e,
                            "background index maintenance failed"
                        );
                    }
                });
                Ok(())
            }
        }
    }
}
