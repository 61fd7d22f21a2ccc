//! Configuration for models
//!
//! Two layers:
//!
//! - [`GlobalConfig`]: defaults shared by every model (table, index, tenant,
//!   backend). Held by a [`Defaults`] handle that callers create and pass
//!   around explicitly.
//! - [`ModelConfig`]: one entity's settings. Any of the shared fields set here
//!   override the defaults field-by-field.
//!
//! Resolution happens once, when a [`Model`] is built; later changes to the
//! defaults do not affect models that already exist.

use crate::backend::TableBackend;
use crate::error::{CriError, Result};
use crate::model::Model;
use crate::schema::{DEFAULT_INDEX_NAME, KEY_SEPARATOR};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Shared backend handle
pub type BackendRef = Arc<dyn TableBackend>;

/// Defaults applied under every model's own settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GlobalConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    #[serde(skip)]
    pub backend: Option<BackendRef>,
}

impl GlobalConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Overlay `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: GlobalConfig) -> GlobalConfig {
        GlobalConfig {
            table_name: overrides.table_name.or(self.table_name),
            index_name: overrides.index_name.or(self.index_name),
            tenant: overrides.tenant.or(self.tenant),
            backend: overrides.backend.or(self.backend),
        }
    }
}

/// Shared, mutable holder for [`GlobalConfig`]
///
/// Cloning the handle shares the underlying defaults.
#[derive(Clone, Debug, Default)]
pub struct Defaults {
    inner: Arc<RwLock<GlobalConfig>>,
}

impl Defaults {
    pub fn new(config: GlobalConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
        }
    }

    /// Merge `options` into the defaults and return the result
    pub fn configure(&self, options: GlobalConfig) -> GlobalConfig {
        let mut guard = self.inner.write();
        let merged = std::mem::take(&mut *guard).merge(options);
        *guard = merged.clone();
        merged
    }

    /// Copy of the current defaults
    pub fn snapshot(&self) -> GlobalConfig {
        self.inner.read().clone()
    }

    /// Build a model from `config` resolved over the current defaults
    pub fn model(&self, config: ModelConfig) -> Result<Model> {
        Model::new(config.resolve(&self.snapshot())?)
    }
}

/// A declared secondary index
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSpec {
    /// Attribute indexed; also the index's sort key suffix
    pub index_name: String,
    /// Attributes copied onto the index record under `__p`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub projections: Option<Vec<String>>,
}

impl IndexSpec {
    pub fn new(index_name: impl Into<String>) -> Self {
        Self {
            index_name: index_name.into(),
            projections: None,
        }
    }

    pub fn with_projections<I, S>(mut self, projections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.projections = Some(projections.into_iter().map(Into::into).collect());
        self
    }

    /// Declared projections; empty when none
    pub fn projected_fields(&self) -> &[String] {
        self.projections.as_deref().unwrap_or_default()
    }
}

/// How `delete` and `update` run their index fan-out
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexMaintenance {
    /// Fan-out completes before the operation returns; failures reach the caller
    #[default]
    Awaited,
    /// Fan-out runs on a spawned Tokio task; failures are logged
    Background,
}

/// One entity's settings
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant: Option<String>,
    pub entity: String,
    /// Attribute whose value becomes the primary record's `gk`
    pub gsik: String,
    #[serde(default)]
    pub indexes: Vec<IndexSpec>,
    #[serde(default)]
    pub track_dates: bool,
    #[serde(default)]
    pub track_indexes: bool,
    #[serde(default)]
    pub maintenance: IndexMaintenance,
    #[serde(skip)]
    pub backend: Option<BackendRef>,
}

impl ModelConfig {
    pub fn new(entity: impl Into<String>, gsik: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            gsik: gsik.into(),
            ..Default::default()
        }
    }

    pub fn with_table_name(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }

    pub fn with_index_name(mut self, index_name: impl Into<String>) -> Self {
        self.index_name = Some(index_name.into());
        self
    }

    pub fn with_tenant(mut self, tenant: impl Into<String>) -> Self {
        self.tenant = Some(tenant.into());
        self
    }

    pub fn with_index(mut self, index: IndexSpec) -> Self {
        self.indexes.push(index);
        self
    }

    pub fn with_indexes(mut self, indexes: impl IntoIterator<Item = IndexSpec>) -> Self {
        self.indexes.extend(indexes);
        self
    }

    pub fn track_dates(mut self, enabled: bool) -> Self {
        self.track_dates = enabled;
        self
    }

    pub fn track_indexes(mut self, enabled: bool) -> Self {
        self.track_indexes = enabled;
        self
    }

    pub fn with_maintenance(mut self, maintenance: IndexMaintenance) -> Self {
        self.maintenance = maintenance;
        self
    }

    pub fn with_backend(mut self, backend: BackendRef) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Resolve over `defaults`, validating required fields
    pub fn resolve(self, defaults: &GlobalConfig) -> Result<ResolvedConfig> {
        let shared = defaults.clone().merge(GlobalConfig {
            table_name: self.table_name,
            index_name: self.index_name,
            tenant: self.tenant,
            backend: self.backend,
        });

        let table_name = shared.table_name.unwrap_or_default();
        let backend = shared
            .backend
            .ok_or_else(|| CriError::invalid_config("a storage backend is required"))?;
        let tenant = shared.tenant.filter(|t| !t.is_empty());

        ResolvedConfig {
            table_name,
            index_name: shared
                .index_name
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            tenant,
            entity: self.entity,
            gsik: self.gsik,
            indexes: self.indexes,
            track_dates: self.track_dates,
            track_indexes: self.track_indexes,
            maintenance: self.maintenance,
            backend,
        }
        .validated()
    }
}

fn require(field: &str, value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(CriError::invalid_config(format!("{field} is required")));
    }
    Ok(())
}

fn no_separator(field: &str, value: &str) -> Result<()> {
    if value.contains(KEY_SEPARATOR) {
        return Err(CriError::invalid_config(format!(
            "{field} '{value}' must not contain '{KEY_SEPARATOR}'"
        )));
    }
    Ok(())
}

/// Fully resolved model settings
#[derive(Clone, Debug)]
pub struct ResolvedConfig {
    pub table_name: String,
    pub index_name: String,
    pub tenant: Option<String>,
    pub entity: String,
    pub gsik: String,
    pub indexes: Vec<IndexSpec>,
    pub track_dates: bool,
    pub track_indexes: bool,
    pub maintenance: IndexMaintenance,
    pub backend: BackendRef,
}

impl ResolvedConfig {
    /// Check required fields and that no key segment contains the separator.
    pub fn validate(&self) -> Result<()> {
        require("entity", &self.entity)?;
        require("gsik", &self.gsik)?;
        if self.table_name.is_empty() {
            return Err(CriError::invalid_config("tableName is required"));
        }
        require("indexName", &self.index_name)?;
        if let Some(tenant) = &self.tenant {
            no_separator("tenant", tenant)?;
        }
        no_separator("entity", &self.entity)?;
        for index in &self.indexes {
            require("indexName", &index.index_name)?;
            no_separator("indexName", &index.index_name)?;
        }
        Ok(())
    }

    fn validated(self) -> Result<Self> {
        self.validate()?;
        Ok(self)
    }

    /// Index names plus every projected field, deduplicated in declaration order.
    ///
    /// A change to any of these requires the index records to be rewritten.
    pub fn tracked_fields(&self) -> Vec<&str> {
        let mut fields: Vec<&str> = Vec::new();
        for index in &self.indexes {
            let names = std::iter::once(index.index_name.as_str())
                .chain(index.projected_fields().iter().map(String::as_str));
            for name in names {
                if !fields.contains(&name) {
                    fields.push(name);
                }
            }
        }
        fields
    }
}
