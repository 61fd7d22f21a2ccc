//! In-memory table backend for testing
//!
//! Stores rows per table in a `HashMap` behind `Arc<RwLock>` and evaluates the
//! key-condition, filter and `SET` expressions the models emit, so the whole
//! model surface can run without a database. Every call is recorded in
//! issue order, and failures can be injected per operation kind.

mod expr;

use crate::backend::{QueryOutput, QueryRequest, TableBackend, UpdateRequest};
use crate::error::{CriError, Result};
use crate::keys::ItemKey;
use crate::schema::{ATTR_GK, ATTR_PK, ATTR_SK};
use crate::Item;
use async_trait::async_trait;
use expr::{sort_key_order, Assignments, Condition};
use parking_lot::{Mutex, RwLock};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

/// Kind of backend operation, used for call filtering and failure injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OpKind {
    Get,
    Put,
    Delete,
    Update,
    Query,
}

/// One recorded backend call
#[derive(Clone, Debug, PartialEq)]
pub enum BackendCall {
    Get { table: String, key: ItemKey },
    Put { table: String, item: Item },
    Delete { table: String, key: ItemKey },
    Update(UpdateRequest),
    Query(QueryRequest),
}

impl BackendCall {
    pub fn kind(&self) -> OpKind {
        match self {
            BackendCall::Get { .. } => OpKind::Get,
            BackendCall::Put { .. } => OpKind::Put,
            BackendCall::Delete { .. } => OpKind::Delete,
            BackendCall::Update(_) => OpKind::Update,
            BackendCall::Query(_) => OpKind::Query,
        }
    }
}

type Rows = BTreeMap<(String, String), Item>;

/// In-memory table backend
#[derive(Clone, Default)]
pub struct MemoryTable {
    tables: Arc<RwLock<HashMap<String, Rows>>>,
    calls: Arc<Mutex<Vec<BackendCall>>>,
    /// Remaining successful calls per kind before injected failures start
    failures: Arc<Mutex<HashMap<OpKind, usize>>>,
}

impl Debug for MemoryTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        f.debug_struct("MemoryTable")
            .field("table_count", &tables.len())
            .field("row_count", &tables.values().map(BTreeMap::len).sum::<usize>())
            .field("call_count", &self.calls.lock().len())
            .finish()
    }
}

impl MemoryTable {
    /// Create a new empty backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a row without recording a call
    pub fn insert(&self, table: &str, item: Item) -> Result<()> {
        let key = row_key(&item)?;
        self.tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(key, item);
        Ok(())
    }

    /// Read a row without recording a call
    pub fn row(&self, table: &str, pk: &str, sk: &str) -> Option<Item> {
        self.tables
            .read()
            .get(table)?
            .get(&(pk.to_string(), sk.to_string()))
            .cloned()
    }

    /// All rows of a table, ordered by `(pk, sk)`
    pub fn rows(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .get(table)
            .map(|rows| rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every call issued so far, in order
    pub fn calls(&self) -> Vec<BackendCall> {
        self.calls.lock().clone()
    }

    /// Calls of one kind, in order
    pub fn calls_of(&self, kind: OpKind) -> Vec<BackendCall> {
        self.calls
            .lock()
            .iter()
            .filter(|c| c.kind() == kind)
            .cloned()
            .collect()
    }

    /// Items passed to `put`, in order
    pub fn put_items(&self) -> Vec<Item> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Put { item, .. } => Some(item.clone()),
                _ => None,
            })
            .collect()
    }

    /// Keys passed to `delete`, in order
    pub fn deleted_keys(&self) -> Vec<ItemKey> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                BackendCall::Delete { key, .. } => Some(key.clone()),
                _ => None,
            })
            .collect()
    }

    /// Forget recorded calls (rows are kept)
    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    /// Let `successes` more calls of `kind` through, then fail every later one
    pub fn fail_after(&self, kind: OpKind, successes: usize) {
        self.failures.lock().insert(kind, successes);
    }

    /// Stop injecting failures
    pub fn clear_failures(&self) {
        self.failures.lock().clear();
    }

    fn record(&self, call: BackendCall) -> Result<()> {
        let kind = call.kind();
        self.calls.lock().push(call);
        let mut failures = self.failures.lock();
        match failures.get_mut(&kind) {
            Some(0) => Err(CriError::backend(format!("injected {kind:?} failure"))),
            Some(remaining) => {
                *remaining -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

fn row_key(item: &Item) -> Result<(String, String)> {
    let key = ItemKey::from_item(item).ok_or_else(|| {
        CriError::backend("ValidationException: item is missing a string pk or sk")
    })?;
    Ok((key.pk, key.sk))
}

/// Order index entries by `gk`, then `pk` for a stable total order
fn index_order(a: &Item, b: &Item) -> Ordering {
    let gk = |i: &Item| i.get(ATTR_GK).cloned().unwrap_or_default();
    let pk = |i: &Item| {
        i.get(ATTR_PK)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    sort_key_order(&gk(a), &gk(b)).then_with(|| pk(a).cmp(&pk(b)))
}

fn last_evaluated_key(item: &Item) -> Item {
    [ATTR_PK, ATTR_SK, ATTR_GK]
        .into_iter()
        .filter_map(|attr| item.get(attr).map(|v| (attr.to_string(), v.clone())))
        .collect()
}

#[async_trait]
impl TableBackend for MemoryTable {
    async fn get(&self, table: &str, key: &ItemKey) -> Result<Option<Item>> {
        self.record(BackendCall::Get {
            table: table.to_string(),
            key: key.clone(),
        })?;
        Ok(self.row(table, &key.pk, &key.sk))
    }

    async fn put(&self, table: &str, item: Item) -> Result<()> {
        self.record(BackendCall::Put {
            table: table.to_string(),
            item: item.clone(),
        })?;
        self.insert(table, item)
    }

    async fn delete(&self, table: &str, key: &ItemKey) -> Result<()> {
        self.record(BackendCall::Delete {
            table: table.to_string(),
            key: key.clone(),
        })?;
        if let Some(rows) = self.tables.write().get_mut(table) {
            rows.remove(&(key.pk.clone(), key.sk.clone()));
        }
        Ok(())
    }

    async fn update(&self, request: UpdateRequest) -> Result<()> {
        self.record(BackendCall::Update(request.clone()))?;
        let assignments = Assignments::parse(
            &request.update_expression,
            &request.expression_attribute_names,
            &request.expression_attribute_values,
        )?;

        let mut tables = self.tables.write();
        let rows = tables.entry(request.table_name.clone()).or_default();
        let row = rows
            .entry((request.key.pk.clone(), request.key.sk.clone()))
            .or_insert_with(|| request.key.to_item());
        assignments.apply(row);
        Ok(())
    }

    async fn query(&self, request: QueryRequest) -> Result<QueryOutput> {
        self.record(BackendCall::Query(request.clone()))?;
        if request.limit == 0 {
            return Err(CriError::backend(
                "ValidationException: Limit must be greater than or equal to 1",
            ));
        }

        let key_condition = Condition::parse(
            &request.key_condition_expression,
            &request.expression_attribute_names,
            &request.expression_attribute_values,
        )?;
        if key_condition.equality_on(ATTR_SK).is_none() {
            return Err(CriError::backend(
                "ValidationException: key condition must pin the index partition key",
            ));
        }
        let filter = request
            .filter_expression
            .as_deref()
            .map(|expr| {
                Condition::parse(
                    expr,
                    &request.expression_attribute_names,
                    &request.expression_attribute_values,
                )
            })
            .transpose()?;

        // Rows without a gk are not projected into the index
        let mut candidates: Vec<Item> = self
            .tables
            .read()
            .get(&request.table_name)
            .map(|rows| {
                rows.values()
                    .filter(|item| item.contains_key(ATTR_GK) && key_condition.matches(item))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        candidates.sort_by(index_order);
        if request.scan_index_forward == Some(false) {
            candidates.reverse();
        }

        if let Some(start) = &request.exclusive_start_key {
            if !start.contains_key(ATTR_GK) || !start.contains_key(ATTR_PK) {
                return Err(CriError::backend(
                    "ValidationException: ExclusiveStartKey must carry pk and gk",
                ));
            }
            let forward = request.scan_index_forward != Some(false);
            candidates.retain(|item| {
                let ordering = index_order(item, start);
                if forward {
                    ordering == Ordering::Greater
                } else {
                    ordering == Ordering::Less
                }
            });
        }

        let limit = request.limit as usize;
        let has_more = candidates.len() > limit;
        candidates.truncate(limit);
        let last_evaluated_key = if has_more {
            candidates.last().map(last_evaluated_key)
        } else {
            None
        };

        let items: Vec<Item> = match &filter {
            Some(filter) => candidates.into_iter().filter(|i| filter.matches(i)).collect(),
            None => candidates,
        };

        Ok(QueryOutput {
            count: items.len(),
            items,
            last_evaluated_key,
        })
    }
}
