//! Shared test harness for dynamo-cri integration tests.

// Not every test crate uses every helper.
#![allow(dead_code)]

use dynamo_cri::{
    Defaults, GlobalConfig, IndexMaintenance, IndexSpec, Item, MemoryTable, Model, ModelConfig,
};
use serde_json::Value as JsonValue;
use std::sync::Arc;
use std::time::Duration;

pub const TABLE: &str = "TestTable";
pub const INDEX: &str = "TestIndex";
pub const TENANT: &str = "TestTenant";
pub const ENTITY: &str = "testEntity";

// =============================================================================
// Logging
// =============================================================================

/// Install a test-writer subscriber once per test binary; `RUST_LOG` controls verbosity.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Items
// =============================================================================

/// JSON object literal to [`Item`]
pub fn item(value: JsonValue) -> Item {
    match value {
        JsonValue::Object(map) => map,
        other => panic!("expected a JSON object, got {other}"),
    }
}

// =============================================================================
// Models
// =============================================================================

/// Defaults pointing at the shared test table on `backend`
pub fn defaults(backend: &MemoryTable) -> Defaults {
    Defaults::new(
        GlobalConfig::new()
            .with_table_name(TABLE)
            .with_index_name(INDEX)
            .with_tenant(TENANT)
            .with_backend(Arc::new(backend.clone())),
    )
}

/// `testEntity` keyed by `name`, indexed by `email` (projecting `document`) and `document`
pub fn entity_config() -> ModelConfig {
    ModelConfig::new(ENTITY, "name")
        .with_index(IndexSpec::new("email").with_projections(["document"]))
        .with_index(IndexSpec::new("document"))
}

pub fn model(backend: &MemoryTable, config: ModelConfig) -> Model {
    init_tracing();
    defaults(backend).model(config).expect("build model")
}

/// The standard entity with inline index maintenance
pub fn tracked_model(backend: &MemoryTable) -> Model {
    model(backend, entity_config().track_indexes(true))
}

pub fn background_model(backend: &MemoryTable) -> Model {
    model(
        backend,
        entity_config()
            .track_indexes(true)
            .with_maintenance(IndexMaintenance::Background),
    )
}

// =============================================================================
// Async helpers
// =============================================================================

/// Poll `condition` until it holds or a second has passed.
pub async fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}
