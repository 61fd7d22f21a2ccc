//! Change-stream reconciliation against the in-memory backend

mod support;

use dynamo_cri::memory::{BackendCall, OpKind};
use dynamo_cri::{
    process_event, process_records, CriError, IndexMaintainer, ItemKey, MemoryTable, Model,
    ModelConfig, StreamEvent, StreamRecord,
};
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use support::{entity_config, item, model, TABLE};

fn record(value: JsonValue) -> StreamRecord {
    serde_json::from_value(value).expect("stream record")
}

fn insert(pk: &str, sk: &str) -> StreamRecord {
    record(json!({
        "eventName": "INSERT",
        "dynamodb": {
            "Keys": {"pk": {"S": pk}, "sk": {"S": sk}},
            "NewImage": {
                "pk": {"S": pk},
                "sk": {"S": sk},
                "gk": {"S": "SomeName"},
                "__v": {"S": "name"},
                "email": {"S": "a@b.com"},
                "document": {"S": "123.456.789-9"}
            }
        }
    }))
}

fn remove(pk: &str, sk: &str) -> StreamRecord {
    record(json!({
        "eventName": "REMOVE",
        "dynamodb": {
            "Keys": {"pk": {"S": pk}, "sk": {"S": sk}},
            "OldImage": {"pk": {"S": pk}, "sk": {"S": sk}}
        }
    }))
}

#[tokio::test]
async fn insert_writes_declared_index_records() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    process_records(&[&users], &[insert("X", "TestTenant|testEntity")])
        .await
        .expect("reconcile");

    assert_eq!(
        backend.put_items(),
        vec![
            item(json!({
                "pk": "X", "sk": "TestTenant|testEntity|email", "gk": "a@b.com", "__v": "email",
                "__p": "{\"document\":\"123.456.789-9\"}"
            })),
            item(json!({
                "pk": "X", "sk": "TestTenant|testEntity|document", "gk": "123.456.789-9",
                "__v": "document"
            })),
        ]
    );
}

#[tokio::test]
async fn modify_rereads_primary_record() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());
    backend
        .insert(
            TABLE,
            item(json!({
                "pk": "X", "sk": "TestTenant|testEntity", "gk": "SomeName", "__v": "name",
                "email": "new@b.com", "document": "1"
            })),
        )
        .expect("seed");

    let modify = record(json!({
        "eventName": "MODIFY",
        "dynamodb": {
            "Keys": {"pk": {"S": "X"}, "sk": {"S": "TestTenant|testEntity"}},
            "NewImage": {"pk": {"S": "X"}, "email": {"S": "new@b.com"}}
        }
    }));
    process_records(&[&users], &[modify]).await.expect("reconcile");

    let kinds: Vec<OpKind> = backend.calls().iter().map(BackendCall::kind).collect();
    assert_eq!(kinds, vec![OpKind::Get, OpKind::Put, OpKind::Put]);
    assert_eq!(
        backend.row(TABLE, "X", "TestTenant|testEntity|email").expect("email")["gk"],
        "new@b.com"
    );
}

#[tokio::test]
async fn remove_deletes_index_records() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    process_records(&[&users], &[remove("X", "TestTenant|testEntity")])
        .await
        .expect("reconcile");
    assert_eq!(
        backend.deleted_keys(),
        vec![
            ItemKey::new("X", "TestTenant|testEntity|email"),
            ItemKey::new("X", "TestTenant|testEntity|document"),
        ]
    );
}

#[tokio::test]
async fn unknown_entity_fails_whole_batch_without_writes() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    let err = process_records(
        &[&users],
        &[
            insert("X", "TestTenant|testEntity"),
            insert("Y", "TestTenant|otherEntity"),
        ],
    )
    .await
    .unwrap_err();

    assert!(matches!(&err, CriError::NoModelForEntity(e) if e == "otherEntity"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn index_records_echoed_by_the_stream_are_skipped() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    process_records(
        &[&users],
        &[
            insert("X", "TestTenant|testEntity|email"),
            remove("X", "TestTenant|testEntity|document"),
        ],
    )
    .await
    .expect("reconcile");
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn sort_key_without_entity_is_malformed() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    let err = process_records(&[&users], &[insert("X", "TestTenant|")])
        .await
        .unwrap_err();
    assert!(matches!(err, CriError::MalformedRecord(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn records_route_to_the_accessor_for_their_tenant() {
    let backend = MemoryTable::new();
    let tenant_a = model(&backend, entity_config().with_tenant("TenantA"));
    let tenant_b = model(&backend, entity_config().with_tenant("TenantB"));
    let maintainers: [&dyn IndexMaintainer; 2] = [&tenant_a, &tenant_b];

    process_records(
        &maintainers,
        &[insert("X", "TenantB|testEntity"), remove("Y", "TenantA|testEntity")],
    )
    .await
    .expect("reconcile");

    let put_sks: Vec<String> = backend
        .put_items()
        .iter()
        .filter_map(|put| put["sk"].as_str().map(str::to_string))
        .collect();
    assert_eq!(
        put_sks,
        ["TenantB|testEntity|email", "TenantB|testEntity|document"]
    );
    assert_eq!(
        backend.deleted_keys(),
        vec![
            ItemKey::new("Y", "TenantA|testEntity|email"),
            ItemKey::new("Y", "TenantA|testEntity|document"),
        ]
    );
}

#[tokio::test]
async fn unknown_tenant_fails_whole_batch_without_writes() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    let err = process_records(
        &[&users],
        &[
            insert("X", "TestTenant|testEntity"),
            insert("Y", "OtherTenant|testEntity"),
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(&err, CriError::NoModelForEntity(e) if e == "testEntity"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn records_without_tenant_are_reconciled() {
    let backend = MemoryTable::new();
    let users = Model::from_config(
        entity_config()
            .with_table_name(TABLE)
            .with_backend(Arc::new(backend.clone())),
    )
    .expect("model without tenant");

    process_records(
        &[&users],
        &[
            insert("X", "testEntity"),
            insert("X", "testEntity|email"),
            remove("Y", "testEntity"),
        ],
    )
    .await
    .expect("reconcile");

    assert_eq!(backend.put_items().len(), 2);
    assert_eq!(backend.put_items()[0]["sk"], "testEntity|email");
    assert_eq!(
        backend.deleted_keys(),
        vec![
            ItemKey::new("Y", "testEntity|email"),
            ItemKey::new("Y", "testEntity|document"),
        ]
    );
}

#[tokio::test]
async fn records_route_to_their_own_entity() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());
    let orders = model(
        &backend,
        ModelConfig::new("order", "number").with_index(dynamo_cri::IndexSpec::new("email")),
    );
    let maintainers: [&dyn IndexMaintainer; 2] = [&users, &orders];

    process_records(
        &maintainers,
        &[remove("O1", "TestTenant|order"), remove("X", "TestTenant|testEntity")],
    )
    .await
    .expect("reconcile");
    assert_eq!(
        backend.deleted_keys(),
        vec![
            ItemKey::new("O1", "TestTenant|order|email"),
            ItemKey::new("X", "TestTenant|testEntity|email"),
            ItemKey::new("X", "TestTenant|testEntity|document"),
        ]
    );
}

#[tokio::test]
async fn failed_write_stops_the_batch() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());
    backend.fail_after(OpKind::Put, 1);

    let err = process_records(
        &[&users],
        &[
            insert("X", "TestTenant|testEntity"),
            insert("Y", "TestTenant|testEntity"),
        ],
    )
    .await
    .unwrap_err();
    assert!(matches!(err, CriError::Backend(_)));
    let pks: Vec<String> = backend
        .put_items()
        .iter()
        .filter_map(|put| put["pk"].as_str().map(str::to_string))
        .collect();
    assert_eq!(pks, ["X", "X"]);
}

#[tokio::test]
async fn lambda_event_is_processed_in_order() {
    let backend = MemoryTable::new();
    let users = model(&backend, entity_config());

    let event: StreamEvent = serde_json::from_value(json!({
        "Records": [
            {
                "eventID": "1",
                "eventName": "INSERT",
                "eventSource": "aws:dynamodb",
                "dynamodb": {
                    "Keys": {"pk": {"S": "X"}, "sk": {"S": "TestTenant|testEntity"}},
                    "NewImage": {
                        "pk": {"S": "X"},
                        "gk": {"S": "SomeName"},
                        "__v": {"S": "name"},
                        "email": {"S": "a@b.com"},
                        "document": {"N": "123"}
                    },
                    "StreamViewType": "NEW_AND_OLD_IMAGES"
                }
            },
            {
                "eventID": "2",
                "eventName": "SOMETHING_ELSE",
                "dynamodb": {"Keys": {"pk": {"S": "X"}, "sk": {"S": "TestTenant|testEntity"}}}
            },
            {
                "eventID": "3",
                "eventName": "REMOVE",
                "dynamodb": {"Keys": {"pk": {"S": "X"}, "sk": {"S": "TestTenant|testEntity"}}}
            }
        ]
    }))
    .expect("event");

    process_event(&[&users], &event).await.expect("reconcile");

    let kinds: Vec<OpKind> = backend.calls().iter().map(BackendCall::kind).collect();
    assert_eq!(
        kinds,
        vec![OpKind::Put, OpKind::Put, OpKind::Delete, OpKind::Delete]
    );
    assert_eq!(backend.put_items()[1]["gk"], 123);
    assert!(backend.rows(TABLE).is_empty());
}
