//! Model::query: key conditions, pagination, filters, index unwrapping

mod support;

use dynamo_cri::memory::{BackendCall, OpKind};
use dynamo_cri::{CriError, KeyCondition, MemoryTable, Model, QueryOptions, QueryResult};
use serde_json::json;
use std::collections::HashSet;
use support::{item, model, tracked_model, INDEX, TABLE};

const NAMES: [&str; 5] = ["Alice", "Bob", "Carol", "Dave", "Erin"];

async fn seeded(backend: &MemoryTable) -> Model {
    let users = tracked_model(backend);
    for (i, name) in NAMES.iter().enumerate() {
        users
            .create(item(json!({
                "id": format!("u{i}"),
                "name": name,
                "email": format!("{}@example.com", name.to_lowercase()),
                "document": format!("d-{}", i % 2)
            })))
            .await
            .expect("seed");
    }
    backend.clear_calls();
    users
}

fn names(result: &QueryResult, field: &str) -> Vec<String> {
    result
        .items
        .iter()
        .map(|i| i[field].as_str().expect("string field").to_string())
        .collect()
}

fn last_query(backend: &MemoryTable) -> dynamo_cri::QueryRequest {
    match backend.calls_of(OpKind::Query).pop() {
        Some(BackendCall::Query(request)) => request,
        other => panic!("expected a query call, got {other:?}"),
    }
}

#[tokio::test]
async fn query_defaults_to_primary_records() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users.query(QueryOptions::new()).await.expect("query");
    assert_eq!(names(&result, "name"), NAMES);
    assert_eq!(result.count, 5);
    assert!(result.offset.is_none());
    assert_eq!(
        result.items[0],
        item(json!({
            "name": "Alice", "id": "u0", "email": "alice@example.com", "document": "d-0"
        }))
    );

    let request = last_query(&backend);
    assert_eq!(request.table_name, TABLE);
    assert_eq!(request.index_name, INDEX);
    assert_eq!(request.limit, 100);
    assert_eq!(request.key_condition_expression, "#sk = :sk");
    assert_eq!(
        request.expression_attribute_values[":sk"],
        "TestTenant|testEntity"
    );
}

#[tokio::test]
async fn query_with_key_condition() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users
        .query(QueryOptions::new().key_condition(KeyCondition::gt("Bob")))
        .await
        .expect("query");
    assert_eq!(names(&result, "name"), ["Carol", "Dave", "Erin"]);

    let result = users
        .query(QueryOptions::new().key_condition(KeyCondition::begins_with("Da")))
        .await
        .expect("query");
    assert_eq!(names(&result, "name"), ["Dave"]);
    assert_eq!(
        last_query(&backend).key_condition_expression,
        "#sk = :sk and begins_with(#key, :key)"
    );
}

#[tokio::test]
async fn query_descending() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users
        .query(QueryOptions::new().scan_index_forward(false).limit(2))
        .await
        .expect("query");
    assert_eq!(names(&result, "name"), ["Erin", "Dave"]);
    assert!(result.offset.is_some());
}

#[tokio::test]
async fn pagination_visits_every_record_once() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let mut seen = Vec::new();
    let mut offset = None;
    let mut pages = 0;
    loop {
        let mut options = QueryOptions::new().limit(2);
        if let Some(offset) = offset.take() {
            options = options.offset(offset);
        }
        let page = users.query(options).await.expect("page");
        pages += 1;
        seen.extend(names(&page, "id"));
        match page.offset {
            Some(next) => offset = Some(next),
            None => break,
        }
    }

    assert_eq!(pages, 3);
    assert_eq!(seen, ["u0", "u1", "u2", "u3", "u4"]);
    assert_eq!(seen.iter().collect::<HashSet<_>>().len(), 5);
}

#[tokio::test]
async fn offset_is_merged_with_current_sort_key() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let first = users
        .query(QueryOptions::new().limit(1))
        .await
        .expect("first page");
    let offset = first.offset.expect("more pages");

    users
        .query(QueryOptions::new().limit(1).offset(offset))
        .await
        .expect("second page");
    let start = last_query(&backend)
        .exclusive_start_key
        .expect("exclusive start key");
    assert_eq!(start["sk"], "TestTenant|testEntity");
    assert_eq!(start["pk"], "u0");
    assert_eq!(start["gk"], "Alice");
}

#[tokio::test]
async fn bad_offset_fails_before_querying() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let err = users
        .query(QueryOptions::new().offset("%%%"))
        .await
        .unwrap_err();
    assert!(matches!(err, CriError::InvalidCursor(_)));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn query_with_filter() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users
        .query(QueryOptions::new().filter("document", "d-1"))
        .await
        .expect("query");
    assert_eq!(names(&result, "name"), ["Bob", "Dave"]);
    assert_eq!(result.count, 2);
    assert_eq!(
        last_query(&backend).filter_expression.as_deref(),
        Some("#f_document = :f_document")
    );
}

#[tokio::test]
async fn index_query_returns_projected_fields() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users
        .query(
            QueryOptions::new()
                .index("email")
                .key_condition(KeyCondition::eq("carol@example.com")),
        )
        .await
        .expect("query");
    assert_eq!(
        result.items,
        vec![item(json!({"email": "carol@example.com", "id": "u2", "document": "d-0"}))]
    );
    assert_eq!(
        last_query(&backend).expression_attribute_values[":sk"],
        "TestTenant|testEntity|email"
    );
}

#[tokio::test]
async fn index_query_can_return_primary_records() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    // Remove u1's primary record only, leaving its index records behind
    let untracked = model(&backend, support::entity_config());
    untracked.delete("u1").await.expect("delete primary");
    backend.clear_calls();

    let result = users
        .query(
            QueryOptions::new()
                .index("document")
                .key_condition(KeyCondition::eq("d-1"))
                .unwrap_index_items(true),
        )
        .await
        .expect("query");

    assert_eq!(names(&result, "name"), ["Dave"]);
    assert_eq!(
        result.items[0],
        item(json!({
            "name": "Dave", "id": "u3", "email": "dave@example.com", "document": "d-1"
        }))
    );
    assert_eq!(backend.calls_of(OpKind::Get).len(), 2);
}

#[tokio::test]
async fn unwrap_flag_is_ignored_on_primary_queries() {
    let backend = MemoryTable::new();
    let users = seeded(&backend).await;

    let result = users
        .query(QueryOptions::new().limit(1).unwrap_index_items(true))
        .await
        .expect("query");
    assert_eq!(result.items.len(), 1);
    assert!(backend.calls_of(OpKind::Get).is_empty());
}
