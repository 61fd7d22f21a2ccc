//! Change-stream reconciliation
//!
//! Replays a batch of table change-log records as index maintenance:
//!
//! | event    | action                                  |
//! |----------|-----------------------------------------|
//! | `INSERT` | `put_index_items(NewImage)`             |
//! | `MODIFY` | `update_indexes_items(NewImage)`        |
//! | `REMOVE` | `delete_index_items(Keys.pk)`           |
//!
//! The whole batch is resolved before the first write: every record must carry
//! the primary sort key of some accessor (tenant and entity), and every image
//! must decode. Only then are
//! the actions applied, strictly one after another in batch order.

use crate::attribute::{unwrap_attribute, unwrap_attributes};
use crate::error::{CriError, Result};
use crate::keys::entity_segment;
use crate::model::Model;
use crate::schema::{ATTR_PK, ATTR_SK, KEY_SEPARATOR};
use crate::Item;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use std::collections::HashMap;

/// Change-log event kind
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventName {
    Insert,
    Modify,
    Remove,
    #[serde(other)]
    Other,
}

/// Key and images of one change
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StreamChange {
    /// Typed `pk`/`sk` envelopes
    pub keys: Item,
    #[serde(default)]
    pub new_image: Option<Item>,
    #[serde(default)]
    pub old_image: Option<Item>,
}

/// One change-log record
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub event_name: EventName,
    pub dynamodb: StreamChange,
}

/// A batch of records as delivered to a stream handler
#[derive(Clone, Debug, Default, Deserialize)]
pub struct StreamEvent {
    #[serde(rename = "Records", default)]
    pub records: Vec<StreamRecord>,
}

/// What the reconciler needs from an accessor
#[async_trait]
pub trait IndexMaintainer: Send + Sync {
    /// Entity name, for logs
    fn entity(&self) -> &str;

    /// Sort key of the entity's primary records
    fn primary_sort_key(&self) -> String;

    async fn put_index_items(&self, body: &Item) -> Result<()>;

    async fn update_indexes_items(&self, body: &Item) -> Result<()>;

    async fn delete_index_items(&self, id: &str) -> Result<()>;
}

#[async_trait]
impl IndexMaintainer for Model {
    fn entity(&self) -> &str {
        Model::entity(self)
    }

    fn primary_sort_key(&self) -> String {
        self.secondary_key(None)
    }

    async fn put_index_items(&self, body: &Item) -> Result<()> {
        Model::put_index_items(self, body).await
    }

    async fn update_indexes_items(&self, body: &Item) -> Result<()> {
        Model::update_indexes_items(self, body).await
    }

    async fn delete_index_items(&self, id: &str) -> Result<()> {
        Model::delete_index_items(self, id).await
    }
}

enum Action {
    Put(Item),
    Update(Item),
    Delete(String),
}

struct Planned<'a> {
    maintainer: &'a dyn IndexMaintainer,
    pk: String,
    action: Action,
}

fn key_attribute(keys: &Item, attr: &str) -> Result<String> {
    let envelope = keys
        .get(attr)
        .ok_or_else(|| CriError::malformed_record(format!("Keys.{attr} is missing")))?;
    match unwrap_attribute(envelope)? {
        JsonValue::String(s) => Ok(s),
        other => Err(CriError::malformed_record(format!(
            "Keys.{attr} is not a string: {other}"
        ))),
    }
}

fn new_image(change: &StreamChange) -> Result<Item> {
    let image = change
        .new_image
        .as_ref()
        .ok_or_else(|| CriError::malformed_record("NewImage is missing"))?;
    unwrap_attributes(image)
}

/// Entity a sort key names: the second segment, or the whole key when there
/// is no tenant segment.
fn entity_of(sk: &str) -> Result<&str> {
    let entity = entity_segment(sk).unwrap_or(sk);
    if entity.is_empty() {
        return Err(CriError::malformed_record(format!(
            "no entity in sort key '{sk}'"
        )));
    }
    Ok(entity)
}

/// Resolve every record to an action, or fail without side effects.
///
/// Records are routed by their full primary sort key, so accessors for the
/// same entity under different tenants each get their own records.
fn plan<'a>(
    maintainers: &[&'a dyn IndexMaintainer],
    records: &[StreamRecord],
) -> Result<Vec<Planned<'a>>> {
    let mut lookup: HashMap<String, &'a dyn IndexMaintainer> = HashMap::new();
    for &maintainer in maintainers {
        lookup
            .entry(maintainer.primary_sort_key())
            .or_insert(maintainer);
    }

    let mut planned = Vec::with_capacity(records.len());
    for record in records {
        let change = &record.dynamodb;
        let pk = key_attribute(&change.keys, ATTR_PK)?;
        let sk = key_attribute(&change.keys, ATTR_SK)?;

        let Some(&maintainer) = lookup.get(&sk) else {
            let echoed = lookup.keys().any(|primary| {
                sk.strip_prefix(primary.as_str())
                    .is_some_and(|rest| rest.starts_with(KEY_SEPARATOR))
            });
            if echoed {
                tracing::trace!(pk = %pk, sk = %sk, "skipping derived index record");
                continue;
            }
            let entity = entity_of(&sk)?;
            tracing::debug!(pk = %pk, sk = %sk, "no accessor for sort key");
            return Err(CriError::no_model(entity));
        };

        let action = match record.event_name {
            EventName::Insert => Action::Put(new_image(change)?),
            EventName::Modify => Action::Update(new_image(change)?),
            EventName::Remove => Action::Delete(pk.clone()),
            EventName::Other => {
                tracing::trace!(pk = %pk, sk = %sk, "skipping unknown event");
                continue;
            }
        };
        planned.push(Planned {
            maintainer,
            pk,
            action,
        });
    }
    Ok(planned)
}

/// Apply a batch of change-log records to the index records they imply.
///
/// Fails before any write when a record is malformed or carries a sort key
/// none of `maintainers` handles. A failing write stops the batch; earlier writes
/// stay committed.
pub async fn process_records(
    maintainers: &[&dyn IndexMaintainer],
    records: &[StreamRecord],
) -> Result<()> {
    for Planned {
        maintainer,
        pk,
        action,
    } in plan(maintainers, records)?
    {
        let entity = maintainer.entity();
        match action {
            Action::Put(image) => {
                tracing::debug!(entity = %entity, pk = %pk, "reconcile insert");
                maintainer.put_index_items(&image).await?;
            }
            Action::Update(image) => {
                tracing::debug!(entity = %entity, pk = %pk, "reconcile modify");
                maintainer.update_indexes_items(&image).await?;
            }
            Action::Delete(id) => {
                tracing::debug!(entity = %entity, pk = %pk, "reconcile remove");
                maintainer.delete_index_items(&id).await?;
            }
        }
    }
    Ok(())
}

/// [`process_records`] over a deserialized stream event
pub async fn process_event(
    maintainers: &[&dyn IndexMaintainer],
    event: &StreamEvent,
) -> Result<()> {
    process_records(maintainers, &event.records).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_lambda_event() {
        let event: StreamEvent = serde_json::from_value(json!({
            "Records": [{
                "eventID": "1",
                "eventName": "INSERT",
                "eventSource": "aws:dynamodb",
                "dynamodb": {
                    "Keys": {"pk": {"S": "1"}, "sk": {"S": "T|user"}},
                    "NewImage": {"pk": {"S": "1"}, "name": {"S": "Ana"}},
                    "SequenceNumber": "111",
                    "StreamViewType": "NEW_AND_OLD_IMAGES"
                }
            }, {
                "eventName": "REMOVE",
                "dynamodb": {
                    "Keys": {"pk": {"S": "2"}, "sk": {"S": "T|user"}},
                    "OldImage": {"pk": {"S": "2"}}
                }
            }, {
                "eventName": "TTL_EXPIRED",
                "dynamodb": {"Keys": {}}
            }]
        }))
        .unwrap();

        assert_eq!(event.records.len(), 3);
        assert_eq!(event.records[0].event_name, EventName::Insert);
        assert!(event.records[0].dynamodb.new_image.is_some());
        assert_eq!(event.records[1].event_name, EventName::Remove);
        assert!(event.records[1].dynamodb.new_image.is_none());
        assert!(event.records[1].dynamodb.old_image.is_some());
        assert_eq!(event.records[2].event_name, EventName::Other);
    }

    #[test]
    fn test_entity_of() {
        assert_eq!(entity_of("T|user").unwrap(), "user");
        assert_eq!(entity_of("T|user|email").unwrap(), "user");
        assert_eq!(entity_of("user").unwrap(), "user");
        assert!(matches!(entity_of(""), Err(CriError::MalformedRecord(_))));
        assert!(matches!(entity_of("T|"), Err(CriError::MalformedRecord(_))));
    }

    #[test]
    fn test_key_attribute() {
        let keys = json!({"pk": {"S": "1"}, "sk": {"N": "3"}});
        let keys = keys.as_object().unwrap();
        assert_eq!(key_attribute(keys, "pk").unwrap(), "1");
        assert!(matches!(
            key_attribute(keys, "sk"),
            Err(CriError::MalformedRecord(_))
        ));
        assert!(matches!(
            key_attribute(keys, "gk"),
            Err(CriError::MalformedRecord(_))
        ));
    }
}
