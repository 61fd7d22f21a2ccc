//! Key derivation for primary and index records
//!
//! Every reader and writer goes through [`secondary_key`] so that point
//! lookups always land on the record a write produced.

use crate::schema::{ATTR_PK, ATTR_SK, KEY_SEPARATOR};
use crate::Item;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Build the sort key for an entity, optionally scoped to a declared index.
///
/// `tenant|entity` or `tenant|entity|index`; the tenant segment is dropped
/// entirely when the tenant is absent or empty.
pub fn secondary_key(tenant: Option<&str>, entity: &str, index: Option<&str>) -> String {
    let mut sk = match tenant {
        Some(t) if !t.is_empty() => format!("{t}{KEY_SEPARATOR}{entity}"),
        _ => entity.to_string(),
    };
    if let Some(index) = index {
        sk.push(KEY_SEPARATOR);
        sk.push_str(index);
    }
    sk
}

/// Entity name carried by a sort key: its second `|` segment.
pub fn entity_segment(sk: &str) -> Option<&str> {
    sk.split(KEY_SEPARATOR).nth(1)
}

/// Physical primary key of a table row
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemKey {
    pub pk: String,
    pub sk: String,
}

impl ItemKey {
    pub fn new(pk: impl Into<String>, sk: impl Into<String>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
        }
    }

    /// Extract the key from a stored item; `None` unless both parts are strings.
    pub fn from_item(item: &Item) -> Option<Self> {
        let pk = item.get(ATTR_PK)?.as_str()?;
        let sk = item.get(ATTR_SK)?.as_str()?;
        Some(Self::new(pk, sk))
    }

    /// Key as a `{pk, sk}` item
    pub fn to_item(&self) -> Item {
        let mut item = Item::new();
        item.insert(ATTR_PK.to_string(), JsonValue::String(self.pk.clone()));
        item.insert(ATTR_SK.to_string(), JsonValue::String(self.sk.clone()));
        item
    }
}

/// Caller-facing reference to a record: logical id plus optional index.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityKey {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<String>,
}

impl EntityKey {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: None,
        }
    }

    /// Target the record derived for `index` instead of the primary record
    pub fn with_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }
}

impl From<&str> for EntityKey {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for EntityKey {
    fn from(id: String) -> Self {
        Self::new(id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secondary_key_with_tenant() {
        assert_eq!(secondary_key(Some("T"), "user", None), "T|user");
        assert_eq!(secondary_key(Some("T"), "user", Some("email")), "T|user|email");
    }

    #[test]
    fn test_secondary_key_without_tenant() {
        assert_eq!(secondary_key(None, "user", None), "user");
        assert_eq!(secondary_key(Some(""), "user", None), "user");
        assert_eq!(secondary_key(None, "user", Some("email")), "user|email");
    }

    #[test]
    fn test_secondary_key_is_deterministic() {
        for (tenant, entity, index) in [
            (Some("acme"), "order", None),
            (Some("acme"), "order", Some("status")),
            (None, "order", Some("status")),
        ] {
            assert_eq!(
                secondary_key(tenant, entity, index),
                secondary_key(tenant, entity, index)
            );
        }
    }

    #[test]
    fn test_index_key_adds_exactly_one_segment() {
        for tenant in [Some("acme"), None] {
            let base = secondary_key(tenant, "order", None);
            let indexed = secondary_key(tenant, "order", Some("status"));
            assert_eq!(
                indexed.split('|').count(),
                base.split('|').count() + 1,
                "tenant {:?}",
                tenant
            );
            assert!(indexed.starts_with(&base));
        }
    }

    #[test]
    fn test_entity_segment() {
        assert_eq!(entity_segment("T|user"), Some("user"));
        assert_eq!(entity_segment("T|user|email"), Some("user"));
        assert_eq!(entity_segment("user"), None);
    }

    #[test]
    fn test_item_key_round_trip() {
        let key = ItemKey::new("abc", "T|user");
        assert_eq!(ItemKey::from_item(&key.to_item()), Some(key));
    }

    #[test]
    fn test_item_key_requires_string_parts() {
        let mut item = Item::new();
        item.insert("pk".into(), JsonValue::from(1));
        item.insert("sk".into(), JsonValue::from("T|user"));
        assert_eq!(ItemKey::from_item(&item), None);
    }
}
