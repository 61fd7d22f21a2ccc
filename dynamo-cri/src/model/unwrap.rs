//! Read-side normalization of stored records

use crate::error::Result;
use crate::schema::{ATTR_GK, ATTR_ID, ATTR_PK, ATTR_PROJECTION, ATTR_VERSION, INTERNAL_ATTRS};
use crate::Item;
use serde_json::Value as JsonValue;

fn non_empty_str<'a>(item: &'a Item, attr: &str) -> Option<&'a str> {
    item.get(attr)
        .and_then(JsonValue::as_str)
        .filter(|s| !s.is_empty())
}

/// Turn a stored record into the caller-facing item.
///
/// - `gk` is re-exposed under the attribute named by `__v`
/// - `pk` becomes `id`
/// - fields projected into `__p` are merged on top
/// - `pk, sk, gk, __v, __p` are removed
///
/// Applying it to an already unwrapped item changes nothing.
pub fn unwrap_item(mut item: Item) -> Result<Item> {
    if let Some(source) = non_empty_str(&item, ATTR_VERSION).map(str::to_string) {
        if let Some(gk) = item.get(ATTR_GK).cloned() {
            item.insert(source, gk);
        }
    }

    if let Some(pk) = item.get(ATTR_PK).cloned() {
        item.insert(ATTR_ID.to_string(), pk);
    }

    if let Some(projection) = non_empty_str(&item, ATTR_PROJECTION) {
        let projected: Item = serde_json::from_str(projection)?;
        item.extend(projected);
    }

    Ok(item
        .into_iter()
        .filter(|(k, _)| !INTERNAL_ATTRS.contains(&k.as_str()))
        .collect())
}
