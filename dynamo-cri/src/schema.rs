//! Physical table schema constants
//!
//! Every entity shares one table and one global secondary index.
//!
//! ## Table Schema
//!
//! ```text
//! Primary Key:
//!   - pk (String, Partition Key): entity instance id
//!   - sk (String, Sort Key): "{tenant}|{entity}" or "{tenant}|{entity}|{index}"
//!
//! GSI (default name "byGSIK"):
//!   - sk (Partition Key)
//!   - gk (Sort Key): value of the attribute named by __v
//!
//! Attributes:
//!   - __v: String - name of the attribute gk was taken from
//!   - __p: String (optional, index records only) - JSON object of projected fields
//!   - everything else: flat business fields (primary records only)
//! ```

/// Partition key attribute
pub const ATTR_PK: &str = "pk";

/// Sort key attribute
pub const ATTR_SK: &str = "sk";

/// GSI sort key attribute
pub const ATTR_GK: &str = "gk";

/// Name of the attribute the `gk` value was derived from
pub const ATTR_VERSION: &str = "__v";

/// JSON-encoded projection payload on index records
pub const ATTR_PROJECTION: &str = "__p";

/// Logical identity exposed to callers in place of `pk`
pub const ATTR_ID: &str = "id";

/// Creation timestamp written when date tracking is enabled
pub const ATTR_CREATED_AT: &str = "createdAt";

/// Last update timestamp written when date tracking is enabled
pub const ATTR_UPDATED_AT: &str = "updatedAt";

/// Attributes never surfaced to callers
pub const INTERNAL_ATTRS: [&str; 5] = [ATTR_PK, ATTR_SK, ATTR_GK, ATTR_VERSION, ATTR_PROJECTION];

/// Default GSI name
pub const DEFAULT_INDEX_NAME: &str = "byGSIK";

/// Default page size for queries
pub const DEFAULT_QUERY_LIMIT: u32 = 100;

/// Separator between sort key segments
pub const KEY_SEPARATOR: char = '|';
