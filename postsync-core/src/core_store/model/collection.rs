/*
    collection.rs - The fixed table of synchronized collections

    Every collection is described by its name plus the record fields that
    carry its identity and its ordering key. The reconciliation driver walks
    this table once per pass.
*/

use crate::core_store::store::errors::{StoreError, StoreResult};
use std::fmt;

/// Static description of one synchronized collection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CollectionSpec {
    /// Collection name, also the file stem and the tombstone key
    pub name: &'static str,

    /// Field holding the record identity
    pub identity_field: &'static str,

    /// Field used to order the reconciled sequence
    pub order_field: &'static str,
}

impl CollectionSpec {
    pub const fn new(
        name: &'static str,
        identity_field: &'static str,
        order_field: &'static str,
    ) -> Self {
        CollectionSpec { name, identity_field, order_field }
    }

    /// File name used for this collection at any location
    pub fn file_name(&self) -> String {
        format!("{}.json", self.name)
    }
}

impl fmt::Display for CollectionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

pub const HISTORY: CollectionSpec = CollectionSpec::new("history", "timestamp", "timestamp");
pub const SCHEDULE: CollectionSpec = CollectionSpec::new("schedule", "id", "scheduledTime");
pub const NOTIFICATIONS: CollectionSpec = CollectionSpec::new("notifications", "id", "timestamp");

/// Every collection reconciled by a sync pass, in pass order
pub const COLLECTIONS: [CollectionSpec; 3] = [HISTORY, SCHEDULE, NOTIFICATIONS];

/// Tombstone keys written by older replicas, mapped to the current collection name
pub const TOMBSTONE_KEY_ALIASES: [(&str, &str); 1] = [("scheduled", "schedule")];

/// Look up a collection by name
pub fn find_collection(name: &str) -> StoreResult<CollectionSpec> {
    COLLECTIONS
        .iter()
        .copied()
        .find(|spec| spec.name == name)
        .ok_or_else(|| StoreError::UnknownCollection(name.to_string()))
}

/// Resolve a tombstone key to the collection name it belongs to
pub fn canonical_tombstone_key(key: &str) -> &str {
    TOMBSTONE_KEY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == key)
        .map(|(_, name)| *name)
        .unwrap_or(key)
}
