/*
    tombstone_set.rs - Grow-only per-collection deletion markers

    A tombstone records that an identity was deleted from a collection and
    must never reappear there. The set only grows: merging two sets is a
    per-collection union, which makes it a join-semilattice.

    On disk the set is a JSON object mapping collection names to arrays of
    identity strings. Legacy keys are folded into their current collection
    name on read, and unknown keys are carried through untouched. Numeric
    identities are read by their decimal rendering; any other entry is
    skipped with a warning instead of discarding the whole file.
*/

use super::traits::Crdt;
use crate::core_store::model::{canonical_tombstone_key, Identity, COLLECTIONS};
use crate::core_store::store::errors::StoreResult;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use tracing::warn;

type Entries = BTreeMap<String, BTreeSet<Identity>>;

/// File content before identities are checked
type RawEntries = BTreeMap<String, Value>;

/// Deleted identities, keyed by collection name
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "RawEntries")]
pub struct TombstoneSet(Entries);

impl TombstoneSet {
    /// Empty set with an entry for every known collection
    pub fn new() -> Self {
        let entries = COLLECTIONS
            .iter()
            .map(|spec| (spec.name.to_string(), BTreeSet::new()))
            .collect();
        TombstoneSet(entries)
    }

    /// Mark `identity` as deleted in `collection`. Returns false if it already was.
    pub fn insert(&mut self, collection: &str, identity: Identity) -> bool {
        self.0
            .entry(canonical_tombstone_key(collection).to_string())
            .or_default()
            .insert(identity)
    }

    pub fn contains(&self, collection: &str, identity: &Identity) -> bool {
        self.0
            .get(canonical_tombstone_key(collection))
            .map_or(false, |dead| dead.contains(identity))
    }

    /// Deleted identities for one collection
    pub fn dead(&self, collection: &str) -> impl Iterator<Item = &Identity> {
        self.0.get(canonical_tombstone_key(collection)).into_iter().flatten()
    }

    pub fn count_for(&self, collection: &str) -> usize {
        self.0.get(canonical_tombstone_key(collection)).map_or(0, BTreeSet::len)
    }

    /// Total number of tombstones across collections
    pub fn len(&self) -> usize {
        self.0.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Collection names present in the set
    pub fn collections(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Union of two sets, leaving both inputs untouched
    pub fn union(a: &TombstoneSet, b: &TombstoneSet) -> TombstoneSet {
        let mut merged = a.clone();
        merged.absorb(b);
        merged
    }

    fn absorb(&mut self, other: &TombstoneSet) {
        for (collection, ids) in &other.0 {
            self.0.entry(collection.clone()).or_default().extend(ids.iter().cloned());
        }
    }
}

impl Default for TombstoneSet {
    fn default() -> Self {
        TombstoneSet::new()
    }
}

impl From<RawEntries> for TombstoneSet {
    fn from(raw: RawEntries) -> Self {
        let mut set = TombstoneSet::new();
        for (key, ids) in raw {
            let dead = set.0.entry(canonical_tombstone_key(&key).to_string()).or_default();
            let Value::Array(ids) = ids else {
                warn!(collection = %key, "Tombstone entry is not an array, skipping");
                continue;
            };
            for id in ids {
                match Identity::from_json(&id) {
                    Some(identity) => {
                        dead.insert(identity);
                    }
                    None => warn!(collection = %key, entry = %id, "Skipping tombstone without a usable identity"),
                }
            }
        }
        set
    }
}

impl Serialize for TombstoneSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.0.serialize(serializer)
    }
}

impl Crdt for TombstoneSet {
    fn merge(&mut self, other: &Self) -> StoreResult<()> {
        self.absorb(other);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_has_every_collection() {
        let set = TombstoneSet::new();
        let names: Vec<&str> = set.collections().collect();
        assert_eq!(names, vec!["history", "notifications", "schedule"]);
        assert!(set.is_empty());
    }

    #[test]
    fn test_insert_and_contains() {
        let mut set = TombstoneSet::new();
        assert!(set.insert("schedule", Identity::new("sch1")));
        assert!(!set.insert("schedule", Identity::new("sch1")));
        assert!(set.contains("schedule", &Identity::new("sch1")));
        assert!(!set.contains("history", &Identity::new("sch1")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_legacy_key_is_folded() {
        let set: TombstoneSet =
            serde_json::from_str(r#"{"scheduled":["sch1"],"schedule":["sch2"]}"#).unwrap();
        assert_eq!(set.count_for("schedule"), 2);
        assert!(set.contains("scheduled", &Identity::new("sch1")));
        assert!(!set.collections().any(|c| c == "scheduled"));
    }

    #[test]
    fn test_unknown_keys_survive_merge() {
        let local: TombstoneSet = serde_json::from_str(r#"{"drafts":["d1"]}"#).unwrap();
        let mut merged = TombstoneSet::new();
        merged.merge(&local).unwrap();
        assert!(merged.contains("drafts", &Identity::new("d1")));
    }

    #[test]
    fn test_odd_entries_do_not_discard_the_file() {
        let set: TombstoneSet = serde_json::from_str(
            r#"{"schedule":["sch1",42,{"id":"x"},null],"history":"2024-01-01","notifications":["n1"]}"#,
        )
        .unwrap();
        assert!(set.contains("schedule", &Identity::new("sch1")));
        assert!(set.contains("schedule", &Identity::new("42")));
        assert_eq!(set.count_for("schedule"), 2);
        assert_eq!(set.count_for("history"), 0);
        assert!(set.contains("notifications", &Identity::new("n1")));
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_serialization_is_deterministic() {
        let mut a = TombstoneSet::new();
        a.insert("history", Identity::new("2024-01-02"));
        a.insert("history", Identity::new("2024-01-01"));
        let mut b = TombstoneSet::new();
        b.insert("history", Identity::new("2024-01-01"));
        b.insert("history", Identity::new("2024-01-02"));
        assert_eq!(serde_json::to_vec(&a).unwrap(), serde_json::to_vec(&b).unwrap());
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            r#"{"history":["2024-01-01","2024-01-02"],"notifications":[],"schedule":[]}"#
        );
    }
}
