/*
    tombstone_merge.rs - Union the local and shared tombstone sets

    Runs once at the start of every pass. The union is written back to both
    locations (local first) before any collection is reconciled, so a
    deletion becomes visible to other replicas even if the pass stops early.
*/

use crate::core_store::crdt::{Crdt, TombstoneSet};
use crate::core_store::store::{RecordStore, StoreResult};
use tracing::debug;

/// Merged tombstones plus whether either side was missing some of them
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedTombstones {
    pub tombstones: TombstoneSet,
    pub changed: bool,
}

/// Load both tombstone sets, union them and persist the union to both sides
pub fn merge_tombstones(
    local_store: &dyn RecordStore,
    shared_store: &dyn RecordStore,
) -> StoreResult<MergedTombstones> {
    let local = local_store.load_tombstones();
    let shared = shared_store.load_tombstones();

    let mut merged = local.clone();
    merged.merge(&shared)?;

    let changed = merged != local || merged != shared;

    local_store.save_tombstones(&merged)?;
    shared_store.save_tombstones(&merged)?;

    debug!(
        local = local.len(),
        shared = shared.len(),
        merged = merged.len(),
        "Merged tombstones"
    );

    Ok(MergedTombstones { tombstones: merged, changed })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_store::model::Identity;
    use crate::core_store::store::{MemoryStore, TOMBSTONES_FILE};

    #[test]
    fn test_union_written_to_both_sides() {
        let local = MemoryStore::new("local");
        let shared = MemoryStore::new("shared");

        let mut a = TombstoneSet::new();
        a.insert("schedule", Identity::new("sch2"));
        local.save_tombstones(&a).unwrap();

        let mut b = TombstoneSet::new();
        b.insert("schedule", Identity::new("sch1"));
        b.insert("history", Identity::new("2024-01-01"));
        shared.save_tombstones(&b).unwrap();

        let merged = merge_tombstones(&local, &shared).unwrap();
        assert!(merged.changed);
        assert_eq!(merged.tombstones.len(), 3);
        assert_eq!(local.file(TOMBSTONES_FILE), shared.file(TOMBSTONES_FILE));
        assert_eq!(local.load_tombstones(), merged.tombstones);
    }

    #[test]
    fn test_corrupt_side_fails_open() {
        let local = MemoryStore::new("local");
        let shared = MemoryStore::new("shared");
        shared.write(TOMBSTONES_FILE, b"not json at all").unwrap();

        let mut a = TombstoneSet::new();
        a.insert("notifications", Identity::new("n1"));
        local.save_tombstones(&a).unwrap();

        let merged = merge_tombstones(&local, &shared).unwrap();
        assert_eq!(merged.tombstones, a);
        assert_eq!(shared.load_tombstones(), a);
    }

    #[test]
    fn test_second_merge_is_unchanged() {
        let local = MemoryStore::new("local");
        let shared = MemoryStore::new("shared");
        let mut a = TombstoneSet::new();
        a.insert("history", Identity::new("2024-01-01"));
        local.save_tombstones(&a).unwrap();

        assert!(merge_tombstones(&local, &shared).unwrap().changed);
        assert!(!merge_tombstones(&local, &shared).unwrap().changed);
    }
}
