/*
    merge_engine.rs - Reconcile one collection between two locations

    Flow:
    1. Drop every record whose identity is tombstoned, on both sides
    2. Keep the shared records, then append local records whose identity the
       shared side does not have (shared content wins on collision)
    3. Stable-sort ascending by the collection's order key
    4. Persist the result locally, then at the shared location

    The computation is a pure function of (local, shared, tombstones), and
    its output is a fixed point: feeding the result back as both sides
    yields the same sequence. A crash between the two writes therefore heals
    on the next pass.
*/

use crate::core_store::crdt::TombstoneSet;
use crate::core_store::model::{CollectionSpec, Identity, Record};
use crate::core_store::store::{RecordStore, StoreResult};
use crate::core_store::sync::report::CollectionReport;
use std::collections::HashSet;
use tracing::{debug, warn};

/// Output of [`reconcile`]: the merged sequence plus what happened to it
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub records: Vec<Record>,
    pub report: CollectionReport,
}

/// Merge a collection's local and shared sequences under `tombstones`
pub fn reconcile(
    spec: &CollectionSpec,
    local: Vec<Record>,
    shared: Vec<Record>,
    tombstones: &TombstoneSet,
) -> Reconciled {
    let mut report = CollectionReport {
        collection: spec.name.to_string(),
        local_count: local.len(),
        shared_count: shared.len(),
        ..Default::default()
    };

    let mut seen: HashSet<Identity> = HashSet::with_capacity(shared.len() + local.len());
    let mut merged: Vec<Record> = Vec::with_capacity(shared.len() + local.len());

    // Shared first, so identities already published keep their shared content
    for (side, records) in [("shared", &shared), ("local", &local)] {
        let mut on_this_side: HashSet<Identity> = HashSet::with_capacity(records.len());
        for record in records {
            let Some(identity) = record.identity(spec.identity_field) else {
                warn!(
                    collection = spec.name,
                    side,
                    field = spec.identity_field,
                    "Dropping record without identity"
                );
                report.dropped_without_identity += 1;
                continue;
            };

            if tombstones.contains(spec.name, &identity) {
                report.removed_by_tombstone += 1;
                continue;
            }

            if !on_this_side.insert(identity.clone()) {
                debug!(collection = spec.name, side, identity = %identity, "Dropping repeated identity");
                report.duplicates_dropped += 1;
                continue;
            }

            // Already taken from the shared side
            if seen.insert(identity) {
                merged.push(record.clone());
            }
        }
    }

    // sort_by_cached_key is stable
    merged.sort_by_cached_key(|record| record.order_key(spec.order_field));

    report.merged_count = merged.len();
    report.local_changed = merged != local;
    report.shared_changed = merged != shared;

    Reconciled { records: merged, report }
}

/// Load both sides of `spec`, reconcile them and write the result to both
pub fn reconcile_collection(
    spec: &CollectionSpec,
    local_store: &dyn RecordStore,
    shared_store: &dyn RecordStore,
    tombstones: &TombstoneSet,
) -> StoreResult<CollectionReport> {
    let local = local_store.load_collection(spec);
    let shared = shared_store.load_collection(spec);

    let Reconciled { records, report } = reconcile(spec, local, shared, tombstones);

    local_store.save_collection(spec, &records)?;
    shared_store.save_collection(spec, &records)?;

    debug!(
        collection = spec.name,
        local = report.local_count,
        shared = report.shared_count,
        merged = report.merged_count,
        removed = report.removed_by_tombstone,
        "Reconciled collection"
    );

    Ok(report)
}


#[cfg(test)]
mod proptests {
    use super::*;
    use crate::core_store::model::SCHEDULE;
    use proptest::prelude::*;

    fn arb_records() -> impl Strategy<Value = Vec<Record>> {
        prop::collection::vec((0..12u32, 0..6u32, 0..3u32), 0..10).prop_map(|rows| {
            rows.into_iter()
                .map(|(id, day, rev)| {
                    Record::new()
                        .with("id", format!("sch{}", id))
                        .with("scheduledTime", format!("2024-12-{:02}", 20 + day))
                        .with("rev", rev)
                })
                .collect()
        })
    }

    fn arb_tombstones() -> impl Strategy<Value = TombstoneSet> {
        prop::collection::vec(0..12u32, 0..4).prop_map(|dead| {
            let mut set = TombstoneSet::new();
            for id in dead {
                set.insert("schedule", Identity(format!("sch{}", id)));
            }
            set
        })
    }

    proptest! {
        #[test]
        fn prop_reconcile_is_idempotent(
            local in arb_records(),
            shared in arb_records(),
            tombstones in arb_tombstones(),
        ) {
            let first = reconcile(&SCHEDULE, local, shared, &tombstones);
            let second = reconcile(&SCHEDULE, first.records.clone(), first.records.clone(), &tombstones);
            prop_assert_eq!(&second.records, &first.records);
            prop_assert!(!second.report.local_changed);
            prop_assert!(!second.report.shared_changed);
        }

        #[test]
        fn prop_partial_write_converges(
            local in arb_records(),
            shared in arb_records(),
            tombstones in arb_tombstones(),
        ) {
            // Crash after the local write: shared still holds its old content
            let first = reconcile(&SCHEDULE, local, shared.clone(), &tombstones);
            let retry = reconcile(&SCHEDULE, first.records.clone(), shared, &tombstones);
            prop_assert_eq!(retry.records, first.records);
        }

        #[test]
        fn prop_output_sorted_unique_and_live(
            local in arb_records(),
            shared in arb_records(),
            tombstones in arb_tombstones(),
        ) {
            let out = reconcile(&SCHEDULE, local, shared, &tombstones);
            let keys: Vec<String> = out.records.iter().map(|r| r.order_key("scheduledTime")).collect();
            prop_assert!(keys.windows(2).all(|w| w[0] <= w[1]));

            let mut seen = HashSet::new();
            for record in &out.records {
                let id = record.identity("id").unwrap();
                prop_assert!(!tombstones.contains("schedule", &id));
                prop_assert!(seen.insert(id));
            }
        }

        #[test]
        fn prop_shared_version_wins(
            local in arb_records(),
            shared in arb_records(),
        ) {
            let out = reconcile(&SCHEDULE, local, shared.clone(), &TombstoneSet::new());
            for record in &out.records {
                let id = record.identity("id").unwrap();
                if let Some(first_shared) = shared.iter().find(|r| r.identity("id").as_ref() == Some(&id)) {
                    prop_assert_eq!(record, first_shared);
                }
            }
        }
    }
}
