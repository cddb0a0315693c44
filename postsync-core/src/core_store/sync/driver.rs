/*
    driver.rs - One reconciliation pass over every collection

    Flow:
    1. Merge tombstones once (shared by every collection)
    2. Reconcile each collection of the table, in order
    3. Return a report, or the first storage error

    There is no transaction spanning collections. An error stops the pass;
    collections reconciled before it stay valid and the next pass picks up
    the rest.
*/

use crate::core_store::model::{CollectionSpec, ReplicaId, Timestamp, COLLECTIONS};
use crate::core_store::store::{RecordStore, StoreResult};
use crate::core_store::sync::merge_engine::reconcile_collection;
use crate::core_store::sync::report::SyncReport;
use crate::core_store::sync::tombstone_merge::merge_tombstones;
use crate::metrics::{self, Timer};
use tracing::{info, info_span};

/// Run a full pass over the fixed collection table
pub fn sync_all(
    replica_id: &ReplicaId,
    local_store: &dyn RecordStore,
    shared_store: &dyn RecordStore,
) -> StoreResult<SyncReport> {
    sync_collections(replica_id, &COLLECTIONS, local_store, shared_store)
}

/// Run a pass over an explicit collection table
pub fn sync_collections(
    replica_id: &ReplicaId,
    table: &[CollectionSpec],
    local_store: &dyn RecordStore,
    shared_store: &dyn RecordStore,
) -> StoreResult<SyncReport> {
    let span = info_span!("sync_pass", replica = %replica_id, shared = %shared_store.location());
    let _entered = span.enter();

    let started_at = Timestamp::now();
    let timer = Timer::new(metrics::SYNC_PASS_DURATION_MS);

    let merged = merge_tombstones(local_store, shared_store)?;
    metrics::record_gauge(metrics::SYNC_TOMBSTONES_COUNT, merged.tombstones.len() as f64);

    let mut collections = Vec::with_capacity(table.len());
    for spec in table {
        let report = reconcile_collection(spec, local_store, shared_store, &merged.tombstones)?;

        metrics::record_collection_gauge(
            metrics::SYNC_COLLECTION_RECORDS,
            spec.name,
            report.merged_count as f64,
        );
        if report.dropped_without_identity > 0 {
            metrics::record_counter(
                metrics::SYNC_RECORDS_DROPPED,
                report.dropped_without_identity as u64,
            );
        }
        collections.push(report);
    }

    let report = SyncReport {
        replica_id: replica_id.clone(),
        started_at,
        duration_ms: timer.stop(),
        tombstones: merged.tombstones.len(),
        tombstones_changed: merged.changed,
        collections,
    };

    info!(
        tombstones = report.tombstones,
        converged = report.is_noop(),
        duration_ms = report.duration_ms,
        "Sync pass complete"
    );

    Ok(report)
}
