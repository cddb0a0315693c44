/*
    service.rs - Per-replica sync service

    The interface the rest of the application talks to:
    - create_record / delete_record mutate the local copy (and tombstones)
    - sync_now runs one reconciliation pass against the shared location
    - sync can be switched on/off and pointed at another shared folder

    Every operation that touches the local files holds the replica's pass
    lock and the local location's lock file, so two passes (or a pass and a
    local mutation) never interleave their reads and writes, whether they
    run in this process or in another one over the same directory.
*/

use crate::config::SyncConfig;
use crate::core_store::model::{find_collection, Identity, Record, ReplicaId};
use crate::core_store::store::{
    JsonDirStore, LocationLock, RecordStore, StoreError, StoreResult, ValidationError,
};
use crate::core_store::sync::driver::sync_all;
use crate::core_store::sync::report::{SkipReason, SyncOutcome};
use crate::metrics;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tracing::{error, info, warn};

/// Helper to convert poison errors into StoreError
fn handle_poison<T>(_err: PoisonError<T>) -> StoreError {
    StoreError::Internal("Lock poisoned: a thread panicked while holding the lock".to_string())
}

/// Held for the duration of a pass or a local mutation.
/// The file lock is released before the in-process mutex.
struct ReplicaGuard<'a> {
    _file: LocationLock,
    _pass: MutexGuard<'a, ()>,
}

/// Sync service for one replica
pub struct SyncService {
    replica_id: ReplicaId,
    local: Arc<dyn RecordStore>,
    shared: RwLock<Option<Arc<dyn RecordStore>>>,
    enabled: AtomicBool,
    sync_on_change: AtomicBool,

    /// Serializes passes and local mutations within this process
    pass_lock: Mutex<()>,

    last_outcome: RwLock<Option<SyncOutcome>>,
}

impl SyncService {
    /// Create a service over a local store. Sync starts enabled with no shared location.
    pub fn new(replica_id: ReplicaId, local: Arc<dyn RecordStore>) -> Self {
        SyncService {
            replica_id,
            local,
            shared: RwLock::new(None),
            enabled: AtomicBool::new(true),
            sync_on_change: AtomicBool::new(false),
            pass_lock: Mutex::new(()),
            last_outcome: RwLock::new(None),
        }
    }

    /// Build a service from the `[sync]` configuration section
    pub fn from_config(config: &SyncConfig) -> Self {
        let service = SyncService::new(
            ReplicaId::new(config.replica_id.clone()),
            Arc::new(JsonDirStore::new(config.local_dir.clone())),
        );
        service.enabled.store(config.enabled, Ordering::SeqCst);
        service.sync_on_change.store(config.sync_on_change, Ordering::SeqCst);
        if let Some(shared_dir) = &config.shared_dir {
            service.set_shared_store(Arc::new(JsonDirStore::new(shared_dir.clone())));
        }
        service
    }

    /// Builder-style shared store
    pub fn with_shared_store(self, shared: Arc<dyn RecordStore>) -> Self {
        self.set_shared_store(shared);
        self
    }

    pub fn replica_id(&self) -> &ReplicaId {
        &self.replica_id
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn set_sync_enabled(&self, enabled: bool) {
        let previous = self.enabled.swap(enabled, Ordering::SeqCst);
        if previous != enabled {
            info!(replica = %self.replica_id, enabled, "Sync toggled");
        }
    }

    /// Run a pass right after every local mutation
    pub fn set_sync_on_change(&self, on: bool) {
        self.sync_on_change.store(on, Ordering::SeqCst);
    }

    /// Point the replica at a shared folder
    pub fn set_shared_location(&self, path: impl Into<PathBuf>) {
        self.set_shared_store(Arc::new(JsonDirStore::new(path)));
    }

    pub fn set_shared_store(&self, shared: Arc<dyn RecordStore>) {
        info!(replica = %self.replica_id, shared = %shared.location(), "Shared location set");
        *self.shared.write().unwrap_or_else(PoisonError::into_inner) = Some(shared);
    }

    pub fn shared_location(&self) -> Option<String> {
        self.shared_store().map(|s| s.location())
    }

    pub fn local_location(&self) -> String {
        self.local.location()
    }

    /// Outcome of the most recent pass attempt, if any
    pub fn last_outcome(&self) -> Option<SyncOutcome> {
        self.last_outcome.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Local copy of a collection
    pub fn list_records(&self, collection_name: &str) -> StoreResult<Vec<Record>> {
        let spec = find_collection(collection_name)?;
        let _guard = self.lock()?;
        Ok(self.local.load_collection(&spec))
    }

    /// Append a record to the local copy of a collection.
    ///
    /// The record must carry a string or numeric identity that is neither
    /// present locally nor tombstoned.
    pub fn create_record(&self, collection_name: &str, record: Record) -> StoreResult<Identity> {
        let spec = find_collection(collection_name)?;
        let identity = record.validate_for(&spec)?;

        {
            let _guard = self.lock()?;

            if self.local.load_tombstones().contains(spec.name, &identity) {
                return Err(ValidationError::Deleted(identity.to_string()).into());
            }

            let mut records = self.local.load_collection(&spec);
            if records.iter().any(|r| r.identity(spec.identity_field).as_ref() == Some(&identity)) {
                return Err(ValidationError::Duplicate(identity.to_string()).into());
            }

            records.push(record);
            self.local.save_collection(&spec, &records)?;
        }

        metrics::record_counter(metrics::STORE_MUTATIONS, 1);
        info!(collection = spec.name, identity = %identity, "Record created");

        self.maybe_sync_after_change();
        Ok(identity)
    }

    /// Delete a record locally and tombstone its identity.
    ///
    /// Returns whether a local record was removed. The tombstone is recorded
    /// either way, so deleting something only another replica has seen
    /// still propagates.
    pub fn delete_record(&self, collection_name: &str, identity: &Identity) -> StoreResult<bool> {
        let spec = find_collection(collection_name)?;

        let removed = {
            let _guard = self.lock()?;

            // Tombstone first: a crash before the collection write is repaired by the next pass
            let mut tombstones = self.local.load_tombstones();
            if tombstones.insert(spec.name, identity.clone()) {
                self.local.save_tombstones(&tombstones)?;
            }

            let mut records = self.local.load_collection(&spec);
            let before = records.len();
            records.retain(|r| r.identity(spec.identity_field).as_ref() != Some(identity));
            let removed = records.len() != before;
            if removed {
                self.local.save_collection(&spec, &records)?;
            }
            removed
        };

        metrics::record_counter(metrics::STORE_MUTATIONS, 1);
        info!(collection = spec.name, identity = %identity, removed, "Record deleted");

        self.maybe_sync_after_change();
        Ok(removed)
    }

    /// Run one reconciliation pass now.
    ///
    /// Never returns an error: storage failures become `SyncOutcome::Failed`
    /// and are retried by the next pass.
    pub fn sync_now(&self) -> SyncOutcome {
        let outcome = self.run_pass();

        match &outcome {
            SyncOutcome::Completed(_) => metrics::record_counter(metrics::SYNC_PASSES_TOTAL, 1),
            SyncOutcome::Skipped { .. } => metrics::record_counter(metrics::SYNC_PASSES_SKIPPED, 1),
            SyncOutcome::Failed { .. } => metrics::record_counter(metrics::SYNC_PASSES_FAILED, 1),
        }

        *self.last_outcome.write().unwrap_or_else(PoisonError::into_inner) = Some(outcome.clone());
        outcome
    }

    fn run_pass(&self) -> SyncOutcome {
        if !self.is_sync_enabled() {
            return SyncOutcome::Skipped { reason: SkipReason::Disabled };
        }

        let Some(shared) = self.shared_store() else {
            return SyncOutcome::Skipped { reason: SkipReason::NoSharedLocation };
        };

        if !shared.is_available() {
            warn!(replica = %self.replica_id, shared = %shared.location(), "Shared location unavailable, skipping pass");
            return SyncOutcome::Skipped { reason: SkipReason::SharedLocationUnavailable };
        }

        let guard = match self.lock() {
            Ok(guard) => guard,
            Err(e) => return SyncOutcome::Failed { error: e.to_string() },
        };

        let result = sync_all(&self.replica_id, self.local.as_ref(), shared.as_ref());
        drop(guard);

        match result {
            Ok(report) => SyncOutcome::Completed(report),
            Err(e) => {
                error!(replica = %self.replica_id, error = %e, "Sync pass failed, will retry on next pass");
                SyncOutcome::Failed { error: e.to_string() }
            }
        }
    }

    fn maybe_sync_after_change(&self) {
        if self.sync_on_change.load(Ordering::SeqCst) {
            self.sync_now();
        }
    }

    fn shared_store(&self) -> Option<Arc<dyn RecordStore>> {
        self.shared.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn lock(&self) -> StoreResult<ReplicaGuard<'_>> {
        let pass = self.pass_lock.lock().map_err(handle_poison)?;
        let file = self.local.lock()?;
        Ok(ReplicaGuard { _file: file, _pass: pass })
    }
}
