/*
    Sync subsystem - Reconcile local state with the shared location

    Handles tombstone merging, per-collection reconciliation, full passes
    and the replica-facing service around them.
*/

pub mod driver;
pub mod merge_engine;
pub mod report;
pub mod scheduler;
pub mod service;
pub mod tombstone_merge;

pub use driver::{sync_all, sync_collections};
pub use merge_engine::{reconcile, reconcile_collection, Reconciled};
pub use report::{CollectionReport, SkipReason, SyncOutcome, SyncReport};
pub use scheduler::SyncScheduler;
pub use service::SyncService;
pub use tombstone_merge::{merge_tombstones, MergedTombstones};
