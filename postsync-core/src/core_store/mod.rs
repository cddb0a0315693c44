/*
    core_store - Replicated record collections

    The state layer synchronized between replicas through a shared folder.
    Handles:
    - Data model (records, identities, the collection table)
    - Tombstone CRDT
    - Local and shared persistence
    - Reconciliation passes
*/

pub mod crdt;
pub mod model;
pub mod store;
pub mod sync;

// Re-export commonly used types
pub use crdt::{Crdt, TombstoneSet};
pub use model::{CollectionSpec, Identity, Record, ReplicaId, Timestamp, COLLECTIONS};
pub use store::{JsonDirStore, RecordStore, StoreError, StoreResult};
pub use sync::{SyncOutcome, SyncReport, SyncService};
