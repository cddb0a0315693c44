/*
    Store subsystem - Persistence layer
*/

pub mod errors;
pub mod json_dir_store;
pub mod lock;
pub mod record_store;

pub use errors::*;
pub use json_dir_store::JsonDirStore;
pub use lock::{LocationLock, LockPolicy, LOCK_FILE};
pub use record_store::{encode, MemoryStore, RecordStore, TOMBSTONES_FILE};
