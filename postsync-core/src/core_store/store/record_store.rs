/*
    record_store.rs - Storage location abstraction

    A location (the replica's local directory or the shared folder) holds one
    JSON file per collection plus one tombstone file. Implementations only
    move bytes; decoding, encoding and the fail-open read policy live in the
    provided methods so every location behaves the same way:

    - absent file           -> empty collection / empty tombstone set
    - unreadable/unparsable -> same, logged at warn level
    - write failure         -> StoreError, surfaced to the caller
*/

use crate::core_store::crdt::TombstoneSet;
use crate::core_store::model::{CollectionSpec, Record};
use crate::core_store::store::errors::StoreResult;
use crate::core_store::store::lock::LocationLock;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};
use tracing::{debug, warn};

/// File holding the tombstone set at every location
pub const TOMBSTONES_FILE: &str = "tombstones.json";

/// Byte-level access to one storage location
pub trait RecordStore: Send + Sync {
    /// Human-readable location, used in logs
    fn location(&self) -> String;

    /// Read a whole file. `Ok(None)` means the file does not exist.
    fn read(&self, file_name: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Replace a whole file. Implementations must not leave a torn file behind.
    fn write(&self, file_name: &str, bytes: &[u8]) -> StoreResult<()>;

    /// Whether the location can be used right now (e.g. the folder is mounted)
    fn is_available(&self) -> bool {
        true
    }

    /// Exclusive access across processes for a read-modify-write cycle.
    /// Locations only reachable from one process return an empty guard.
    fn lock(&self) -> StoreResult<LocationLock> {
        Ok(LocationLock::unlocked())
    }

    /// Load a collection, failing open to the empty sequence
    fn load_collection(&self, spec: &CollectionSpec) -> Vec<Record> {
        let file_name = spec.file_name();
        match read_or_log(self, &file_name) {
            Some(bytes) => match serde_json::from_slice::<Vec<Record>>(&bytes) {
                Ok(records) => records,
                Err(e) => {
                    warn!(
                        location = %self.location(),
                        file = %file_name,
                        error = %e,
                        "Unparsable collection file, treating as empty"
                    );
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }

    /// Persist a collection, fully overwriting prior content
    fn save_collection(&self, spec: &CollectionSpec, records: &[Record]) -> StoreResult<()> {
        let bytes = encode(records)?;
        self.write(&spec.file_name(), &bytes)
    }

    /// Load the tombstone set, failing open to the empty set
    fn load_tombstones(&self) -> TombstoneSet {
        match read_or_log(self, TOMBSTONES_FILE) {
            Some(bytes) => match serde_json::from_slice::<TombstoneSet>(&bytes) {
                Ok(set) => set,
                Err(e) => {
                    warn!(
                        location = %self.location(),
                        file = TOMBSTONES_FILE,
                        error = %e,
                        "Unparsable tombstone file, treating as empty"
                    );
                    TombstoneSet::new()
                }
            },
            None => TombstoneSet::new(),
        }
    }

    fn save_tombstones(&self, tombstones: &TombstoneSet) -> StoreResult<()> {
        let bytes = encode(tombstones)?;
        self.write(TOMBSTONES_FILE, &bytes)
    }
}

/// Canonical on-disk encoding: pretty JSON with a trailing newline
pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> StoreResult<Vec<u8>> {
    let mut bytes = serde_json::to_vec_pretty(value)?;
    bytes.push(b'\n');
    Ok(bytes)
}

fn read_or_log<S: RecordStore + ?Sized>(store: &S, file_name: &str) -> Option<Vec<u8>> {
    match store.read(file_name) {
        Ok(Some(bytes)) => Some(bytes),
        Ok(None) => {
            debug!(location = %store.location(), file = %file_name, "File absent");
            None
        }
        Err(e) => {
            warn!(
                location = %store.location(),
                file = %file_name,
                error = %e,
                "Unreadable file, treating as empty"
            );
            None
        }
    }
}

/// In-memory location, used by benches and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    name: String,
    files: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new(name: impl Into<String>) -> Self {
        MemoryStore { name: name.into(), files: RwLock::new(HashMap::new()) }
    }

    /// Raw file content, if present
    pub fn file(&self, file_name: &str) -> Option<Vec<u8>> {
        self.files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(file_name)
            .cloned()
    }
}

impl RecordStore for MemoryStore {
    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn read(&self, file_name: &str) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.file(file_name))
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> StoreResult<()> {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(file_name.to_string(), bytes.to_vec());
        Ok(())
    }
}
