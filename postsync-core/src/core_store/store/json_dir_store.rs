/*
    json_dir_store.rs - Directory-backed storage location

    One directory per location, one JSON file per collection plus the
    tombstone file. Used for both the replica's local directory and the
    shared (externally synchronized) folder.

    Features:
    - Atomic file replacement (write to temp, fsync, then rename)
    - Temp names carry a random suffix so two writers never share one
    - Directory created on first write
    - lock() takes a lock file in the directory (see lock.rs)
*/

use crate::core_store::store::errors::StoreResult;
use crate::core_store::store::lock::{LocationLock, LockPolicy};
use crate::core_store::store::record_store::RecordStore;
use std::fs::{create_dir_all, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;
use uuid::Uuid;

/// Storage location rooted at a directory
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    root: PathBuf,
    lock_policy: LockPolicy,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        JsonDirStore { root: root.into(), lock_policy: LockPolicy::default() }
    }

    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn path_of(&self, file_name: &str) -> PathBuf {
        self.root.join(file_name)
    }
}

impl RecordStore for JsonDirStore {
    fn location(&self) -> String {
        self.root.display().to_string()
    }

    fn read(&self, file_name: &str) -> StoreResult<Option<Vec<u8>>> {
        match std::fs::read(self.path_of(file_name)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn is_available(&self) -> bool {
        self.root.is_dir()
    }

    fn lock(&self) -> StoreResult<LocationLock> {
        LocationLock::acquire(&self.root, &self.lock_policy)
    }

    fn write(&self, file_name: &str, bytes: &[u8]) -> StoreResult<()> {
        create_dir_all(&self.root)?;

        let final_path = self.path_of(file_name);
        let temp_path = self.root.join(format!(".{}.{}.tmp", file_name, Uuid::new_v4().simple()));

        let result = write_then_rename(&temp_path, &final_path, bytes);
        if result.is_err() {
            let _ = std::fs::remove_file(&temp_path);
        }
        result?;

        debug!(path = %final_path.display(), bytes = bytes.len(), "Wrote file");
        Ok(())
    }
}

fn write_then_rename(temp_path: &Path, final_path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut file = File::create(temp_path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    // Atomically rename to final name
    std::fs::rename(temp_path, final_path)
}
