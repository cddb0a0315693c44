/*
    traits.rs - Core CRDT trait definitions

    Defines the interface for state that replicas exchange by merging
    with another replica's copy.
*/

use crate::core_store::store::errors::StoreResult;

/// State-based CRDT: `merge` must be idempotent, commutative and associative
pub trait Crdt: Clone + Send + Sync {
    /// Merge another CRDT state into this one
    /// This is called with the state read from the shared location
    fn merge(&mut self, other: &Self) -> StoreResult<()>;
}
