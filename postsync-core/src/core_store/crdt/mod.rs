/*
    CRDT subsystem - Conflict-Free Replicated Data Types

    Replicated deletion state shared between replicas.
*/

pub mod tombstone_set;
pub mod traits;

pub use tombstone_set::TombstoneSet;
pub use traits::Crdt;
