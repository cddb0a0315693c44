/*
    Model subsystem - Records, identities and the collection table
*/

pub mod collection;
pub mod record;
pub mod types;

pub use collection::*;
pub use record::*;
pub use types::*;
