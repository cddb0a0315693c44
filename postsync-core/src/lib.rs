pub mod config;
pub mod core_store;
pub mod logging;
pub mod metrics;
pub mod shutdown;

pub use config::{Config, ConfigError, SyncConfig};
pub use core_store::model::{Identity, Record};
pub use core_store::store::{StoreError, StoreResult};
pub use core_store::sync::{SkipReason, SyncOutcome, SyncReport, SyncScheduler, SyncService};
pub use logging::{init_logging, init_logging_with_config, LogConfig, LogLevel};
