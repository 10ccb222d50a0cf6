//! Expiring record storage over a document database.
//! Records are kept unique by id and removed by the engine after a
//! configurable retention window.

pub mod config;
pub mod logging;
pub mod model;
pub mod repo;
pub mod store;

pub use config::{ConfigError, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::record::{truncate_to_millis, Record, RecordId};
pub use repo::record_repo::{
    ExpiringRecordRepository, PersistedRecord, RecordRepository, RepoError, RepoErrorKind,
    RepoResult,
};
pub use store::memory::MemoryCollection;
pub use store::{open_collection, IndexKind, IndexSpec, RecordCollection, StorageError};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
