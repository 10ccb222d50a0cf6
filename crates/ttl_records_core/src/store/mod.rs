//! Storage-engine seam consumed by the record repository.
//!
//! # Responsibility
//! - Describe the minimal collection capabilities the repository relies on.
//! - Provide MongoDB and in-process implementations of that contract.
//!
//! # Invariants
//! - Index provisioning is idempotent for identical index specs.
//! - Uniqueness and expiration are enforced by the engine, never by callers.
//! - Every backend can tell a duplicate-key failure apart from other failures.

use crate::repo::record_repo::PersistedRecord;
use mongodb::bson::Uuid as BsonUuid;
use std::error::Error;
use std::time::Duration;

pub mod memory;
pub mod mongo;
pub mod open;

pub use open::open_collection;

/// Engine error code reported when a unique index rejects a write.
pub const DUPLICATE_KEY_CODE: i32 = 11000;

/// Engine error code reported when an index exists with different options.
pub const INDEX_OPTIONS_CONFLICT_CODE: i32 = 85;

/// Behavior attached to a single-field ascending index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// Rejects writes that would duplicate an existing field value.
    Unique,
    /// Lets the engine delete documents once the field is older than the
    /// given window.
    ExpireAfter(Duration),
}

/// Declarative description of one index the repository requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: &'static str,
    pub kind: IndexKind,
}

impl IndexSpec {
    pub fn unique(field: &'static str) -> Self {
        Self {
            field,
            kind: IndexKind::Unique,
        }
    }

    pub fn expire_after(field: &'static str, window: Duration) -> Self {
        Self {
            field,
            kind: IndexKind::ExpireAfter(window),
        }
    }

    /// Engine-assigned default name (`<field>_1`).
    pub fn name(&self) -> String {
        format!("{}_1", self.field)
    }
}

/// Failure raised by a storage backend.
///
/// Backends report whether a failure means "uniqueness violated" through a
/// well-known identifier of their own error representation.
pub trait StorageError: Error + Send + Sync + 'static {
    fn is_duplicate_key(&self) -> bool;
}

/// Single collection holding persisted records.
pub trait RecordCollection {
    type Error: StorageError;

    /// Creates the given indexes, succeeding when they already exist as-is.
    fn provision_indexes(&self, indexes: &[IndexSpec]) -> Result<(), Self::Error>;

    /// Inserts exactly one document.
    fn insert_record(&self, record: &PersistedRecord) -> Result<(), Self::Error>;

    /// Finds the single document whose `id` equals `id`.
    fn find_record(&self, id: BsonUuid) -> Result<Option<PersistedRecord>, Self::Error>;
}

impl<C: RecordCollection + ?Sized> RecordCollection for &C {
    type Error = C::Error;

    fn provision_indexes(&self, indexes: &[IndexSpec]) -> Result<(), Self::Error> {
        (**self).provision_indexes(indexes)
    }

    fn insert_record(&self, record: &PersistedRecord) -> Result<(), Self::Error> {
        (**self).insert_record(record)
    }

    fn find_record(&self, id: BsonUuid) -> Result<Option<PersistedRecord>, Self::Error> {
        (**self).find_record(id)
    }
}
