//! Expiring record domain model.
//!
//! # Responsibility
//! - Define the `{id, timestamp}` record stored by the repository.
//! - Expose the millisecond truncation rule applied by storage.
//!
//! # Invariants
//! - `id` is assigned by the caller and never changes after storage.
//! - `timestamp` marks the moment the record becomes eligible for expiry.

use mongodb::bson::DateTime;
use std::time::SystemTime;
use uuid::Uuid;

/// Stable identifier of a stored record.
pub type RecordId = Uuid;

/// Timestamped record with a globally unique identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub id: RecordId,
    /// Expiration anchor; the store removes the record after
    /// `timestamp + retention`.
    pub timestamp: SystemTime,
}

impl Record {
    pub fn new(id: RecordId, timestamp: SystemTime) -> Self {
        Self { id, timestamp }
    }

    /// Creates a record with a random v4 id anchored at the current time.
    pub fn now() -> Self {
        Self::new(Uuid::new_v4(), SystemTime::now())
    }

    /// Returns this record as it reads back from storage.
    pub fn truncated(&self) -> Self {
        Self::new(self.id, truncate_to_millis(self.timestamp))
    }
}

/// Truncates `timestamp` toward the epoch to millisecond precision.
///
/// Stored timestamps use the engine's native datetime, which keeps whole
/// milliseconds only. Compare round-tripped records through this function.
///
/// Values more than `i64::MAX` milliseconds away from the epoch clamp to the
/// datetime bounds here; the repository refuses to store such timestamps.
pub fn truncate_to_millis(timestamp: SystemTime) -> SystemTime {
    DateTime::from_system_time(timestamp).to_system_time()
}
