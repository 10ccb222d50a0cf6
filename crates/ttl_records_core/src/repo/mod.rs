//! Repository layer over the storage-engine seam.
//!
//! # Responsibility
//! - Expose store/get use cases for expiring records.
//! - Isolate persisted document encoding from callers.
//!
//! # Invariants
//! - Repository APIs return classified errors (`DuplicateRecord`,
//!   `Insertion`, `NotFound`) with the storage cause attached.

pub mod record_repo;
