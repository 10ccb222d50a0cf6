//! Caller-facing domain model.
//!
//! # Responsibility
//! - Define the plain value types handed to and returned by repositories.
//!
//! # Invariants
//! - Domain types carry no storage encoding; translation lives in `repo`.

pub mod record;
