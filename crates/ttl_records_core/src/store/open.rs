//! Connection bootstrap for the MongoDB backend.
//!
//! # Responsibility
//! - Build a driver client from a `StoreConfig`.
//! - Hand back the typed collection consumed by the repository.
//!
//! # Invariants
//! - No process-wide client is cached; callers own the returned handle.

use crate::config::StoreConfig;
use crate::repo::record_repo::PersistedRecord;
use log::{error, info};
use mongodb::error::Error as MongoError;
use mongodb::sync::{Client, Collection};
use std::time::Instant;

/// Connects to the configured server and returns the records collection.
///
/// The driver connects lazily, so an unreachable server surfaces on the
/// first operation (index provisioning) rather than here.
///
/// # Side effects
/// - Emits `store_open` logging events with duration and status.
pub fn open_collection(config: &StoreConfig) -> Result<Collection<PersistedRecord>, MongoError> {
    let started_at = Instant::now();
    info!(
        "event=store_open module=store status=start database={} collection={}",
        config.database, config.collection
    );

    let client = match Client::with_uri_str(&config.uri) {
        Ok(client) => client,
        Err(err) => {
            error!(
                "event=store_open module=store status=error duration_ms={} error_code=client_init_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(err);
        }
    };

    let collection = client
        .database(&config.database)
        .collection::<PersistedRecord>(&config.collection);
    info!(
        "event=store_open module=store status=ok duration_ms={}",
        started_at.elapsed().as_millis()
    );
    Ok(collection)
}
