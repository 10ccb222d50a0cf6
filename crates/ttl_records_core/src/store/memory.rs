//! In-process collection with unique and TTL index semantics.
//!
//! # Responsibility
//! - Stand in for the document engine in tests and local CLI runs.
//! - Enforce provisioned unique indexes on insert.
//! - Remove expired documents only when `sweep_expired` is called, mirroring
//!   an engine-side periodic sweep.
//!
//! # Invariants
//! - Re-provisioning an identical index is a no-op; the same field with
//!   different options fails with `INDEX_OPTIONS_CONFLICT_CODE`.
//! - Duplicate inserts fail with `DUPLICATE_KEY_CODE` and leave the stored
//!   document untouched.
//! - A unique index cannot be built over documents that already share an id.

use super::{
    IndexKind, IndexSpec, RecordCollection, StorageError, DUPLICATE_KEY_CODE,
    INDEX_OPTIONS_CONFLICT_CODE,
};
use crate::repo::record_repo::{PersistedRecord, ID_FIELD, TIMESTAMP_FIELD};
use mongodb::bson::Uuid as BsonUuid;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

/// Engine code used while the collection is marked unavailable.
pub const UNAVAILABLE_CODE: i32 = 6;

/// Engine code for indexes on fields a persisted record does not have.
pub const UNKNOWN_FIELD_CODE: i32 = 2;

/// Error raised by `MemoryCollection`, shaped like an engine error reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryStoreError {
    pub code: i32,
    pub message: String,
}

impl MemoryStoreError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl Display for MemoryStoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "memory store error {}: {}", self.code, self.message)
    }
}

impl Error for MemoryStoreError {}

impl StorageError for MemoryStoreError {
    fn is_duplicate_key(&self) -> bool {
        self.code == DUPLICATE_KEY_CODE
    }
}

#[derive(Debug, Default)]
struct MemoryState {
    indexes: Vec<IndexSpec>,
    documents: Vec<PersistedRecord>,
    unavailable: bool,
}

impl MemoryState {
    fn check_available(&self) -> Result<(), MemoryStoreError> {
        if self.unavailable {
            return Err(MemoryStoreError::new(
                UNAVAILABLE_CODE,
                "collection is unavailable",
            ));
        }
        Ok(())
    }

    fn has_unique_id_index(&self) -> bool {
        self.indexes
            .iter()
            .any(|index| index.field == ID_FIELD && index.kind == IndexKind::Unique)
    }

    fn first_duplicate_id(&self) -> Option<BsonUuid> {
        self.documents.iter().enumerate().find_map(|(position, document)| {
            self.documents[..position]
                .iter()
                .any(|earlier| earlier.id == document.id)
                .then_some(document.id)
        })
    }
}

/// Thread-safe in-memory collection of persisted records.
#[derive(Debug, Default)]
pub struct MemoryCollection {
    state: Mutex<MemoryState>,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent call fail with a non-duplicate error until
    /// cleared.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.lock().unavailable = unavailable;
    }

    /// Returns the indexes provisioned so far, in creation order.
    pub fn indexes(&self) -> Vec<IndexSpec> {
        self.lock().indexes.clone()
    }

    /// Returns the number of stored documents.
    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Deletes every document whose TTL field is at least its window old at
    /// `now`. Returns how many documents were removed.
    pub fn sweep_expired(&self, now: SystemTime) -> usize {
        let mut state = self.lock();
        let windows = state
            .indexes
            .iter()
            .filter_map(|index| match index.kind {
                IndexKind::ExpireAfter(window) if index.field == TIMESTAMP_FIELD => Some(window),
                _ => None,
            })
            .collect::<Vec<_>>();
        if windows.is_empty() {
            return 0;
        }

        let before = state.documents.len();
        state.documents.retain(|document| {
            let timestamp = document.timestamp.to_system_time();
            !windows
                .iter()
                .any(|window| timestamp.checked_add(*window).is_some_and(|at| at <= now))
        });
        before - state.documents.len()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl RecordCollection for MemoryCollection {
    type Error = MemoryStoreError;

    fn provision_indexes(&self, indexes: &[IndexSpec]) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.check_available()?;

        for spec in indexes {
            if spec.field != ID_FIELD && spec.field != TIMESTAMP_FIELD {
                return Err(MemoryStoreError::new(
                    UNKNOWN_FIELD_CODE,
                    format!("unknown field `{}`", spec.field),
                ));
            }
            if let Some(existing) = state.indexes.iter().find(|index| index.field == spec.field) {
                if existing.kind != spec.kind {
                    return Err(MemoryStoreError::new(
                        INDEX_OPTIONS_CONFLICT_CODE,
                        format!(
                            "index `{}` already exists with different options",
                            spec.name()
                        ),
                    ));
                }
            } else if spec.kind == IndexKind::Unique && spec.field == ID_FIELD {
                if let Some(id) = state.first_duplicate_id() {
                    return Err(MemoryStoreError::new(
                        DUPLICATE_KEY_CODE,
                        format!(
                            "E11000 duplicate key error building index {} dup key: {id}",
                            spec.name()
                        ),
                    ));
                }
            }
        }

        for spec in indexes {
            if !state.indexes.contains(spec) {
                state.indexes.push(*spec);
            }
        }
        Ok(())
    }

    fn insert_record(&self, record: &PersistedRecord) -> Result<(), Self::Error> {
        let mut state = self.lock();
        state.check_available()?;

        if state.has_unique_id_index()
            && state.documents.iter().any(|document| document.id == record.id)
        {
            return Err(MemoryStoreError::new(
                DUPLICATE_KEY_CODE,
                format!("E11000 duplicate key error index: id_1 dup key: {}", record.id),
            ));
        }

        state.documents.push(record.clone());
        Ok(())
    }

    fn find_record(&self, id: BsonUuid) -> Result<Option<PersistedRecord>, Self::Error> {
        let state = self.lock();
        state.check_available()?;
        Ok(state
            .documents
            .iter()
            .find(|document| document.id == id)
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryCollection, UNAVAILABLE_CODE};
    use crate::repo::record_repo::PersistedRecord;
    use crate::store::{IndexSpec, RecordCollection, StorageError, INDEX_OPTIONS_CONFLICT_CODE};
    use crate::Record;
    use std::time::{Duration, SystemTime};

    fn ttl(seconds: u64) -> IndexSpec {
        IndexSpec::expire_after("timestamp", Duration::from_secs(seconds))
    }

    #[test]
    fn inserts_without_unique_index_allow_duplicates() {
        let collection = MemoryCollection::new();
        let persisted = PersistedRecord::try_from(&Record::now()).unwrap();

        collection.insert_record(&persisted).unwrap();
        collection.insert_record(&persisted).unwrap();
        assert_eq!(collection.len(), 2);
    }

    #[test]
    fn unique_index_rejects_duplicate_with_duplicate_code() {
        let collection = MemoryCollection::new();
        collection
            .provision_indexes(&[IndexSpec::unique("id")])
            .unwrap();
        let persisted = PersistedRecord::try_from(&Record::now()).unwrap();

        collection.insert_record(&persisted).unwrap();
        let err = collection.insert_record(&persisted).unwrap_err();
        assert!(err.is_duplicate_key());
        assert_eq!(collection.len(), 1);
    }

    #[test]
    fn unique_index_build_over_duplicates_is_rejected() {
        let collection = MemoryCollection::new();
        let persisted = PersistedRecord::try_from(&Record::now()).unwrap();
        collection.insert_record(&persisted).unwrap();
        collection.insert_record(&persisted).unwrap();

        let err = collection
            .provision_indexes(&[IndexSpec::unique("id"), ttl(60)])
            .unwrap_err();
        assert!(err.is_duplicate_key());
        assert!(collection.indexes().is_empty());
    }

    #[test]
    fn unique_index_build_over_distinct_ids_succeeds() {
        let collection = MemoryCollection::new();
        for _ in 0..3 {
            collection
                .insert_record(&PersistedRecord::try_from(&Record::now()).unwrap())
                .unwrap();
        }

        collection
            .provision_indexes(&[IndexSpec::unique("id")])
            .unwrap();
        assert_eq!(collection.indexes(), vec![IndexSpec::unique("id")]);
    }

    #[test]
    fn conflicting_ttl_window_is_rejected() {
        let collection = MemoryCollection::new();
        collection.provision_indexes(&[ttl(60)]).unwrap();
        collection.provision_indexes(&[ttl(60)]).unwrap();

        let err = collection.provision_indexes(&[ttl(120)]).unwrap_err();
        assert_eq!(err.code, INDEX_OPTIONS_CONFLICT_CODE);
        assert!(!err.is_duplicate_key());
        assert_eq!(collection.indexes(), vec![ttl(60)]);
    }

    #[test]
    fn unknown_index_field_is_rejected() {
        let collection = MemoryCollection::new();
        let err = collection
            .provision_indexes(&[IndexSpec::unique("name")])
            .unwrap_err();
        assert!(err.message.contains("name"));
        assert!(collection.indexes().is_empty());
    }

    #[test]
    fn sweep_removes_only_expired_documents() {
        let collection = MemoryCollection::new();
        collection.provision_indexes(&[ttl(60)]).unwrap();
        let now = SystemTime::now();
        let old = Record::new(uuid::Uuid::new_v4(), now - Duration::from_secs(120));
        let fresh = Record::new(uuid::Uuid::new_v4(), now);
        collection
            .insert_record(&PersistedRecord::try_from(&old).unwrap())
            .unwrap();
        collection
            .insert_record(&PersistedRecord::try_from(&fresh).unwrap())
            .unwrap();

        assert_eq!(collection.sweep_expired(now), 1);
        assert_eq!(collection.len(), 1);
        assert!(collection
            .find_record(PersistedRecord::try_from(&fresh).unwrap().id)
            .unwrap()
            .is_some());
    }

    #[test]
    fn sweep_without_ttl_index_keeps_everything() {
        let collection = MemoryCollection::new();
        let old = Record::new(
            uuid::Uuid::new_v4(),
            SystemTime::now() - Duration::from_secs(3600),
        );
        collection
            .insert_record(&PersistedRecord::try_from(&old).unwrap())
            .unwrap();

        assert_eq!(collection.sweep_expired(SystemTime::now()), 0);
        assert!(!collection.is_empty());
    }

    #[test]
    fn unavailable_collection_fails_every_call() {
        let collection = MemoryCollection::new();
        collection.set_unavailable(true);

        let err = collection.provision_indexes(&[ttl(1)]).unwrap_err();
        assert_eq!(err.code, UNAVAILABLE_CODE);
        let persisted = PersistedRecord::try_from(&Record::now()).unwrap();
        assert!(collection.insert_record(&persisted).is_err());
        assert!(collection.find_record(persisted.id).is_err());

        collection.set_unavailable(false);
        assert!(collection.find_record(persisted.id).unwrap().is_none());
    }
}
