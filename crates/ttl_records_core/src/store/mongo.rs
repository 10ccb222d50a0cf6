//! MongoDB collection backend.
//!
//! # Responsibility
//! - Map `IndexSpec` values onto MongoDB index models.
//! - Delegate inserts and lookups to the synchronous driver.
//! - Recognize duplicate-key failures across driver error shapes.
//!
//! # Invariants
//! - Indexes use the server's default names so re-provisioning is a no-op.
//! - TTL windows are passed as `expireAfterSeconds`; deletion timing is owned
//!   by the server's TTL monitor.

use super::{IndexKind, IndexSpec, RecordCollection, StorageError, DUPLICATE_KEY_CODE};
use crate::repo::record_repo::PersistedRecord;
use mongodb::bson::{doc, Document, Uuid as BsonUuid};
use mongodb::error::{Error as MongoError, ErrorKind, WriteFailure};
use mongodb::options::IndexOptions;
use mongodb::sync::Collection;
use mongodb::IndexModel;

impl StorageError for MongoError {
    fn is_duplicate_key(&self) -> bool {
        match self.kind.as_ref() {
            ErrorKind::Write(WriteFailure::WriteError(err)) => err.code == DUPLICATE_KEY_CODE,
            ErrorKind::BulkWrite(failure) => failure
                .write_errors
                .as_ref()
                .is_some_and(|errors| errors.iter().any(|err| err.code == DUPLICATE_KEY_CODE)),
            ErrorKind::Command(err) => err.code == DUPLICATE_KEY_CODE,
            _ => false,
        }
    }
}

impl RecordCollection for Collection<PersistedRecord> {
    type Error = MongoError;

    fn provision_indexes(&self, indexes: &[IndexSpec]) -> Result<(), Self::Error> {
        let models = indexes.iter().map(index_model).collect::<Vec<_>>();
        self.create_indexes(models, None)?;
        Ok(())
    }

    fn insert_record(&self, record: &PersistedRecord) -> Result<(), Self::Error> {
        self.insert_one(record, None)?;
        Ok(())
    }

    fn find_record(&self, id: BsonUuid) -> Result<Option<PersistedRecord>, Self::Error> {
        self.find_one(doc! { "id": id }, None)
    }
}

fn index_model(spec: &IndexSpec) -> IndexModel {
    let options = match spec.kind {
        IndexKind::Unique => IndexOptions::builder().unique(true).build(),
        IndexKind::ExpireAfter(window) => IndexOptions::builder().expire_after(window).build(),
    };

    let mut keys = Document::new();
    keys.insert(spec.field, 1_i32);

    IndexModel::builder()
        .keys(keys)
        .options(options)
        .build()
}
