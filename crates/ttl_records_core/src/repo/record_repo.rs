//! Expiring record repository contracts and collection-backed implementation.
//!
//! # Responsibility
//! - Translate domain records to the persisted document shape and back.
//! - Provision the unique `id` index and the `timestamp` TTL index on
//!   construction.
//! - Classify storage failures into `RepoError` variants.
//!
//! # Invariants
//! - `store_record` performs exactly one insert and never retries.
//! - Every error variant keeps its underlying storage cause when one exists.
//! - Reads cannot tell "never stored" apart from "already expired".

use crate::model::record::{Record, RecordId};
use crate::store::{IndexSpec, RecordCollection, StorageError};
use log::{debug, error, info, warn};
use mongodb::bson::{DateTime, Uuid as BsonUuid};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use uuid::Uuid;

/// Persisted field holding the record identifier.
pub const ID_FIELD: &str = "id";
/// Persisted field holding the expiration anchor.
pub const TIMESTAMP_FIELD: &str = "timestamp";
/// Largest retention the engine accepts for `expireAfterSeconds`.
pub const MAX_RETENTION_SECONDS: u32 = i32::MAX as u32;

pub type RepoResult<T> = Result<T, RepoError>;

/// Underlying failure preserved inside a `RepoError`.
pub type RepoCause = Box<dyn Error + Send + Sync + 'static>;

/// Document shape stored in the collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedRecord {
    pub id: BsonUuid,
    pub timestamp: DateTime,
}

impl TryFrom<&Record> for PersistedRecord {
    type Error = TimestampOutOfRange;

    fn try_from(value: &Record) -> Result<Self, Self::Error> {
        Ok(Self {
            id: encode_id(value.id),
            timestamp: encode_timestamp(value.timestamp)?,
        })
    }
}

impl From<PersistedRecord> for Record {
    fn from(value: PersistedRecord) -> Self {
        Record::new(
            Uuid::from_bytes(value.id.bytes()),
            value.timestamp.to_system_time(),
        )
    }
}

fn encode_id(id: RecordId) -> BsonUuid {
    BsonUuid::from_bytes(*id.as_bytes())
}

/// Converts to the engine datetime, refusing values it would clamp.
fn encode_timestamp(timestamp: SystemTime) -> Result<DateTime, TimestampOutOfRange> {
    let in_range = match timestamp.duration_since(UNIX_EPOCH) {
        Ok(after) => after.as_millis() <= i64::MAX as u128,
        Err(before) => before.duration().as_millis() <= i64::MAX as u128,
    };
    if !in_range {
        return Err(TimestampOutOfRange { timestamp });
    }
    Ok(DateTime::from_system_time(timestamp))
}

/// Timestamp outside the engine's millisecond datetime range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampOutOfRange {
    pub timestamp: SystemTime,
}

impl Display for TimestampOutOfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "timestamp {:?} is outside the storable millisecond range",
            self.timestamp
        )
    }
}

impl Error for TimestampOutOfRange {}

/// Classification of a `RepoError`, for callers matching on kind only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoErrorKind {
    Initialization,
    DuplicateRecord,
    Insertion,
    NotFound,
}

/// Repository error taxonomy.
#[derive(Debug)]
pub enum RepoError {
    /// Index provisioning failed or the retention window is unusable.
    Initialization(RepoCause),
    /// A record with the same id is already stored.
    DuplicateRecord { id: RecordId, cause: RepoCause },
    /// Any other write failure.
    Insertion { id: RecordId, cause: RepoCause },
    /// No live record matched, or the lookup itself failed.
    NotFound {
        id: RecordId,
        cause: Option<RepoCause>,
    },
}

impl RepoError {
    pub fn kind(&self) -> RepoErrorKind {
        match self {
            Self::Initialization(_) => RepoErrorKind::Initialization,
            Self::DuplicateRecord { .. } => RepoErrorKind::DuplicateRecord,
            Self::Insertion { .. } => RepoErrorKind::Insertion,
            Self::NotFound { .. } => RepoErrorKind::NotFound,
        }
    }
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialization(cause) => {
                write!(f, "failed to initialize record repository: {cause}")
            }
            Self::DuplicateRecord { id, cause } => {
                write!(f, "duplicate record {id}: {cause}")
            }
            Self::Insertion { id, cause } => write!(f, "failed to insert record {id}: {cause}"),
            Self::NotFound { id, cause: None } => write!(f, "record not found: {id}"),
            Self::NotFound {
                id,
                cause: Some(cause),
            } => write!(f, "record not found: {id}: {cause}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Initialization(cause)
            | Self::DuplicateRecord { cause, .. }
            | Self::Insertion { cause, .. } => Some(cause.as_ref()),
            Self::NotFound { cause, .. } => cause.as_deref().map(|cause| cause as &dyn Error),
        }
    }
}

/// Retention value rejected before any index is provisioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionOutOfRange {
    pub seconds: u32,
}

impl Display for RetentionOutOfRange {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "retention of {} seconds exceeds the maximum of {MAX_RETENTION_SECONDS}",
            self.seconds
        )
    }
}

impl Error for RetentionOutOfRange {}

/// Repository interface for expiring records.
pub trait RecordRepository {
    fn store_record(&self, record: &Record) -> RepoResult<()>;
    fn get_record(&self, id: RecordId) -> RepoResult<Record>;
}

/// Record repository backed by one engine collection with unique and TTL
/// indexes.
#[derive(Debug)]
pub struct ExpiringRecordRepository<C: RecordCollection> {
    collection: C,
    retention: Duration,
}

impl<C: RecordCollection> ExpiringRecordRepository<C> {
    /// Wraps `collection` and provisions the required indexes.
    ///
    /// # Errors
    /// - `RepoError::Initialization` when `retention_seconds` exceeds
    ///   `MAX_RETENTION_SECONDS` or index provisioning fails.
    pub fn new(collection: C, retention_seconds: u32) -> RepoResult<Self> {
        let started_at = Instant::now();
        if retention_seconds > MAX_RETENTION_SECONDS {
            error!(
                "event=repo_init module=repo status=error error_code=retention_out_of_range retention_s={}",
                retention_seconds
            );
            return Err(RepoError::Initialization(Box::new(RetentionOutOfRange {
                seconds: retention_seconds,
            })));
        }

        let retention = Duration::from_secs(u64::from(retention_seconds));
        let indexes = [
            IndexSpec::unique(ID_FIELD),
            IndexSpec::expire_after(TIMESTAMP_FIELD, retention),
        ];
        if let Err(err) = collection.provision_indexes(&indexes) {
            error!(
                "event=repo_init module=repo status=error duration_ms={} error_code=index_provision_failed error={}",
                started_at.elapsed().as_millis(),
                err
            );
            return Err(RepoError::Initialization(Box::new(err)));
        }

        info!(
            "event=repo_init module=repo status=ok duration_ms={} retention_s={}",
            started_at.elapsed().as_millis(),
            retention_seconds
        );
        Ok(Self {
            collection,
            retention,
        })
    }

    /// Returns the retention window the TTL index was provisioned with.
    pub fn retention(&self) -> Duration {
        self.retention
    }

    pub fn collection(&self) -> &C {
        &self.collection
    }
}

impl<C: RecordCollection> RecordRepository for ExpiringRecordRepository<C> {
    fn store_record(&self, record: &Record) -> RepoResult<()> {
        let persisted = match PersistedRecord::try_from(record) {
            Ok(persisted) => persisted,
            Err(err) => {
                error!(
                    "event=record_store module=repo status=error error_code=timestamp_out_of_range id={}",
                    record.id
                );
                return Err(RepoError::Insertion {
                    id: record.id,
                    cause: Box::new(err),
                });
            }
        };
        match self.collection.insert_record(&persisted) {
            Ok(()) => {
                debug!("event=record_store module=repo status=ok id={}", record.id);
                Ok(())
            }
            Err(err) if err.is_duplicate_key() => {
                warn!(
                    "event=record_store module=repo status=error error_code=duplicate_record id={}",
                    record.id
                );
                Err(RepoError::DuplicateRecord {
                    id: record.id,
                    cause: Box::new(err),
                })
            }
            Err(err) => {
                error!(
                    "event=record_store module=repo status=error error_code=insert_failed id={} error={}",
                    record.id, err
                );
                Err(RepoError::Insertion {
                    id: record.id,
                    cause: Box::new(err),
                })
            }
        }
    }

    fn get_record(&self, id: RecordId) -> RepoResult<Record> {
        match self.collection.find_record(encode_id(id)) {
            Ok(Some(persisted)) => Ok(Record::from(persisted)),
            Ok(None) => {
                debug!("event=record_get module=repo status=miss id={}", id);
                Err(RepoError::NotFound { id, cause: None })
            }
            Err(err) => {
                error!(
                    "event=record_get module=repo status=error error_code=lookup_failed id={} error={}",
                    id, err
                );
                Err(RepoError::NotFound {
                    id,
                    cause: Some(Box::new(err)),
                })
            }
        }
    }
}
