//! Command-line entry point for expiring record storage.
//!
//! # Responsibility
//! - Open the store from flags or `TTL_RECORDS_*` environment variables.
//! - Wire the retention window into the repository and run one operation.
//!
//! # Invariants
//! - Exit code `2` means an expected outcome (duplicate or not found); `1`
//!   means any other failure.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::process::ExitCode;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use ttl_records_core::config::{
    DEFAULT_COLLECTION, DEFAULT_DATABASE, DEFAULT_RETENTION_SECONDS, ENV_COLLECTION, ENV_DATABASE,
    ENV_RETENTION_SECONDS, ENV_URI,
};
use ttl_records_core::{
    default_log_level, init_logging, open_collection, ExpiringRecordRepository, MemoryCollection,
    Record, RecordCollection, RecordRepository, RepoError, RepoErrorKind, StoreConfig,
};
use uuid::Uuid;

#[derive(Debug, Parser)]
#[command(name = "ttl_records", version, about = "Store and read expiring records")]
struct Cli {
    /// MongoDB connection string.
    #[arg(long, env = ENV_URI, required_unless_present = "in_memory")]
    uri: Option<String>,

    #[arg(long, env = ENV_DATABASE, default_value = DEFAULT_DATABASE)]
    database: String,

    #[arg(long, env = ENV_COLLECTION, default_value = DEFAULT_COLLECTION)]
    collection: String,

    /// Seconds after a record's timestamp before the store may delete it.
    #[arg(long, env = ENV_RETENTION_SECONDS, default_value_t = DEFAULT_RETENTION_SECONDS)]
    retention_seconds: u32,

    /// Use a process-local store instead of MongoDB. Its state is discarded
    /// on exit, so `get` in this mode always reports not found.
    #[arg(long)]
    in_memory: bool,

    #[arg(long, env = "TTL_RECORDS_LOG_LEVEL")]
    log_level: Option<String>,

    /// Absolute directory for rolling log files; logging is off when unset.
    #[arg(long, env = "TTL_RECORDS_LOG_DIR")]
    log_dir: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Store one record and print its id.
    Store {
        /// Record id; a random v4 id is generated when omitted.
        #[arg(long)]
        id: Option<Uuid>,
        /// Expiration anchor in Unix epoch milliseconds; defaults to now.
        #[arg(long)]
        timestamp_ms: Option<u64>,
    },
    /// Print a stored record.
    Get { id: Uuid },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            let expected = err.downcast_ref::<RepoError>().is_some_and(|err| {
                matches!(
                    err.kind(),
                    RepoErrorKind::DuplicateRecord | RepoErrorKind::NotFound
                )
            });
            if expected {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    if let Some(log_dir) = cli.log_dir.as_deref() {
        let level = cli.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir).map_err(anyhow::Error::msg)?;
    }

    if cli.in_memory {
        let repo = ExpiringRecordRepository::new(MemoryCollection::new(), cli.retention_seconds)?;
        return execute(&repo, &cli.command);
    }

    let config = StoreConfig {
        uri: cli.uri.clone().unwrap_or_default(),
        database: cli.database.clone(),
        collection: cli.collection.clone(),
        retention_seconds: cli.retention_seconds,
    };
    config.validate()?;
    let collection = open_collection(&config).context("failed to open MongoDB collection")?;
    let repo = ExpiringRecordRepository::new(collection, config.retention_seconds)?;
    execute(&repo, &cli.command)
}

fn execute<C: RecordCollection>(
    repo: &ExpiringRecordRepository<C>,
    command: &Command,
) -> Result<()> {
    match command {
        Command::Store { id, timestamp_ms } => {
            let timestamp = match timestamp_ms {
                Some(millis) => UNIX_EPOCH + Duration::from_millis(*millis),
                None => SystemTime::now(),
            };
            let record = Record::new(id.unwrap_or_else(Uuid::new_v4), timestamp);
            repo.store_record(&record)?;
            println!("{}", record.id);
        }
        Command::Get { id } => {
            let record = repo.get_record(*id)?;
            println!("id={} timestamp_ms={}", record.id, epoch_millis(record.timestamp));
        }
    }
    Ok(())
}

fn epoch_millis(timestamp: SystemTime) -> i128 {
    match timestamp.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_millis() as i128,
        Err(err) => -(err.duration().as_millis() as i128),
    }
}

#[cfg(test)]
mod tests {
    use super::{epoch_millis, execute, Cli, Command};
    use clap::{CommandFactory, Parser};
    use std::time::{Duration, UNIX_EPOCH};
    use ttl_records_core::{
        ExpiringRecordRepository, MemoryCollection, RecordRepository, RepoError, RepoErrorKind,
    };
    use uuid::Uuid;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn store_accepts_explicit_id_and_timestamp() {
        let cli = Cli::try_parse_from([
            "ttl_records",
            "--in-memory",
            "--retention-seconds",
            "60",
            "store",
            "--id",
            "67e55044-10b1-426f-9247-bb680e5fe0c8",
            "--timestamp-ms",
            "1700000000000",
        ])
        .unwrap();

        assert_eq!(cli.retention_seconds, 60);
        assert!(matches!(
            cli.command,
            Command::Store {
                id: Some(_),
                timestamp_ms: Some(1_700_000_000_000)
            }
        ));
    }

    #[test]
    fn get_requires_valid_uuid() {
        let result = Cli::try_parse_from(["ttl_records", "--in-memory", "get", "not-a-uuid"]);
        assert!(result.is_err());
    }

    #[test]
    fn epoch_millis_handles_both_sides_of_epoch() {
        assert_eq!(epoch_millis(UNIX_EPOCH + Duration::from_millis(1_500)), 1_500);
        assert_eq!(epoch_millis(UNIX_EPOCH - Duration::from_millis(20)), -20);
    }

    #[test]
    fn in_memory_get_from_fresh_store_is_not_found() {
        let repo = ExpiringRecordRepository::new(MemoryCollection::new(), 60).unwrap();

        let err = execute(&repo, &Command::Get { id: Uuid::new_v4() }).unwrap_err();

        let repo_err = err.downcast_ref::<RepoError>().unwrap();
        assert_eq!(repo_err.kind(), RepoErrorKind::NotFound);
    }

    #[test]
    fn in_memory_store_is_visible_within_same_run() {
        let repo = ExpiringRecordRepository::new(MemoryCollection::new(), 60).unwrap();
        let id = Uuid::new_v4();

        execute(
            &repo,
            &Command::Store {
                id: Some(id),
                timestamp_ms: Some(1_700_000_000_123),
            },
        )
        .unwrap();

        let record = repo.get_record(id).unwrap();
        assert_eq!(epoch_millis(record.timestamp), 1_700_000_000_123);
    }

    #[test]
    fn store_with_unstorable_timestamp_is_insertion_error() {
        let repo = ExpiringRecordRepository::new(MemoryCollection::new(), 60).unwrap();

        let err = execute(
            &repo,
            &Command::Store {
                id: None,
                timestamp_ms: Some(u64::MAX),
            },
        )
        .unwrap_err();

        let repo_err = err.downcast_ref::<RepoError>().unwrap();
        assert_eq!(repo_err.kind(), RepoErrorKind::Insertion);
    }
}
