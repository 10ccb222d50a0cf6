//! Store connection settings.
//!
//! # Responsibility
//! - Hold the connection URI, collection location and retention window.
//! - Load settings from `TTL_RECORDS_*` environment variables.
//!
//! # Invariants
//! - A validated config has a non-empty URI, database and collection name.

use std::error::Error;
use std::fmt::{Display, Formatter};

pub const ENV_URI: &str = "TTL_RECORDS_MONGODB_URI";
pub const ENV_DATABASE: &str = "TTL_RECORDS_DATABASE";
pub const ENV_COLLECTION: &str = "TTL_RECORDS_COLLECTION";
pub const ENV_RETENTION_SECONDS: &str = "TTL_RECORDS_RETENTION_SECONDS";

pub const DEFAULT_DATABASE: &str = "ttl";
pub const DEFAULT_COLLECTION: &str = "records";
pub const DEFAULT_RETENTION_SECONDS: u32 = 700;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    Missing(&'static str),
    Empty(&'static str),
    InvalidRetention(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(name) => write!(f, "missing required setting `{name}`"),
            Self::Empty(name) => write!(f, "setting `{name}` cannot be empty"),
            Self::InvalidRetention(value) => write!(
                f,
                "invalid retention `{value}`; expected a non-negative number of seconds"
            ),
        }
    }
}

impl Error for ConfigError {}

/// Where records live and how long they are kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub uri: String,
    pub database: String,
    pub collection: String,
    pub retention_seconds: u32,
}

impl StoreConfig {
    /// Builds a config with default database, collection and retention.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            database: DEFAULT_DATABASE.to_string(),
            collection: DEFAULT_COLLECTION.to_string(),
            retention_seconds: DEFAULT_RETENTION_SECONDS,
        }
    }

    /// Loads settings from the process environment.
    ///
    /// # Errors
    /// - `ConfigError::Missing` when `TTL_RECORDS_MONGODB_URI` is unset.
    /// - `ConfigError::InvalidRetention` when the retention is not a `u32`.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Loads settings through `lookup`, which maps a variable name to its
    /// value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let uri = lookup(ENV_URI).ok_or(ConfigError::Missing(ENV_URI))?;
        let mut config = Self::new(uri);

        if let Some(database) = lookup(ENV_DATABASE) {
            config.database = database;
        }
        if let Some(collection) = lookup(ENV_COLLECTION) {
            config.collection = collection;
        }
        if let Some(retention) = lookup(ENV_RETENTION_SECONDS) {
            config.retention_seconds = parse_retention(&retention)?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.uri.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_URI));
        }
        if self.database.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_DATABASE));
        }
        if self.collection.trim().is_empty() {
            return Err(ConfigError::Empty(ENV_COLLECTION));
        }
        Ok(())
    }
}

/// Parses a retention window in whole seconds.
pub fn parse_retention(value: &str) -> Result<u32, ConfigError> {
    value
        .trim()
        .parse::<u32>()
        .map_err(|_| ConfigError::InvalidRetention(value.to_string()))
}
