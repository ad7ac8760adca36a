//! Engine configuration module.
//!
//! This module loads the `cursorkv` binary's configuration from environment
//! variables and the store schemas from a JSON file.
//!
//! # Environment Variables
//!
//! - `CURSORKV_SCHEMA_FILE`: JSON file holding an array of store schemas (required)
//! - `CURSORKV_DATABASE_NAME`: Database name passed to the substrate (default: `cursorkv`)
//! - `CURSORKV_DATABASE_VERSION`: Schema version, at least 1 (default: `1`)
//! - `CURSORKV_CACHE_CAPACITY`: Records kept in the LRU cache, at least 1 (default: `1000`)
//!
//! # Invariants
//!
//! - `database_version >= 1`
//! - `cache_capacity >= 1`

use std::path::{Path, PathBuf};

use crate::cache::DEFAULT_CACHE_CAPACITY;
use crate::database::DatabaseOptions;
use crate::types::StoreSchema;

const SCHEMA_FILE: &str = "CURSORKV_SCHEMA_FILE";
const DATABASE_NAME: &str = "CURSORKV_DATABASE_NAME";
const DATABASE_VERSION: &str = "CURSORKV_DATABASE_VERSION";
const CACHE_CAPACITY: &str = "CURSORKV_CACHE_CAPACITY";

/// Engine configuration.
///
/// # Post-conditions
///
/// When constructed via `from_env()` or `from_lookup()`:
/// - `database_version` is at least 1
/// - `cache_capacity` is at least 1
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path of the JSON schema file.
    pub schema_file: PathBuf,
    /// Name the substrate opens the database under.
    pub database_name: String,
    /// Schema version. Raising it lets the substrate add stores and indexes.
    pub database_version: u32,
    /// Capacity of the record cache.
    pub cache_capacity: usize,
}

/// Error returned when loading configuration fails.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable is missing.
    MissingEnvVar(String),
    /// An environment variable has an invalid value.
    InvalidValue { name: String, message: String },
    /// The schema file could not be read or parsed.
    SchemaFile { path: PathBuf, message: String },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingEnvVar(name) => {
                write!(f, "missing required environment variable: {name}")
            }
            Self::InvalidValue { name, message } => {
                write!(f, "invalid value for {name}: {message}")
            }
            Self::SchemaFile { path, message } => {
                write!(f, "cannot load schema file {}: {message}", path.display())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

impl EngineConfig {
    /// Default database name.
    pub const DEFAULT_DATABASE_NAME: &'static str = "cursorkv";
    /// Default schema version.
    pub const DEFAULT_DATABASE_VERSION: u32 = 1;

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through `lookup`, which returns a variable's value
    /// if it is set.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `CURSORKV_SCHEMA_FILE` is not set or is empty
    /// - `CURSORKV_DATABASE_VERSION` is set but not an integer >= 1
    /// - `CURSORKV_CACHE_CAPACITY` is set but not an integer >= 1
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let schema_file = match lookup(SCHEMA_FILE) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            Some(_) => {
                return Err(ConfigError::InvalidValue {
                    name: SCHEMA_FILE.to_string(),
                    message: "must not be empty".to_string(),
                });
            }
            None => return Err(ConfigError::MissingEnvVar(SCHEMA_FILE.to_string())),
        };

        let database_name = lookup(DATABASE_NAME)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| Self::DEFAULT_DATABASE_NAME.to_string());

        let database_version = match lookup(DATABASE_VERSION) {
            Some(value) => parse_positive::<u32>(DATABASE_VERSION, &value)?,
            None => Self::DEFAULT_DATABASE_VERSION,
        };

        let cache_capacity = match lookup(CACHE_CAPACITY) {
            Some(value) => parse_positive::<usize>(CACHE_CAPACITY, &value)?,
            None => DEFAULT_CACHE_CAPACITY,
        };

        Ok(Self {
            schema_file,
            database_name,
            database_version,
            cache_capacity,
        })
    }

    /// Database options for these settings and `stores`.
    #[must_use]
    pub fn database_options(&self, stores: Vec<StoreSchema>) -> DatabaseOptions {
        DatabaseOptions::new(self.database_name.as_str())
            .with_version(self.database_version)
            .with_cache_capacity(self.cache_capacity)
            .with_stores(stores)
    }
}

fn parse_positive<T>(name: &str, value: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr + PartialOrd + From<u8>,
{
    match value.trim().parse::<T>() {
        Ok(n) if n >= T::from(1) => Ok(n),
        _ => Err(ConfigError::InvalidValue {
            name: name.to_string(),
            message: format!("'{value}' is not a positive integer"),
        }),
    }
}

/// Read a JSON array of store schemas.
pub fn load_schemas(path: &Path) -> Result<Vec<StoreSchema>, ConfigError> {
    let schema_error = |message: String| ConfigError::SchemaFile {
        path: path.to_path_buf(),
        message,
    };
    let text = std::fs::read_to_string(path).map_err(|e| schema_error(e.to_string()))?;
    serde_json::from_str(&text).map_err(|e| schema_error(e.to_string()))
}
