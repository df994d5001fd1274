//! Configuration handling.
//!
//! Two layers live here: the registry configuration (logical units and named
//! connections, read from a JSON document) and the command line of the
//! `db-session` binary, parsed with clap.

use crate::error::{DbError, DbResult};
use crate::models::{ConnectionDescriptor, PersistenceUnit};
use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

// Pool defaults; SQLite pools hold a single connection
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Driver-level options for the pool behind one session factory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolOptions {
    /// Maximum connections (default: 5, or 1 for SQLite)
    pub max_connections: Option<u32>,
    /// Minimum idle connections (default: 0, nothing is opened eagerly)
    pub min_connections: Option<u32>,
    /// Seconds before an idle connection is dropped (default: 600)
    pub idle_timeout_secs: Option<u64>,
    /// Seconds a session waits for a free connection (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// Ping pooled connections before handing them out (default: true)
    pub test_before_acquire: Option<bool>,
}

impl PoolOptions {
    /// Configured maximum, else the engine default.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.max_connections.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    pub fn test_before_acquire_or_default(&self) -> bool {
        self.test_before_acquire.unwrap_or(true)
    }

    /// Reject settings sqlx would refuse or that could never be satisfied.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(max) = self.max_connections {
            if max == 0 {
                return Err("max_connections must be greater than 0".to_string());
            }
            if let Some(min) = self.min_connections {
                if min > max {
                    return Err(format!(
                        "min_connections ({}) cannot exceed max_connections ({})",
                        min, max
                    ));
                }
            }
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Logical units and named connections, as supplied by an external loader.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RegistryConfig {
    #[serde(default)]
    pub units: Vec<PersistenceUnit>,
    /// Registration order is preserved by the registry.
    #[serde(default)]
    pub connections: Vec<ConnectionDescriptor>,
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unit(mut self, unit: PersistenceUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_connection(mut self, connection: ConnectionDescriptor) -> Self {
        self.connections.push(connection);
        self
    }

    /// Parse a JSON document.
    pub fn from_json(json: &str) -> DbResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| DbError::configuration(format!("Invalid registry configuration: {}", e)))
    }

    /// Read and parse a JSON file.
    pub fn from_file(path: &Path) -> DbResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            DbError::configuration(format!("Cannot read '{}': {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Find a logical unit by name.
    pub fn unit(&self, name: &str) -> Option<&PersistenceUnit> {
        self.units.iter().find(|u| u.name == name)
    }

    /// Check names, references, URLs and pool options.
    pub fn validate(&self) -> DbResult<()> {
        let mut unit_names = HashSet::new();
        for unit in &self.units {
            validate_name("unit", &unit.name)?;
            if !unit_names.insert(unit.name.as_str()) {
                return Err(DbError::configuration(format!(
                    "Duplicate unit name '{}'",
                    unit.name
                )));
            }
            unit.pool.validate().map_err(|e| {
                DbError::configuration(format!("Unit '{}': {}", unit.name, e))
            })?;
        }

        let mut connection_names = HashSet::new();
        for conn in &self.connections {
            validate_name("connection", &conn.name)?;
            if !connection_names.insert(conn.name.as_str()) {
                return Err(DbError::configuration(format!(
                    "Duplicate connection name '{}'",
                    conn.name
                )));
            }
            let unit = self.unit(&conn.unit).ok_or_else(|| {
                DbError::configuration(format!(
                    "Connection '{}' references unknown unit '{}'",
                    conn.name, conn.unit
                ))
            })?;
            if conn.url.is_none() && unit.url.is_none() {
                return Err(DbError::configuration(format!(
                    "Connection '{}' has no URL and unit '{}' defines none",
                    conn.name, conn.unit
                )));
            }
        }
        Ok(())
    }
}

fn validate_name(kind: &str, name: &str) -> DbResult<()> {
    if name.is_empty() {
        return Err(DbError::configuration(format!("{} name cannot be empty", kind)));
    }
    if !name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(DbError::configuration(format!(
            "{} name contains invalid characters: {}",
            kind, name
        )));
    }
    Ok(())
}

/// Command line of the `db-session` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "db-session",
    about = "Inspect and reset databases through named logical connections",
    version,
    author
)]
pub struct Config {
    /// Registry configuration file (JSON with "units" and "connections")
    #[arg(short, long, value_name = "FILE", env = "DB_SESSION_CONFIG")]
    pub config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "DB_SESSION_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "DB_SESSION_JSON_LOGS")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// List connection names, optionally filtered by flags
    List {
        /// Only connections declaring this flag (repeatable)
        #[arg(short, long = "flag")]
        flags: Vec<String>,
    },
    /// List the tables visible to a connection
    Tables { connection: String },
    /// List the columns of a table
    Columns { connection: String, table: String },
    /// Show the single-column primary key of a table
    PrimaryKey { connection: String, table: String },
    /// List sequence names
    Sequences { connection: String },
    /// Restart identity columns and sequences at a value, then commit
    ResetSequences {
        connection: String,
        #[arg(default_value_t = 1)]
        start: i64,
    },
    /// Peek at the next value of a sequence
    NextValue { connection: String, sequence: String },
}
