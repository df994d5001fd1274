//! Connection-related data models.
//!
//! This module defines the engine enumeration, logical units, connection
//! descriptors and the transaction state carried by a session.

use crate::config::PoolOptions;
use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    Derby,
    H2,
    /// Includes MariaDB
    MySql,
    Oracle,
    Postgres,
    Sqlite,
}

impl DbType {
    /// Detect the engine from a connection URL.
    ///
    /// Accepts JDBC-style URLs (`jdbc:h2:mem:test`) as well as driver URLs
    /// (`postgres://host/db`). An unrecognized prefix is an error rather than a
    /// fallback, so no statement is ever generated for the wrong engine.
    pub fn detect(url: &str) -> DbResult<Self> {
        let lower = url.trim().to_lowercase();
        let rest = lower.strip_prefix("jdbc:").unwrap_or(&lower);
        let db_type = if rest.starts_with("derby:") {
            Self::Derby
        } else if rest.starts_with("h2:") {
            Self::H2
        } else if rest.starts_with("mysql:") || rest.starts_with("mariadb:") {
            Self::MySql
        } else if rest.starts_with("oracle:") {
            Self::Oracle
        } else if rest.starts_with("postgres:") || rest.starts_with("postgresql:") {
            Self::Postgres
        } else if rest.starts_with("sqlite:") {
            Self::Sqlite
        } else {
            return Err(DbError::dialect_detection(mask_url(url)));
        };
        Ok(db_type)
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Derby => "Derby",
            Self::H2 => "H2",
            Self::MySql => "MySQL",
            Self::Oracle => "Oracle",
            Self::Postgres => "PostgreSQL",
            Self::Sqlite => "SQLite",
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// A named persistence configuration that connections resolve against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistenceUnit {
    pub name: String,
    /// Default URL used when a connection does not override it.
    #[serde(default, skip_serializing)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub pool: PoolOptions,
}

impl PersistenceUnit {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: None,
            user: None,
            password: None,
            pool: PoolOptions::default(),
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_pool(mut self, pool: PoolOptions) -> Self {
        self.pool = pool;
        self
    }
}

/// A named logical connection. Immutable once the registry has loaded it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionDescriptor {
    pub name: String,
    /// Name of the logical unit this connection resolves against.
    pub unit: String,
    /// Capability flags, e.g. "esw" or "connection".
    #[serde(default)]
    pub flags: BTreeSet<String>,
    /// Overrides the unit's URL. `None` means "use unit defaults".
    #[serde(default, skip_serializing)]
    pub url: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    /// Contains sensitive data - never log
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
}

impl ConnectionDescriptor {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
            flags: BTreeSet::new(),
            url: None,
            user: None,
            password: None,
        }
    }

    pub fn with_flags<I, S>(mut self, flags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.flags.extend(flags.into_iter().map(Into::into));
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    /// True if every requested flag is declared on this descriptor.
    pub fn has_flags<S: AsRef<str>>(&self, requested: &[S]) -> bool {
        requested.iter().all(|f| self.flags.contains(f.as_ref()))
    }
}

/// Transaction state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionState {
    NotStarted,
    Active,
    /// Can no longer be committed; released with a rollback
    RollbackOnly,
    Committed,
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction is still open (active or rollback-only).
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::RollbackOnly)
    }

    /// Check if the transaction has ended (committed or rolled back).
    pub fn is_ended(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

/// Mask the password in a URL for display (credentials never reach logs).
pub fn mask_url(url: &str) -> String {
    if let Some(at_pos) = url.find('@') {
        let scheme_end = url.find("://").map(|p| p + 3).unwrap_or(0);
        if let Some(colon_pos) = url[scheme_end..at_pos].rfind(':') {
            let colon_pos = scheme_end + colon_pos;
            let prefix = &url[..colon_pos + 1];
            let suffix = &url[at_pos..];
            return format!("{}****{}", prefix, suffix);
        }
    }
    url.to_string()
}
