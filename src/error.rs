//! Error types for the session layer.
//!
//! Construction and establishment failures always reach the caller; cleanup
//! failures are logged by the session layer and never surface through this type.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Unknown connection: {name}")]
    UnknownConnection { name: String },

    #[error("Connection registry is closed")]
    RegistryClosed,

    #[error("Cannot create session factory for unit '{unit}': {message}")]
    FactoryCreation {
        unit: String,
        message: String,
        suggestion: String,
    },

    #[error("Failed to establish session '{connection}': {message}")]
    Establish { connection: String, message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLSTATE or vendor code, e.g. "42P01"
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Timed out {operation} after {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Table '{table}' has no primary key")]
    NoPrimaryKey { table: String },

    #[error(
        "Table '{table}' has a composite primary key ({}); only single-column keys are supported",
        .columns.join(", ")
    )]
    CompositeKeyUnsupported { table: String, columns: Vec<String> },

    #[error("No column metadata returned for table '{table}'")]
    EmptyMetadata { table: String },

    #[error("Metadata error: {message} (object: {object})")]
    Metadata { message: String, object: String },

    #[error("{operation} not supported by {db_type}")]
    UnsupportedOperation { operation: String, db_type: String },

    #[error("Cannot detect database type from connection URL '{url}'")]
    DialectDetection { url: String },

    #[error("Session '{connection}' is closed")]
    SessionClosed { connection: String },

    #[error("Transaction error: {message} (connection: {connection})")]
    Transaction { message: String, connection: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an unknown connection error.
    pub fn unknown_connection(name: impl Into<String>) -> Self {
        Self::UnknownConnection { name: name.into() }
    }

    /// Create a factory creation error with a helpful suggestion.
    pub fn factory_creation(
        unit: impl Into<String>,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::FactoryCreation {
            unit: unit.into(),
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an establish error.
    pub fn establish(connection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Establish {
            connection: connection.into(),
            message: message.into(),
        }
    }

    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    pub fn no_primary_key(table: impl Into<String>) -> Self {
        Self::NoPrimaryKey {
            table: table.into(),
        }
    }

    pub fn composite_key_unsupported(table: impl Into<String>, columns: Vec<String>) -> Self {
        Self::CompositeKeyUnsupported {
            table: table.into(),
            columns,
        }
    }

    pub fn empty_metadata(table: impl Into<String>) -> Self {
        Self::EmptyMetadata {
            table: table.into(),
        }
    }

    /// Create a metadata error for an unexpected driver result.
    pub fn metadata(message: impl Into<String>, object: impl Into<String>) -> Self {
        Self::Metadata {
            message: message.into(),
            object: object.into(),
        }
    }

    /// Create an unsupported operation error for a dialect capability.
    pub fn unsupported(operation: impl Into<String>, db_type: impl std::fmt::Display) -> Self {
        Self::UnsupportedOperation {
            operation: operation.into(),
            db_type: db_type.to_string(),
        }
    }

    pub fn dialect_detection(url: impl Into<String>) -> Self {
        Self::DialectDetection { url: url.into() }
    }

    pub fn session_closed(connection: impl Into<String>) -> Self {
        Self::SessionClosed {
            connection: connection.into(),
        }
    }

    pub fn transaction(message: impl Into<String>, connection: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            connection: connection.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Hint for the operator, when the failure has an obvious remedy.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::FactoryCreation { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Get the SQLSTATE reported by the driver, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if this error describes unexpected metadata cardinality.
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            Self::NoPrimaryKey { .. }
                | Self::CompositeKeyUnsupported { .. }
                | Self::EmptyMetadata { .. }
                | Self::Metadata { .. }
        )
    }
}

/// Driver errors split into statement failures (which poison the session's
/// transaction), connectivity failures and decoding bugs.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::Error as E;

        match err {
            E::Database(db_err) => DbError::database(
                db_err.message(),
                db_err.code().map(|c| c.into_owned()),
                "Check the statement and the objects it references",
            ),
            E::RowNotFound => DbError::database(
                "Statement returned no rows",
                None,
                "Check that the referenced rows exist",
            ),
            // The acquire limit is not known here; contexts report it themselves
            E::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "Raise max_connections or acquire_timeout_secs of the persistence unit",
            ),
            E::Configuration(_)
            | E::Io(_)
            | E::Tls(_)
            | E::Protocol(_)
            | E::PoolClosed
            | E::WorkerCrashed => {
                let suggestion = match &err {
                    E::Configuration(_) => "Check the URL and credentials of the persistence unit",
                    E::Tls(_) => "Check the TLS settings of the server and the driver",
                    E::PoolClosed => "The factory was released; open a new session from the registry",
                    _ => "Check that the database server is running and reachable",
                };
                DbError::connection(err.to_string(), suggestion)
            }
            E::ColumnNotFound(column) => {
                DbError::metadata(format!("Column '{}' missing from result", column), column)
            }
            other => DbError::internal(format!("Driver error: {}", other)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_display() {
        let err = DbError::connection("refused", "Start the server");
        assert_eq!(err.to_string(), "Connection failed: refused");
    }

    #[test]
    fn test_database_error_carries_sql_state() {
        let err = DbError::database("syntax error at or near \"FORM\"", Some("42601".into()), "Fix it");
        assert_eq!(err.suggestion(), Some("Fix it"));
        assert_eq!(err.sql_state(), Some("42601"));
    }

    #[test]
    fn test_unsupported_message_names_engine() {
        let err = DbError::unsupported("sequences", "MySQL");
        assert_eq!(err.to_string(), "sequences not supported by MySQL");
    }

    #[test]
    fn test_composite_key_lists_columns() {
        let err = DbError::composite_key_unsupported(
            "ORDER_LINE",
            vec!["ORDER_ID".to_string(), "LINE_NO".to_string()],
        );
        let msg = err.to_string();
        assert!(msg.contains("ORDER_ID, LINE_NO"));
        assert!(err.is_metadata_error());
    }

    #[test]
    fn test_metadata_classification() {
        assert!(DbError::no_primary_key("T").is_metadata_error());
        assert!(DbError::empty_metadata("T").is_metadata_error());
        assert!(!DbError::session_closed("main").is_metadata_error());
        assert!(!DbError::RegistryClosed.is_metadata_error());
    }

    #[test]
    fn test_factory_creation_has_suggestion() {
        let err = DbError::factory_creation("app", "no driver", "register a connector");
        assert_eq!(err.suggestion(), Some("register a connector"));
        assert!(err.to_string().contains("'app'"));
    }

    #[test]
    fn test_pool_timeout_maps_to_connection() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.suggestion().unwrap().contains("acquire_timeout_secs"));
    }
}
