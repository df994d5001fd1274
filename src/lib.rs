//! Database session layer.
//!
//! Named logical connections resolve to cached session factories; each
//! [`Session`] lazily opens one context with one implicit transaction and
//! delegates engine-specific catalog work to a [`DialectHandler`]
//! (Derby, H2, MySQL, Oracle, PostgreSQL, SQLite).

pub mod config;
pub mod db;
pub mod error;
pub mod models;

pub use config::{Config, RegistryConfig};
pub use db::{
    ConnectionRegistry, DialectHandler, Session, SessionFactoryCache, SqlxConnector, WorkScope,
};
pub use error::{DbError, DbResult};
pub use models::{ConnectionDescriptor, DbType, PersistenceUnit, QueryParam, QueryRows};
