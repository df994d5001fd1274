//! Backend seam between sessions and drivers.
//!
//! A [`SessionFactory`] is the heavyweight, shareable object (one per
//! [`FactoryCacheKey`]); a [`SessionContext`] is the per-session handle it hands
//! out. A [`Connector`] builds factories and is the injection point for engines
//! the bundled sqlx drivers do not speak.

use crate::config::PoolOptions;
use crate::error::DbResult;
use crate::models::{DbType, QueryParam, QueryRows};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

/// Cache identity of a factory: logical unit plus the connection's URL override.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FactoryCacheKey {
    pub unit: String,
    /// `None` means "use the unit's defaults".
    pub url: Option<String>,
}

impl FactoryCacheKey {
    pub fn new(unit: impl Into<String>, url: Option<String>) -> Self {
        Self {
            unit: unit.into(),
            url,
        }
    }
}

impl fmt::Display for FactoryCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.url {
            Some(url) => write!(f, "{}@{}", self.unit, crate::models::mask_url(url)),
            None => write!(f, "{}@<unit default>", self.unit),
        }
    }
}

/// Everything a connector needs to build one factory.
#[derive(Clone)]
pub struct FactorySpec {
    pub key: FactoryCacheKey,
    /// Effective URL (connection override, else unit default).
    pub url: String,
    pub user: Option<String>,
    /// Contains sensitive data - never log
    pub password: Option<String>,
    pub pool: PoolOptions,
}

impl fmt::Debug for FactorySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FactorySpec")
            .field("key", &self.key)
            .field("url", &crate::models::mask_url(&self.url))
            .field("user", &self.user)
            .field("has_password", &self.password.is_some())
            .field("pool", &self.pool)
            .finish()
    }
}

/// Builds factories. Failures surface as `DbError::FactoryCreation`.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, spec: &FactorySpec) -> DbResult<Arc<dyn SessionFactory>>;
}

/// Shared, thread-safe producer of session contexts.
#[async_trait]
pub trait SessionFactory: Send + Sync + fmt::Debug {
    fn key(&self) -> &FactoryCacheKey;

    /// URL the factory connects to, used for engine detection.
    fn url(&self) -> &str;

    /// Engine behind this factory, detected from its URL.
    fn db_type(&self) -> DbResult<DbType> {
        DbType::detect(self.url())
    }

    /// Create an unopened context. Performs no I/O.
    async fn create_context(&self) -> DbResult<Box<dyn SessionContext>>;

    /// Release the factory's resources. Idempotent.
    async fn close(&self);
}

/// Exclusively owned per-session handle: one raw connection, one transaction.
#[async_trait]
pub trait SessionContext: Send {
    /// Acquire the raw connection and start the transaction.
    async fn begin(&mut self) -> DbResult<()>;

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows>;

    /// Execute a statement and return the affected row count.
    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64>;

    async fn commit(self: Box<Self>) -> DbResult<()>;

    async fn rollback(self: Box<Self>) -> DbResult<()>;

    /// Give the context back without a commit; an open transaction is rolled back.
    async fn release(self: Box<Self>);
}
