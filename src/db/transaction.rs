//! Per-session transaction handle for the sqlx drivers.
//!
//! A [`SqlxContext`] starts life holding only a pool handle. `begin` checks out
//! one connection and opens the transaction on it; the connection stays with
//! the context until it is committed, rolled back or released.

use crate::db::factory::SessionContext;
use crate::db::params::{bind_mysql_param, bind_postgres_param, bind_sqlite_param};
use crate::db::pool::DbPool;
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult};
use crate::models::{QueryParam, QueryRows};
use async_trait::async_trait;
use futures_util::{TryFutureExt, TryStreamExt};
use sqlx::{Column, Executor, MySql, Postgres, Sqlite, Transaction};
use std::time::Duration;
use tracing::{debug, warn};

/// Database-specific transaction wrapper.
pub enum DbTransaction {
    MySql(Transaction<'static, MySql>),
    Postgres(Transaction<'static, Postgres>),
    Sqlite(Transaction<'static, Sqlite>),
}

impl DbTransaction {
    /// Check out a connection from the pool and begin a transaction on it.
    ///
    /// Returns the driver error untouched so the caller can report pool
    /// timeouts against its own acquire limit.
    pub async fn begin(pool: &DbPool) -> sqlx::Result<Self> {
        let tx = impl_db_dispatch!(DbPool, pool, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            Sqlite(p) => DbTransaction::Sqlite(p.begin().await?),
        });
        Ok(tx)
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.commit().await.map_err(DbError::from),
            Postgres(tx) => tx.commit().await.map_err(DbError::from),
            Sqlite(tx) => tx.commit().await.map_err(DbError::from),
        })
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => tx.rollback().await.map_err(DbError::from),
            Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            Sqlite(tx) => tx.rollback().await.map_err(DbError::from),
        })
    }

    /// Execute a statement and return the affected row count.
    ///
    /// Statements without parameters go over the text protocol, which also
    /// accepts transaction control that MySQL refuses to prepare.
    pub async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        if params.is_empty() {
            let rows_affected = impl_db_dispatch!(DbTransaction, self, {
                MySql(tx) => (&mut **tx).execute(sqlx::raw_sql(sql)).await?.rows_affected(),
                Postgres(tx) => (&mut **tx).execute(sqlx::raw_sql(sql)).await?.rows_affected(),
                Sqlite(tx) => (&mut **tx).execute(sqlx::raw_sql(sql)).await?.rows_affected(),
            });
            return Ok(rows_affected);
        }
        let rows_affected = impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => (&mut **tx)
                .execute(bind_all!(sql, params, bind_mysql_param))
                .await?
                .rows_affected(),
            Postgres(tx) => (&mut **tx)
                .execute(bind_all!(sql, params, bind_postgres_param))
                .await?
                .rows_affected(),
            Sqlite(tx) => (&mut **tx)
                .execute(bind_all!(sql, params, bind_sqlite_param))
                .await?
                .rows_affected(),
        });
        Ok(rows_affected)
    }

    /// Run a query and collect every row.
    pub async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows> {
        let rows = impl_db_dispatch!(DbTransaction, self, {
            MySql(tx) => {
                let rows: Vec<sqlx::mysql::MySqlRow> = (&mut **tx)
                    .fetch(bind_all!(sql, params, bind_mysql_param))
                    .try_collect()
                    .await?;
                let columns = match rows.first() {
                    Some(row) => row.column_names(),
                    None => described_columns(&mut **tx, sql).await?,
                };
                to_query_rows(columns, &rows)
            },
            Postgres(tx) => {
                let rows: Vec<sqlx::postgres::PgRow> = (&mut **tx)
                    .fetch(bind_all!(sql, params, bind_postgres_param))
                    .try_collect()
                    .await?;
                let columns = match rows.first() {
                    Some(row) => row.column_names(),
                    None => described_columns(&mut **tx, sql).await?,
                };
                to_query_rows(columns, &rows)
            },
            Sqlite(tx) => {
                let rows: Vec<sqlx::sqlite::SqliteRow> = (&mut **tx)
                    .fetch(bind_all!(sql, params, bind_sqlite_param))
                    .try_collect()
                    .await?;
                let columns = match rows.first() {
                    Some(row) => row.column_names(),
                    None => described_columns(&mut **tx, sql).await?,
                };
                to_query_rows(columns, &rows)
            },
        });
        Ok(rows)
    }
}

fn to_query_rows<R: RowToJson>(columns: Vec<String>, rows: &[R]) -> QueryRows {
    QueryRows::new(columns, rows.iter().map(|r| r.to_json_values()).collect())
}

/// Result header from the prepared statement, for queries that matched no rows.
fn described_columns<'c, E>(
    executor: E,
    sql: &'c str,
) -> impl Future<Output = sqlx::Result<Vec<String>>> + Send + 'c
where
    E: Executor<'c>,
{
    executor.describe(sql).map_ok(|describe| {
        describe
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect()
    })
}

/// Session context over a sqlx pool.
pub struct SqlxContext {
    pool: DbPool,
    /// The pool's acquire limit, reported when `begin` times out.
    acquire_timeout: Duration,
    transaction: Option<DbTransaction>,
}

impl SqlxContext {
    pub fn new(pool: DbPool, acquire_timeout: Duration) -> Self {
        Self {
            pool,
            acquire_timeout,
            transaction: None,
        }
    }

    fn active(&mut self) -> DbResult<&mut DbTransaction> {
        self.transaction.as_mut().ok_or_else(|| {
            DbError::transaction("No transaction in progress", self.pool.db_type().to_string())
        })
    }
}

#[async_trait]
impl SessionContext for SqlxContext {
    async fn begin(&mut self) -> DbResult<()> {
        if self.transaction.is_some() {
            return Err(DbError::transaction(
                "Transaction already started",
                self.pool.db_type().to_string(),
            ));
        }
        let tx = DbTransaction::begin(&self.pool).await.map_err(|e| match e {
            sqlx::Error::PoolTimedOut => DbError::timeout(
                "acquiring a pooled connection",
                self.acquire_timeout.as_secs(),
            ),
            other => DbError::from(other),
        })?;
        self.transaction = Some(tx);
        debug!(db_type = %self.pool.db_type(), "Transaction started");
        Ok(())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows> {
        let rows = self.active()?.fetch_all(sql, params).await?;
        debug!(sql = %sql, row_count = rows.len(), "Queried in transaction");
        Ok(rows)
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let rows_affected = self.active()?.execute(sql, params).await?;
        debug!(sql = %sql, rows_affected = rows_affected, "Executed in transaction");
        Ok(rows_affected)
    }

    async fn commit(mut self: Box<Self>) -> DbResult<()> {
        let tx = self.transaction.take().ok_or_else(|| {
            DbError::transaction("No transaction in progress", self.pool.db_type().to_string())
        })?;
        tx.commit().await
    }

    async fn rollback(mut self: Box<Self>) -> DbResult<()> {
        match self.transaction.take() {
            Some(tx) => tx.rollback().await,
            None => Ok(()),
        }
    }

    async fn release(mut self: Box<Self>) {
        if let Some(tx) = self.transaction.take() {
            if let Err(e) = tx.rollback().await {
                warn!(error = %e, "Rollback on release failed");
            }
        }
    }
}
