//! Lazily established database sessions.
//!
//! A [`Session`] is handed out unopened. The first metadata or statement call
//! creates a context from the session's factory and begins its single
//! transaction; `close()` commits (or rolls back when the transaction was
//! marked rollback-only) and releases the context.
//!
//! ```text
//! Unopened ──establish──> Open(Active | RollbackOnly) ──close/rollback──> Closed
//!     └──────────────────────────close────────────────────────────────────┘
//! ```

use crate::db::dialect::{DialectHandler, handler_for};
use crate::db::factory::{SessionContext, SessionFactory};
use crate::error::{DbError, DbResult};
use crate::models::{DbType, QueryParam, QueryRows, TransactionState, normalize_params};
use std::sync::Arc;
use tracing::{debug, info, warn};

enum SessionState {
    Unopened,
    Open(Box<dyn SessionContext>),
    Closed,
}

impl SessionState {
    fn name(&self) -> &'static str {
        match self {
            SessionState::Unopened => "unopened",
            SessionState::Open(_) => "open",
            SessionState::Closed => "closed",
        }
    }
}

/// Per-use-case handle on a named connection.
///
/// Not shareable: every operation takes `&mut self`, so calls on one session
/// are strictly ordered.
pub struct Session {
    id: String,
    name: String,
    factory: Arc<dyn SessionFactory>,
    dialect: Box<dyn DialectHandler>,
    state: SessionState,
    transaction: TransactionState,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("factory", &self.factory.key())
            .field("db_type", &self.dialect.db_type())
            .field("state", &self.state.name())
            .field("transaction", &self.transaction)
            .finish()
    }
}

impl Session {
    /// Create an unopened session. Detects the engine from the factory URL;
    /// no I/O happens here.
    pub fn new(name: impl Into<String>, factory: Arc<dyn SessionFactory>) -> DbResult<Self> {
        let db_type = factory.db_type()?;
        Ok(Self {
            id: generate_session_id(),
            name: name.into(),
            factory,
            dialect: handler_for(db_type),
            state: SessionState::Unopened,
            transaction: TransactionState::NotStarted,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Connection name this session was opened for.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn db_type(&self) -> DbType {
        self.dialect.db_type()
    }

    pub fn factory(&self) -> &Arc<dyn SessionFactory> {
        &self.factory
    }

    /// True between establishment and close/rollback.
    pub fn is_open(&self) -> bool {
        matches!(self.state, SessionState::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, SessionState::Closed)
    }

    pub fn transaction_state(&self) -> TransactionState {
        self.transaction
    }

    pub fn is_rollback_only(&self) -> bool {
        self.transaction == TransactionState::RollbackOnly
    }

    /// Acquire a context and begin the transaction, once.
    ///
    /// A context whose transaction cannot begin is released before the error
    /// is returned; the session stays unopened.
    pub(crate) async fn establish(&mut self) -> DbResult<()> {
        match self.state {
            SessionState::Open(_) => return Ok(()),
            SessionState::Closed => return Err(DbError::session_closed(&self.name)),
            SessionState::Unopened => {}
        }

        let mut ctx = self.factory.create_context().await.map_err(|e| {
            DbError::factory_creation(
                &self.factory.key().unit,
                e.to_string(),
                e.suggestion()
                    .unwrap_or("Check that the database is reachable")
                    .to_string(),
            )
        })?;

        if let Err(e) = ctx.begin().await {
            ctx.release().await;
            return Err(DbError::establish(&self.name, e.to_string()));
        }

        self.state = SessionState::Open(ctx);
        self.transaction = TransactionState::Active;
        info!(
            session_id = %self.id,
            connection = %self.name,
            db_type = %self.dialect.db_type(),
            "Session established"
        );
        Ok(())
    }

    /// Establish if needed and hand out the dialect with the open context.
    async fn open_parts(&mut self) -> DbResult<(&dyn DialectHandler, &mut dyn SessionContext)> {
        self.establish().await?;
        match &mut self.state {
            SessionState::Open(ctx) => Ok((self.dialect.as_ref(), ctx.as_mut())),
            SessionState::Closed => Err(DbError::session_closed(&self.name)),
            SessionState::Unopened => Err(DbError::internal("Session not established")),
        }
    }

    /// A failed statement poisons the unit of work.
    fn observe<T>(&mut self, result: DbResult<T>) -> DbResult<T> {
        if let Err(e) = &result {
            if poisons_transaction(e) && self.transaction == TransactionState::Active {
                warn!(
                    session_id = %self.id,
                    connection = %self.name,
                    error = %e,
                    "Statement failed, transaction marked rollback-only"
                );
                self.transaction = TransactionState::RollbackOnly;
            }
        }
        result
    }

    /// Flag the open transaction so that `close()` rolls it back.
    pub fn set_rollback_only(&mut self) -> DbResult<()> {
        match self.state {
            SessionState::Open(_) => {
                self.transaction = TransactionState::RollbackOnly;
                Ok(())
            }
            SessionState::Closed => Err(DbError::session_closed(&self.name)),
            SessionState::Unopened => Err(DbError::transaction(
                "No transaction in progress",
                &self.name,
            )),
        }
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub async fn list_tables(&mut self) -> DbResult<Vec<String>> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = dialect.list_tables(ctx).await;
        self.observe(result)
    }

    pub async fn convert_table_name_casing(&mut self, name: &str) -> DbResult<String> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = dialect.convert_table_name_casing(ctx, name).await;
        self.observe(result)
    }

    /// The single primary key column of `table`.
    pub async fn primary_key_column(&mut self, table: &str) -> DbResult<String> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = match dialect.convert_table_name_casing(ctx, table).await {
            Ok(stored) => dialect.primary_key_columns(ctx, &stored).await,
            Err(e) => Err(e),
        };
        let mut columns = self.observe(result)?;
        debug!(session_id = %self.id, table = %table, columns = ?columns, "Primary key lookup");

        match columns.len() {
            0 => Err(DbError::no_primary_key(table)),
            1 => Ok(columns.remove(0)),
            _ => Err(DbError::composite_key_unsupported(table, columns)),
        }
    }

    /// Column names of `table` in declaration order.
    pub async fn column_names(&mut self, table: &str) -> DbResult<Vec<String>> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = match dialect.convert_table_name_casing(ctx, table).await {
            Ok(stored) => dialect.column_names(ctx, &stored).await,
            Err(e) => Err(e),
        };
        let columns = self.observe(result)?;
        if columns.is_empty() {
            return Err(DbError::empty_metadata(table));
        }
        Ok(columns)
    }

    /// Sequence names as the catalog reports them right now.
    pub async fn sequence_names(&mut self) -> DbResult<Vec<String>> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = dialect.sequence_names(ctx).await;
        self.observe(result)
    }

    pub async fn reset_identity_generation_or_sequences(&mut self, start: i64) -> DbResult<()> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = dialect
            .reset_identity_generation_or_sequences(ctx, start)
            .await;
        self.observe(result)?;
        info!(session_id = %self.id, connection = %self.name, start = start, "Identity generation reset");
        Ok(())
    }

    pub async fn next_value_from_sequence(&mut self, name: &str) -> DbResult<i64> {
        let (dialect, ctx) = self.open_parts().await?;
        let result = dialect.next_value_from_sequence(ctx, name).await;
        self.observe(result)
    }

    // =========================================================================
    // Statements
    // =========================================================================

    /// Run a query with positional parameters.
    pub async fn query(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows> {
        let params = normalize_params(params);
        let (_, ctx) = self.open_parts().await?;
        let result = ctx.fetch_all(sql, &params).await;
        self.observe(result)
    }

    /// Execute a statement with positional parameters; returns the affected row count.
    pub async fn update(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        let params = normalize_params(params);
        let (_, ctx) = self.open_parts().await?;
        let result = ctx.execute(sql, &params).await;
        self.observe(result)
    }

    // =========================================================================
    // Completion
    // =========================================================================

    fn take_context(&mut self) -> Option<Box<dyn SessionContext>> {
        match std::mem::replace(&mut self.state, SessionState::Closed) {
            SessionState::Open(ctx) => Some(ctx),
            _ => None,
        }
    }

    /// Commit now and close, propagating the failure.
    pub(crate) async fn commit(&mut self) -> DbResult<()> {
        match self.state {
            SessionState::Closed => return Err(DbError::session_closed(&self.name)),
            SessionState::Unopened => {
                return Err(DbError::transaction("No transaction in progress", &self.name));
            }
            SessionState::Open(_) if self.is_rollback_only() => {
                return Err(DbError::transaction(
                    "Transaction is marked rollback-only",
                    &self.name,
                ));
            }
            SessionState::Open(_) => {}
        }

        let Some(ctx) = self.take_context() else {
            return Err(DbError::internal("Session lost its context"));
        };
        match ctx.commit().await {
            Ok(()) => {
                self.transaction = TransactionState::Committed;
                info!(session_id = %self.id, connection = %self.name, "Session committed");
                Ok(())
            }
            Err(e) => {
                self.transaction = TransactionState::RolledBack;
                Err(e)
            }
        }
    }

    /// Roll back and close. Later calls are no-ops.
    pub async fn rollback(&mut self) -> DbResult<()> {
        if self.is_closed() {
            return Ok(());
        }
        let Some(ctx) = self.take_context() else {
            debug!(session_id = %self.id, "Rollback on unopened session");
            return Ok(());
        };
        self.transaction = TransactionState::RolledBack;
        info!(session_id = %self.id, connection = %self.name, "Session rolled back");
        ctx.rollback().await
    }

    /// Commit, or roll back when flagged, and release the context.
    ///
    /// Failures are logged, never returned. Closing twice, or closing a
    /// session that was never used, does nothing.
    pub async fn close(&mut self) {
        if self.is_closed() {
            return;
        }
        let Some(ctx) = self.take_context() else {
            debug!(session_id = %self.id, "Closed without establishing");
            return;
        };

        if self.is_rollback_only() {
            self.transaction = TransactionState::RolledBack;
            if let Err(e) = ctx.rollback().await {
                warn!(session_id = %self.id, connection = %self.name, error = %e, "Rollback on close failed");
            }
            info!(session_id = %self.id, connection = %self.name, "Session closed (rolled back)");
            return;
        }

        match ctx.commit().await {
            Ok(()) => {
                self.transaction = TransactionState::Committed;
                info!(session_id = %self.id, connection = %self.name, "Session closed (committed)");
            }
            Err(e) => {
                self.transaction = TransactionState::RolledBack;
                warn!(session_id = %self.id, connection = %self.name, error = %e, "Commit on close failed");
            }
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if self.is_open() {
            // The context's drop rolls the transaction back
            warn!(
                session_id = %self.id,
                connection = %self.name,
                "Session dropped while open - call close() explicitly"
            );
        }
    }
}

/// Driver-originated failures; metadata cardinality and capability errors
/// leave the transaction usable.
fn poisons_transaction(error: &DbError) -> bool {
    matches!(
        error,
        DbError::Database { .. } | DbError::Connection { .. } | DbError::Timeout { .. }
    )
}

/// Generate a unique session ID.
fn generate_session_id() -> String {
    format!("sess_{}", uuid::Uuid::new_v4().simple())
}
