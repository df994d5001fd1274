//! Explicit units of work.
//!
//! A [`WorkScope`] wraps a [`Session`] whose transaction begins on
//! construction. The caller ends it with exactly one of `commit()` or
//! `set_rollback_only()`, then `close()`:
//!
//! - after `commit()`: nothing left to do
//! - after `set_rollback_only()`: rolls back
//! - with neither: rolls back and warns, since the outcome was never decided
//!
//! ```ignore
//! let mut work = registry.open_work("main").await?;
//! work.update("INSERT INTO orders (id) VALUES (?)", &[1.into()]).await?;
//! work.commit().await?;
//! work.close().await;
//! ```

use crate::db::session::Session;
use crate::error::{DbError, DbResult};
use std::ops::{Deref, DerefMut};
use tracing::warn;

#[derive(Debug)]
pub struct WorkScope {
    session: Session,
    committed: bool,
}

impl WorkScope {
    /// Establish `session` now and wrap it.
    pub async fn begin(mut session: Session) -> DbResult<Self> {
        session.establish().await?;
        Ok(Self {
            session,
            committed: false,
        })
    }

    /// Commit immediately. The scope cannot be used for statements afterwards.
    pub async fn commit(&mut self) -> DbResult<()> {
        if self.committed {
            return Err(DbError::transaction(
                "Unit of work already committed",
                self.session.name(),
            ));
        }
        self.session.commit().await?;
        self.committed = true;
        Ok(())
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    /// Release the scope, honoring the rollback flag.
    pub async fn close(mut self) {
        if self.committed || self.session.is_closed() {
            return;
        }
        if !self.session.is_rollback_only() {
            warn!(
                session_id = %self.session.id(),
                connection = %self.session.name(),
                "Unit of work closed without commit or rollback-only flag, rolling back"
            );
        }
        if let Err(e) = self.session.rollback().await {
            warn!(
                session_id = %self.session.id(),
                connection = %self.session.name(),
                error = %e,
                "Rollback on close failed"
            );
        }
    }

    /// Unwrap the underlying session.
    pub fn into_session(self) -> Session {
        self.session
    }
}

impl Deref for WorkScope {
    type Target = Session;

    fn deref(&self) -> &Self::Target {
        &self.session
    }
}

impl DerefMut for WorkScope {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.session
    }
}
