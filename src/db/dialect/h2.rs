//! H2.
//!
//! Identity columns are backed by system sequences, so restarting every
//! sequence also restarts every identity column.

use super::{DialectHandler, fetch_strings, peeked_value, quote_ident};
use crate::db::factory::SessionContext;
use crate::error::DbResult;
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = SCHEMA() AND TABLE_TYPE IN ('TABLE', 'BASE TABLE')
        ORDER BY TABLE_NAME
    "#;

    pub const COLUMN_NAMES: &str = r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = SCHEMA() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT kcu.COLUMN_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
          ON tc.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
         AND tc.TABLE_SCHEMA = kcu.TABLE_SCHEMA
         AND tc.TABLE_NAME = kcu.TABLE_NAME
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
          AND tc.TABLE_SCHEMA = SCHEMA()
          AND tc.TABLE_NAME = ?
        ORDER BY kcu.ORDINAL_POSITION
    "#;

    pub const SEQUENCE_NAMES: &str = r#"
        SELECT SEQUENCE_NAME
        FROM INFORMATION_SCHEMA.SEQUENCES
        WHERE SEQUENCE_SCHEMA = SCHEMA()
        ORDER BY SEQUENCE_NAME
    "#;

    pub const PEEK_SEQUENCE: &str = r#"
        SELECT BASE_VALUE
        FROM INFORMATION_SCHEMA.SEQUENCES
        WHERE SEQUENCE_SCHEMA = SCHEMA() AND UPPER(SEQUENCE_NAME) = UPPER(?)
    "#;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct H2Dialect;

#[async_trait]
impl DialectHandler for H2Dialect {
    fn db_type(&self) -> DbType {
        DbType::H2
    }

    async fn list_tables(&self, ctx: &mut dyn SessionContext) -> DbResult<Vec<String>> {
        fetch_strings(ctx, queries::LIST_TABLES, &[]).await
    }

    async fn primary_key_columns(
        &self,
        ctx: &mut dyn SessionContext,
        table: &str,
    ) -> DbResult<Vec<String>> {
        fetch_strings(ctx, queries::PRIMARY_KEY_COLUMNS, &[QueryParam::from(table)]).await
    }

    async fn column_names(
        &self,
        ctx: &mut dyn SessionContext,
        table: &str,
    ) -> DbResult<Vec<String>> {
        fetch_strings(ctx, queries::COLUMN_NAMES, &[QueryParam::from(table)]).await
    }

    async fn sequence_names(&self, ctx: &mut dyn SessionContext) -> DbResult<Vec<String>> {
        fetch_strings(ctx, queries::SEQUENCE_NAMES, &[]).await
    }

    async fn reset_identity_generation_or_sequences(
        &self,
        ctx: &mut dyn SessionContext,
        start: i64,
    ) -> DbResult<()> {
        for sequence in self.sequence_names(ctx).await? {
            debug!(sequence = %sequence, start = start, "Restarting sequence");
            let sql = format!(
                "ALTER SEQUENCE {} RESTART WITH {}",
                quote_ident(&sequence, '"'),
                start
            );
            ctx.execute(&sql, &[]).await?;
        }
        Ok(())
    }

    async fn next_value_from_sequence(
        &self,
        ctx: &mut dyn SessionContext,
        name: &str,
    ) -> DbResult<i64> {
        let rows = ctx
            .fetch_all(queries::PEEK_SEQUENCE, &[QueryParam::from(name)])
            .await?;
        peeked_value(&rows, name)
    }
}
