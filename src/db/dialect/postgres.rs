//! PostgreSQL.
//!
//! Unquoted identifiers fold to lower case. Serial and identity columns own
//! sequences listed in `pg_sequences`, so restarting every sequence covers them.

use super::{DialectHandler, fetch_strings, peeked_value, quote_ident};
use crate::db::factory::SessionContext;
use crate::error::DbResult;
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT table_name::text
        FROM information_schema.tables
        WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
        ORDER BY table_name
    "#;

    pub const COLUMN_NAMES: &str = r#"
        SELECT column_name::text
        FROM information_schema.columns
        WHERE table_schema = current_schema() AND table_name = $1
        ORDER BY ordinal_position
    "#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT kcu.column_name::text
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
          ON tc.constraint_name = kcu.constraint_name
         AND tc.table_schema = kcu.table_schema
         AND tc.table_name = kcu.table_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
          AND tc.table_schema = current_schema()
          AND tc.table_name = $1
        ORDER BY kcu.ordinal_position
    "#;

    pub const SEQUENCE_NAMES: &str = r#"
        SELECT sequencename::text
        FROM pg_sequences
        WHERE schemaname = current_schema()
        ORDER BY sequencename
    "#;

    pub const PEEK_SEQUENCE: &str = r#"
        SELECT COALESCE(last_value + increment_by, start_value)
        FROM pg_sequences
        WHERE schemaname = current_schema() AND lower(sequencename) = lower($1)
    "#;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

#[async_trait]
impl DialectHandler for PostgresDialect {
    fn db_type(&self) -> DbType {
        DbType::Postgres
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

    async fn convert_table_name_casing(
        &self,
        _ctx: &mut dyn SessionContext,
        name: &str,
    ) -> DbResult<String> {
        Ok(name.to_lowercase())
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
