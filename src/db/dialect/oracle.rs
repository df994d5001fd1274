//! Oracle.
//!
//! A sequence's next value cannot be set directly, so user sequences are
//! dropped and recreated. System sequences behind identity columns
//! (`ISEQ$$_…`) cannot be dropped; those columns are restarted through
//! `ALTER TABLE … MODIFY`.

use super::{DialectHandler, fetch_strings, peeked_value, quote_ident, value_to_i64};
use crate::db::factory::SessionContext;
use crate::error::DbResult;
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = "SELECT TABLE_NAME FROM USER_TABLES ORDER BY TABLE_NAME";

    pub const COLUMN_NAMES: &str =
        "SELECT COLUMN_NAME FROM USER_TAB_COLUMNS WHERE TABLE_NAME = :1 ORDER BY COLUMN_ID";

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT cc.COLUMN_NAME
        FROM USER_CONSTRAINTS c
        JOIN USER_CONS_COLUMNS cc ON c.CONSTRAINT_NAME = cc.CONSTRAINT_NAME
        WHERE c.CONSTRAINT_TYPE = 'P' AND c.TABLE_NAME = :1
        ORDER BY cc.POSITION
    "#;

    pub const SEQUENCE_NAMES: &str =
        "SELECT SEQUENCE_NAME FROM USER_SEQUENCES ORDER BY SEQUENCE_NAME";

    pub const USER_SEQUENCES: &str = r#"
        SELECT SEQUENCE_NAME, INCREMENT_BY
        FROM USER_SEQUENCES
        WHERE SEQUENCE_NAME NOT LIKE 'ISEQ$$%'
        ORDER BY SEQUENCE_NAME
    "#;

    pub const IDENTITY_COLUMNS: &str = r#"
        SELECT TABLE_NAME, COLUMN_NAME, GENERATION_TYPE
        FROM USER_TAB_IDENTITY_COLS
        ORDER BY TABLE_NAME
    "#;

    pub const PEEK_SEQUENCE: &str =
        "SELECT LAST_NUMBER FROM USER_SEQUENCES WHERE UPPER(SEQUENCE_NAME) = UPPER(:1)";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct OracleDialect;

#[async_trait]
impl DialectHandler for OracleDialect {
    fn db_type(&self) -> DbType {
        DbType::Oracle
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
        let sequences = ctx.fetch_all(queries::USER_SEQUENCES, &[]).await?;
        for row in &sequences.rows {
            let Some(JsonValue::String(name)) = row.first() else {
                continue;
            };
            let increment = match row.get(1) {
                Some(value) => value_to_i64(value, name)?,
                None => 1,
            };
            debug!(sequence = %name, start = start, "Recreating sequence");
            let quoted = quote_ident(name, '"');
            ctx.execute(&format!("DROP SEQUENCE {}", quoted), &[]).await?;
            ctx.execute(
                &format!(
                    "CREATE SEQUENCE {} START WITH {} INCREMENT BY {}",
                    quoted, start, increment
                ),
                &[],
            )
            .await?;
        }

        let identities = ctx.fetch_all(queries::IDENTITY_COLUMNS, &[]).await?;
        for row in &identities.rows {
            let (Some(JsonValue::String(table)), Some(JsonValue::String(column))) =
                (row.first(), row.get(1))
            else {
                continue;
            };
            let generation = match row.get(2) {
                Some(JsonValue::String(g)) if g.eq_ignore_ascii_case("ALWAYS") => "ALWAYS",
                _ => "BY DEFAULT",
            };
            debug!(table = %table, column = %column, start = start, "Restarting identity column");
            let sql = format!(
                "ALTER TABLE {} MODIFY ({} GENERATED {} AS IDENTITY (START WITH {}))",
                quote_ident(table, '"'),
                quote_ident(column, '"'),
                generation,
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
