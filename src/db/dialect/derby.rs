//! Apache Derby.
//!
//! Derby cannot change a sequence's next value in place, so sequences are
//! dropped and recreated. Identity columns do support `RESTART WITH`.

use super::{DialectHandler, fetch_strings, match_stored_name, peeked_value, quote_ident, value_to_i64};
use crate::db::factory::SessionContext;
use crate::error::{DbError, DbResult};
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT t.TABLENAME
        FROM SYS.SYSTABLES t
        JOIN SYS.SYSSCHEMAS s ON t.SCHEMAID = s.SCHEMAID
        WHERE t.TABLETYPE = 'T' AND s.SCHEMANAME = CURRENT SCHEMA
        ORDER BY t.TABLENAME
    "#;

    pub const COLUMN_NAMES: &str = r#"
        SELECT c.COLUMNNAME
        FROM SYS.SYSCOLUMNS c
        JOIN SYS.SYSTABLES t ON c.REFERENCEID = t.TABLEID
        JOIN SYS.SYSSCHEMAS s ON t.SCHEMAID = s.SCHEMAID
        WHERE s.SCHEMANAME = CURRENT SCHEMA AND t.TABLENAME = ?
        ORDER BY c.COLUMNNUMBER
    "#;

    // Key membership lives in the conglomerate's index descriptor
    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT c.COLUMNNAME
        FROM SYS.SYSCONSTRAINTS con
        JOIN SYS.SYSKEYS k ON con.CONSTRAINTID = k.CONSTRAINTID
        JOIN SYS.SYSCONGLOMERATES cg ON k.CONGLOMERATEID = cg.CONGLOMERATEID
        JOIN SYS.SYSTABLES t ON con.TABLEID = t.TABLEID
        JOIN SYS.SYSSCHEMAS s ON t.SCHEMAID = s.SCHEMAID
        JOIN SYS.SYSCOLUMNS c ON c.REFERENCEID = t.TABLEID
        WHERE con.TYPE = 'P'
          AND s.SCHEMANAME = CURRENT SCHEMA
          AND t.TABLENAME = ?
          AND cg.DESCRIPTOR.getKeyColumnPosition(c.COLUMNNUMBER) > 0
        ORDER BY cg.DESCRIPTOR.getKeyColumnPosition(c.COLUMNNUMBER)
    "#;

    pub const IDENTITY_COLUMNS: &str = r#"
        SELECT t.TABLENAME, c.COLUMNNAME
        FROM SYS.SYSCOLUMNS c
        JOIN SYS.SYSTABLES t ON c.REFERENCEID = t.TABLEID
        JOIN SYS.SYSSCHEMAS s ON t.SCHEMAID = s.SCHEMAID
        WHERE s.SCHEMANAME = CURRENT SCHEMA AND c.AUTOINCREMENTVALUE IS NOT NULL
        ORDER BY t.TABLENAME
    "#;

    pub const SEQUENCE_NAMES: &str = r#"
        SELECT q.SEQUENCENAME
        FROM SYS.SYSSEQUENCES q
        JOIN SYS.SYSSCHEMAS s ON q.SCHEMAID = s.SCHEMAID
        WHERE s.SCHEMANAME = CURRENT SCHEMA
        ORDER BY q.SEQUENCENAME
    "#;

    pub const SEQUENCE_DEFINITIONS: &str = r#"
        SELECT q.SEQUENCENAME, q.INCREMENT, q.MINIMUMVALUE, q.MAXIMUMVALUE, q.CYCLEOPTION
        FROM SYS.SYSSEQUENCES q
        JOIN SYS.SYSSCHEMAS s ON q.SCHEMAID = s.SCHEMAID
        WHERE s.SCHEMANAME = CURRENT SCHEMA
        ORDER BY q.SEQUENCENAME
    "#;

    pub const PEEK_SEQUENCE: &str =
        "VALUES SYSCS_UTIL.SYSCS_PEEK_AT_SEQUENCE(CURRENT SCHEMA, ?)";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DerbyDialect;

/// Definition needed to recreate a sequence.
#[derive(Debug, Clone, PartialEq)]
struct SequenceDefinition {
    name: String,
    increment: i64,
    min: i64,
    max: i64,
    cycle: bool,
}

impl SequenceDefinition {
    /// Smallest integer type holding both bounds. The catalog keeps the
    /// declared type as a Java object that plain SQL cannot render.
    fn data_type(&self) -> &'static str {
        if self.min >= i16::MIN as i64 && self.max <= i16::MAX as i64 {
            "SMALLINT"
        } else if self.min >= i32::MIN as i64 && self.max <= i32::MAX as i64 {
            "INTEGER"
        } else {
            "BIGINT"
        }
    }

    fn create_statement(&self, start: i64) -> String {
        format!(
            "CREATE SEQUENCE {} AS {} START WITH {} INCREMENT BY {} MINVALUE {} MAXVALUE {} {}",
            quote_ident(&self.name, '"'),
            self.data_type(),
            start,
            self.increment,
            self.min,
            self.max,
            if self.cycle { "CYCLE" } else { "NO CYCLE" }
        )
    }
}

fn sequence_definitions(rows: &crate::models::QueryRows) -> DbResult<Vec<SequenceDefinition>> {
    rows.rows
        .iter()
        .map(|row| {
            let cell = |idx: usize| row.get(idx).unwrap_or(&JsonValue::Null);
            let name = match cell(0) {
                JsonValue::String(s) => s.clone(),
                other => {
                    return Err(DbError::metadata(
                        format!("Unexpected sequence name {}", other),
                        "SYS.SYSSEQUENCES",
                    ));
                }
            };
            Ok(SequenceDefinition {
                increment: value_to_i64(cell(1), &name)?,
                min: value_to_i64(cell(2), &name)?,
                max: value_to_i64(cell(3), &name)?,
                cycle: matches!(cell(4), JsonValue::String(s) if s.eq_ignore_ascii_case("Y")),
                name,
            })
        })
        .collect()
}

#[async_trait]
impl DialectHandler for DerbyDialect {
    fn db_type(&self) -> DbType {
        DbType::Derby
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
        let identities = ctx.fetch_all(queries::IDENTITY_COLUMNS, &[]).await?;
        for row in &identities.rows {
            let (Some(JsonValue::String(table)), Some(JsonValue::String(column))) =
                (row.first(), row.get(1))
            else {
                continue;
            };
            let sql = format!(
                "ALTER TABLE {} ALTER COLUMN {} RESTART WITH {}",
                quote_ident(table, '"'),
                quote_ident(column, '"'),
                start
            );
            debug!(table = %table, column = %column, start = start, "Restarting identity column");
            ctx.execute(&sql, &[]).await?;
        }

        let definitions = ctx.fetch_all(queries::SEQUENCE_DEFINITIONS, &[]).await?;
        for sequence in sequence_definitions(&definitions)? {
            debug!(sequence = %sequence.name, start = start, "Recreating sequence");
            let drop = format!("DROP SEQUENCE {} RESTRICT", quote_ident(&sequence.name, '"'));
            ctx.execute(&drop, &[]).await?;
            ctx.execute(&sequence.create_statement(start), &[]).await?;
        }
        Ok(())
    }

    async fn next_value_from_sequence(
        &self,
        ctx: &mut dyn SessionContext,
        name: &str,
    ) -> DbResult<i64> {
        // The peek function raises on unknown names; resolve first so that a
        // missing sequence does not fail a statement inside the transaction.
        let stored = match_stored_name(self.sequence_names(ctx).await?, name)
            .ok_or_else(|| DbError::metadata("Sequence not found", name))?;
        let rows = ctx
            .fetch_all(queries::PEEK_SEQUENCE, &[QueryParam::from(stored.as_str())])
            .await?;
        peeked_value(&rows, &stored)
    }
}
