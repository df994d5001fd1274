//! SQLite.
//!
//! Only `AUTOINCREMENT` tables keep a counter (in `sqlite_sequence`). A table
//! whose `INTEGER PRIMARY KEY` aliases the rowid without `AUTOINCREMENT` always
//! continues from `MAX(rowid) + 1`, so its keys cannot be reset; identity reset
//! refuses to run while such a table exists.

use super::{DialectHandler, fetch_strings, match_stored_name};
use crate::db::factory::SessionContext;
use crate::error::{DbError, DbResult};
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
        ORDER BY name
    "#;

    pub const COLUMN_NAMES: &str = "SELECT name FROM pragma_table_info(?) ORDER BY cid";

    pub const PRIMARY_KEY_COLUMNS: &str =
        "SELECT name FROM pragma_table_info(?) WHERE pk > 0 ORDER BY pk";

    pub const HAS_SEQUENCE_TABLE: &str =
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'sqlite_sequence'";

    pub const AUTOINCREMENT_TABLES: &str = r#"
        SELECT name FROM sqlite_master
        WHERE type = 'table' AND name NOT LIKE 'sqlite_%' AND sql LIKE '%AUTOINCREMENT%'
        ORDER BY name
    "#;

    pub const ROWID_ALIAS_TABLES: &str = r#"
        SELECT m.name FROM sqlite_master m
        WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite_%'
          AND m.sql NOT LIKE '%AUTOINCREMENT%'
          AND m.sql NOT LIKE '%WITHOUT ROWID%'
          AND (SELECT COUNT(*) FROM pragma_table_info(m.name) WHERE pk > 0) = 1
          AND (SELECT UPPER(type) FROM pragma_table_info(m.name) WHERE pk > 0) = 'INTEGER'
        ORDER BY m.name
    "#;

    pub const CLEAR_SEQUENCE: &str = "DELETE FROM sqlite_sequence WHERE name = ?";

    pub const SET_SEQUENCE: &str = "INSERT INTO sqlite_sequence (name, seq) VALUES (?, ?)";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

#[async_trait]
impl DialectHandler for SqliteDialect {
    fn db_type(&self) -> DbType {
        DbType::Sqlite
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
        ctx: &mut dyn SessionContext,
        name: &str,
    ) -> DbResult<String> {
        let tables = self.list_tables(ctx).await?;
        Ok(match_stored_name(tables, name).unwrap_or_else(|| name.to_string()))
    }

    async fn reset_identity_generation_or_sequences(
        &self,
        ctx: &mut dyn SessionContext,
        start: i64,
    ) -> DbResult<()> {
        let fixed = fetch_strings(ctx, queries::ROWID_ALIAS_TABLES, &[]).await?;
        if !fixed.is_empty() {
            return Err(DbError::unsupported(
                format!(
                    "identity reset without AUTOINCREMENT (tables: {})",
                    fixed.join(", ")
                ),
                DbType::Sqlite,
            ));
        }
        // sqlite_sequence only exists once an AUTOINCREMENT table was created
        if fetch_strings(ctx, queries::HAS_SEQUENCE_TABLE, &[]).await?.is_empty() {
            return Ok(());
        }
        for table in fetch_strings(ctx, queries::AUTOINCREMENT_TABLES, &[]).await? {
            debug!(table = %table, start = start, "Resetting AUTOINCREMENT counter");
            let name = QueryParam::from(table.as_str());
            ctx.execute(queries::CLEAR_SEQUENCE, std::slice::from_ref(&name))
                .await?;
            ctx.execute(queries::SET_SEQUENCE, &[name, QueryParam::Int(start - 1)])
                .await?;
        }
        Ok(())
    }
}
