//! MySQL and MariaDB.
//!
//! Table names can be case-sensitive depending on `lower_case_table_names`, so
//! casing is resolved against the live catalog instead of upper-casing. MySQL
//! has no sequences; identity reset rewrites each table's `AUTO_INCREMENT`.

use super::{DialectHandler, fetch_strings, match_stored_name, quote_ident};
use crate::db::factory::SessionContext;
use crate::error::DbResult;
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use tracing::debug;

mod queries {
    pub const LIST_TABLES: &str = r#"
        SELECT TABLE_NAME
        FROM INFORMATION_SCHEMA.TABLES
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_TYPE = 'BASE TABLE'
        ORDER BY TABLE_NAME
    "#;

    pub const COLUMN_NAMES: &str = r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ?
        ORDER BY ORDINAL_POSITION
    "#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
        SELECT COLUMN_NAME
        FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE
        WHERE TABLE_SCHEMA = DATABASE() AND TABLE_NAME = ? AND CONSTRAINT_NAME = 'PRIMARY'
        ORDER BY ORDINAL_POSITION
    "#;

    pub const AUTO_INCREMENT_TABLES: &str = r#"
        SELECT DISTINCT TABLE_NAME
        FROM INFORMATION_SCHEMA.COLUMNS
        WHERE TABLE_SCHEMA = DATABASE() AND EXTRA LIKE '%auto_increment%'
        ORDER BY TABLE_NAME
    "#;

    pub const START_TRANSACTION: &str = "START TRANSACTION";
}

#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

#[async_trait]
impl DialectHandler for MySqlDialect {
    fn db_type(&self) -> DbType {
        DbType::MySql
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

    /// InnoDB never lowers `AUTO_INCREMENT` below `MAX(key) + 1`; callers reset
    /// empty tables.
    ///
    /// `ALTER TABLE` commits implicitly and leaves the connection in autocommit
    /// mode, so a new transaction is started once the tables are altered. Work
    /// done before the reset is committed with it.
    async fn reset_identity_generation_or_sequences(
        &self,
        ctx: &mut dyn SessionContext,
        start: i64,
    ) -> DbResult<()> {
        let tables = fetch_strings(ctx, queries::AUTO_INCREMENT_TABLES, &[]).await?;
        if tables.is_empty() {
            return Ok(());
        }
        for table in tables {
            debug!(table = %table, start = start, "Resetting AUTO_INCREMENT");
            let sql = format!("ALTER TABLE {} AUTO_INCREMENT = {}", quote_ident(&table, '`'), start);
            ctx.execute(&sql, &[]).await?;
        }
        ctx.execute(queries::START_TRANSACTION, &[]).await?;
        Ok(())
    }
}
