//! Per-engine dialect handlers.
//!
//! A [`DialectHandler`] owns every statement whose text differs between engines:
//! catalog queries, identifier casing, sequence discovery and identity/sequence
//! reset. The trait's default methods are the fallback behavior; each engine
//! overrides what it supports.
//!
//! Handlers are stateless. They run their statements on the session's context
//! so that everything happens inside the session's transaction.

mod derby;
mod h2;
mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use derby::DerbyDialect;
pub use h2::H2Dialect;
pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::db::factory::SessionContext;
use crate::error::{DbError, DbResult};
use crate::models::{DbType, QueryParam};
use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::debug;

#[async_trait]
pub trait DialectHandler: Send + Sync + std::fmt::Debug {
    fn db_type(&self) -> DbType;

    /// Base tables of the current schema.
    async fn list_tables(&self, ctx: &mut dyn SessionContext) -> DbResult<Vec<String>>;

    /// Primary key columns of `table` in key order. Empty when there is none.
    async fn primary_key_columns(
        &self,
        ctx: &mut dyn SessionContext,
        table: &str,
    ) -> DbResult<Vec<String>>;

    /// Column names of `table` in declaration order. Empty when the table is unknown.
    async fn column_names(
        &self,
        ctx: &mut dyn SessionContext,
        table: &str,
    ) -> DbResult<Vec<String>>;

    /// Map a caller-supplied table name onto the casing the catalog stores.
    async fn convert_table_name_casing(
        &self,
        _ctx: &mut dyn SessionContext,
        name: &str,
    ) -> DbResult<String> {
        Ok(name.to_uppercase())
    }

    async fn sequence_names(&self, _ctx: &mut dyn SessionContext) -> DbResult<Vec<String>> {
        Err(DbError::unsupported("sequences", self.db_type()))
    }

    /// Make the next generated key of every identity column and sequence `start`.
    async fn reset_identity_generation_or_sequences(
        &self,
        _ctx: &mut dyn SessionContext,
        _start: i64,
    ) -> DbResult<()> {
        Err(DbError::unsupported("identity/sequence reset", self.db_type()))
    }

    /// Value the sequence would hand out next, without consuming it.
    async fn next_value_from_sequence(
        &self,
        _ctx: &mut dyn SessionContext,
        _name: &str,
    ) -> DbResult<i64> {
        Err(DbError::unsupported("sequences", self.db_type()))
    }
}

/// Handler for an engine. Every engine has one.
pub fn handler_for(db_type: DbType) -> Box<dyn DialectHandler> {
    match db_type {
        DbType::Derby => Box::new(DerbyDialect),
        DbType::H2 => Box::new(H2Dialect),
        DbType::MySql => Box::new(MySqlDialect),
        DbType::Oracle => Box::new(OracleDialect),
        DbType::Postgres => Box::new(PostgresDialect),
        DbType::Sqlite => Box::new(SqliteDialect),
    }
}

// =============================================================================
// Shared helpers
// =============================================================================

/// Run a catalog query and collect the first column as text.
pub(crate) async fn fetch_strings(
    ctx: &mut dyn SessionContext,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<Vec<String>> {
    let rows = ctx.fetch_all(sql, params).await?;
    debug!(sql = %sql.trim(), row_count = rows.len(), "Catalog query");
    Ok(rows.strings_at(0))
}

/// Exact stored name matching `name` case-insensitively, if any.
pub(crate) fn match_stored_name(candidates: Vec<String>, name: &str) -> Option<String> {
    candidates
        .into_iter()
        .find(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// Quote an identifier, doubling embedded quote characters.
pub(crate) fn quote_ident(name: &str, quote: char) -> String {
    let doubled: String = [quote, quote].iter().collect();
    format!(
        "{q}{}{q}",
        name.replace(quote, &doubled),
        q = quote
    )
}

/// Normalize a numeric cell to `i64`.
///
/// Drivers hand sequence values back as signed or unsigned integers, integral
/// floats, or exact decimals rendered as text.
pub fn value_to_i64(value: &JsonValue, object: &str) -> DbResult<i64> {
    let not_integral =
        || DbError::metadata(format!("Value {} is not a 64-bit integer", value), object);

    match value {
        JsonValue::Number(n) => {
            if let Some(v) = n.as_i64() {
                return Ok(v);
            }
            if n.as_u64().is_some() {
                return Err(not_integral());
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 => {
                    Ok(f as i64)
                }
                _ => Err(not_integral()),
            }
        }
        JsonValue::String(s) => parse_decimal_text(s.trim()).ok_or_else(not_integral),
        _ => Err(not_integral()),
    }
}

/// Parse "123", "-5", "42.000" as an integer; reject fractional parts.
fn parse_decimal_text(s: &str) -> Option<i64> {
    let (int_part, frac_part) = match s.split_once('.') {
        Some((i, f)) => (i, f),
        None => (s, ""),
    };
    if !frac_part.chars().all(|c| c == '0') {
        return None;
    }
    int_part.parse::<i64>().ok()
}

/// First cell of a peek query, normalized, or a metadata error naming the sequence.
pub(crate) fn peeked_value(rows: &crate::models::QueryRows, sequence: &str) -> DbResult<i64> {
    match rows.scalar() {
        Some(JsonValue::Null) | None => Err(DbError::metadata(
            "Sequence not found or has no next value",
            sequence,
        )),
        Some(value) => value_to_i64(value, sequence),
    }
}
