//! Binding of [`QueryParam`] values onto sqlx queries.
//!
//! The three bundled drivers accept the same Rust types for every variant, so
//! the binders share one match.

use crate::models::QueryParam;
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::query::Query;
use sqlx::sqlite::SqliteArguments;
use sqlx::{MySql, Postgres, Sqlite};

macro_rules! bind_param {
    ($query:expr, $param:expr) => {
        match $param {
            QueryParam::Null => $query.bind(None::<String>),
            QueryParam::Bool(v) => $query.bind(*v),
            QueryParam::Int(v) => $query.bind(*v),
            QueryParam::Float(v) => $query.bind(*v),
            QueryParam::String(v) => $query.bind(v.as_str()),
            QueryParam::Bytes(v) => $query.bind(v.as_slice()),
            QueryParam::Date(v) => $query.bind(*v),
            QueryParam::Time(v) => $query.bind(*v),
            QueryParam::Timestamp(v) => $query.bind(*v),
            // Normally rewritten by `normalize_params` before it gets here
            QueryParam::DateTime(v) => $query.bind(v.naive_utc()),
        }
    };
}

pub(crate) fn bind_mysql_param<'q>(
    query: Query<'q, MySql, MySqlArguments>,
    param: &'q QueryParam,
) -> Query<'q, MySql, MySqlArguments> {
    bind_param!(query, param)
}

pub(crate) fn bind_postgres_param<'q>(
    query: Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> Query<'q, Postgres, PgArguments> {
    bind_param!(query, param)
}

pub(crate) fn bind_sqlite_param<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q QueryParam,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    bind_param!(query, param)
}
