//! Database dispatch macros for reducing code duplication.
//!
//! The sqlx-backed types (`DbPool`, `DbTransaction`) are enums with one variant
//! per driver. These macros generate the per-variant match arms while keeping
//! each arm's body readable at the call site.

/// Macro for generating driver dispatch match arms.
///
/// The first argument names the enum, which must be in scope at the call site.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(DbPool, pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     Sqlite(p) => do_sqlite(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($kind:ident, $value:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $value {
            $(
                $kind::$variant($p) => $body,
            )+
        }
    };
}

/// Bind every parameter of a slice onto a query with the given binder.
#[macro_export]
macro_rules! bind_all {
    ($sql:expr, $params:expr, $binder:path) => {{
        let mut query = sqlx::query($sql);
        for param in $params {
            query = $binder(query, param);
        }
        query
    }};
}

pub use bind_all;
pub use impl_db_dispatch;
