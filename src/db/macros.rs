//! Database dispatch macros for reducing code duplication.
//!
//! This module provides declarative macros that generate database-specific
//! match arms over an open driver connection while keeping each arm linear
//! and readable.

/// Macro for generating driver dispatch match arms.
///
/// This macro generates match arms for `DriverConnection` variants, reducing
/// the need to manually write repetitive match statements.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(conn, {
///     MySql(c) => mysql::execute(c, command),
///     Postgres(c) => postgres::execute(c, command),
///     SQLite(c) => sqlite::execute(c, command),
/// });
/// ```
macro_rules! impl_db_dispatch {
    ($conn:expr, { $($variant:ident($c:ident) => $body:expr),+ $(,)? }) => {
        match $conn {
            $(
                $crate::db::sqlx_provider::DriverConnection::$variant($c) => $body,
            )+
        }
    };
}

pub(crate) use impl_db_dispatch;
