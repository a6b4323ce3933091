//! Parameter binding utilities for database queries.
//!
//! This module binds command [`Parameter`]s to database-specific query objects.
//! Parameters are bound positionally in declaration order; only parameters whose
//! direction is sent to the server (`Input`, `InputOutput`) are bound. A NULL
//! value is bound as a typed null when the parameter carries a [`DbType`] hint.

use crate::models::{DbType, Parameter, Value};
use sqlx::mysql::MySqlArguments;
use sqlx::postgres::PgArguments;
use sqlx::sqlite::SqliteArguments;
use sqlx::types::Json;
use sqlx::{MySql, Postgres, Sqlite};

/// Bind NULL with the type named by the hint.
macro_rules! bind_typed_null {
    ($query:expr, $db_type:expr, json = $json:ty) => {
        match $db_type {
            DbType::Boolean => $query.bind(None::<bool>),
            DbType::Int16 => $query.bind(None::<i16>),
            DbType::Int32 => $query.bind(None::<i32>),
            DbType::Int64 => $query.bind(None::<i64>),
            DbType::Double => $query.bind(None::<f64>),
            DbType::Binary => $query.bind(None::<Vec<u8>>),
            DbType::Json => $query.bind(None::<$json>),
            DbType::Object | DbType::String | DbType::Decimal | DbType::DateTime => {
                $query.bind(None::<String>)
            }
        }
    };
}

/// Narrow an integer to the hinted width when it fits.
macro_rules! bind_int {
    ($query:expr, $v:expr, $db_type:expr) => {
        match $db_type {
            DbType::Int16 if i16::try_from($v).is_ok() => $query.bind($v as i16),
            DbType::Int32 if i32::try_from($v).is_ok() => $query.bind($v as i32),
            DbType::Boolean => $query.bind($v != 0),
            DbType::Double => $query.bind($v as f64),
            _ => $query.bind($v),
        }
    };
}

/// Bind a parameter to a MySQL query.
pub(crate) fn bind_mysql_param<'q>(
    query: sqlx::query::Query<'q, MySql, MySqlArguments>,
    param: &'q Parameter,
) -> sqlx::query::Query<'q, MySql, MySqlArguments> {
    match &param.value {
        Value::Null => bind_typed_null!(query, param.db_type, json = Json<serde_json::Value>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => bind_int!(query, *v, param.db_type),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Json(v) => query.bind(Json(v)),
    }
}

/// Bind a parameter to a PostgreSQL query.
pub(crate) fn bind_postgres_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q Parameter,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match &param.value {
        Value::Null => bind_typed_null!(query, param.db_type, json = Json<serde_json::Value>),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => bind_int!(query, *v, param.db_type),
        Value::Float(v) => query.bind(*v),
        // PostgreSQL does not coerce text parameters into timestamp columns
        Value::Text(v) if param.db_type == DbType::DateTime => bind_postgres_datetime(query, v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Json(v) => query.bind(Json(v)),
    }
}

fn bind_postgres_datetime<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    text: &'q str,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    use chrono::{DateTime, NaiveDate, NaiveDateTime};

    if let Ok(v) = DateTime::parse_from_rfc3339(text) {
        return query.bind(v);
    }
    if let Ok(v) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return query.bind(v);
    }
    if let Ok(v) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return query.bind(v);
    }
    query.bind(text)
}

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(
    query: sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>,
    param: &'q Parameter,
) -> sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>> {
    match &param.value {
        // SQLite doesn't have native JSON type, store as string
        Value::Null => bind_typed_null!(query, param.db_type, json = String),
        Value::Bool(v) => query.bind(*v),
        Value::Int(v) => bind_int!(query, *v, param.db_type),
        Value::Float(v) => query.bind(*v),
        Value::Text(v) => query.bind(v.as_str()),
        Value::Bytes(v) => query.bind(v.as_slice()),
        Value::Json(v) => query.bind(v.to_string()),
    }
}
