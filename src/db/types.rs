//! Database-agnostic type mappings.
//!
//! This module provides utilities for mapping between database-specific types
//! and the provider-neutral [`Value`].
//!
//! # Architecture
//!
//! Type conversion uses a two-phase approach:
//! 1. `TypeCategory` classifies column types into logical categories
//! 2. Database-specific decoders handle the actual value extraction
//!
//! This design centralizes type classification logic while allowing
//! database-specific handling where needed.

use crate::error::{DbError, DbResult};
use crate::models::{ColumnMetadata, DatabaseType, Row as DataRow, Value};
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row, Type, TypeInfo};
use std::sync::Arc;

// =============================================================================
// Type Classification
// =============================================================================

/// Logical category for database column types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeCategory {
    Integer,
    Float,
    Decimal,
    Boolean,
    Text,
    Binary,
    Json,
    Uuid,
    DateTime,
    Unknown,
}

/// Classify a database type name into a logical category.
pub fn categorize_type(type_name: &str, db: DatabaseType) -> TypeCategory {
    let lower = type_name.to_lowercase();

    // Decimal/Numeric - check first as it overlaps with "numeric" in float checks
    if lower.contains("decimal") || lower.contains("numeric") {
        // SQLite's NUMERIC is actually a float
        if db == DatabaseType::SQLite && lower == "numeric" {
            return TypeCategory::Float;
        }
        return TypeCategory::Decimal;
    }

    // Date/time before integers: "interval" and "point" would otherwise match "int"
    if lower.contains("timestamp") || lower.contains("datetime") || lower == "date" || lower == "time"
    {
        return TypeCategory::DateTime;
    }
    if lower == "interval" || lower == "point" {
        return TypeCategory::Unknown;
    }

    // Boolean (MySQL reports TINYINT(1) as BOOLEAN)
    if lower == "bool" || lower == "boolean" {
        return TypeCategory::Boolean;
    }

    // Integer types
    if lower.contains("int") || lower.contains("serial") || lower.contains("tiny") {
        return TypeCategory::Integer;
    }

    // Float types
    if lower.contains("float")
        || lower.contains("double")
        || lower == "real"
        || lower == "float4"
        || lower == "float8"
    {
        return TypeCategory::Float;
    }

    // JSON types
    if lower == "json" || lower == "jsonb" {
        return TypeCategory::Json;
    }

    // UUID (PostgreSQL)
    if lower == "uuid" {
        return TypeCategory::Uuid;
    }

    // Binary types
    if lower.contains("blob") || lower.contains("binary") || lower == "bytea" {
        return TypeCategory::Binary;
    }

    if lower.contains("char") || lower.contains("text") || lower == "string" {
        return TypeCategory::Text;
    }

    TypeCategory::Unknown
}

// =============================================================================
// Decimal Type Support
// =============================================================================

/// Wrapper type for raw DECIMAL/NUMERIC values as strings.
/// This preserves the exact database representation.
#[derive(Debug)]
pub struct RawDecimal(pub String);

impl Type<sqlx::MySql> for RawDecimal {
    fn type_info() -> MySqlTypeInfo {
        <String as Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &MySqlTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("decimal") || name.contains("numeric")
    }
}

impl<'r> Decode<'r, sqlx::MySql> for RawDecimal {
    fn decode(value: MySqlValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::MySql>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

impl Type<sqlx::Postgres> for RawDecimal {
    fn type_info() -> PgTypeInfo {
        <String as Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &PgTypeInfo) -> bool {
        let name = ty.name().to_lowercase();
        name.contains("numeric") || name.contains("decimal")
    }
}

impl<'r> Decode<'r, sqlx::Postgres> for RawDecimal {
    fn decode(value: PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <&str as Decode<sqlx::Postgres>>::decode(value)?;
        Ok(RawDecimal(s.to_string()))
    }
}

// =============================================================================
// Row Decoding
// =============================================================================

/// Trait for converting driver rows to provider-neutral rows.
pub trait DecodeRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata>;

    /// Decode every cell. A non-NULL cell that cannot be decoded is a mapping
    /// error naming its column.
    fn decode_values(&self) -> DbResult<Vec<Value>>;

    /// Decode into a [`DataRow`], reusing `columns` when the caller already holds
    /// the column list of this result.
    fn to_data_row(&self, columns: &mut Option<Arc<[ColumnMetadata]>>) -> DbResult<DataRow> {
        let values = self.decode_values()?;
        let shared = columns
            .get_or_insert_with(|| self.column_metadata().into())
            .clone();
        Ok(DataRow::new(shared, values))
    }
}

impl DecodeRow for MySqlRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        column_metadata(self)
    }

    fn decode_values(&self) -> DbResult<Vec<Value>> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::MySQL);
                mysql::decode_column(self, idx, type_name, category)
                    .map_err(|e| decode_error(col.name(), type_name, e))
            })
            .collect()
    }
}

impl DecodeRow for PgRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        column_metadata(self)
    }

    fn decode_values(&self) -> DbResult<Vec<Value>> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let category = categorize_type(type_name, DatabaseType::PostgreSQL);
                postgres::decode_column(self, idx, type_name, category)
                    .map_err(|e| decode_error(col.name(), type_name, e))
            })
            .collect()
    }
}

impl DecodeRow for SqliteRow {
    fn column_metadata(&self) -> Vec<ColumnMetadata> {
        column_metadata(self)
    }

    fn decode_values(&self) -> DbResult<Vec<Value>> {
        self.columns()
            .iter()
            .enumerate()
            .map(|(idx, col)| {
                let type_name = col.type_info().name();
                let declared = categorize_type(type_name, DatabaseType::SQLite);
                sqlite::decode_column(self, idx, declared)
                    .map_err(|e| decode_error(col.name(), type_name, e))
            })
            .collect()
    }
}

fn column_metadata<R: Row>(row: &R) -> Vec<ColumnMetadata> {
    row.columns()
        .iter()
        .map(|col| ColumnMetadata::new(col.name(), col.type_info().name()))
        .collect()
}

fn decode_error(column: &str, type_name: &str, error: sqlx::Error) -> DbError {
    tracing::error!(column, type_name, "Failed to decode column: {}", error);
    DbError::mapping(
        format!(
            "Cannot decode column '{}' of type {}: {}",
            column, type_name, error
        ),
        Some(column),
    )
}

fn or_null<T>(value: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
    value.map(wrap).unwrap_or(Value::Null)
}

// =============================================================================
// Database-Specific Decoders
// =============================================================================

mod mysql {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

    pub fn decode_column(
        row: &MySqlRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<Value, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx, type_name),
            _ => decode_text(row, idx, type_name),
        }
    }

    fn decode_decimal(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<RawDecimal>, _>(idx)
            .map(|v| or_null(v, |d| Value::Text(d.0)))
    }

    fn decode_integer(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        fn int<T: Into<i64>>(v: Option<T>) -> Value {
            or_null(v, |v| Value::Int(v.into()))
        }

        // Each width only accepts its own column type; try them widest first
        row.try_get::<Option<i64>, _>(idx)
            .map(int)
            .or_else(|_| row.try_get::<Option<i32>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<i16>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<i8>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<u32>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<u16>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<u8>, _>(idx).map(int))
            .or_else(|_| {
                // BIGINT UNSIGNED beyond i64 keeps its exact digits
                row.try_get::<Option<u64>, _>(idx).map(|v| {
                    or_null(v, |v| {
                        i64::try_from(v)
                            .map(Value::Int)
                            .unwrap_or_else(|_| Value::Text(v.to_string()))
                    })
                })
            })
    }

    fn decode_boolean(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<bool>, _>(idx)
            .map(|v| or_null(v, Value::Bool))
    }

    fn decode_float(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<f64>, _>(idx)
            .map(|v| or_null(v, Value::Float))
            .or_else(|_| {
                row.try_get::<Option<f32>, _>(idx)
                    .map(|v| or_null(v, |f| Value::Float(f.into())))
            })
    }

    fn decode_binary(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .map(|v| or_null(v, Value::Bytes))
    }

    fn decode_json(row: &MySqlRow, idx: usize) -> Result<Value, sqlx::Error> {
        // MySQL JSON type should be decoded as serde_json::Value directly
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .map(|v| or_null(v, Value::Json))
    }

    fn decode_datetime(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
        let text = match type_name.to_lowercase().as_str() {
            "timestamp" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map(|d| d.to_rfc3339())),
            "date" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(|d| d.to_string())),
            "time" => row
                .try_get::<Option<NaiveTime>, _>(idx)
                .map(|v| v.map(|t| t.to_string())),
            _ => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map(|d| d.to_string())),
        };
        text.map(|v| or_null(v, Value::Text))
    }

    fn decode_text(row: &MySqlRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
        let Some(v) = row.try_get::<Option<String>, _>(idx)? else {
            return Ok(Value::Null);
        };
        // Check if this might be JSON
        if type_name.to_lowercase().contains("json") {
            if let Ok(json) = serde_json::from_str::<serde_json::Value>(&v) {
                return Ok(Value::Json(json));
            }
        }
        Ok(Value::Text(v))
    }
}

mod postgres {
    use super::*;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
    use sqlx::ValueRef;

    pub fn decode_column(
        row: &PgRow,
        idx: usize,
        type_name: &str,
        category: TypeCategory,
    ) -> Result<Value, sqlx::Error> {
        match category {
            TypeCategory::Decimal => decode_decimal(row, idx),
            TypeCategory::Integer => decode_integer(row, idx),
            TypeCategory::Boolean => decode_boolean(row, idx),
            TypeCategory::Float => decode_float(row, idx),
            TypeCategory::Binary => decode_binary(row, idx),
            TypeCategory::Json => decode_json(row, idx),
            TypeCategory::Uuid => decode_uuid(row, idx),
            TypeCategory::DateTime => decode_datetime(row, idx, type_name),
            _ => decode_text(row, idx),
        }
    }

    fn decode_decimal(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<RawDecimal>, _>(idx)
            .map(|v| or_null(v, |d| Value::Text(d.0)))
    }

    fn decode_integer(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        fn int<T: Into<i64>>(v: Option<T>) -> Value {
            or_null(v, |v| Value::Int(v.into()))
        }

        row.try_get::<Option<i64>, _>(idx)
            .map(int)
            .or_else(|_| row.try_get::<Option<i32>, _>(idx).map(int))
            .or_else(|_| row.try_get::<Option<i16>, _>(idx).map(int))
    }

    fn decode_boolean(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<bool>, _>(idx)
            .map(|v| or_null(v, Value::Bool))
    }

    fn decode_float(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<f64>, _>(idx)
            .map(|v| or_null(v, Value::Float))
            .or_else(|_| {
                row.try_get::<Option<f32>, _>(idx)
                    .map(|v| or_null(v, |f| Value::Float(f.into())))
            })
    }

    fn decode_binary(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<Vec<u8>>, _>(idx)
            .map(|v| or_null(v, Value::Bytes))
    }

    fn decode_json(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<serde_json::Value>, _>(idx)
            .map(|v| or_null(v, Value::Json))
    }

    /// UUIDs arrive as 16 raw bytes on prepared statements and as text on
    /// simple queries.
    fn decode_uuid(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        if row.try_get_raw(idx)?.is_null() {
            return Ok(Value::Null);
        }
        let bytes = row.try_get_unchecked::<&[u8], _>(idx)?;
        if let Ok(uuid) = uuid::Uuid::from_slice(bytes) {
            return Ok(Value::Text(uuid.to_string()));
        }
        std::str::from_utf8(bytes)
            .map(|s| Value::Text(s.to_string()))
            .map_err(|e| sqlx::Error::Decode(Box::new(e)))
    }

    fn decode_datetime(row: &PgRow, idx: usize, type_name: &str) -> Result<Value, sqlx::Error> {
        let text = match type_name.to_lowercase().as_str() {
            "timestamptz" => row
                .try_get::<Option<DateTime<Utc>>, _>(idx)
                .map(|v| v.map(|d| d.to_rfc3339())),
            "date" => row
                .try_get::<Option<NaiveDate>, _>(idx)
                .map(|v| v.map(|d| d.to_string())),
            "time" => row
                .try_get::<Option<NaiveTime>, _>(idx)
                .map(|v| v.map(|t| t.to_string())),
            _ => row
                .try_get::<Option<NaiveDateTime>, _>(idx)
                .map(|v| v.map(|d| d.to_string())),
        };
        text.map(|v| or_null(v, Value::Text))
    }

    fn decode_text(row: &PgRow, idx: usize) -> Result<Value, sqlx::Error> {
        row.try_get::<Option<String>, _>(idx)
            .map(|v| or_null(v, Value::Text))
    }
}

mod sqlite {
    use super::*;
    use sqlx::ValueRef;

    /// SQLite values carry their own storage class, which may differ from the
    /// declared column type; decode by storage class and use the declared type
    /// only to recover booleans and JSON.
    pub fn decode_column(
        row: &SqliteRow,
        idx: usize,
        declared: TypeCategory,
    ) -> Result<Value, sqlx::Error> {
        let raw = row.try_get_raw(idx)?;
        if raw.is_null() {
            return Ok(Value::Null);
        }
        let storage = raw.type_info().name().to_uppercase();

        match storage.as_str() {
            "INTEGER" => {
                let v = row.try_get_unchecked::<i64, _>(idx)?;
                Ok(match declared {
                    TypeCategory::Boolean => Value::Bool(v != 0),
                    _ => Value::Int(v),
                })
            }
            "REAL" => row.try_get_unchecked::<f64, _>(idx).map(Value::Float),
            "BLOB" => row.try_get_unchecked::<Vec<u8>, _>(idx).map(Value::Bytes),
            _ => decode_text(row, idx, declared),
        }
    }

    fn decode_text(
        row: &SqliteRow,
        idx: usize,
        declared: TypeCategory,
    ) -> Result<Value, sqlx::Error> {
        match row.try_get_unchecked::<String, _>(idx) {
            Ok(v) if declared == TypeCategory::Json => Ok(serde_json::from_str(&v)
                .map(Value::Json)
                .unwrap_or(Value::Text(v))),
            Ok(v) => Ok(Value::Text(v)),
            // TEXT storage is not checked for UTF-8; keep the stored bytes
            Err(_) => row.try_get_unchecked::<Vec<u8>, _>(idx).map(Value::Bytes),
        }
    }
}

// =============================================================================
// Type Normalization
// =============================================================================

/// Normalize a database type name to a more consistent format.
pub fn normalize_type_name(type_name: &str) -> String {
    let lower = type_name.to_lowercase();

    match lower.as_str() {
        // Integers
        "int4" | "integer" | "int" => "integer".to_string(),
        "int8" | "bigint" | "bigserial" => "bigint".to_string(),
        "int2" | "smallint" => "smallint".to_string(),
        "tinyint" | "tiny" => "tinyint".to_string(),
        // Text
        "varchar" | "character varying" | "text" | "string" => "text".to_string(),
        "char" | "character" | "bpchar" => "char".to_string(),
        // Boolean
        "bool" | "boolean" => "boolean".to_string(),
        // Float
        "float4" | "real" | "float" => "real".to_string(),
        "float8" | "double precision" | "double" => "double".to_string(),
        // Binary
        "bytea" | "blob" | "binary" | "varbinary" => "binary".to_string(),
        // Date/Time
        "timestamp" | "timestamptz" | "datetime" => "timestamp".to_string(),
        "date" => "date".to_string(),
        "time" | "timetz" => "time".to_string(),
        // JSON
        "json" | "jsonb" => "json".to_string(),
        // UUID
        "uuid" => "uuid".to_string(),
        // Default
        _ => lower,
    }
}
