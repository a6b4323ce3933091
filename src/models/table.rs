//! Result containers: rows, row sets and column schemas.

use crate::error::{DbError, DbResult};
use crate::models::{FromValue, Value};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMetadata {
    pub name: String,
    /// Database-specific type (e.g., "int8", "varchar", "TEXT")
    pub type_name: String,
}

impl ColumnMetadata {
    /// Create new column metadata.
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
        }
    }
}

/// One positioned result row.
///
/// Rows of the same result share their column list.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    columns: Arc<[ColumnMetadata]>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(columns: Arc<[ColumnMetadata]>, values: Vec<Value>) -> Self {
        debug_assert_eq!(columns.len(), values.len());
        Self { columns, values }
    }

    pub fn columns(&self) -> &[ColumnMetadata] {
        &self.columns
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Position of a column, matched case-insensitively.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name == name)
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.name.eq_ignore_ascii_case(name))
            })
    }

    /// Raw value of a column, matched case-insensitively.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.column_index(name).map(|idx| &self.values[idx])
    }

    pub fn get_by_index(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Typed value of a column.
    ///
    /// A missing column or an incompatible value is a mapping error.
    pub fn try_get<T: FromValue>(&self, name: &str) -> DbResult<T> {
        let value = self.get(name).ok_or_else(|| {
            DbError::mapping(format!("Column '{}' not found in row", name), Some(name))
        })?;
        T::from_value(value).map_err(|reason| {
            DbError::mapping(format!("Column '{}': {}", name, reason), Some(name))
        })
    }

    /// Convert the row to a JSON object keyed by column name.
    pub fn to_json_map(&self) -> serde_json::Map<String, JsonValue> {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(col, value)| (col.name.clone(), value.to_json()))
            .collect()
    }
}

/// Eagerly materialized row set.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataTable {
    /// Empty when the result had no rows and no column information.
    pub columns: Vec<ColumnMetadata>,
    pub rows: Vec<Row>,
}

impl DataTable {
    /// Build a table from rows; columns are taken from the first row.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        let columns = rows
            .first()
            .map(|r| r.columns().to_vec())
            .unwrap_or_default();
        Self { columns, rows }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }
}

/// Description of one result column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSchema {
    pub name: String,
    pub ordinal: usize,
    /// Type name as reported by the driver
    pub data_type: String,
    /// Normalized type name (see [`normalize_type_name`](crate::db::types::normalize_type_name))
    pub normalized_type: String,
}

/// Column layout of a statement's result.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SchemaTable {
    pub columns: Vec<ColumnSchema>,
}

impl SchemaTable {
    pub fn column(&self, name: &str) -> Option<&ColumnSchema> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_row() -> Row {
        let columns: Arc<[ColumnMetadata]> = vec![
            ColumnMetadata::new("Id", "INTEGER"),
            ColumnMetadata::new("Name", "TEXT"),
        ]
        .into();
        Row::new(columns, vec![Value::Int(1), Value::Text("Ada".into())])
    }

    #[test]
    fn test_row_lookup_is_case_insensitive() {
        let row = sample_row();
        assert_eq!(row.get("id"), Some(&Value::Int(1)));
        assert_eq!(row.get("NAME"), Some(&Value::Text("Ada".into())));
        assert_eq!(row.get("missing"), None);
    }

    #[test]
    fn test_try_get_reports_missing_column() {
        let row = sample_row();
        let err = row.try_get::<i64>("age").unwrap_err();
        assert!(matches!(err, DbError::Mapping { column: Some(c), .. } if c == "age"));
    }

    #[test]
    fn test_try_get_reports_type_mismatch() {
        let row = sample_row();
        assert!(row.try_get::<i64>("Name").is_err());
        assert_eq!(row.try_get::<String>("name").unwrap(), "Ada");
    }

    #[test]
    fn test_data_table_from_rows() {
        let table = DataTable::from_rows(vec![sample_row(), sample_row()]);
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.column_names(), vec!["Id", "Name"]);
        assert!(DataTable::from_rows(Vec::new()).columns.is_empty());
    }

    #[test]
    fn test_row_to_json_map() {
        let map = sample_row().to_json_map();
        assert_eq!(map["Id"], serde_json::json!(1));
        assert_eq!(map["Name"], serde_json::json!("Ada"));
    }
}
