//! Data models for the SQL caller.
//!
//! This module re-exports all model types used throughout the crate.

pub mod command;
pub mod connection;
pub mod table;
pub mod value;

// Re-export commonly used types
pub use command::{
    Command, CommandBehavior, CommandBinding, CommandType, DbType, InParameterInfo, Parameter,
    ParameterDirection,
};
pub use connection::{
    ConnectionState, DatabaseType, IsolationLevel, TransactionState, masked_connection_string,
};
pub use table::{ColumnMetadata, ColumnSchema, DataTable, Row, SchemaTable};
pub use value::{FromValue, Value};
