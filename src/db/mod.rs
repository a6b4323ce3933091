//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The provider contract the execution engine is written against
//! - A sqlx-backed provider for SQLite, PostgreSQL and MySQL
//! - Per-dialect transaction control statements
//! - Type mappings and parameter binding
//! - Database dispatch macros for reducing code duplication

pub mod dialect;
pub(crate) mod macros;
pub mod params;
pub mod provider;
pub mod sqlx_provider;
pub mod types;

pub use provider::{DbConnection, RowStream, SqlProvider};
pub use sqlx_provider::{SqlxConnection, SqlxProvider};
