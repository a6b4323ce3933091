//! SQL Caller Library
//!
//! A provider-agnostic execution layer for relational databases (SQLite,
//! PostgreSQL, MySQL). It owns connection and transaction lifecycles so call
//! sites only describe what to run:
//!
//! - single statements: [`query`](SqlCaller::query),
//!   [`execute_non_query`](SqlCaller::execute_non_query),
//!   [`execute_scalar`](SqlCaller::execute_scalar),
//!   [`get_schema`](SqlCaller::get_schema)
//! - mapped retrieval: [`get`](SqlCaller::get), [`get_with`](SqlCaller::get_with),
//!   [`iterate`](SqlCaller::iterate)
//! - transactional batches: [`transact`](SqlCaller::transact),
//!   [`operate_collection`](SqlCaller::operate_collection)
//! - caller-managed transactions:
//!   [`create_scoped_transaction`](SqlCaller::create_scoped_transaction)
//!
//! Every connection opened for a call is closed before the call returns, on
//! success, failure and cancellation alike.
//!
//! ```ignore
//! use sql_caller::{SqlCaller, SqlxProvider};
//! use tokio_util::sync::CancellationToken;
//!
//! let caller = SqlCaller::new(SqlxProvider::new("sqlite:app.db")?);
//! let token = CancellationToken::new();
//! let users: Vec<User> = caller.get_reflected("SELECT id, name FROM users", &token).await?;
//! ```

pub mod blocking;
pub mod caller;
pub mod config;
pub mod db;
pub mod error;
pub mod mapping;
pub mod models;

pub use caller::{CommandAction, ScopedTransaction, SqlCaller, Statement};
pub use config::{ConnectionSettings, ProviderOptions};
pub use db::{DbConnection, SqlProvider, SqlxConnection, SqlxProvider};
pub use error::{DbError, DbResult};
pub use mapping::{DataMapper, ReflectionMapper};
pub use models::{
    Command, CommandBehavior, CommandType, DataTable, DbType, InParameterInfo, IsolationLevel,
    Parameter, ParameterDirection, Row, SchemaTable, TransactionState, Value,
};
pub use tokio_util::sync::CancellationToken;
