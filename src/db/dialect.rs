//! Per-database SQL fragments: transaction control and command text resolution.

use crate::error::{DbError, DbResult};
use crate::models::{Command, CommandType, DatabaseType, IsolationLevel};
use std::borrow::Cow;

/// Statements that begin a transaction at the requested isolation level.
///
/// SQLite has no isolation levels (it is always serializable); `Serializable`
/// takes the write lock up front with `BEGIN IMMEDIATE`, everything else defers.
pub fn begin_statements(db: DatabaseType, isolation: IsolationLevel) -> Vec<&'static str> {
    match db {
        DatabaseType::PostgreSQL => vec![match isolation {
            IsolationLevel::Unspecified => "BEGIN",
            IsolationLevel::ReadUncommitted => "BEGIN ISOLATION LEVEL READ UNCOMMITTED",
            IsolationLevel::ReadCommitted => "BEGIN ISOLATION LEVEL READ COMMITTED",
            // PostgreSQL's repeatable read is snapshot isolation
            IsolationLevel::RepeatableRead | IsolationLevel::Snapshot => {
                "BEGIN ISOLATION LEVEL REPEATABLE READ"
            }
            IsolationLevel::Serializable => "BEGIN ISOLATION LEVEL SERIALIZABLE",
        }],
        DatabaseType::MySQL => match isolation {
            IsolationLevel::Unspecified => vec!["START TRANSACTION"],
            IsolationLevel::ReadUncommitted => vec![
                "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED",
                "START TRANSACTION",
            ],
            IsolationLevel::ReadCommitted => vec![
                "SET TRANSACTION ISOLATION LEVEL READ COMMITTED",
                "START TRANSACTION",
            ],
            IsolationLevel::RepeatableRead => vec![
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
                "START TRANSACTION",
            ],
            IsolationLevel::Snapshot => vec![
                "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ",
                "START TRANSACTION WITH CONSISTENT SNAPSHOT",
            ],
            IsolationLevel::Serializable => vec![
                "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE",
                "START TRANSACTION",
            ],
        },
        DatabaseType::SQLite => vec![match isolation {
            IsolationLevel::Serializable => "BEGIN IMMEDIATE",
            _ => "BEGIN DEFERRED",
        }],
    }
}

pub fn commit_statement(_db: DatabaseType) -> &'static str {
    "COMMIT"
}

pub fn rollback_statement(_db: DatabaseType) -> &'static str {
    "ROLLBACK"
}

/// SQL actually sent to the server for a command.
pub fn command_sql(db: DatabaseType, command: &Command) -> DbResult<Cow<'_, str>> {
    match command.command_type() {
        CommandType::Text => Ok(Cow::Borrowed(command.text())),
        CommandType::TableDirect => Ok(Cow::Owned(format!(
            "SELECT * FROM {}",
            command.text()
        ))),
        CommandType::StoredProcedure => {
            let count = command.bound_parameters().count();
            let placeholders: Vec<String> = match db {
                DatabaseType::PostgreSQL => (1..=count).map(|i| format!("${}", i)).collect(),
                DatabaseType::MySQL => vec!["?".to_string(); count],
                DatabaseType::SQLite => {
                    return Err(DbError::invalid_input(format!(
                        "SQLite does not support stored procedures (procedure: {})",
                        command.text()
                    )));
                }
            };
            Ok(Cow::Owned(format!(
                "CALL {}({})",
                command.text(),
                placeholders.join(", ")
            )))
        }
    }
}
