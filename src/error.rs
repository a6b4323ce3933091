//! Error types for the SQL caller.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Every engine operation returns [`DbResult`]; errors produced by the driver are
//! classified once, at the driver boundary, and then surface unchanged.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Mapping error: {message}")]
    Mapping {
        message: String,
        column: Option<String>,
    },

    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    #[error("Timeout: {operation} exceeded {limit_ms}ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error("Transaction error: {message} (transaction: {transaction_id})")]
    Transaction {
        message: String,
        transaction_id: String,
    },

    #[error("Operation not implemented: {operation}")]
    NotImplemented { operation: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a mapping error, optionally naming the offending column.
    pub fn mapping(message: impl Into<String>, column: Option<&str>) -> Self {
        Self::Mapping {
            message: message.into(),
            column: column.map(str::to_string),
        }
    }

    /// Create a cancellation error.
    pub fn cancelled(operation: impl Into<String>) -> Self {
        Self::Cancelled {
            operation: operation.into(),
        }
    }

    /// Create a timeout error for an operation bounded by `limit`.
    pub fn timeout(operation: impl Into<String>, limit: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, transaction_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            transaction_id: transaction_id.into(),
        }
    }

    pub fn not_implemented(operation: impl Into<String>) -> Self {
        Self::NotImplemented {
            operation: operation.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    ///
    /// The engine never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. } | Self::Timeout { .. })
    }

    /// Check if this error was produced by a cancellation request.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}

/// Hint for a driver-reported statement failure, by constraint kind.
fn database_suggestion(kind: sqlx::error::ErrorKind) -> &'static str {
    use sqlx::error::ErrorKind;

    match kind {
        ErrorKind::UniqueViolation => "A row with the same key already exists",
        ErrorKind::ForeignKeyViolation => "The referenced row does not exist or is still referenced",
        ErrorKind::NotNullViolation => "Provide a value for every NOT NULL column",
        ErrorKind::CheckViolation => "The value violates a CHECK constraint",
        _ => "Check the SQL syntax and referenced objects",
    }
}

/// Classify driver errors at the driver boundary.
///
/// Connections are never pooled, so pool errors only appear through the
/// catch-all arm.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(db_err.message(), code, database_suggestion(db_err.kind()))
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::mapping(format!("Type not found: {}", type_name), None)
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::mapping(format!("Column not found: {}", col), Some(col.as_str()))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::mapping(
                format!("Column index {} out of bounds (len: {})", index, len),
                None,
            ),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::mapping(format!("Failed to decode column {}: {}", index, source), None)
            }
            sqlx::Error::Decode(source) => {
                DbError::mapping(format!("Decode error: {}", source), None)
            }
            sqlx::Error::WorkerCrashed => DbError::internal("SQLite worker thread crashed"),
            _ => DbError::internal(format!("Unexpected driver error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
