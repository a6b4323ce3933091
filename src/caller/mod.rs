//! The execution engine.
//!
//! [`SqlCaller`] owns the connection lifecycle for every call: it creates a
//! connection through the provider, attaches the command, opens, executes,
//! and then always detaches the command and closes the connection before
//! returning the result or the error.
//!
//! # Architecture
//!
//! - `execution`: running a command on an open connection (timeouts, cancellation)
//! - `batch`: ordered action batches and collection batches in one transaction
//! - `scoped`: caller-managed connection + transaction pairs
//!
//! Every operation takes a [`CancellationToken`]. The token is checked before
//! any I/O starts and raced against each database round trip; a cancelled
//! operation unwinds through the same release path and fails with
//! [`DbError::Cancelled`].

mod batch;
pub(crate) mod execution;
mod scoped;

pub use batch::CommandAction;
pub use scoped::ScopedTransaction;

use crate::db::{DbConnection, SqlProvider};
use crate::error::{DbError, DbResult};
use crate::mapping::{DataMapper, ReflectionMapper};
use crate::models::{Command, CommandType, DataTable, IsolationLevel, SchemaTable, Value};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

/// What to execute: raw SQL text or a prepared command.
///
/// Text is wrapped into a fresh [`Command`] by the provider's
/// [`create_command`](SqlProvider::create_command). A borrowed command keeps its
/// parameters and can be reused by later calls.
#[derive(Debug)]
pub enum Statement<'a> {
    Text(&'a str),
    Command(&'a mut Command),
}

impl<'a> From<&'a str> for Statement<'a> {
    fn from(text: &'a str) -> Self {
        Statement::Text(text)
    }
}

impl<'a> From<&'a String> for Statement<'a> {
    fn from(text: &'a String) -> Self {
        Statement::Text(text.as_str())
    }
}

impl<'a> From<&'a mut Command> for Statement<'a> {
    fn from(command: &'a mut Command) -> Self {
        Statement::Command(command)
    }
}

impl<'a> Statement<'a> {
    /// The command to run; text is materialized into `slot`.
    pub(crate) fn resolve<'s, P: SqlProvider>(
        self,
        provider: &P,
        slot: &'s mut Option<Command>,
    ) -> &'s mut Command
    where
        'a: 's,
    {
        match self {
            Statement::Command(command) => command,
            Statement::Text(text) => slot.insert(provider.create_command(
                text,
                CommandType::Text,
                Vec::new(),
                Vec::new(),
            )),
        }
    }
}

/// Asynchronous execution engine over a [`SqlProvider`].
#[derive(Debug, Clone)]
pub struct SqlCaller<P: SqlProvider> {
    provider: P,
}

impl<P: SqlProvider> SqlCaller<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a statement and materialize every row.
    pub async fn query<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<DataTable> {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            execution::fetch_described_table(&self.provider, &mut connection, command, token)
                .await
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// Execute a statement that returns no rows; yields the number of affected rows.
    pub async fn execute_non_query<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<u64> {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            execution::execute(&self.provider, &mut connection, command, token).await
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// First column of the first row, or `Value::Null` when there are no rows.
    pub async fn execute_scalar<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Value> {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            execution::fetch_scalar(&self.provider, &mut connection, command, token).await
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// Describe the result columns of a statement without reading rows.
    ///
    /// Returns `None` for statements that produce no columns.
    pub async fn get_schema<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Option<SchemaTable>> {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            execution::describe(&self.provider, &mut connection, command, token).await
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// Map every row with `mapper`, preserving row order.
    pub async fn get<'a, T, M>(
        &self,
        mapper: &M,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Vec<T>>
    where
        M: DataMapper<T> + ?Sized,
    {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            execution::fetch_mapped(&self.provider, &mut connection, command, mapper, token).await
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// [`get`](Self::get) with the default [`ReflectionMapper`].
    pub async fn get_reflected<'a, T>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        self.get(&ReflectionMapper::<T>::new(), statement, token)
            .await
    }

    /// Hand the whole result to `reader`, which builds the list itself.
    ///
    /// Rows are read under the command timeout; `reader` runs after the read,
    /// before the connection is released, and its error is returned as is.
    pub async fn get_with<'a, T, F>(
        &self,
        reader: F,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Vec<T>>
    where
        F: FnOnce(DataTable) -> DbResult<Vec<T>>,
    {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            let table =
                execution::fetch_described_table(&self.provider, &mut connection, command, token)
                    .await?;
            reader(table)
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// Map rows as they are read and pass each to `action`.
    ///
    /// Nothing is buffered; the connection stays open until the last row has
    /// been handed over (or an error stops the read).
    pub async fn iterate<'a, T, M, A>(
        &self,
        mapper: &M,
        action: A,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<()>
    where
        M: DataMapper<T> + ?Sized,
        A: FnMut(T),
    {
        let mut slot = None;
        let command = statement.into().resolve(&self.provider, &mut slot);
        let mut connection = self.provider.create_connection();

        let result = async {
            self.open(&mut connection, command, token).await?;
            let count = execution::for_each_mapped(
                &self.provider,
                &mut connection,
                command,
                mapper,
                action,
                token,
            )
            .await?;
            debug!(connection_id = %connection.id(), rows = count, "Iteration finished");
            Ok(())
        }
        .await;

        self.release(&mut connection, command).await;
        result
    }

    /// [`iterate`](Self::iterate) with the default [`ReflectionMapper`].
    pub async fn iterate_reflected<'a, T, A>(
        &self,
        action: A,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<()>
    where
        T: DeserializeOwned,
        A: FnMut(T),
    {
        self.iterate(&ReflectionMapper::<T>::new(), action, statement, token)
            .await
    }

    /// Untyped row retrieval. Not supported: always fails without touching the
    /// database.
    pub async fn get_dynamic<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Vec<Map<String, JsonValue>>> {
        let _ = (statement.into(), token);
        Err(DbError::not_implemented("get_dynamic"))
    }

    /// Open a connection and begin a transaction that the caller then drives.
    ///
    /// The engine never commits, rolls back or closes a scoped transaction on
    /// its own.
    pub async fn create_scoped_transaction(
        &self,
        isolation: IsolationLevel,
        token: &CancellationToken,
    ) -> DbResult<ScopedTransaction<'_, P>> {
        ScopedTransaction::begin(&self.provider, isolation, token).await
    }

    /// Attach `command` to a fresh connection and open it.
    async fn open(
        &self,
        connection: &mut P::Connection,
        command: &mut Command,
        token: &CancellationToken,
    ) -> DbResult<()> {
        command.attach(connection.id(), None);
        execution::guarded(token, "open connection", None, connection.open()).await
    }

    /// Detach the command and close the connection. Never fails: a close error
    /// is logged and the operation's own result stands.
    async fn release(&self, connection: &mut P::Connection, command: &mut Command) {
        command.detach();
        if let Err(e) = connection.close().await {
            warn!(connection_id = %connection.id(), error = %e, "Failed to close connection");
        }
    }
}

/// Identifier for a transaction, used in logs and command bindings.
fn new_transaction_id() -> Uuid {
    Uuid::new_v4()
}
