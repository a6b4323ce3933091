//! Caller-managed transactions.
//!
//! A [`ScopedTransaction`] holds one open connection with one active
//! transaction across several engine calls. The caller decides when to
//! commit, roll back and close; the engine never does it for them.

use super::{Statement, execution, new_transaction_id};
use crate::db::{DbConnection, SqlProvider};
use crate::error::{DbError, DbResult};
use crate::mapping::DataMapper;
use crate::models::{Command, DataTable, IsolationLevel, TransactionState, Value};
use chrono::{DateTime, Utc};
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// An open connection with an active transaction.
pub struct ScopedTransaction<'p, P: SqlProvider> {
    provider: &'p P,
    connection: P::Connection,
    id: Uuid,
    isolation: IsolationLevel,
    state: TransactionState,
    started_at: DateTime<Utc>,
    created_at: Instant,
    closed: bool,
}

impl<'p, P: SqlProvider> ScopedTransaction<'p, P> {
    pub(crate) async fn begin(
        provider: &'p P,
        isolation: IsolationLevel,
        token: &CancellationToken,
    ) -> DbResult<Self> {
        let mut connection = execution::guarded(
            token,
            "open connection",
            None,
            provider.create_opened_connection(),
        )
        .await?;

        let begun = execution::guarded(
            token,
            "begin transaction",
            None,
            connection.begin_transaction(isolation),
        )
        .await;
        if let Err(error) = begun {
            if let Err(e) = connection.close().await {
                warn!(connection_id = %connection.id(), error = %e, "Failed to close connection");
            }
            return Err(error);
        }

        let id = new_transaction_id();
        info!(
            transaction_id = %id,
            connection_id = %connection.id(),
            isolation = %isolation,
            "Scoped transaction started"
        );

        Ok(Self {
            provider,
            connection,
            id,
            isolation,
            state: TransactionState::Active,
            started_at: Utc::now(),
            created_at: Instant::now(),
            closed: false,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub async fn execute_non_query<'a>(
        &mut self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<u64> {
        self.ensure_active()?;
        let mut slot = None;
        let command = statement.into().resolve(self.provider, &mut slot);

        self.attach(command);
        let result = execution::execute(self.provider, &mut self.connection, command, token).await;
        command.detach();
        result
    }

    pub async fn execute_scalar<'a>(
        &mut self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Value> {
        self.ensure_active()?;
        let mut slot = None;
        let command = statement.into().resolve(self.provider, &mut slot);

        self.attach(command);
        let result =
            execution::fetch_scalar(self.provider, &mut self.connection, command, token).await;
        command.detach();
        result
    }

    pub async fn query<'a>(
        &mut self,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<DataTable> {
        self.ensure_active()?;
        let mut slot = None;
        let command = statement.into().resolve(self.provider, &mut slot);

        self.attach(command);
        let result =
            execution::fetch_table(self.provider, &mut self.connection, command, token).await;
        command.detach();
        result
    }

    pub async fn get<'a, T, M>(
        &mut self,
        mapper: &M,
        statement: impl Into<Statement<'a>>,
        token: &CancellationToken,
    ) -> DbResult<Vec<T>>
    where
        M: DataMapper<T> + ?Sized,
    {
        self.ensure_active()?;
        let mut slot = None;
        let command = statement.into().resolve(self.provider, &mut slot);

        self.attach(command);
        let result =
            execution::fetch_mapped(self.provider, &mut self.connection, command, mapper, token)
                .await;
        command.detach();
        result
    }

    pub async fn commit(&mut self) -> DbResult<()> {
        self.ensure_active()?;
        match self.connection.commit().await {
            Ok(()) => {
                self.state = TransactionState::Committed;
                info!(
                    transaction_id = %self.id,
                    elapsed_ms = self.created_at.elapsed().as_millis() as u64,
                    "Scoped transaction committed"
                );
                Ok(())
            }
            Err(e) => {
                // A failed COMMIT leaves nothing to commit or roll back
                self.state = TransactionState::RolledBack;
                warn!(transaction_id = %self.id, error = %e, "Commit failed");
                Err(e)
            }
        }
    }

    pub async fn rollback(&mut self) -> DbResult<()> {
        self.ensure_active()?;
        self.state = TransactionState::RolledBack;
        let result = self.connection.rollback().await;
        info!(
            transaction_id = %self.id,
            elapsed_ms = self.created_at.elapsed().as_millis() as u64,
            "Scoped transaction rolled back"
        );
        result
    }

    /// Close the connection. A transaction still active at this point is
    /// discarded by the server.
    pub async fn close(mut self) -> DbResult<()> {
        if self.state.is_active() {
            warn!(
                transaction_id = %self.id,
                "Closing scoped transaction that was neither committed nor rolled back"
            );
        }
        self.closed = true;
        debug!(transaction_id = %self.id, "Closing scoped transaction");
        self.connection.close().await
    }

    fn ensure_active(&self) -> DbResult<()> {
        if self.state.is_active() {
            Ok(())
        } else {
            Err(DbError::transaction(
                format!("Transaction is no longer active (state: {:?})", self.state),
                self.id.to_string(),
            ))
        }
    }

    fn attach(&self, command: &mut Command) {
        command.attach(self.connection.id(), Some(self.id));
    }
}

impl<P: SqlProvider> Drop for ScopedTransaction<'_, P> {
    fn drop(&mut self) {
        if !self.closed && self.state.is_active() {
            warn!(
                transaction_id = %self.id,
                "Scoped transaction dropped while active; the server will discard it"
            );
        }
    }
}

impl<P: SqlProvider> std::fmt::Debug for ScopedTransaction<'_, P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScopedTransaction")
            .field("id", &self.id)
            .field("isolation", &self.isolation)
            .field("state", &self.state)
            .field("started_at", &self.started_at)
            .finish()
    }
}
