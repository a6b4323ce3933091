//! Transactional batches.
//!
//! Both batch shapes run the same protocol on one connection and one
//! engine-owned command:
//!
//! ```text
//! open -> begin -> attach command -> initializer
//!      -> per unit: mutate command, execute, clear parameters
//!      -> commit
//! ```
//!
//! A failing unit (execution error, timeout or cancellation) rolls the
//! transaction back, reports the offending unit to the optional callback and
//! returns the unit's error unchanged. The command is detached and the
//! connection closed on every path. An empty batch opens nothing.

use super::{SqlCaller, execution, new_transaction_id};
use crate::db::{DbConnection, SqlProvider};
use crate::error::{DbError, DbResult};
use crate::models::{Command, CommandType, IsolationLevel};
use std::collections::VecDeque;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One step of an ordered action batch: mutates the shared command, which is
/// then executed as a non-query.
pub type CommandAction = Box<dyn FnOnce(&mut Command) + Send>;

/// Where a batch stopped.
enum BatchFailure {
    /// Open, begin or commit failed; there is nothing to roll back.
    Transaction(DbError),
    /// The unit at `index` failed inside the open transaction.
    Unit { index: usize, error: DbError },
}

impl<P: SqlProvider> SqlCaller<P> {
    /// Run each action against the engine-owned command, in submission order,
    /// inside one transaction.
    ///
    /// On failure the transaction is rolled back and `on_failure` receives the
    /// text of the command that failed. Pass `None::<fn(&str)>` for no callback.
    pub async fn transact<C>(
        &self,
        isolation: IsolationLevel,
        actions: VecDeque<CommandAction>,
        on_failure: Option<C>,
        token: &CancellationToken,
    ) -> DbResult<()>
    where
        C: FnOnce(&str),
    {
        self.run_batch(
            isolation,
            actions,
            |_| {},
            |command, action| action(command),
            |command, _| {
                if let Some(callback) = on_failure {
                    callback(command.text());
                }
            },
            token,
        )
        .await
    }

    /// Execute the command once per item, in iteration order, inside one
    /// transaction.
    ///
    /// `initializer` runs once before the first item (typically to set the
    /// command text); `binder` adds the item's parameters. The items are
    /// collected once up front. On failure the transaction is rolled back and
    /// `on_failure` receives the item that failed.
    pub async fn operate_collection<T, I, F, B, C>(
        &self,
        items: I,
        initializer: F,
        mut binder: B,
        isolation: IsolationLevel,
        on_failure: Option<C>,
        token: &CancellationToken,
    ) -> DbResult<()>
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(&mut Command),
        B: FnMut(&mut Command, &T),
        C: FnOnce(&T),
    {
        let items: Vec<T> = items.into_iter().collect();
        self.run_batch(
            isolation,
            items.iter(),
            initializer,
            |command, item| binder(command, item),
            |_, index| {
                if let Some(callback) = on_failure {
                    callback(&items[index]);
                }
            },
            token,
        )
        .await
    }

    async fn run_batch<U, S, F, A, R>(
        &self,
        isolation: IsolationLevel,
        units: S,
        initializer: F,
        mut apply: A,
        report: R,
        token: &CancellationToken,
    ) -> DbResult<()>
    where
        S: IntoIterator<Item = U>,
        F: FnOnce(&mut Command),
        A: FnMut(&mut Command, U),
        R: FnOnce(&Command, usize),
    {
        let mut units = units.into_iter().peekable();
        if units.peek().is_none() {
            debug!("Empty batch, nothing to execute");
            return Ok(());
        }

        let transaction_id = new_transaction_id();
        let mut connection = self.provider.create_connection();
        let mut command = self
            .provider
            .create_command("", CommandType::Text, Vec::new(), Vec::new());

        let outcome = self
            .batch_loop(
                &mut connection,
                &mut command,
                transaction_id,
                isolation,
                units,
                initializer,
                &mut apply,
                token,
            )
            .await;

        let result = match outcome {
            Ok(count) => {
                info!(
                    transaction_id = %transaction_id,
                    items = count,
                    "Batch committed"
                );
                Ok(())
            }
            Err(BatchFailure::Unit { index, error }) => {
                info!(
                    transaction_id = %transaction_id,
                    index,
                    error = %error,
                    "Batch item failed, rolling back"
                );
                // Never cancelled: the token may be what stopped the batch
                if let Err(e) = connection.rollback().await {
                    warn!(
                        transaction_id = %transaction_id,
                        error = %e,
                        "Rollback failed"
                    );
                }
                report(&command, index);
                Err(error)
            }
            Err(BatchFailure::Transaction(error)) => Err(error),
        };

        self.release(&mut connection, &mut command).await;
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn batch_loop<U, F, A>(
        &self,
        connection: &mut P::Connection,
        command: &mut Command,
        transaction_id: Uuid,
        isolation: IsolationLevel,
        units: impl Iterator<Item = U>,
        initializer: F,
        apply: &mut A,
        token: &CancellationToken,
    ) -> Result<usize, BatchFailure>
    where
        F: FnOnce(&mut Command),
        A: FnMut(&mut Command, U),
    {
        execution::guarded(token, "open connection", None, connection.open())
            .await
            .map_err(BatchFailure::Transaction)?;
        execution::guarded(
            token,
            "begin transaction",
            None,
            connection.begin_transaction(isolation),
        )
        .await
        .map_err(BatchFailure::Transaction)?;

        debug!(
            transaction_id = %transaction_id,
            connection_id = %connection.id(),
            isolation = %isolation,
            "Batch transaction started"
        );
        command.attach(connection.id(), Some(transaction_id));
        initializer(command);

        let mut count = 0;
        for (index, unit) in units.enumerate() {
            apply(command, unit);
            let executed = execution::execute(&self.provider, connection, command, token).await;
            command.clear_parameters();
            match executed {
                Ok(rows_affected) => {
                    debug!(transaction_id = %transaction_id, index, rows_affected, "Batch item executed");
                }
                Err(error) => return Err(BatchFailure::Unit { index, error }),
            }
            count += 1;
        }

        connection
            .commit()
            .await
            .map_err(BatchFailure::Transaction)?;
        Ok(count)
    }
}
