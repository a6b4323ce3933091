//! Statement execution on an already open connection.
//!
//! Shared by the one-shot engine operations and by scoped transactions. Every
//! function here applies the command timeout and races the work against the
//! cancellation token; none of them opens, attaches or releases anything.

use crate::db::{DbConnection, SqlProvider};
use crate::error::{DbError, DbResult};
use crate::mapping::DataMapper;
use crate::models::{ColumnMetadata, Command, CommandBehavior, DataTable, Row, SchemaTable, Value};
use futures_util::TryStreamExt;
use std::future::Future;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Timeout for a command: its own, else the provider's default.
pub(crate) fn effective_timeout<P: SqlProvider>(provider: &P, command: &Command) -> Option<Duration> {
    command
        .timeout()
        .or_else(|| provider.default_command_timeout())
}

/// Run `work` unless the token fires first; bound it by `limit` when set.
///
/// An already-cancelled token wins without polling `work` at all.
pub(crate) async fn guarded<F, T>(
    token: &CancellationToken,
    operation: &str,
    limit: Option<Duration>,
    work: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    race(token, operation, limit.map(|limit| (limit, limit)), work).await
}

/// `bound` is the configured limit and what is left of it.
async fn race<F, T>(
    token: &CancellationToken,
    operation: &str,
    bound: Option<(Duration, Duration)>,
    work: F,
) -> DbResult<T>
where
    F: Future<Output = DbResult<T>>,
{
    let bounded = async {
        match bound {
            Some((limit, remaining)) => tokio::time::timeout(remaining, work)
                .await
                .unwrap_or_else(|_| Err(DbError::timeout(operation, limit))),
            None => work.await,
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Err(DbError::cancelled(operation)),
        result = bounded => result,
    }
}

/// Command timeout shared by the driver steps of one streamed read.
///
/// Only time spent inside [`IoBudget::run`] is charged, so caller code run
/// between steps never counts against the limit.
pub(crate) struct IoBudget {
    limit: Option<Duration>,
    spent: Duration,
}

impl IoBudget {
    pub(crate) fn new(limit: Option<Duration>) -> Self {
        Self {
            limit,
            spent: Duration::ZERO,
        }
    }

    pub(crate) async fn run<F, T>(
        &mut self,
        token: &CancellationToken,
        operation: &str,
        work: F,
    ) -> DbResult<T>
    where
        F: Future<Output = DbResult<T>>,
    {
        let bound = self
            .limit
            .map(|limit| (limit, limit.saturating_sub(self.spent)));
        let started = Instant::now();
        let result = race(token, operation, bound, work).await;
        self.spent += started.elapsed();
        result
    }
}

pub(crate) async fn execute<P: SqlProvider>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    token: &CancellationToken,
) -> DbResult<u64> {
    let limit = effective_timeout(provider, command);
    guarded(token, "execute", limit, connection.execute(command)).await
}

pub(crate) async fn fetch_table<P: SqlProvider>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    token: &CancellationToken,
) -> DbResult<DataTable> {
    let limit = effective_timeout(provider, command);
    guarded(token, "query", limit, async {
        let rows: Vec<Row> = provider
            .create_reader(connection, command, CommandBehavior::Default)
            .try_collect()
            .await?;
        Ok(DataTable::from_rows(rows))
    })
    .await
}

/// [`fetch_table`], taking the column list from the driver when no row
/// carried it.
///
/// Only for connections outside a transaction: a failed describe would abort
/// an open PostgreSQL transaction.
pub(crate) async fn fetch_described_table<P: SqlProvider>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    token: &CancellationToken,
) -> DbResult<DataTable> {
    let mut table = fetch_table(provider, connection, command, token).await?;
    if !table.columns.is_empty() {
        return Ok(table);
    }

    let limit = effective_timeout(provider, command);
    match guarded(token, "query", limit, connection.describe(command)).await {
        Ok(schema) => {
            table.columns = schema
                .columns
                .into_iter()
                .map(|c| ColumnMetadata::new(c.name, c.data_type))
                .collect();
        }
        Err(e) if e.is_cancelled() => return Err(e),
        // Multi-statement text cannot be prepared; the rows are still valid
        Err(e) => warn!(
            connection_id = %connection.id(),
            error = %e,
            "Could not describe columns of an empty result"
        ),
    }
    Ok(table)
}

/// First column of the first row; `Value::Null` when there are no rows.
pub(crate) async fn fetch_scalar<P: SqlProvider>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    token: &CancellationToken,
) -> DbResult<Value> {
    let limit = effective_timeout(provider, command);
    guarded(token, "execute scalar", limit, async {
        let mut rows = provider.create_reader(connection, command, CommandBehavior::SingleRow);
        let first = rows.try_next().await?;
        Ok(first
            .and_then(|row| row.get_by_index(0).cloned())
            .unwrap_or(Value::Null))
    })
    .await
}

/// Column layout of the command's result; `None` when it produces no columns.
pub(crate) async fn describe<P: SqlProvider>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    token: &CancellationToken,
) -> DbResult<Option<SchemaTable>> {
    let limit = effective_timeout(provider, command);
    let schema = guarded(token, "get schema", limit, connection.describe(command)).await?;
    Ok((!schema.columns.is_empty()).then_some(schema))
}

pub(crate) async fn fetch_mapped<P, T, M>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    mapper: &M,
    token: &CancellationToken,
) -> DbResult<Vec<T>>
where
    P: SqlProvider,
    M: DataMapper<T> + ?Sized,
{
    let mut mapped = Vec::new();
    for_each_mapped(provider, connection, command, mapper, |item| mapped.push(item), token).await?;
    Ok(mapped)
}

/// Map rows as they are read and hand each to `action`. Returns the row count.
pub(crate) async fn for_each_mapped<P, T, M, A>(
    provider: &P,
    connection: &mut P::Connection,
    command: &Command,
    mapper: &M,
    mut action: A,
    token: &CancellationToken,
) -> DbResult<u64>
where
    P: SqlProvider,
    M: DataMapper<T> + ?Sized,
    A: FnMut(T),
{
    let mut budget = IoBudget::new(effective_timeout(provider, command));
    let mut rows = provider.create_reader(connection, command, CommandBehavior::Default);
    let mut count = 0;
    while let Some(row) = budget.run(token, "read rows", rows.try_next()).await? {
        action(mapper.create_mapped_instance(&row)?);
        count += 1;
    }
    Ok(count)
}
