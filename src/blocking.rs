//! Synchronous facade over the execution engine.
//!
//! [`SqlCaller`] here wraps the asynchronous [`caller::SqlCaller`] and drives
//! each call to completion on a current-thread tokio runtime it owns. The
//! semantics are identical; the only difference is that calls block and
//! cannot be cancelled.
//!
//! Do not use this type from inside an async runtime: blocking on a runtime
//! from within another runtime panics.

use crate::caller::{self, CommandAction, Statement};
use crate::db::SqlProvider;
use crate::error::{DbError, DbResult};
use crate::mapping::DataMapper;
use crate::models::{Command, DataTable, IsolationLevel, SchemaTable, TransactionState, Value};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value as JsonValue};
use std::collections::VecDeque;
use tokio::runtime::{Builder, Runtime};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Blocking execution engine.
pub struct SqlCaller<P: SqlProvider> {
    inner: caller::SqlCaller<P>,
    runtime: Runtime,
}

impl<P: SqlProvider> SqlCaller<P> {
    pub fn new(provider: P) -> DbResult<Self> {
        let runtime = Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| DbError::internal(format!("Failed to start runtime: {}", e)))?;
        Ok(Self {
            inner: caller::SqlCaller::new(provider),
            runtime,
        })
    }

    pub fn provider(&self) -> &P {
        self.inner.provider()
    }

    /// The asynchronous engine this facade drives.
    pub fn as_async(&self) -> &caller::SqlCaller<P> {
        &self.inner
    }

    pub fn query<'a>(&self, statement: impl Into<Statement<'a>>) -> DbResult<DataTable> {
        let token = CancellationToken::new();
        self.runtime.block_on(self.inner.query(statement, &token))
    }

    pub fn execute_non_query<'a>(&self, statement: impl Into<Statement<'a>>) -> DbResult<u64> {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.execute_non_query(statement, &token))
    }

    pub fn execute_scalar<'a>(&self, statement: impl Into<Statement<'a>>) -> DbResult<Value> {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.execute_scalar(statement, &token))
    }

    pub fn get_schema<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
    ) -> DbResult<Option<SchemaTable>> {
        let token = CancellationToken::new();
        self.runtime.block_on(self.inner.get_schema(statement, &token))
    }

    pub fn get<'a, T, M>(&self, mapper: &M, statement: impl Into<Statement<'a>>) -> DbResult<Vec<T>>
    where
        M: DataMapper<T> + ?Sized,
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.get(mapper, statement, &token))
    }

    pub fn get_reflected<'a, T>(&self, statement: impl Into<Statement<'a>>) -> DbResult<Vec<T>>
    where
        T: DeserializeOwned,
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.get_reflected(statement, &token))
    }

    pub fn get_with<'a, T, F>(
        &self,
        reader: F,
        statement: impl Into<Statement<'a>>,
    ) -> DbResult<Vec<T>>
    where
        F: FnOnce(DataTable) -> DbResult<Vec<T>>,
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.get_with(reader, statement, &token))
    }

    pub fn iterate<'a, T, M, A>(
        &self,
        mapper: &M,
        action: A,
        statement: impl Into<Statement<'a>>,
    ) -> DbResult<()>
    where
        M: DataMapper<T> + ?Sized,
        A: FnMut(T),
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.iterate(mapper, action, statement, &token))
    }

    pub fn iterate_reflected<'a, T, A>(
        &self,
        action: A,
        statement: impl Into<Statement<'a>>,
    ) -> DbResult<()>
    where
        T: DeserializeOwned,
        A: FnMut(T),
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.iterate_reflected(action, statement, &token))
    }

    pub fn get_dynamic<'a>(
        &self,
        statement: impl Into<Statement<'a>>,
    ) -> DbResult<Vec<Map<String, JsonValue>>> {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.get_dynamic(statement, &token))
    }

    pub fn transact<C>(
        &self,
        isolation: IsolationLevel,
        actions: VecDeque<CommandAction>,
        on_failure: Option<C>,
    ) -> DbResult<()>
    where
        C: FnOnce(&str),
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.transact(isolation, actions, on_failure, &token))
    }

    pub fn operate_collection<T, I, F, B, C>(
        &self,
        items: I,
        initializer: F,
        binder: B,
        isolation: IsolationLevel,
        on_failure: Option<C>,
    ) -> DbResult<()>
    where
        I: IntoIterator<Item = T>,
        F: FnOnce(&mut Command),
        B: FnMut(&mut Command, &T),
        C: FnOnce(&T),
    {
        let token = CancellationToken::new();
        self.runtime.block_on(self.inner.operate_collection(
            items,
            initializer,
            binder,
            isolation,
            on_failure,
            &token,
        ))
    }

    pub fn create_scoped_transaction(
        &self,
        isolation: IsolationLevel,
    ) -> DbResult<ScopedTransaction<'_, P>> {
        let token = CancellationToken::new();
        let inner = self
            .runtime
            .block_on(self.inner.create_scoped_transaction(isolation, &token))?;
        Ok(ScopedTransaction {
            inner,
            runtime: &self.runtime,
        })
    }
}

/// Blocking counterpart of [`caller::ScopedTransaction`].
#[derive(Debug)]
pub struct ScopedTransaction<'a, P: SqlProvider> {
    inner: caller::ScopedTransaction<'a, P>,
    runtime: &'a Runtime,
}

impl<'a, P: SqlProvider> ScopedTransaction<'a, P> {
    pub fn id(&self) -> Uuid {
        self.inner.id()
    }

    pub fn isolation(&self) -> IsolationLevel {
        self.inner.isolation()
    }

    pub fn state(&self) -> TransactionState {
        self.inner.state()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.inner.started_at()
    }

    pub fn execute_non_query<'s>(&mut self, statement: impl Into<Statement<'s>>) -> DbResult<u64> {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.execute_non_query(statement, &token))
    }

    pub fn execute_scalar<'s>(&mut self, statement: impl Into<Statement<'s>>) -> DbResult<Value> {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.execute_scalar(statement, &token))
    }

    pub fn query<'s>(&mut self, statement: impl Into<Statement<'s>>) -> DbResult<DataTable> {
        let token = CancellationToken::new();
        self.runtime.block_on(self.inner.query(statement, &token))
    }

    pub fn get<'s, T, M>(
        &mut self,
        mapper: &M,
        statement: impl Into<Statement<'s>>,
    ) -> DbResult<Vec<T>>
    where
        M: DataMapper<T> + ?Sized,
    {
        let token = CancellationToken::new();
        self.runtime
            .block_on(self.inner.get(mapper, statement, &token))
    }

    pub fn commit(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.inner.commit())
    }

    pub fn rollback(&mut self) -> DbResult<()> {
        self.runtime.block_on(self.inner.rollback())
    }

    pub fn close(self) -> DbResult<()> {
        self.runtime.block_on(self.inner.close())
    }
}
