//! Shared fixtures for integration tests.
//!
//! Every engine call opens its own connection, so tests use file-backed SQLite
//! databases in a temporary directory (an in-memory database would be private
//! to each connection).

#![allow(dead_code)]

use async_trait::async_trait;
use sql_caller::db::RowStream;
use sql_caller::models::{Command, ConnectionState, IsolationLevel, SchemaTable};
use sql_caller::{DbConnection, DbResult, SqlProvider, SqlxConnection, SqlxProvider};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;
use uuid::Uuid;

/// Install a test-friendly tracing subscriber (once per process).
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A fresh SQLite database file; deleted when the returned directory drops.
pub fn temp_sqlite_url() -> (TempDir, String) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("test.db");
    let url = format!("sqlite:{}", path.display());
    (dir, url)
}

/// Connection lifecycle counters.
#[derive(Debug, Default)]
pub struct Stats {
    created: AtomicUsize,
    opened: AtomicUsize,
    closed: AtomicUsize,
}

impl Stats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    pub fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    /// Every connection that was opened has been closed again.
    pub fn all_released(&self) -> bool {
        self.opened() == self.closed()
    }
}

/// Provider wrapper that counts connection lifecycle events.
#[derive(Debug, Clone)]
pub struct CountingProvider {
    inner: SqlxProvider,
    pub stats: Arc<Stats>,
}

impl CountingProvider {
    pub fn new(url: &str) -> Self {
        Self {
            inner: SqlxProvider::new(url).unwrap(),
            stats: Arc::new(Stats::default()),
        }
    }
}

#[async_trait]
impl SqlProvider for CountingProvider {
    type Connection = CountingConnection;

    fn connection_string(&self) -> &str {
        self.inner.connection_string()
    }

    fn provider_type(&self) -> &str {
        self.inner.provider_type()
    }

    fn default_command_timeout(&self) -> Option<Duration> {
        self.inner.default_command_timeout()
    }

    fn create_connection(&self) -> CountingConnection {
        self.stats.created.fetch_add(1, Ordering::SeqCst);
        CountingConnection {
            inner: self.inner.create_connection(),
            stats: Arc::clone(&self.stats),
        }
    }
}

pub struct CountingConnection {
    inner: SqlxConnection,
    stats: Arc<Stats>,
}

#[async_trait]
impl DbConnection for CountingConnection {
    fn id(&self) -> Uuid {
        self.inner.id()
    }

    fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    async fn open(&mut self) -> DbResult<()> {
        self.inner.open().await?;
        self.stats.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&mut self) -> DbResult<()> {
        if self.inner.state() == ConnectionState::Open {
            self.stats.closed.fetch_add(1, Ordering::SeqCst);
        }
        self.inner.close().await
    }

    async fn begin_transaction(&mut self, isolation: IsolationLevel) -> DbResult<()> {
        self.inner.begin_transaction(isolation).await
    }

    async fn commit(&mut self) -> DbResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> DbResult<()> {
        self.inner.rollback().await
    }

    async fn execute(&mut self, command: &Command) -> DbResult<u64> {
        self.inner.execute(command).await
    }

    fn fetch<'c>(&'c mut self, command: &'c Command) -> RowStream<'c> {
        self.inner.fetch(command)
    }

    async fn describe(&mut self, command: &Command) -> DbResult<SchemaTable> {
        self.inner.describe(command).await
    }
}

/// Create the `users` table used across tests and insert two rows.
pub async fn seed_users<P: SqlProvider>(caller: &sql_caller::SqlCaller<P>) {
    let token = sql_caller::CancellationToken::new();
    caller
        .execute_non_query(
            "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT, active BOOLEAN NOT NULL DEFAULT 1)",
            &token,
        )
        .await
        .unwrap();
    caller
        .execute_non_query(
            "INSERT INTO users (id, name, email) VALUES (1, 'ada', 'ada@example.com'), (2, 'bob', NULL)",
            &token,
        )
        .await
        .unwrap();
}
