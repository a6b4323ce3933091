//! Integration tests against live MySQL and PostgreSQL servers.
//!
//! Set TEST_MYSQL_URL / TEST_POSTGRES_URL to run them; they are skipped
//! otherwise.

mod common;

use common::{CountingProvider, init_tracing};
use sql_caller::models::{Command, DbType, IsolationLevel, Parameter, Value};
use sql_caller::{CancellationToken, CommandAction, DbError, SqlCaller};
use std::collections::VecDeque;

fn server_url(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(url) => Some(url),
        Err(_) => {
            eprintln!("Skipping test: {} not set", var);
            None
        }
    }
}

#[tokio::test]
async fn test_mysql_utf8_and_batch_rollback() {
    let Some(url) = server_url("TEST_MYSQL_URL") else {
        return;
    };
    init_tracing();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let _ = caller
        .execute_non_query("DROP TABLE IF EXISTS sql_caller_utf8", &token)
        .await;
    caller
        .execute_non_query(
            "CREATE TABLE sql_caller_utf8 (id INT PRIMARY KEY, name VARCHAR(100)) \
             ENGINE=InnoDB DEFAULT CHARSET=utf8mb4",
            &token,
        )
        .await
        .unwrap();

    let mut insert = Command::new("INSERT INTO sql_caller_utf8 (id, name) VALUES (?, ?)");
    insert.bind("id", 1).bind("name", "张三 🚀");
    caller.execute_non_query(&mut insert, &token).await.unwrap();

    let name = caller
        .execute_scalar("SELECT name FROM sql_caller_utf8 WHERE id = 1", &token)
        .await
        .unwrap();
    assert_eq!(name, Value::Text("张三 🚀".into()));

    let actions: VecDeque<CommandAction> = VecDeque::from(vec![
        Box::new(|command: &mut Command| {
            command.set_text("INSERT INTO sql_caller_utf8 (id, name) VALUES (2, 'ok')")
        }) as CommandAction,
        Box::new(|command: &mut Command| {
            command.set_text("INSERT INTO sql_caller_utf8 (id, name) VALUES (1, 'duplicate')")
        }),
    ]);
    let result = caller
        .transact(IsolationLevel::RepeatableRead, actions, None::<fn(&str)>, &token)
        .await;
    assert!(matches!(result, Err(DbError::Database { .. })));

    let count = caller
        .execute_scalar("SELECT COUNT(*) FROM sql_caller_utf8", &token)
        .await
        .unwrap();
    assert_eq!(count, Value::Int(1));

    caller
        .execute_non_query("DROP TABLE sql_caller_utf8", &token)
        .await
        .unwrap();
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_postgres_typed_parameters_and_scoped_transaction() {
    let Some(url) = server_url("TEST_POSTGRES_URL") else {
        return;
    };
    init_tracing();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let _ = caller
        .execute_non_query("DROP TABLE IF EXISTS sql_caller_events", &token)
        .await;
    caller
        .execute_non_query(
            "CREATE TABLE sql_caller_events (id BIGINT PRIMARY KEY, note TEXT, happened_at TIMESTAMPTZ)",
            &token,
        )
        .await
        .unwrap();

    let mut tx = caller
        .create_scoped_transaction(IsolationLevel::Serializable, &token)
        .await
        .unwrap();
    let mut insert = Command::new(
        "INSERT INTO sql_caller_events (id, note, happened_at) VALUES ($1, $2, $3)",
    );
    insert
        .bind("id", 1_i64)
        .add_parameter(Parameter::input("note", Value::Null).with_db_type(DbType::String))
        .add_parameter(
            Parameter::input("happened_at", "2024-05-01T12:00:00Z").with_db_type(DbType::DateTime),
        );
    tx.execute_non_query(&mut insert, &token).await.unwrap();
    tx.commit().await.unwrap();
    tx.close().await.unwrap();

    let table = caller
        .query("SELECT id, note, happened_at FROM sql_caller_events", &token)
        .await
        .unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(table.rows[0].get("id"), Some(&Value::Int(1)));
    assert_eq!(table.rows[0].get("note"), Some(&Value::Null));
    assert!(matches!(table.rows[0].get("happened_at"), Some(Value::Text(_))));

    let schema = caller
        .get_schema("SELECT id, note FROM sql_caller_events", &token)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(schema.columns.len(), 2);

    // A type the decoder has no text form for is reported, not read as NULL
    let err = caller
        .query("SELECT point(1, 2) AS location", &token)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DbError::Mapping { column: Some(ref column), .. } if column == "location"
    ));

    caller
        .execute_non_query("DROP TABLE sql_caller_events", &token)
        .await
        .unwrap();
    assert!(caller.provider().stats.all_released());
}
