//! Integration tests for single-statement engine operations.
//!
//! Tests verify that:
//! - query / execute_non_query / execute_scalar / get_schema return the right shapes
//! - every opened connection is closed and commands are detached afterwards
//! - prepared commands can be reused across calls
//! - errors surface unchanged after release

mod common;

use common::{CountingProvider, init_tracing, seed_users, temp_sqlite_url};
use sql_caller::models::{Command, CommandType, DataTable, DbType, Parameter, Row, Value};
use sql_caller::{CancellationToken, DbError, DbResult, SqlCaller, SqlProvider};

#[tokio::test]
async fn test_query_materializes_rows() {
    init_tracing();
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let table = caller
        .query("SELECT id, name, email, active FROM users ORDER BY id", &token)
        .await
        .unwrap();

    assert_eq!(table.row_count(), 2);
    assert_eq!(table.column_names(), vec!["id", "name", "email", "active"]);
    assert_eq!(table.rows[0].get("NAME"), Some(&Value::Text("ada".into())));
    assert_eq!(table.rows[1].get("email"), Some(&Value::Null));
    assert_eq!(table.rows[1].get("active"), Some(&Value::Bool(true)));

    let stats = &caller.provider().stats;
    assert_eq!(stats.opened(), 3);
    assert!(stats.all_released());
}

#[tokio::test]
async fn test_query_with_no_rows_is_empty() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let table = caller
        .query("SELECT id, name FROM users WHERE id > 100", &token)
        .await
        .unwrap();
    assert!(table.is_empty());
    // The column list survives an empty result
    assert_eq!(table.column_names(), vec!["id", "name"]);
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_execute_non_query_reports_affected_rows() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let mut update = Command::new("UPDATE users SET email = ? WHERE email IS NULL");
    update.bind("email", "bob@example.com");
    let affected = caller.execute_non_query(&mut update, &token).await.unwrap();
    assert_eq!(affected, 1);
    assert!(!update.is_attached());

    let deleted = caller
        .execute_non_query("DELETE FROM users", &token)
        .await
        .unwrap();
    assert_eq!(deleted, 2);
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_execute_scalar_returns_first_cell_or_null() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let count = caller
        .execute_scalar("SELECT COUNT(*) FROM users", &token)
        .await
        .unwrap();
    assert_eq!(count, Value::Int(2));

    let name = caller
        .execute_scalar("SELECT name, id FROM users ORDER BY id DESC", &token)
        .await
        .unwrap();
    assert_eq!(name, Value::Text("bob".into()));

    let missing = caller
        .execute_scalar("SELECT name FROM users WHERE id = 42", &token)
        .await
        .unwrap();
    assert_eq!(missing, Value::Null);
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_get_schema_describes_columns() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let schema = caller
        .get_schema("SELECT id, name FROM users", &token)
        .await
        .unwrap()
        .expect("select has columns");
    assert_eq!(schema.columns.len(), 2);
    assert_eq!(schema.columns[1].name, "name");
    assert_eq!(schema.columns[1].ordinal, 1);
    assert!(schema.column("ID").is_some());

    let none = caller
        .get_schema("DELETE FROM users WHERE id = 0", &token)
        .await
        .unwrap();
    assert!(none.is_none());

    // Describing reads no rows and changes nothing
    let count = caller
        .execute_scalar("SELECT COUNT(*) FROM users", &token)
        .await
        .unwrap();
    assert_eq!(count, Value::Int(2));
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_prepared_command_is_reusable() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let mut lookup = caller.provider().create_command(
        "SELECT name FROM users WHERE id = ?",
        CommandType::Text,
        vec![caller
            .provider()
            .create_input_parameter("id", Value::Int(1), DbType::Int64)],
        Vec::new(),
    );

    let first = caller.execute_scalar(&mut lookup, &token).await.unwrap();
    assert_eq!(first, Value::Text("ada".into()));
    assert!(!lookup.is_attached());

    lookup.clear_parameters();
    lookup.bind("id", 2);
    let second = caller.execute_scalar(&mut lookup, &token).await.unwrap();
    assert_eq!(second, Value::Text("bob".into()));
    assert!(!lookup.is_attached());
}

#[tokio::test]
async fn test_typed_null_parameter_and_output_parameters() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let mut insert = Command::new("INSERT INTO users (id, name, email) VALUES (?, ?, ?)");
    insert
        .bind("id", 3)
        .bind("name", "cy")
        .add_parameter(Parameter::input("email", Value::Null).with_db_type(DbType::String))
        // Output parameters are carried but never bound
        .add_parameter(Parameter::output("ignored"));
    assert_eq!(caller.execute_non_query(&mut insert, &token).await.unwrap(), 1);

    let email = caller
        .execute_scalar("SELECT email FROM users WHERE id = 3", &token)
        .await
        .unwrap();
    assert!(email.is_null());
}

#[tokio::test]
async fn test_parameters_from_struct() {
    #[derive(serde::Serialize)]
    struct NewUser {
        id: i64,
        name: &'static str,
        email: Option<String>,
    }

    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let user = NewUser {
        id: 10,
        name: "dee",
        email: None,
    };
    let params = caller.provider().create_input_parameters(&user, ":").unwrap();
    let mut insert = caller.provider().create_command(
        "INSERT INTO users (id, name, email) VALUES (:id, :name, :email)",
        CommandType::Text,
        params,
        Vec::new(),
    );
    caller.execute_non_query(&mut insert, &token).await.unwrap();

    let name = caller
        .execute_scalar("SELECT name FROM users WHERE id = 10", &token)
        .await
        .unwrap();
    assert_eq!(name, Value::Text("dee".into()));
}

#[tokio::test]
async fn test_table_direct_reads_whole_table() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let mut command = Command::with_type("users", CommandType::TableDirect);
    let table = caller.query(&mut command, &token).await.unwrap();
    assert_eq!(table.row_count(), 2);
}

#[tokio::test]
async fn test_stored_procedure_rejected_on_sqlite() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let mut command = Command::with_type("add_user", CommandType::StoredProcedure);
    let result = caller.execute_non_query(&mut command, &token).await;
    assert!(matches!(result, Err(DbError::InvalidInput { .. })));
    assert!(!command.is_attached());
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_database_error_surfaces_after_release() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let mut command = Command::new("SELECT * FROM no_such_table");
    let result = caller.query(&mut command, &token).await;
    assert!(matches!(result, Err(DbError::Database { .. })));
    assert!(!command.is_attached());

    let stats = &caller.provider().stats;
    assert_eq!(stats.opened(), 1);
    assert!(stats.all_released());
}

#[tokio::test]
async fn test_connection_failure_surfaces() {
    let dir = tempfile::TempDir::new().unwrap();
    let url = format!(
        "sqlite:{}?create_if_missing=false",
        dir.path().join("missing.db").display()
    );
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let result = caller.execute_scalar("SELECT 1", &token).await;
    assert!(matches!(result, Err(DbError::Connection { .. })));
    assert_eq!(caller.provider().stats.opened(), 0);
}

#[tokio::test]
async fn test_get_with_custom_mapper_keeps_row_order() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    let mapper = |row: &Row| -> DbResult<(i64, String)> {
        Ok((row.try_get("id")?, row.try_get("name")?))
    };
    let users = caller
        .get(&mapper, "SELECT id, name FROM users ORDER BY id", &token)
        .await
        .unwrap();
    assert_eq!(users, vec![(1, "ada".to_string()), (2, "bob".to_string())]);
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_get_with_reads_the_whole_result() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    seed_users(&caller).await;
    let token = CancellationToken::new();

    // Pair each user with the next one, which a per-row mapper cannot see
    let pairs = caller
        .get_with(
            |table: DataTable| {
                table
                    .rows
                    .windows(2)
                    .map(|w| -> DbResult<(String, String)> {
                        Ok((w[0].try_get("name")?, w[1].try_get("name")?))
                    })
                    .collect()
            },
            "SELECT name FROM users ORDER BY id",
            &token,
        )
        .await
        .unwrap();
    assert_eq!(pairs, vec![("ada".to_string(), "bob".to_string())]);

    let result: DbResult<Vec<i64>> = caller
        .get_with(
            |table: DataTable| {
                assert_eq!(table.column_names(), vec!["id"]);
                Err(DbError::mapping("nothing to build", None))
            },
            "SELECT id FROM users WHERE id < 0",
            &token,
        )
        .await;
    assert!(matches!(result, Err(DbError::Mapping { .. })));
    assert!(caller.provider().stats.all_released());
}

#[tokio::test]
async fn test_get_dynamic_is_not_implemented() {
    let (_dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url));
    let token = CancellationToken::new();

    let result = caller.get_dynamic("SELECT 1", &token).await;
    match result {
        Err(DbError::NotImplemented { operation }) => assert_eq!(operation, "get_dynamic"),
        other => panic!("expected NotImplemented, got {:?}", other),
    }
    assert_eq!(caller.provider().stats.created(), 0);
}
