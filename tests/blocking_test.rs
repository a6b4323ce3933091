//! Integration tests for the blocking facade.

mod common;

use common::{CountingProvider, init_tracing, temp_sqlite_url};
use serde::Deserialize;
use sql_caller::blocking::SqlCaller;
use sql_caller::models::{Command, DataTable, IsolationLevel, Value};
use sql_caller::{CommandAction, DbError, DbResult};
use std::collections::VecDeque;

#[derive(Debug, Deserialize, PartialEq)]
struct Product {
    sku: String,
    price: f64,
}

fn setup() -> (tempfile::TempDir, SqlCaller<CountingProvider>) {
    init_tracing();
    let (dir, url) = temp_sqlite_url();
    let caller = SqlCaller::new(CountingProvider::new(&url)).unwrap();
    caller
        .execute_non_query("CREATE TABLE products (sku TEXT PRIMARY KEY, price REAL NOT NULL)")
        .unwrap();
    (dir, caller)
}

#[test]
fn test_blocking_single_statements() {
    let (_dir, caller) = setup();

    let mut insert = Command::new("INSERT INTO products (sku, price) VALUES (?, ?)");
    insert.bind("sku", "A-1").bind("price", 9.5);
    assert_eq!(caller.execute_non_query(&mut insert).unwrap(), 1);

    let table = caller.query("SELECT sku, price FROM products").unwrap();
    assert_eq!(table.row_count(), 1);
    assert_eq!(
        caller.execute_scalar("SELECT price FROM products").unwrap(),
        Value::Float(9.5)
    );

    let schema = caller
        .get_schema("SELECT sku, price FROM products")
        .unwrap()
        .unwrap();
    assert_eq!(schema.columns.len(), 2);

    let products: Vec<Product> = caller.get_reflected("SELECT sku, price FROM products").unwrap();
    assert_eq!(
        products,
        vec![Product {
            sku: "A-1".into(),
            price: 9.5,
        }]
    );

    let mut skus = Vec::new();
    caller
        .iterate_reflected(|p: Product| skus.push(p.sku), "SELECT sku, price FROM products")
        .unwrap();
    assert_eq!(skus, vec!["A-1"]);

    assert!(matches!(
        caller.get_dynamic("SELECT 1"),
        Err(DbError::NotImplemented { .. })
    ));
    assert!(caller.provider().stats.all_released());
}

#[test]
fn test_blocking_batches() {
    let (_dir, caller) = setup();

    caller
        .operate_collection(
            vec![("B-1", 1.0), ("B-2", 2.0)],
            |command: &mut Command| {
                command.set_text("INSERT INTO products (sku, price) VALUES (?, ?)")
            },
            |command: &mut Command, (sku, price): &(&str, f64)| {
                command.bind("sku", *sku).bind("price", *price);
            },
            IsolationLevel::Serializable,
            None::<fn(&(&str, f64))>,
        )
        .unwrap();

    let mut failed = Vec::new();
    let callback = |text: &str| failed.push(text.to_string());
    let actions: VecDeque<CommandAction> = VecDeque::from(vec![
        Box::new(|command: &mut Command| {
            command.set_text("UPDATE products SET price = price * 2")
        }) as CommandAction,
        Box::new(|command: &mut Command| {
            command.set_text("INSERT INTO products (sku, price) VALUES ('B-1', 0)")
        }),
    ]);
    let result = caller.transact(IsolationLevel::Serializable, actions, Some(callback));
    assert!(matches!(result, Err(DbError::Database { .. })));
    assert_eq!(failed.len(), 1);

    // The update was rolled back together with the failed insert
    assert_eq!(
        caller
            .execute_scalar("SELECT SUM(price) FROM products")
            .unwrap(),
        Value::Float(3.0)
    );
    assert!(caller.provider().stats.all_released());
}

#[test]
fn test_blocking_scoped_transaction() {
    let (_dir, caller) = setup();

    let mut tx = caller
        .create_scoped_transaction(IsolationLevel::Unspecified)
        .unwrap();
    tx.execute_non_query("INSERT INTO products (sku, price) VALUES ('C-1', 4.0)")
        .unwrap();
    assert_eq!(
        tx.execute_scalar("SELECT COUNT(*) FROM products").unwrap(),
        Value::Int(1)
    );
    tx.commit().unwrap();
    tx.close().unwrap();

    let table = caller.query("SELECT sku FROM products").unwrap();
    assert_eq!(table.row_count(), 1);
    assert!(caller.provider().stats.all_released());
}

#[test]
fn test_blocking_get_with() {
    let (_dir, caller) = setup();
    caller
        .execute_non_query("INSERT INTO products (sku, price) VALUES ('D-1', 1.5), ('D-2', 2.5)")
        .unwrap();

    let total = caller
        .get_with(
            |table: DataTable| {
                let sum = table
                    .rows
                    .iter()
                    .map(|row| row.try_get::<f64>("price"))
                    .sum::<DbResult<f64>>()?;
                Ok(vec![sum])
            },
            "SELECT price FROM products",
        )
        .unwrap();
    assert_eq!(total, vec![4.0]);
    assert!(caller.provider().stats.all_released());
}
