//! Catalog SQL issued by each dialect, checked against a scripted backend.
//!
//! Derby, H2 and Oracle have no bundled driver; their handlers run here
//! against canned catalog rows and the recorded DDL is compared verbatim.

mod common;

use common::{Script, rows, scripted_registry};
use db_session::error::DbError;
use db_session::models::{QueryParam, TransactionState};
use serde_json::json;

const DERBY_URL: &str = "jdbc:derby:memory:app;create=true";
const H2_URL: &str = "jdbc:h2:mem:app";
const ORACLE_URL: &str = "jdbc:oracle:thin:@db.internal:1521/APP";
const MYSQL_URL: &str = "mysql://db.internal/app";
const POSTGRES_URL: &str = "postgres://db.internal/app";

/// Statements that are not catalog reads or transaction markers.
fn ddl(script: &Script) -> Vec<String> {
    script
        .statements()
        .into_iter()
        .filter(|s| s.starts_with("ALTER") || s.starts_with("CREATE") || s.starts_with("DROP"))
        .collect()
}

// =============================================================================
// Derby
// =============================================================================

#[tokio::test]
async fn test_derby_reset_restarts_identities_and_recreates_sequences() {
    let script = Script::new()
        .respond("AUTOINCREMENTVALUE", rows(&["TABLENAME", "COLUMNNAME"], vec![
            vec![json!("ORDERS"), json!("ID")],
        ]))
        .respond("MINIMUMVALUE", rows(
            &["SEQUENCENAME", "INCREMENT", "MINIMUMVALUE", "MAXIMUMVALUE", "CYCLEOPTION"],
            vec![
                vec![json!("INVOICE_SEQ"), json!(1), json!(1), json!(i32::MAX), json!("N")],
                vec![json!("TINY_SEQ"), json!(2), json!(-32768), json!(32767), json!("Y")],
            ],
        ));
    let (registry, _) = scripted_registry(DERBY_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    session.reset_identity_generation_or_sequences(10).await.unwrap();
    session.close().await;

    assert_eq!(
        ddl(&script),
        vec![
            "ALTER TABLE \"ORDERS\" ALTER COLUMN \"ID\" RESTART WITH 10",
            "DROP SEQUENCE \"INVOICE_SEQ\" RESTRICT",
            "CREATE SEQUENCE \"INVOICE_SEQ\" AS INTEGER START WITH 10 INCREMENT BY 1 \
             MINVALUE 1 MAXVALUE 2147483647 NO CYCLE",
            "DROP SEQUENCE \"TINY_SEQ\" RESTRICT",
            "CREATE SEQUENCE \"TINY_SEQ\" AS SMALLINT START WITH 10 INCREMENT BY 2 \
             MINVALUE -32768 MAXVALUE 32767 CYCLE",
        ]
    );
    assert_eq!(script.statements().last().map(String::as_str), Some("COMMIT"));
}

#[tokio::test]
async fn test_derby_peek_resolves_stored_name() {
    let script = Script::new()
        .respond("SYSCS_PEEK_AT_SEQUENCE", rows(&["1"], vec![vec![json!("42")]]))
        .respond("SYSSEQUENCES", rows(&["SEQUENCENAME"], vec![vec![json!("ORDER_SEQ")]]));
    let (registry, _) = scripted_registry(DERBY_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.next_value_from_sequence("order_seq").await.unwrap(), 42);
    session.close().await;

    let peek = script
        .recorded()
        .into_iter()
        .find(|r| r.sql.contains("SYSCS_PEEK_AT_SEQUENCE"))
        .unwrap();
    assert_eq!(peek.params, vec![QueryParam::from("ORDER_SEQ")]);
}

#[tokio::test]
async fn test_derby_unknown_sequence_is_metadata_error() {
    let script = Script::new();
    let (registry, _) = scripted_registry(DERBY_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    let err = session.next_value_from_sequence("nope").await.unwrap_err();
    assert!(matches!(err, DbError::Metadata { ref object, .. } if object == "nope"));
    assert!(!session.is_rollback_only());
    session.close().await;

    assert!(
        !script
            .statements()
            .iter()
            .any(|s| s.contains("SYSCS_PEEK_AT_SEQUENCE"))
    );
}

#[tokio::test]
async fn test_derby_casing_upper_cases_before_lookup() {
    let script = Script::new().respond("SYSCONSTRAINTS", rows(&["COLUMNNAME"], vec![vec![json!("ID")]]));
    let (registry, _) = scripted_registry(DERBY_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.primary_key_column("orders").await.unwrap(), "ID");
    session.close().await;

    let lookup = script
        .recorded()
        .into_iter()
        .find(|r| r.sql.contains("SYSCONSTRAINTS"))
        .unwrap();
    assert_eq!(lookup.params, vec![QueryParam::from("ORDERS")]);
}

// =============================================================================
// H2
// =============================================================================

#[tokio::test]
async fn test_h2_reset_restarts_each_sequence() {
    let script = Script::new().respond(
        "INFORMATION_SCHEMA.SEQUENCES",
        rows(&["SEQUENCE_NAME"], vec![vec![json!("ORDER_SEQ")], vec![json!("INVOICE_SEQ")]]),
    );
    let (registry, _) = scripted_registry(H2_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(
        session.sequence_names().await.unwrap(),
        vec!["ORDER_SEQ", "INVOICE_SEQ"]
    );
    session.reset_identity_generation_or_sequences(1).await.unwrap();
    session.close().await;

    assert_eq!(
        ddl(&script),
        vec![
            "ALTER SEQUENCE \"ORDER_SEQ\" RESTART WITH 1",
            "ALTER SEQUENCE \"INVOICE_SEQ\" RESTART WITH 1",
        ]
    );
}

#[tokio::test]
async fn test_h2_peek_normalizes_value() {
    let script = Script::new().respond("BASE_VALUE", rows(&["BASE_VALUE"], vec![vec![json!(7)]]));
    let (registry, _) = scripted_registry(H2_URL, script);

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.next_value_from_sequence("order_seq").await.unwrap(), 7);
    session.close().await;
}

#[tokio::test]
async fn test_h2_missing_sequence() {
    let (registry, _) = scripted_registry(H2_URL, Script::new());

    let mut session = registry.open("main").await.unwrap();
    assert!(matches!(
        session.next_value_from_sequence("missing").await.unwrap_err(),
        DbError::Metadata { .. }
    ));
    session.close().await;
}

// =============================================================================
// Oracle
// =============================================================================

#[tokio::test]
async fn test_oracle_reset_recreates_sequences_and_identities() {
    let script = Script::new()
        .respond("INCREMENT_BY", rows(&["SEQUENCE_NAME", "INCREMENT_BY"], vec![
            vec![json!("ORDER_SEQ"), json!("5")],
        ]))
        .respond("USER_TAB_IDENTITY_COLS", rows(
            &["TABLE_NAME", "COLUMN_NAME", "GENERATION_TYPE"],
            vec![
                vec![json!("ORDERS"), json!("ID"), json!("ALWAYS")],
                vec![json!("INVOICES"), json!("ID"), json!("BY DEFAULT")],
            ],
        ));
    let (registry, _) = scripted_registry(ORACLE_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    session.reset_identity_generation_or_sequences(100).await.unwrap();
    session.close().await;

    assert_eq!(
        ddl(&script),
        vec![
            "DROP SEQUENCE \"ORDER_SEQ\"",
            "CREATE SEQUENCE \"ORDER_SEQ\" START WITH 100 INCREMENT BY 5",
            "ALTER TABLE \"ORDERS\" MODIFY (\"ID\" GENERATED ALWAYS AS IDENTITY (START WITH 100))",
            "ALTER TABLE \"INVOICES\" MODIFY (\"ID\" GENERATED BY DEFAULT AS IDENTITY (START WITH 100))",
        ]
    );
}

#[tokio::test]
async fn test_oracle_peek_accepts_decimal_text() {
    let script = Script::new().respond("LAST_NUMBER", rows(&["LAST_NUMBER"], vec![vec![json!("21")]]));
    let (registry, _) = scripted_registry(ORACLE_URL, script);

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.next_value_from_sequence("ORDER_SEQ").await.unwrap(), 21);
    session.close().await;
}

#[tokio::test]
async fn test_oracle_rejects_fractional_peek() {
    let script = Script::new().respond("LAST_NUMBER", rows(&["LAST_NUMBER"], vec![vec![json!("21.5")]]));
    let (registry, _) = scripted_registry(ORACLE_URL, script);

    let mut session = registry.open("main").await.unwrap();
    assert!(matches!(
        session.next_value_from_sequence("ORDER_SEQ").await.unwrap_err(),
        DbError::Metadata { .. }
    ));
    session.close().await;
}

// =============================================================================
// MySQL
// =============================================================================

#[tokio::test]
async fn test_mysql_casing_matches_stored_table() {
    let script = Script::new()
        .respond("INFORMATION_SCHEMA.TABLES", rows(&["TABLE_NAME"], vec![vec![json!("Orders")]]))
        .respond("KEY_COLUMN_USAGE", rows(&["COLUMN_NAME"], vec![vec![json!("tenant")], vec![json!("id")]]));
    let (registry, _) = scripted_registry(MYSQL_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.convert_table_name_casing("ORDERS").await.unwrap(), "Orders");
    assert_eq!(session.convert_table_name_casing("other").await.unwrap(), "other");
    assert!(matches!(
        session.primary_key_column("orders").await.unwrap_err(),
        DbError::CompositeKeyUnsupported { ref columns, .. } if columns.len() == 2
    ));
    session.close().await;

    let lookup = script
        .recorded()
        .into_iter()
        .find(|r| r.sql.contains("KEY_COLUMN_USAGE"))
        .unwrap();
    assert_eq!(lookup.params, vec![QueryParam::from("Orders")]);
}

#[tokio::test]
async fn test_mysql_reset_alters_auto_increment() {
    let script = Script::new().respond(
        "auto_increment",
        rows(&["TABLE_NAME"], vec![vec![json!("Orders")], vec![json!("audit`log")]]),
    );
    let (registry, _) = scripted_registry(MYSQL_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    session.reset_identity_generation_or_sequences(1).await.unwrap();
    session.close().await;

    assert_eq!(
        ddl(&script),
        vec![
            "ALTER TABLE `Orders` AUTO_INCREMENT = 1",
            "ALTER TABLE `audit``log` AUTO_INCREMENT = 1",
        ]
    );
    // The ALTERs commit implicitly; a fresh transaction follows them
    let statements = script.statements();
    assert_eq!(
        &statements[statements.len() - 2..],
        ["START TRANSACTION", "COMMIT"]
    );
}

#[tokio::test]
async fn test_mysql_reset_without_auto_increment_keeps_transaction() {
    let script = Script::new();
    let (registry, _) = scripted_registry(MYSQL_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    session.reset_identity_generation_or_sequences(1).await.unwrap();
    session.close().await;

    let statements = script.statements();
    assert!(ddl(&script).is_empty());
    assert!(!statements.iter().any(|s| s == "START TRANSACTION"));
}

#[tokio::test]
async fn test_mysql_sequences_unsupported_without_poisoning() {
    let script = Script::new();
    let (registry, _) = scripted_registry(MYSQL_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert!(matches!(
        session.sequence_names().await.unwrap_err(),
        DbError::UnsupportedOperation { .. }
    ));
    assert!(matches!(
        session.next_value_from_sequence("seq").await.unwrap_err(),
        DbError::UnsupportedOperation { .. }
    ));
    assert_eq!(session.transaction_state(), TransactionState::Active);
    session.close().await;

    assert_eq!(script.statements(), vec!["BEGIN", "COMMIT"]);
}

// =============================================================================
// PostgreSQL
// =============================================================================

#[tokio::test]
async fn test_postgres_casing_lower_cases() {
    let script = Script::new().respond("information_schema.columns", rows(&["column_name"], vec![
        vec![json!("id")],
        vec![json!("customer")],
    ]));
    let (registry, _) = scripted_registry(POSTGRES_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    assert_eq!(session.convert_table_name_casing("ORDERS").await.unwrap(), "orders");
    assert_eq!(session.column_names("Orders").await.unwrap(), vec!["id", "customer"]);
    session.close().await;

    let lookup = script
        .recorded()
        .into_iter()
        .find(|r| r.sql.contains("information_schema.columns"))
        .unwrap();
    assert_eq!(lookup.params, vec![QueryParam::from("orders")]);
}

#[tokio::test]
async fn test_postgres_reset_restarts_sequences() {
    let script = Script::new().respond(
        "pg_sequences",
        rows(&["sequencename"], vec![vec![json!("orders_id_seq")]]),
    );
    let (registry, _) = scripted_registry(POSTGRES_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    session.reset_identity_generation_or_sequences(50).await.unwrap();
    session.close().await;

    assert_eq!(ddl(&script), vec!["ALTER SEQUENCE \"orders_id_seq\" RESTART WITH 50"]);
}

// =============================================================================
// Failure handling
// =============================================================================

#[tokio::test]
async fn test_failed_ddl_marks_rollback_only() {
    let script = Script::new()
        .respond("pg_sequences", rows(&["sequencename"], vec![vec![json!("orders_id_seq")]]))
        .fail_on("ALTER SEQUENCE");
    let (registry, _) = scripted_registry(POSTGRES_URL, script.clone());

    let mut session = registry.open("main").await.unwrap();
    let err = session
        .reset_identity_generation_or_sequences(1)
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }));
    assert!(session.is_rollback_only());
    session.close().await;

    let statements = script.statements();
    assert_eq!(statements.last().map(String::as_str), Some("ROLLBACK"));
    assert!(!statements.iter().any(|s| s == "COMMIT"));
}
