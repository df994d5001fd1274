//! Shared helpers for integration tests.
//!
//! `ScriptedConnector` builds factories whose contexts answer catalog queries
//! from a script (first needle contained in the SQL wins) and record every
//! statement, so dialect SQL can be checked without the engine.

#![allow(dead_code)]

use async_trait::async_trait;
use db_session::config::RegistryConfig;
use db_session::db::{
    ConnectionRegistry, Connector, FactoryCacheKey, FactorySpec, SessionContext, SessionFactory,
    SessionFactoryCache,
};
use db_session::error::{DbError, DbResult};
use db_session::models::{ConnectionDescriptor, PersistenceUnit, QueryParam, QueryRows};
use serde_json::Value as JsonValue;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// One recorded statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Recorded {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

#[derive(Debug, Default)]
pub struct ScriptState {
    responses: Vec<(String, QueryRows)>,
    failures: Vec<String>,
    fail_begin: bool,
    log: Vec<Recorded>,
    contexts_created: usize,
    releases: usize,
}

/// Script and recording shared by every factory and context of one connector.
#[derive(Debug, Clone, Default)]
pub struct Script(Arc<Mutex<ScriptState>>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer any query containing `needle` with `rows`.
    pub fn respond(self, needle: &str, rows: QueryRows) -> Self {
        self.0
            .lock()
            .unwrap()
            .responses
            .push((needle.to_string(), rows));
        self
    }

    /// Fail any statement containing `needle` with a database error.
    pub fn fail_on(self, needle: &str) -> Self {
        self.0.lock().unwrap().failures.push(needle.to_string());
        self
    }

    pub fn fail_begin(self) -> Self {
        self.0.lock().unwrap().fail_begin = true;
        self
    }

    /// Recorded SQL, whitespace-collapsed.
    pub fn statements(&self) -> Vec<String> {
        self.0
            .lock()
            .unwrap()
            .log
            .iter()
            .map(|r| collapse(&r.sql))
            .collect()
    }

    pub fn recorded(&self) -> Vec<Recorded> {
        self.0.lock().unwrap().log.clone()
    }

    pub fn contexts_created(&self) -> usize {
        self.0.lock().unwrap().contexts_created
    }

    pub fn releases(&self) -> usize {
        self.0.lock().unwrap().releases
    }

    fn record(&self, sql: &str, params: &[QueryParam]) -> DbResult<Option<QueryRows>> {
        let mut state = self.0.lock().unwrap();
        state.log.push(Recorded {
            sql: sql.to_string(),
            params: params.to_vec(),
        });
        if state.failures.iter().any(|needle| sql.contains(needle.as_str())) {
            return Err(DbError::database("scripted failure", Some("42000".into()), ""));
        }
        Ok(state
            .responses
            .iter()
            .find(|(needle, _)| sql.contains(needle.as_str()))
            .map(|(_, rows)| rows.clone()))
    }

    fn marker(&self, what: &str) {
        self.0.lock().unwrap().log.push(Recorded {
            sql: what.to_string(),
            params: Vec::new(),
        });
    }
}

pub fn collapse(sql: &str) -> String {
    sql.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Rows with the given column names.
pub fn rows(columns: &[&str], data: Vec<Vec<JsonValue>>) -> QueryRows {
    QueryRows::new(columns.iter().map(|c| c.to_string()).collect(), data)
}

#[derive(Debug, Default)]
pub struct ScriptedConnector {
    pub script: Script,
    pub built: AtomicUsize,
}

impl ScriptedConnector {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            built: AtomicUsize::new(0),
        }
    }

    pub fn built(&self) -> usize {
        self.built.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Connector for ScriptedConnector {
    async fn connect(&self, spec: &FactorySpec) -> DbResult<Arc<dyn SessionFactory>> {
        self.built.fetch_add(1, Ordering::SeqCst);
        // Give concurrent callers a chance to pile up on the same key
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        Ok(Arc::new(ScriptedFactory {
            key: spec.key.clone(),
            url: spec.url.clone(),
            script: self.script.clone(),
        }))
    }
}

#[derive(Debug)]
pub struct ScriptedFactory {
    key: FactoryCacheKey,
    url: String,
    script: Script,
}

#[async_trait]
impl SessionFactory for ScriptedFactory {
    fn key(&self) -> &FactoryCacheKey {
        &self.key
    }

    fn url(&self) -> &str {
        &self.url
    }

    async fn create_context(&self) -> DbResult<Box<dyn SessionContext>> {
        self.script.0.lock().unwrap().contexts_created += 1;
        Ok(Box::new(ScriptedContext {
            script: self.script.clone(),
            begun: false,
        }))
    }

    async fn close(&self) {}
}

pub struct ScriptedContext {
    script: Script,
    begun: bool,
}

#[async_trait]
impl SessionContext for ScriptedContext {
    async fn begin(&mut self) -> DbResult<()> {
        if self.script.0.lock().unwrap().fail_begin {
            return Err(DbError::connection("scripted begin failure", "none"));
        }
        self.script.marker("BEGIN");
        self.begun = true;
        Ok(())
    }

    async fn fetch_all(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<QueryRows> {
        Ok(self.script.record(sql, params)?.unwrap_or_default())
    }

    async fn execute(&mut self, sql: &str, params: &[QueryParam]) -> DbResult<u64> {
        self.script.record(sql, params)?;
        Ok(1)
    }

    async fn commit(self: Box<Self>) -> DbResult<()> {
        self.script.marker("COMMIT");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> DbResult<()> {
        self.script.marker("ROLLBACK");
        Ok(())
    }

    async fn release(self: Box<Self>) {
        self.script.0.lock().unwrap().releases += 1;
        self.script.marker("RELEASE");
    }
}

/// Registry with one unit at `url` and connections `main` (esw, connection),
/// `audit` (connection) and `alt` (esw, URL override).
pub fn scripted_registry(url: &str, script: Script) -> (ConnectionRegistry, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::new(script));
    let cache = Arc::new(SessionFactoryCache::new(connector.clone()));
    let config = RegistryConfig::new()
        .with_unit(PersistenceUnit::new("app").with_url(url))
        .with_connection(ConnectionDescriptor::new("main", "app").with_flags(["esw", "connection"]))
        .with_connection(ConnectionDescriptor::new("audit", "app").with_flags(["connection"]))
        .with_connection(
            ConnectionDescriptor::new("alt", "app")
                .with_flags(["esw"])
                .with_url(format!("{}_alt", url)),
        );
    let registry = ConnectionRegistry::new(config, cache).unwrap();
    (registry, connector)
}

/// Registry over a fresh SQLite file. Keep the `TempDir` alive for the test.
pub fn sqlite_registry() -> (ConnectionRegistry, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let path: PathBuf = dir.path().join("session.db");
    let config = RegistryConfig::new()
        .with_unit(PersistenceUnit::new("app").with_url(format!("sqlite:{}", path.display())))
        .with_connection(ConnectionDescriptor::new("main", "app").with_flags(["esw"]));
    (ConnectionRegistry::with_sqlx(config).unwrap(), dir)
}

/// Run DDL/DML in its own session and commit.
pub async fn setup(registry: &ConnectionRegistry, statements: &[&str]) {
    let mut session = registry.open("main").await.unwrap();
    for sql in statements {
        session.update(sql, &[]).await.unwrap();
    }
    session.close().await;
}

/// Count rows of `table` from a fresh session.
pub async fn count(registry: &ConnectionRegistry, table: &str) -> i64 {
    let mut session = registry.open("main").await.unwrap();
    let rows = session
        .query(&format!("SELECT COUNT(*) FROM {}", table), &[])
        .await
        .unwrap();
    session.close().await;
    rows.scalar().and_then(JsonValue::as_i64).unwrap()
}
