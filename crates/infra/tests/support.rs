//! Shared helpers for `pelagic-infra` integration tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use pelagic_core::{
    AuthenticationLock, Authenticator, Authorizer, Requester, TokenExchanger,
};
use pelagic_domain::{
    Actor, AuthenticationPolicy, AuthorizationGrant, PelagicError, RequesterConfig, Result,
};
use pelagic_infra::{DbManager, HttpClient, HttpTransport, SqliteActorProvider, SqliteRequestStore};
use tempfile::TempDir;

pub const TEST_DB_KEY: &str = "test_key_64_chars_long_aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";

/// Temporary database directory that outlives every engine opened on it,
/// so a test can "restart" by opening a second engine on the same file.
pub struct TestDatabase {
    _temp_dir: TempDir,
    path: PathBuf,
}

impl TestDatabase {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let path = temp_dir.path().join("pelagic.db");
        Self { _temp_dir: temp_dir, path }
    }

    /// Open a fresh pool on the database file with migrations applied.
    pub fn open(&self) -> Arc<DbManager> {
        let manager =
            DbManager::new(&self.path, 2, Some(TEST_DB_KEY)).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");
        Arc::new(manager)
    }

    /// Raw `(id, headers_json)` rows of the pending request table.
    pub fn stored_rows(&self) -> Vec<(String, String)> {
        let manager = self.open();
        let conn = manager.get_connection().expect("connection");
        let mut stmt = conn
            .prepare("SELECT id, headers_json FROM pending_requests ORDER BY created_at")
            .expect("statement");
        stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
            .expect("query")
            .collect::<std::result::Result<Vec<_>, _>>()
            .expect("rows")
    }

    /// Write a row directly, bypassing the store's encoding.
    pub fn insert_raw_row(&self, id: &str, method: &str) {
        let manager = self.open();
        let conn = manager.get_connection().expect("connection");
        conn.execute(
            "INSERT INTO pending_requests (id, method, route, authentication, headers_json, body, created_at)
             VALUES (?1, ?2, '/api/v1/statuses', 'none', '[]', x'00', 0)",
            rusqlite::params![id, method],
        )
        .expect("raw row inserted");
    }
}

/// Requester over SQLite and HTTP, as one process run would build it.
pub struct Engine {
    pub db: Arc<DbManager>,
    pub store: Arc<SqliteRequestStore>,
    pub provider: Arc<SqliteActorProvider>,
    pub requester: Arc<Requester>,
}

impl Engine {
    pub fn start(database: &TestDatabase, server_uri: &str) -> Self {
        let db = database.open();
        let store = Arc::new(SqliteRequestStore::new(db.clone()));
        let provider = Arc::new(SqliteActorProvider::new(db.clone()));
        let transport = Arc::new(
            HttpTransport::new(HttpClient::new().expect("http client"), server_uri)
                .expect("transport"),
        );

        let authenticator = Arc::new(Authenticator::new(
            Arc::new(NoApproval),
            Arc::new(NoExchange),
            provider.clone(),
            AuthenticationPolicy::Reprompt,
        ));
        let lock = Arc::new(AuthenticationLock::new(provider.clone(), authenticator));
        let config = RequesterConfig { reuse_ttl_ms: 0, ..RequesterConfig::default() };
        let requester = Arc::new(Requester::new(store.clone(), transport, lock, &config));

        Self { db, store, provider, requester }
    }
}

/// Authorizer for tests that must never reach the approval flow.
pub struct NoApproval;

#[async_trait]
impl Authorizer for NoApproval {
    async fn authorize(&self) -> Result<AuthorizationGrant> {
        Err(PelagicError::FailedAuthentication("no approval surface in tests".into()))
    }
}

pub struct NoExchange;

#[async_trait]
impl TokenExchanger for NoExchange {
    async fn exchange(&self, _grant: AuthorizationGrant) -> Result<Actor> {
        Err(PelagicError::FailedAuthentication("no token exchange in tests".into()))
    }
}
