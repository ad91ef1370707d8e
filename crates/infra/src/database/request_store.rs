//! SQLite implementation of the request store.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use pelagic_core::{RequestStore, UnreadableRecord};
use pelagic_domain::{EncodedBody, PelagicError, Request, Result};
use rusqlite::{params, Row};
use tokio::task;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use super::manager::{map_join_error, map_sql_error, DbConnection, DbManager};

const SELECT_ALL: &str =
    "SELECT id, method, route, authentication, headers_json, body, created_at, resumable
     FROM pending_requests
     ORDER BY created_at ASC, id ASC";

/// `RequestStore` over the `pending_requests` table.
///
/// Every call runs on the blocking pool with its own pooled connection.
pub struct SqliteRequestStore {
    db: Arc<DbManager>,
}

impl SqliteRequestStore {
    /// Store over a migrated database.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl RequestStore for SqliteRequestStore {
    #[instrument(skip(self, request), fields(request_id = %request.id, route = %request.route))]
    async fn put(&self, request: &Request) -> Result<()> {
        let db = Arc::clone(&self.db);
        let request = request.clone();

        task::spawn_blocking(move || -> Result<()> {
            let headers_json = serde_json::to_string(&request.headers).map_err(|e| {
                PelagicError::StoreIo(format!("failed to serialize request headers: {e}"))
            })?;
            let conn = db.get_connection()?;
            conn.execute(
                "INSERT INTO pending_requests
                    (id, method, route, authentication, headers_json, body, created_at, resumable)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                 ON CONFLICT(id) DO UPDATE SET
                    method = excluded.method,
                    route = excluded.route,
                    authentication = excluded.authentication,
                    headers_json = excluded.headers_json,
                    body = excluded.body,
                    resumable = excluded.resumable",
                params![
                    request.id.to_string(),
                    request.method.as_str(),
                    request.route,
                    request.authentication.as_str(),
                    headers_json,
                    request.body.as_bytes(),
                    request.created_at.timestamp_millis(),
                    request.resumable,
                ],
            )
            .map_err(map_sql_error)?;
            debug!("request persisted");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self), fields(request_id = %id))]
    async fn remove(&self, id: Uuid) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let removed = conn
                .execute("DELETE FROM pending_requests WHERE id = ?1", params![id.to_string()])
                .map_err(map_sql_error)?;
            debug!(removed, "request removed");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn get_all(&self) -> Result<Vec<Request>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<Request>> {
            let conn = db.get_connection()?;
            let (requests, unreadable) = load_all(&conn)?;
            for record in &unreadable {
                warn!(key = %record.key, error = %record.error, "skipping unreadable stored request");
            }
            Ok(requests)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn unreadable(&self) -> Result<Vec<UnreadableRecord>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<UnreadableRecord>> {
            let conn = db.get_connection()?;
            Ok(load_all(&conn)?.1)
        })
        .await
        .map_err(map_join_error)?
    }

    #[instrument(skip(self))]
    async fn clear(&self) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let removed = conn.execute("DELETE FROM pending_requests", []).map_err(map_sql_error)?;
            debug!(removed, "request store cleared");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Every row, split into decodable requests and the rows that are not.
///
/// Only a failure to run the query itself is an error.
fn load_all(conn: &DbConnection) -> Result<(Vec<Request>, Vec<UnreadableRecord>)> {
    let mut stmt = conn.prepare(SELECT_ALL).map_err(map_sql_error)?;
    let rows = stmt
        .query_map([], |row| Ok((row_key(row), read_row(row))))
        .map_err(map_sql_error)?;

    let mut requests = Vec::new();
    let mut unreadable = Vec::new();
    for row in rows {
        let (key, read) = row.map_err(map_sql_error)?;
        match read.map_err(map_sql_error).and_then(StoredRow::into_request) {
            Ok(request) => requests.push(request),
            Err(error) => unreadable.push(UnreadableRecord { key, error }),
        }
    }
    Ok((requests, unreadable))
}

fn row_key(row: &Row<'_>) -> String {
    match row.get_ref(0) {
        Ok(value) => match value.as_str() {
            Ok(text) => text.to_string(),
            Err(_) => format!("{value:?}"),
        },
        Err(err) => format!("<unreadable id: {err}>"),
    }
}

/// Raw column values; parsed outside the row callback so decode failures
/// keep their own error kind.
struct StoredRow {
    id: String,
    method: String,
    route: String,
    authentication: String,
    headers_json: String,
    body: Vec<u8>,
    created_at: i64,
    resumable: bool,
}

fn read_row(row: &Row<'_>) -> rusqlite::Result<StoredRow> {
    Ok(StoredRow {
        id: row.get(0)?,
        method: row.get(1)?,
        route: row.get(2)?,
        authentication: row.get(3)?,
        headers_json: row.get(4)?,
        body: row.get(5)?,
        created_at: row.get(6)?,
        resumable: row.get(7)?,
    })
}

impl StoredRow {
    fn into_request(self) -> Result<Request> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| PelagicError::Decode(format!("invalid request id {}: {e}", self.id)))?;
        let headers: Vec<(String, String)> = serde_json::from_str(&self.headers_json)
            .map_err(|e| PelagicError::Decode(format!("invalid headers for {id}: {e}")))?;
        let created_at: DateTime<Utc> = Utc
            .timestamp_millis_opt(self.created_at)
            .single()
            .ok_or_else(|| PelagicError::Decode(format!("invalid timestamp for {id}")))?;

        Ok(Request {
            id,
            authentication: self.authentication.parse()?,
            method: self.method.parse()?,
            route: self.route,
            headers,
            body: EncodedBody::from_bytes(self.body),
            created_at,
            resumable: self.resumable,
        })
    }
}
