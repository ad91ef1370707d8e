//! SQLite-backed actor provider.
//!
//! The current actor lives in the single-row `session_actor` table so a
//! signed-in session survives restarts. Reads are served from memory once
//! the row has been loaded.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use pelagic_core::ActorProvider;
use pelagic_domain::{Actor, Result};
use rusqlite::{params, OptionalExtension};
use tokio::task;
use tracing::{info, instrument};

use super::manager::{map_join_error, map_sql_error, DbManager};

/// `ActorProvider` persisting the signed-in actor in `session_actor`.
///
/// Reads are served from memory after the first load.
pub struct SqliteActorProvider {
    db: Arc<DbManager>,
    cached: RwLock<Option<Actor>>,
}

impl SqliteActorProvider {
    /// Provider over a migrated database. Nothing is read until first use.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db, cached: RwLock::new(None) }
    }
}

#[async_trait]
impl ActorProvider for SqliteActorProvider {
    async fn provide(&self) -> Result<Actor> {
        if let Some(actor) = self.cached.read().clone() {
            return Ok(actor);
        }

        let db = Arc::clone(&self.db);
        let actor = task::spawn_blocking(move || -> Result<Actor> {
            let conn = db.get_connection()?;
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT account_id, access_token FROM session_actor WHERE slot = 1",
                    [],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()
                .map_err(map_sql_error)?;

            match row {
                Some((id, token)) => Actor::authenticated(id, token),
                None => Ok(Actor::Unauthenticated),
            }
        })
        .await
        .map_err(map_join_error)??;

        *self.cached.write() = Some(actor.clone());
        Ok(actor)
    }

    #[instrument(skip(self, actor), fields(authenticated = actor.is_authenticated()))]
    async fn remember(&self, actor: Actor) -> Result<()> {
        let db = Arc::clone(&self.db);
        let stored = actor.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let written = match stored.as_authenticated() {
                Some(credentials) => conn.execute(
                    "INSERT INTO session_actor (slot, account_id, access_token, updated_at)
                     VALUES (1, ?1, ?2, ?3)
                     ON CONFLICT(slot) DO UPDATE SET
                        account_id = excluded.account_id,
                        access_token = excluded.access_token,
                        updated_at = excluded.updated_at",
                    params![credentials.id(), credentials.access_token(), Utc::now().timestamp()],
                ),
                None => conn.execute("DELETE FROM session_actor", []),
            };
            written.map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)??;

        *self.cached.write() = Some(actor);
        info!("actor remembered");
        Ok(())
    }
}
