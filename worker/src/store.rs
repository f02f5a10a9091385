//! Durable store adapter: owns a single Postgres connection and the
//! last-write-wins vote upsert.

use async_trait::async_trait;
use sqlx::postgres::PgConnectOptions;
use sqlx::{Connection, PgConnection, Row};
use tracing::{info, warn};

use shared::models::{Tally, VoteChoice, VoteRecord};

use crate::config::DatabaseConfig;
use crate::error::StoreError;
use crate::supervisor::{Acquire, ConnectionState};

/// Safe to run on every startup and after every reconnect.
const ENSURE_SCHEMA: &str = "CREATE TABLE IF NOT EXISTS votes (
        id TEXT PRIMARY KEY,
        vote TEXT NOT NULL,
        created_at TIMESTAMPTZ NOT NULL DEFAULT now()
    )";

const UPSERT_VOTE: &str = "INSERT INTO votes (id, vote) VALUES ($1, $2)
    ON CONFLICT (id) DO UPDATE SET vote = EXCLUDED.vote, created_at = now()";

#[async_trait]
pub trait VoteStore: Acquire<Error = StoreError> {
    fn state(&self) -> ConnectionState;

    /// Trivial round-trip query. Returns false (never errors) on any failure,
    /// signalling the caller to reconnect.
    async fn health_check(&mut self) -> bool;

    /// Inserts the voter's record, or overwrites choice and timestamp on
    /// conflict. The conflict path is expected, not an error.
    async fn upsert_vote(&mut self, voter_id: &str, choice: VoteChoice) -> Result<(), StoreError>;

    /// Grouped count over all records, recomputed from scratch.
    async fn tally(&mut self) -> Result<Tally, StoreError>;

    async fn fetch_vote(&mut self, voter_id: &str) -> Result<Option<VoteRecord>, StoreError>;

    async fn close(&mut self);
}

pub struct PostgresVoteStore {
    config: DatabaseConfig,
    conn: Option<PgConnection>,
    state: ConnectionState,
}

impl PostgresVoteStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self {
            config,
            conn: None,
            state: ConnectionState::Disconnected,
        }
    }
}

#[async_trait]
impl Acquire for PostgresVoteStore {
    type Error = StoreError;

    fn target(&self) -> &'static str {
        "database"
    }

    async fn connect(&mut self) -> Result<(), StoreError> {
        self.state = ConnectionState::Connecting;
        let options = PgConnectOptions::new()
            .host(&self.config.host)
            .username(&self.config.user)
            .password(&self.config.password)
            .database(&self.config.dbname);

        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(StoreError::Connect)?;
        sqlx::query(ENSURE_SCHEMA)
            .execute(&mut conn)
            .await
            .map_err(StoreError::Query)?;

        self.conn = Some(conn);
        self.state = ConnectionState::Ready;
        info!(host = %self.config.host, db = %self.config.dbname, "database ready");
        Ok(())
    }
}

#[async_trait]
impl VoteStore for PostgresVoteStore {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn health_check(&mut self) -> bool {
        let Some(conn) = self.conn.as_mut() else {
            return false;
        };
        match sqlx::query("SELECT 1").execute(&mut *conn).await {
            Ok(_) => true,
            Err(e) => {
                warn!("database health check failed: {e}");
                self.state = ConnectionState::Degraded;
                false
            }
        }
    }

    async fn upsert_vote(&mut self, voter_id: &str, choice: VoteChoice) -> Result<(), StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotConnected)?;
        sqlx::query(UPSERT_VOTE)
            .bind(voter_id)
            .bind(choice.as_str())
            .execute(&mut *conn)
            .await
            .map_err(StoreError::Query)?;
        Ok(())
    }

    async fn tally(&mut self) -> Result<Tally, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotConnected)?;
        let rows = sqlx::query("SELECT vote, COUNT(*) AS count FROM votes GROUP BY vote")
            .fetch_all(&mut *conn)
            .await
            .map_err(StoreError::Query)?;

        let mut tally = Tally::default();
        for row in rows {
            let vote: String = row.try_get("vote").map_err(StoreError::Query)?;
            let count: i64 = row.try_get("count").map_err(StoreError::Query)?;
            match VoteChoice::from_column(&vote) {
                Some(VoteChoice::A) => tally.count_a = count,
                Some(VoteChoice::B) => tally.count_b = count,
                None => warn!(value = %vote, "skipping unrecognized choice in tally"),
            }
        }
        Ok(tally)
    }

    async fn fetch_vote(&mut self, voter_id: &str) -> Result<Option<VoteRecord>, StoreError> {
        let conn = self.conn.as_mut().ok_or(StoreError::NotConnected)?;
        let row = sqlx::query("SELECT id, vote, created_at FROM votes WHERE id = $1")
            .bind(voter_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(StoreError::Query)?;

        let Some(row) = row else { return Ok(None) };
        let vote: String = row.try_get("vote").map_err(StoreError::Query)?;
        let Some(choice) = VoteChoice::from_column(&vote) else {
            warn!(voter = voter_id, value = %vote, "stored vote has an unrecognized choice");
            return Ok(None);
        };
        Ok(Some(VoteRecord {
            voter_id: row.try_get("id").map_err(StoreError::Query)?,
            choice,
            recorded_at: row.try_get("created_at").map_err(StoreError::Query)?,
        }))
    }

    async fn close(&mut self) {
        if let Some(conn) = self.conn.take() {
            let _ = conn.close().await;
        }
        self.state = ConnectionState::Disconnected;
    }
}
