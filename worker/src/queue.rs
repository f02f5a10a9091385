//! Queue adapter: wraps the Redis list the vote front end pushes into.

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use tracing::{info, warn};

use crate::config::QueueConfig;
use crate::error::QueueError;
use crate::supervisor::{Acquire, ConnectionState};

/// Producers RPUSH onto this list; we LPOP from the head, so drain order is
/// submission order.
const VOTE_QUEUE_KEY: &str = "votes";

#[async_trait]
pub trait VoteQueue: Acquire<Error = QueueError> {
    fn state(&self) -> ConnectionState;

    fn is_ready(&self) -> bool {
        self.state().is_ready()
    }

    /// Non-blocking pop of the oldest queued entry; `Ok(None)` immediately
    /// when the queue is empty. The caller supplies its own idle delay.
    async fn try_pop(&mut self) -> Result<Option<String>, QueueError>;

    async fn close(&mut self);
}

pub struct RedisVoteQueue {
    config: QueueConfig,
    conn: Option<MultiplexedConnection>,
    state: ConnectionState,
}

impl RedisVoteQueue {
    pub fn new(config: QueueConfig) -> Self {
        Self {
            config,
            conn: None,
            state: ConnectionState::Disconnected,
        }
    }
}

#[async_trait]
impl Acquire for RedisVoteQueue {
    type Error = QueueError;

    fn target(&self) -> &'static str {
        "queue"
    }

    async fn connect(&mut self) -> Result<(), QueueError> {
        self.state = ConnectionState::Connecting;
        let url = format!("redis://{}:{}/", self.config.host, self.config.port);
        // An unparsable address cannot heal; everything past this point can.
        let client = redis::Client::open(url.as_str()).map_err(QueueError::InvalidAddress)?;

        // Host resolution happens here, and DNS can lag container startup —
        // the supervisor retries these.
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(QueueError::Connect)?;

        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(QueueError::Connect)?;

        self.conn = Some(conn);
        self.state = ConnectionState::Ready;
        info!(host = %self.config.host, port = self.config.port, "queue ready");
        Ok(())
    }
}

#[async_trait]
impl VoteQueue for RedisVoteQueue {
    fn state(&self) -> ConnectionState {
        self.state
    }

    async fn try_pop(&mut self) -> Result<Option<String>, QueueError> {
        if !self.state.is_ready() {
            return Err(QueueError::NotConnected);
        }
        let conn = self.conn.as_mut().ok_or(QueueError::NotConnected)?;
        let popped: Result<Option<String>, redis::RedisError> = redis::cmd("LPOP")
            .arg(VOTE_QUEUE_KEY)
            .query_async(&mut *conn)
            .await;
        match popped {
            Ok(entry) => Ok(entry),
            Err(e) => {
                warn!("queue pop failed: {e}");
                self.state = ConnectionState::Degraded;
                Err(QueueError::Io(e))
            }
        }
    }

    async fn close(&mut self) {
        self.conn = None;
        self.state = ConnectionState::Disconnected;
    }
}
