//! Retry-with-backoff driver for (re)establishing adapter connections.
//!
//! The ingestion path is never allowed to give up: `acquire` retries the
//! adapter's `connect` forever with a capped exponential delay, and only a
//! fatal configuration error escapes.

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;
use tracing::{error, info, warn};

/// Lifecycle of a single adapter-owned connection. Each adapter holds exactly
/// one of these; handles are never shared across adapters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Ready,
    Degraded,
}

impl ConnectionState {
    pub fn is_ready(self) -> bool {
        matches!(self, ConnectionState::Ready)
    }
}

/// Exponential backoff between connection attempts: non-decreasing, capped.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl BackoffPolicy {
    /// Adapter (re)acquisition: 2s doubling up to 30s.
    pub const CONNECT: Self = Self {
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(30),
        multiplier: 2.0,
    };

    /// Full-reset path after a systemic failure: 2s doubling, 5s ceiling.
    pub const RESET: Self = Self {
        initial_delay: Duration::from_secs(2),
        max_delay: Duration::from_secs(5),
        multiplier: 2.0,
    };

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let multiplier = self.multiplier.powi(attempt as i32);
        let delay_secs = self.initial_delay.as_secs_f64() * multiplier;
        Duration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

/// Error contract for adapter connection attempts. Everything is presumed
/// transient unless the adapter says otherwise.
pub trait AdapterError: std::fmt::Display {
    fn is_fatal(&self) -> bool {
        false
    }
}

/// An adapter whose connection the supervisor can (re)establish.
#[async_trait]
pub trait Acquire {
    type Error: AdapterError + Send;

    /// Short name for log lines, e.g. `"database"` or `"queue"`.
    fn target(&self) -> &'static str;

    async fn connect(&mut self) -> Result<(), Self::Error>;
}

/// Blocks the caller until the adapter's `connect` succeeds, waiting
/// `policy.delay_for_attempt(n)` between attempts. Returns `Err` only for a
/// fatal configuration error; transient failures are logged and retried
/// transparently.
pub async fn acquire<A>(adapter: &mut A, policy: &BackoffPolicy) -> Result<(), A::Error>
where
    A: Acquire + Send,
{
    let mut attempt: u32 = 0;
    loop {
        match adapter.connect().await {
            Ok(()) => {
                if attempt > 0 {
                    info!(
                        adapter = adapter.target(),
                        attempts = attempt + 1,
                        "connection established"
                    );
                }
                return Ok(());
            }
            Err(e) if e.is_fatal() => {
                error!(adapter = adapter.target(), "unrecoverable connection error: {e}");
                return Err(e);
            }
            Err(e) => {
                let delay = policy.delay_for_attempt(attempt);
                warn!(
                    adapter = adapter.target(),
                    attempt = attempt + 1,
                    retry_in_ms = delay.as_millis() as u64,
                    "connection attempt failed: {e}"
                );
                sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
