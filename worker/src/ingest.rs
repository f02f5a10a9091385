//! The consumer state machine: pop, parse, upsert, escalate.
//!
//! Driven one step at a time — each step consumes the current state and
//! returns the next — so recovery behavior is deterministic under test. The
//! loop favors availability over strict ordering: the idempotent upsert on
//! voter id tolerates the reprocess-or-skip window around a crash.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use shared::models::VoteEvent;

use crate::error::FatalError;
use crate::metrics::PipelineMetrics;
use crate::queue::VoteQueue;
use crate::store::VoteStore;
use crate::supervisor::{self, BackoffPolicy};

#[derive(Debug, Clone, Copy)]
pub struct IngestPolicy {
    /// Delay between iterations when the queue is empty.
    pub idle_interval: Duration,
    /// Consecutive upsert failures that count as a systemic failure.
    pub error_threshold: u32,
    pub connect_backoff: BackoffPolicy,
    pub reset_backoff: BackoffPolicy,
}

impl Default for IngestPolicy {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(100),
            error_threshold: 5,
            connect_backoff: BackoffPolicy::CONNECT,
            reset_backoff: BackoffPolicy::RESET,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum LoopState {
    Initializing,
    Running,
    RecoveringQueue,
    RecoveringStore,
}

pub struct IngestLoop<S, Q> {
    store: S,
    queue: Q,
    policy: IngestPolicy,
    metrics: Arc<PipelineMetrics>,
    consecutive_errors: u32,
}

impl<S, Q> IngestLoop<S, Q>
where
    S: VoteStore + Send,
    Q: VoteQueue + Send,
{
    pub fn new(store: S, queue: Q, policy: IngestPolicy, metrics: Arc<PipelineMetrics>) -> Self {
        Self {
            store,
            queue,
            policy,
            metrics,
            consecutive_errors: 0,
        }
    }

    /// Runs until the shutdown token fires or adapter acquisition hits an
    /// unrecoverable configuration error.
    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), FatalError> {
        let mut state = LoopState::Initializing;
        loop {
            let next = tokio::select! {
                _ = shutdown.cancelled() => None,
                next = self.step(state) => Some(next?),
            };
            match next {
                Some(s) => state = s,
                None => {
                    info!("ingestion loop stopping");
                    self.store.close().await;
                    self.queue.close().await;
                    self.metrics.database_connection_status.set(0);
                    self.metrics.queue_connection_status.set(0);
                    return Ok(());
                }
            }
        }
    }

    pub(crate) async fn step(&mut self, state: LoopState) -> Result<LoopState, FatalError> {
        match state {
            LoopState::Initializing => self.initialize().await,
            LoopState::Running => self.run_once().await,
            LoopState::RecoveringQueue => self.recover_queue().await,
            LoopState::RecoveringStore => self.recover_store().await,
        }
    }

    async fn initialize(&mut self) -> Result<LoopState, FatalError> {
        supervisor::acquire(&mut self.queue, &self.policy.connect_backoff).await?;
        self.metrics.queue_connection_status.set(1);
        supervisor::acquire(&mut self.store, &self.policy.connect_backoff).await?;
        self.metrics.database_connection_status.set(1);
        self.reset_error_counter();
        info!("ingestion loop running");
        Ok(LoopState::Running)
    }

    async fn run_once(&mut self) -> Result<LoopState, FatalError> {
        if !self.queue.is_ready() {
            return Ok(LoopState::RecoveringQueue);
        }

        let popped = match self.queue.try_pop().await {
            Ok(popped) => popped,
            Err(e) => {
                warn!("queue unusable: {e}");
                return Ok(LoopState::RecoveringQueue);
            }
        };

        let Some(raw) = popped else {
            // Idle tick doubles as a store liveness probe.
            if !self.store.health_check().await {
                return Ok(LoopState::RecoveringStore);
            }
            sleep(self.policy.idle_interval).await;
            return Ok(LoopState::Running);
        };
        self.metrics.queue_pops.inc();

        let event = match VoteEvent::from_json(&raw) {
            Ok(event) => event,
            Err(e) => {
                warn!("skipping malformed vote event: {e}");
                self.metrics.malformed_events.inc();
                return Ok(LoopState::Running);
            }
        };

        // The popped event stays in hand through this reconnect, so a severed
        // store never costs us an already-drained vote.
        if !self.store.health_check().await {
            self.metrics.database_connection_status.set(0);
            warn!("database unhealthy before upsert, reconnecting");
            supervisor::acquire(&mut self.store, &self.policy.connect_backoff).await?;
            self.metrics.database_connection_status.set(1);
        }

        match self.store.upsert_vote(&event.voter_id, event.choice).await {
            Ok(()) => {
                self.reset_error_counter();
                self.metrics
                    .votes_recorded
                    .with_label_values(&[event.choice.as_str()])
                    .inc();
                debug!(voter = %event.voter_id, choice = %event.choice, "vote recorded");
            }
            Err(e) => {
                error!(voter = %event.voter_id, "vote upsert failed: {e}");
                self.record_failure().await?;
            }
        }
        Ok(LoopState::Running)
    }

    async fn recover_queue(&mut self) -> Result<LoopState, FatalError> {
        self.metrics.queue_connection_status.set(0);
        warn!("re-establishing queue connection");
        self.queue.close().await;
        supervisor::acquire(&mut self.queue, &self.policy.connect_backoff).await?;
        self.metrics.queue_connection_status.set(1);
        Ok(LoopState::Running)
    }

    async fn recover_store(&mut self) -> Result<LoopState, FatalError> {
        self.metrics.database_connection_status.set(0);
        warn!("re-establishing database connection");
        self.store.close().await;
        supervisor::acquire(&mut self.store, &self.policy.connect_backoff).await?;
        self.metrics.database_connection_status.set(1);
        Ok(LoopState::Running)
    }

    async fn record_failure(&mut self) -> Result<(), FatalError> {
        self.consecutive_errors += 1;
        self.metrics
            .consecutive_errors
            .set(i64::from(self.consecutive_errors));
        if self.consecutive_errors >= self.policy.error_threshold {
            self.full_reset().await?;
        }
        Ok(())
    }

    /// Systemic failure: recycle both connections under the capped reset
    /// backoff and start counting afresh.
    async fn full_reset(&mut self) -> Result<(), FatalError> {
        warn!(
            errors = self.consecutive_errors,
            "error threshold reached, recycling both connections"
        );
        self.store.close().await;
        self.queue.close().await;
        self.metrics.database_connection_status.set(0);
        self.metrics.queue_connection_status.set(0);

        supervisor::acquire(&mut self.queue, &self.policy.reset_backoff).await?;
        self.metrics.queue_connection_status.set(1);
        supervisor::acquire(&mut self.store, &self.policy.reset_backoff).await?;
        self.metrics.database_connection_status.set(1);
        self.reset_error_counter();
        Ok(())
    }

    fn reset_error_counter(&mut self) {
        self.consecutive_errors = 0;
        self.metrics.consecutive_errors.set(0);
    }

    #[cfg(test)]
    pub(crate) fn parts(&mut self) -> (&mut S, &mut Q) {
        (&mut self.store, &mut self.queue)
    }
}
