//! Periodic tally poll and fan-out to live subscribers.
//!
//! Deliberately simple polling, decoupled from the ingestion loop's internal
//! state: the two tasks share nothing but the durable store, each over its
//! own connection.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use shared::models::Tally;

use crate::error::FatalError;
use crate::metrics::PipelineMetrics;
use crate::store::VoteStore;
use crate::supervisor::{self, BackoffPolicy};

/// Per-subscriber channel depth. A subscriber that stops reading loses ticks
/// once its buffer fills; nobody else waits for it.
const SUBSCRIBER_BUFFER: usize = 8;

#[derive(Debug, Clone, Copy)]
pub struct BroadcastPolicy {
    pub period: Duration,
    pub connect_backoff: BackoffPolicy,
}

impl Default for BroadcastPolicy {
    fn default() -> Self {
        Self {
            period: Duration::from_secs(1),
            connect_backoff: BackoffPolicy::CONNECT,
        }
    }
}

/// Pure fan-out of tally snapshots. New subscribers receive only future
/// ticks; there is no replay backlog.
#[derive(Clone, Default)]
pub struct SubscriberRegistry {
    senders: Arc<Mutex<Vec<mpsc::Sender<Tally>>>>,
}

impl SubscriberRegistry {
    pub fn subscribe(&self) -> mpsc::Receiver<Tally> {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_BUFFER);
        if let Ok(mut senders) = self.senders.lock() {
            senders.push(tx);
        }
        rx
    }

    /// Delivers a snapshot to every live subscriber without ever blocking:
    /// a full channel is skipped this tick, a closed one is dropped from the
    /// registry. Returns how many subscribers received the snapshot.
    fn fan_out(&self, tally: Tally) -> usize {
        let mut delivered = 0;
        if let Ok(mut senders) = self.senders.lock() {
            senders.retain(|tx| match tx.try_send(tally) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    warn!("subscriber lagging, skipping it this tick");
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        }
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.senders.lock().map(|s| s.len()).unwrap_or(0)
    }
}

pub struct TallyBroadcaster<S> {
    store: S,
    registry: SubscriberRegistry,
    policy: BroadcastPolicy,
    metrics: Arc<PipelineMetrics>,
    last_tally: Option<Tally>,
}

impl<S> TallyBroadcaster<S>
where
    S: VoteStore + Send,
{
    pub fn new(
        store: S,
        registry: SubscriberRegistry,
        policy: BroadcastPolicy,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            store,
            registry,
            policy,
            metrics,
            last_tally: None,
        }
    }

    pub async fn run(mut self, shutdown: CancellationToken) -> Result<(), FatalError> {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("tally broadcaster stopping");
                return Ok(());
            }
            result = supervisor::acquire(&mut self.store, &self.policy.connect_backoff) => result?,
        }
        info!(period_ms = self.policy.period.as_millis() as u64, "tally broadcaster running");

        let mut ticker = interval(self.policy.period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("tally broadcaster stopping");
                    self.store.close().await;
                    return Ok(());
                }
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// One poll-and-publish cycle. A failed poll skips the tick and keeps the
    /// last good tally; the broadcaster never gives up on a read error.
    pub(crate) async fn tick(&mut self) {
        match self.store.tally().await {
            Ok(tally) => {
                self.last_tally = Some(tally);
                self.metrics
                    .votes_by_option
                    .with_label_values(&["a"])
                    .set(tally.count_a);
                self.metrics
                    .votes_by_option
                    .with_label_values(&["b"])
                    .set(tally.count_b);
                self.metrics.total_votes.set(tally.total());

                let delivered = self.registry.fan_out(tally);
                self.metrics.tally_broadcasts.inc();
                debug!(
                    a = tally.count_a,
                    b = tally.count_b,
                    subscribers = delivered,
                    "tally broadcast"
                );
            }
            Err(e) => {
                warn!("tally poll failed, keeping previous value: {e}");
                // A single reconnect attempt per tick keeps the cadence
                // independent of store downtime.
                if !self.store.health_check().await {
                    if let Err(e) = self.store.connect().await {
                        warn!("tally store reconnect failed: {e}");
                    }
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn last_tally(&self) -> Option<Tally> {
        self.last_tally
    }

    #[cfg(test)]
    pub(crate) fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }
}
