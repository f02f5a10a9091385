//! Prometheus counters and gauges for the pipeline, exposed on /metrics.

use prometheus::{
    IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};

pub struct PipelineMetrics {
    registry: Registry,
    /// Raw entries drained from the queue (the queue-drain rate).
    pub queue_pops: IntCounter,
    /// Votes durably upserted, labelled by choice.
    pub votes_recorded: IntCounterVec,
    pub malformed_events: IntCounter,
    /// Current consecutive processing-error count in the ingestion loop.
    pub consecutive_errors: IntGauge,
    /// 1 when the adapter's connection is Ready, 0 otherwise.
    pub queue_connection_status: IntGauge,
    pub database_connection_status: IntGauge,
    pub tally_broadcasts: IntCounter,
    /// Vote counts observed at the last successful tally poll.
    pub votes_by_option: IntGaugeVec,
    pub total_votes: IntGauge,
}

impl PipelineMetrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let queue_pops = IntCounter::with_opts(Opts::new(
            "queue_pops_total",
            "Vote events drained from the queue",
        ))?;
        let votes_recorded = IntCounterVec::new(
            Opts::new("votes_recorded_total", "Votes durably recorded, by choice"),
            &["choice"],
        )?;
        let malformed_events = IntCounter::with_opts(Opts::new(
            "malformed_events_total",
            "Queue entries that failed validation and were skipped",
        ))?;
        let consecutive_errors = IntGauge::with_opts(Opts::new(
            "consecutive_errors",
            "Consecutive processing errors in the ingestion loop",
        ))?;
        let queue_connection_status = IntGauge::with_opts(Opts::new(
            "queue_connection_status",
            "Queue connection status (1=connected, 0=disconnected)",
        ))?;
        let database_connection_status = IntGauge::with_opts(Opts::new(
            "database_connection_status",
            "Database connection status (1=connected, 0=disconnected)",
        ))?;
        let tally_broadcasts = IntCounter::with_opts(Opts::new(
            "tally_broadcasts_total",
            "Tally snapshots broadcast to subscribers",
        ))?;
        let votes_by_option = IntGaugeVec::new(
            Opts::new(
                "database_votes_by_option",
                "Current votes in the database by option",
            ),
            &["option"],
        )?;
        let total_votes = IntGauge::with_opts(Opts::new(
            "total_votes_in_database",
            "Total number of votes in the database",
        ))?;

        registry.register(Box::new(queue_pops.clone()))?;
        registry.register(Box::new(votes_recorded.clone()))?;
        registry.register(Box::new(malformed_events.clone()))?;
        registry.register(Box::new(consecutive_errors.clone()))?;
        registry.register(Box::new(queue_connection_status.clone()))?;
        registry.register(Box::new(database_connection_status.clone()))?;
        registry.register(Box::new(tally_broadcasts.clone()))?;
        registry.register(Box::new(votes_by_option.clone()))?;
        registry.register(Box::new(total_votes.clone()))?;

        Ok(Self {
            registry,
            queue_pops,
            votes_recorded,
            malformed_events,
            consecutive_errors,
            queue_connection_status,
            database_connection_status,
            tally_broadcasts,
            votes_by_option,
            total_votes,
        })
    }

    /// Text exposition of every registered metric.
    pub fn encode(&self) -> String {
        TextEncoder::new()
            .encode_to_string(&self.registry.gather())
            .unwrap_or_default()
    }
}
