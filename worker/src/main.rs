use std::process::ExitCode;
use std::sync::Arc;

use rocket::routes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use worker::broadcast::{BroadcastPolicy, SubscriberRegistry, TallyBroadcaster};
use worker::config::Config;
use worker::ingest::{IngestLoop, IngestPolicy};
use worker::metrics::PipelineMetrics;
use worker::queue::RedisVoteQueue;
use worker::routes::{healthz, metrics, AppState};
use worker::store::PostgresVoteStore;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();
    info!("🚀 Starting vote ingestion worker");

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("configuration rejected: {e}");
            return ExitCode::from(2);
        }
    };
    let pipeline_metrics = match PipelineMetrics::new() {
        Ok(metrics) => Arc::new(metrics),
        Err(e) => {
            error!("metrics registry failed: {e}");
            return ExitCode::from(2);
        }
    };

    let shutdown = CancellationToken::new();

    let ingest = IngestLoop::new(
        PostgresVoteStore::new(config.database.clone()),
        RedisVoteQueue::new(config.queue.clone()),
        IngestPolicy::default(),
        pipeline_metrics.clone(),
    );
    let mut ingest_task = tokio::spawn(ingest.run(shutdown.clone()));

    // The broadcaster polls over its own connection so tally reads never
    // contend with ingestion writes.
    let registry = SubscriberRegistry::default();
    let broadcaster = TallyBroadcaster::new(
        PostgresVoteStore::new(config.database.clone()),
        registry.clone(),
        BroadcastPolicy::default(),
        pipeline_metrics.clone(),
    );
    let broadcast_task = tokio::spawn(broadcaster.run(shutdown.clone()));

    // In-process subscriber so tally updates show up in the logs.
    let mut tally_rx = registry.subscribe();
    tokio::spawn(async move {
        while let Some(tally) = tally_rx.recv().await {
            debug!(a = tally.count_a, b = tally.count_b, "tally update");
        }
    });

    let figment = rocket::Config::figment()
        .merge(("port", config.listen_port))
        .merge(("address", "0.0.0.0"));
    let server = rocket::custom(figment)
        .manage(AppState {
            metrics: pipeline_metrics.clone(),
        })
        .mount("/", routes![healthz, metrics]);
    info!(port = config.listen_port, "📡 serving /healthz and /metrics");

    let exit = tokio::select! {
        result = server.launch() => match result {
            Ok(_) => {
                info!("shutdown signal received");
                ExitCode::SUCCESS
            }
            Err(e) => {
                error!("health server failed: {e}");
                ExitCode::from(1)
            }
        },
        result = &mut ingest_task => match result {
            Ok(Err(e)) => {
                error!("ingestion aborted: {e}");
                ExitCode::from(1)
            }
            Ok(Ok(())) => ExitCode::SUCCESS,
            Err(e) => {
                error!("ingestion task failed: {e}");
                ExitCode::from(1)
            }
        },
    };

    shutdown.cancel();
    if !ingest_task.is_finished() {
        let _ = ingest_task.await;
    }
    let _ = broadcast_task.await;
    exit
}
