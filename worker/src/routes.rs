use rocket::{get, http::ContentType, serde::json::Json, State};
use serde::Serialize;
use std::sync::Arc;

use crate::metrics::PipelineMetrics;

pub struct AppState {
    pub metrics: Arc<PipelineMetrics>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub queue: &'static str,
    pub database: &'static str,
}

fn gauge_status(gauge: &prometheus::IntGauge) -> &'static str {
    if gauge.get() == 1 {
        "ok"
    } else {
        "down"
    }
}

#[get("/healthz")]
pub fn healthz(state: &State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        queue: gauge_status(&state.metrics.queue_connection_status),
        database: gauge_status(&state.metrics.database_connection_status),
    })
}

#[get("/metrics")]
pub fn metrics(state: &State<AppState>) -> (ContentType, String) {
    (ContentType::Plain, state.metrics.encode())
}
