// src/api.rs
//! Control surface: trigger a run, probe health, scrape metrics.
use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tower_http::cors::CorsLayer;

use crate::ingest::scheduler::{ScrapeScheduler, TriggerOutcome};
use crate::metrics::Metrics;

#[derive(Clone)]
pub struct AppState {
    pub scheduler: ScrapeScheduler,
}

pub fn router(state: AppState, metrics: Option<&Metrics>) -> Router {
    let mut app = Router::new()
        .route("/scrape", post(trigger_scrape))
        .route("/health", get(health))
        .with_state(state);
    if let Some(m) = metrics {
        app = app.merge(m.router());
    }
    app.fallback(not_found).layer(CorsLayer::very_permissive())
}

async fn trigger_scrape(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    match state.scheduler.try_trigger() {
        TriggerOutcome::Started => (StatusCode::ACCEPTED, Json(json!({ "status": "started" }))),
        TriggerOutcome::AlreadyRunning => (
            StatusCode::CONFLICT,
            Json(json!({ "error": "Scrape already in progress" })),
        ),
    }
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "status": "ok", "scraping": state.scheduler.is_running() }))
}

async fn not_found() -> (StatusCode, Json<Value>) {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found" })))
}
