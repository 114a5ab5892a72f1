use std::sync::Arc;

use axum::extract::State;
use axum::response::Json;
use serde_json::{json, Value};

use crate::state::AppState;

/// Health check handler.
/// Returns JSON with status, a config summary, and in-process usage totals.
pub fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let config = &state.config;
    let totals = state.usage.totals();
    Json(json!({
        "status": "chatmeter is running",
        "config": {
            "deployment": config.upstream.deployment,
            "api_version": config.upstream.api_version,
            "service_name": config.telemetry.service_name,
            "token_encoding": config.telemetry.token_encoding,
            "metrics_exporter_configured": config.telemetry.connection_string.is_some(),
        },
        "usage": {
            "events": totals.events,
            "total_tokens": totals.total_tokens,
        }
    }))
}
