use axum::{Json, Router, routing::get};
use config::HealthConfig;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
enum HealthState {
    Healthy,
}

/// The liveness endpoint, mounted at the configured path.
pub(crate) fn router(config: &HealthConfig) -> Router {
    log::debug!("Health endpoint mounted at {}", config.path);

    Router::new().route(&config.path, get(|| async { Json(HealthState::Healthy) }))
}
