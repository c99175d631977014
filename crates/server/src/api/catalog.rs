//! Health and parameter discovery endpoints.

use axum::{extract::State, routing::get, Json, Router};
use hivemind_core::swarm::ParameterCatalog;
use serde::Serialize;
use utoipa::ToSchema;

use super::SharedState;

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
}

pub fn catalog_routes() -> Router<SharedState> {
    Router::new()
        .route("/health", get(health))
        .route("/agent-parameters", get(agent_parameters))
}

/// Liveness probe
#[utoipa::path(
    get,
    path = "/health",
    tag = "meta",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Tunable parameters per stage, with defaults and bounds
#[utoipa::path(
    get,
    path = "/agent-parameters",
    tag = "meta",
    responses(
        (status = 200, description = "Stage id -> parameter specs")
    )
)]
pub async fn agent_parameters(State(state): State<SharedState>) -> Json<ParameterCatalog> {
    Json(state.coordinator.agent_parameter_catalog())
}
