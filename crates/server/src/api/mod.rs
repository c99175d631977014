//! # HTTP API
//!
//! ```text
//! GET  /health            liveness
//! GET  /agent-parameters  tunable stage parameters
//! POST /query             run the swarm (SSE or JSON)
//! GET  /openapi.json      API description
//! ```

pub mod catalog;
pub mod query;

use axum::http::{header, HeaderValue, Method};
use axum::{routing::get, Json, Router};
use hivemind_core::swarm::Coordinator;
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};
use utoipa::OpenApi;

use crate::config::ApiSettings;

/// Application state
pub struct AppState {
    pub coordinator: Coordinator,
    pub api: ApiSettings,
}

pub type SharedState = Arc<AppState>;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Hivemind API",
        version = "1.0.0",
        description = "API interface for the Hivemind reasoning swarm"
    ),
    paths(catalog::health, catalog::agent_parameters, query::process_query),
    components(schemas(
        catalog::HealthResponse,
        query::QueryRequest,
        query::QueryDetails,
        query::StageDetail,
        query::AnswerResponse,
        query::ErrorResponse
    )),
    tags(
        (name = "swarm", description = "Query processing"),
        (name = "meta", description = "Health and discovery")
    )
)]
pub struct ApiDoc;

async fn serve_openapi() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// CORS restricted to the configured origins
fn cors_layer(api: &ApiSettings) -> CorsLayer {
    let origins: Vec<HeaderValue> = api
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Build the application router
pub fn router(state: SharedState) -> Router {
    let cors = cors_layer(&state.api);

    Router::new()
        .merge(catalog::catalog_routes())
        .merge(query::query_routes())
        .route("/openapi.json", get(serve_openapi))
        .layer(cors)
        .with_state(state)
}
