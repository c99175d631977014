//! # Query API
//!
//! `POST /query` runs the swarm. Depending on settings the answer is an SSE
//! stream of stage fragments, the full per-stage breakdown, or just the
//! final text.

use axum::{
    extract::State,
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Response,
    },
    routing::post,
    Json, Router,
};
use futures::StreamExt;
use hivemind_core::swarm::{ParameterOverrides, PipelineResult, StreamEvent};
use hivemind_core::{SwarmError, SwarmResult};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::convert::Infallible;
use utoipa::ToSchema;

use super::SharedState;

const DEFAULT_USER_ID: &str = "default";

/// A query to run through the swarm
#[derive(Debug, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub text: String,
    /// Conversation owner, `"default"` when omitted
    #[serde(default)]
    pub user_id: Option<String>,
    /// Stage id -> parameter name -> value in [min, max]
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub parameters: Option<HashMap<String, Option<HashMap<String, i64>>>>,
}

impl QueryRequest {
    pub fn user_id(&self) -> &str {
        self.user_id.as_deref().unwrap_or(DEFAULT_USER_ID)
    }

    /// Stages sent as `null` are skipped
    pub fn overrides(&self) -> ParameterOverrides {
        let mut overrides = ParameterOverrides::new();
        let stages = self.parameters.iter().flatten();
        for (stage_id, values) in stages {
            for (name, value) in values.iter().flatten() {
                overrides.set(stage_id, name, *value);
            }
        }
        overrides
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StageDetail {
    pub name: String,
    pub response: String,
}

/// Every stage's output plus the final answer
#[derive(Debug, Serialize, ToSchema)]
pub struct QueryDetails {
    pub is_simple_query: bool,
    pub stages: BTreeMap<String, StageDetail>,
    pub response: String,
}

impl From<PipelineResult> for QueryDetails {
    fn from(result: PipelineResult) -> Self {
        let stages = result
            .stage_outputs
            .into_iter()
            .map(|output| {
                (
                    output.stage_id,
                    StageDetail {
                        name: output.stage_name,
                        response: output.text,
                    },
                )
            })
            .collect();
        Self {
            is_simple_query: result.is_simple,
            stages,
            response: result.final_text,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AnswerResponse {
    pub response: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorResponse {
    pub detail: String,
}

/// One SSE `data:` payload
#[derive(Debug, Serialize)]
struct StreamChunk {
    role: String,
    name: String,
    content: String,
}

impl From<StreamEvent> for StreamChunk {
    fn from(event: StreamEvent) -> Self {
        Self {
            role: event.stage_id,
            name: event.stage_name,
            content: event.fragment,
        }
    }
}

/// Swarm failure mapped onto an HTTP status
pub struct ApiError(SwarmError);

impl From<SwarmError> for ApiError {
    fn from(err: SwarmError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            err if err.is_client_error() => StatusCode::BAD_REQUEST,
            SwarmError::Provider { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::error!(status = status.as_u16(), error = %self.0, "Query failed");
        (
            status,
            Json(ErrorResponse {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

pub fn query_routes() -> Router<SharedState> {
    Router::new().route("/query", post(process_query))
}

/// Run a query through the swarm
#[utoipa::path(
    post,
    path = "/query",
    tag = "swarm",
    request_body = QueryRequest,
    responses(
        (status = 200, description = "SSE stream, full details or the answer alone, per server settings", body = QueryDetails),
        (status = 400, description = "Parameter out of range", body = ErrorResponse),
        (status = 502, description = "Completion provider failed", body = ErrorResponse)
    )
)]
pub async fn process_query(
    State(state): State<SharedState>,
    Json(req): Json<QueryRequest>,
) -> Result<Response, ApiError> {
    let overrides = req.overrides();
    let user_id = req.user_id();
    tracing::info!(
        user = %user_id,
        streaming = state.api.use_streaming,
        "Query received"
    );

    if state.api.use_streaming {
        let events = state
            .coordinator
            .run_streaming(&req.text, user_id, &overrides)?;
        let stream = events.map(to_sse_event);
        return Ok(Sse::new(stream)
            .keep_alive(KeepAlive::default())
            .into_response());
    }

    let result = state.coordinator.run(&req.text, user_id, &overrides).await?;
    if state.api.send_full_response {
        Ok(Json(QueryDetails::from(result)).into_response())
    } else {
        Ok(Json(AnswerResponse {
            response: result.final_text,
        })
        .into_response())
    }
}

fn to_sse_event(item: SwarmResult<StreamEvent>) -> Result<Event, Infallible> {
    let data = match item {
        Ok(event) => serde_json::to_string(&StreamChunk::from(event)),
        Err(e) => {
            tracing::error!(error = %e, "Streaming query failed");
            serde_json::to_string(&serde_json::json!({ "error": e.to_string() }))
        }
    };
    Ok(Event::default().data(data.unwrap_or_default()))
}

#[cfg(test)]
mod tests {
    use super::super::test_support::scripted_app;
    use crate::config::ApiSettings;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use hivemind_core::provider::Script;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn full_pipeline() -> Vec<Script> {
        vec![
            Script::fragments(["COMP", "LEX"]),
            Script::reply("interp"),
            Script::reply("research"),
            Script::reply("critique"),
            Script::reply("ideas"),
            Script::fragments(["final ", "answer"]),
        ]
    }

    fn json_only() -> ApiSettings {
        ApiSettings {
            use_streaming: false,
            ..ApiSettings::default()
        }
    }

    fn post_query(body: Value) -> Request<Body> {
        Request::post("/query")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn read_body(response: axum::response::Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn sse_payloads(body: &str) -> Vec<Value> {
        body.lines()
            .filter_map(|line| line.strip_prefix("data: "))
            .map(|data| serde_json::from_str(data).unwrap())
            .collect()
    }

    #[tokio::test]
    async fn test_streaming_query_relays_fragments() {
        let (app, _, memory) = scripted_app(full_pipeline(), ApiSettings::default());

        let response = app
            .oneshot(post_query(json!({ "text": "plan a trip", "user_id": "u1" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers()[header::CONTENT_TYPE]
            .to_str()
            .unwrap()
            .starts_with("text/event-stream"));

        let events = sse_payloads(&read_body(response).await);
        assert_eq!(events.len(), 8);
        assert_eq!(
            events[0],
            json!({ "role": "triage", "name": "Query Triage", "content": "COMP" })
        );
        assert_eq!(events[7]["role"], "synthesizer");
        assert_eq!(memory.history("u1")[0].response, "final answer");
    }

    #[tokio::test]
    async fn test_streaming_simple_query_ends_with_final_event() {
        let (app, _, memory) =
            scripted_app(vec![Script::reply("SIMPLE: Paris")], ApiSettings::default());

        let response = app
            .oneshot(post_query(json!({ "text": "capital of France?" })))
            .await
            .unwrap();

        let events = sse_payloads(&read_body(response).await);
        let last = events.last().unwrap();
        assert_eq!(last["role"], "final");
        assert_eq!(last["name"], "Simple Response");
        assert_eq!(last["content"], "Paris");
        assert_eq!(memory.history("default").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_streaming_failure_emits_error_event() {
        let script = std::iter::repeat(Script::fail("down")).take(4).collect();
        let (app, _, _) = scripted_app(script, ApiSettings::default());

        let response = app
            .oneshot(post_query(json!({ "text": "hi" })))
            .await
            .unwrap();

        let events = sse_payloads(&read_body(response).await);
        assert_eq!(events.len(), 1);
        assert!(events[0]["error"]
            .as_str()
            .unwrap()
            .contains("failed after 3 attempt(s)"));
    }

    #[tokio::test]
    async fn test_invalid_parameter_is_bad_request() {
        let (app, provider, _) = scripted_app(full_pipeline(), ApiSettings::default());

        let response = app
            .oneshot(post_query(json!({
                "text": "hi",
                "parameters": { "critic": { "rigor_level": 101 } }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert!(body["detail"].as_str().unwrap().contains("rigor_level"));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_details_response() {
        let (app, provider, _) = scripted_app(full_pipeline(), json_only());

        let response = app
            .oneshot(post_query(json!({
                "text": "plan a trip",
                "parameters": {
                    "interpreter": null,
                    "creative": { "creativity_level": 10 }
                }
            })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body["is_simple_query"], false);
        assert_eq!(body["response"], "final answer");
        assert_eq!(body["stages"]["critic"]["name"], "Critical Analyzer");
        assert_eq!(body["stages"]["critic"]["response"], "critique");
        assert!(provider.calls()[4]
            .request
            .system_prompt
            .ends_with("- creativity_level: 10%\n"));
    }

    #[tokio::test]
    async fn test_answer_only_response() {
        let api = ApiSettings {
            send_full_response: false,
            ..json_only()
        };
        let (app, _, _) = scripted_app(vec![Script::reply("SIMPLE: Paris")], api);

        let response = app
            .oneshot(post_query(json!({ "text": "capital of France?" })))
            .await
            .unwrap();

        let body: Value = serde_json::from_str(&read_body(response).await).unwrap();
        assert_eq!(body, json!({ "response": "Paris" }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_provider_failure_is_bad_gateway() {
        let script = std::iter::repeat(Script::fail("down")).take(3).collect();
        let (app, _, memory) = scripted_app(script, json_only());

        let response = app
            .oneshot(post_query(json!({ "text": "hi" })))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(memory.user_count(), 0);
    }
}
