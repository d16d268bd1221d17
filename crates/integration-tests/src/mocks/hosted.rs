use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response, Sse, sse::Event},
    routing::{get, post},
};
use futures::stream;
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use super::{SpawnedBackend, TestBackend};

/// Builder for a mock OpenAI-compatible hosted API.
pub struct HostedApiMock {
    service_id: String,
    models: Vec<String>,
    listed: bool,
    reply: Vec<String>,
    api_key: Option<String>,
    stats: HostedApiStats,
}

/// Request counters of a running mock.
#[derive(Clone, Default)]
pub struct HostedApiStats {
    probes: Arc<AtomicUsize>,
    streams: Arc<AtomicUsize>,
}

impl HostedApiStats {
    /// Non-streaming completions, which is how the router probes a hosted API.
    pub fn probe_requests(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Streaming completions.
    pub fn stream_requests(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }
}

impl HostedApiMock {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            models: vec!["gpt-4o-mini".to_string()],
            listed: true,
            reply: vec!["Hi".to_string(), " there".to_string()],
            api_key: Some("sk-test".to_string()),
            stats: HostedApiStats::default(),
        }
    }

    pub fn with_models(mut self, models: &[&str]) -> Self {
        self.models = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub fn with_reply(mut self, chunks: &[&str]) -> Self {
        self.reply = chunks.iter().map(|c| c.to_string()).collect();
        self
    }

    /// Answers `/models` with 404, like endpoints that cannot enumerate models.
    pub fn without_model_list(mut self) -> Self {
        self.listed = false;
        self
    }

    pub fn stats(&self) -> HostedApiStats {
        self.stats.clone()
    }
}

struct MockState {
    models: Vec<String>,
    listed: bool,
    reply: Vec<String>,
    api_key: Option<String>,
    stats: HostedApiStats,
}

impl MockState {
    fn authorized(&self, headers: &HeaderMap) -> bool {
        let Some(key) = &self.api_key else {
            return true;
        };

        headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .is_some_and(|value| value == format!("Bearer {key}"))
    }
}

impl TestBackend for HostedApiMock {
    async fn spawn(self) -> anyhow::Result<SpawnedBackend> {
        let models = self.models.clone();
        let api_key = self.api_key.clone();

        let state = Arc::new(MockState {
            models: self.models,
            listed: self.listed,
            reply: self.reply,
            api_key: self.api_key,
            stats: self.stats,
        });

        let app = Router::new()
            .route("/v1/models", get(list_models))
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(SpawnedBackend {
            service_id: self.service_id,
            address,
            kind: "hosted",
            models,
            api_key,
        })
    }
}

fn error(status: StatusCode, message: &str, r#type: &str) -> Response {
    (
        status,
        Json(json!({ "error": { "message": message, "type": r#type } })),
    )
        .into_response()
}

async fn list_models(State(state): State<Arc<MockState>>, headers: HeaderMap) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Invalid API key", "invalid_request_error");
    }

    if !state.listed {
        return error(StatusCode::NOT_FOUND, "Not found", "invalid_request_error");
    }

    let data = state
        .models
        .iter()
        .map(|id| json!({ "id": id, "object": "model", "created": 1700000000, "owned_by": "test" }))
        .collect::<Vec<_>>();

    Json(json!({ "object": "list", "data": data })).into_response()
}

#[derive(Deserialize)]
struct CompletionRequest {
    model: String,
    #[serde(default)]
    stream: bool,
}

async fn chat_completions(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    Json(request): Json<CompletionRequest>,
) -> Response {
    if !state.authorized(&headers) {
        return error(StatusCode::UNAUTHORIZED, "Invalid API key", "invalid_request_error");
    }

    if !state.models.contains(&request.model) {
        let message = format!("The model `{}` does not exist", request.model);
        return error(StatusCode::NOT_FOUND, &message, "invalid_request_error");
    }

    if !request.stream {
        state.stats.probes.fetch_add(1, Ordering::SeqCst);

        return Json(json!({
            "id": "chatcmpl-probe",
            "object": "chat.completion",
            "model": request.model,
            "choices": [{ "index": 0, "message": { "role": "assistant", "content": "H" }, "finish_reason": "length" }]
        }))
        .into_response();
    }

    state.stats.streams.fetch_add(1, Ordering::SeqCst);

    let mut frames = vec![json!({
        "id": "chatcmpl-1",
        "object": "chat.completion.chunk",
        "choices": [{ "index": 0, "delta": { "role": "assistant" }, "finish_reason": null }]
    })
    .to_string()];

    for chunk in &state.reply {
        frames.push(
            json!({
                "id": "chatcmpl-1",
                "object": "chat.completion.chunk",
                "choices": [{ "index": 0, "delta": { "content": chunk }, "finish_reason": null }]
            })
            .to_string(),
        );
    }

    frames.push("[DONE]".to_string());

    let events = stream::iter(
        frames
            .into_iter()
            .map(|data| Ok::<_, Infallible>(Event::default().data(data))),
    );

    Sse::new(events).into_response()
}
