use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures::{StreamExt, stream};
use serde::Deserialize;
use serde_json::json;
use tokio::net::TcpListener;

use super::{SpawnedBackend, TestBackend};

/// Builder for a mock local model runtime.
pub struct LocalRuntimeMock {
    service_id: String,
    models: Vec<String>,
    reply: Vec<String>,
    chunk_delay: Option<Duration>,
    fail_after_first_chunk: Option<String>,
    stats: LocalRuntimeStats,
}

/// Request counters of a running mock.
#[derive(Clone, Default)]
pub struct LocalRuntimeStats {
    tags: Arc<AtomicUsize>,
    chats: Arc<AtomicUsize>,
}

impl LocalRuntimeStats {
    /// How often the model list was requested. Every availability probe lists models.
    pub fn tags_requests(&self) -> usize {
        self.tags.load(Ordering::SeqCst)
    }

    /// How many chat requests were received.
    pub fn chat_requests(&self) -> usize {
        self.chats.load(Ordering::SeqCst)
    }
}

impl LocalRuntimeMock {
    pub fn new(service_id: impl Into<String>) -> Self {
        Self {
            service_id: service_id.into(),
            models: vec!["llama3.2:latest".to_string()],
            reply: vec!["Hello".to_string(), " from".to_string(), " llama".to_string()],
            chunk_delay: None,
            fail_after_first_chunk: None,
            stats: LocalRuntimeStats::default(),
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

    /// Sleeps between chunks, to keep a stream running long enough to stop it.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = Some(delay);
        self
    }

    /// Sends an error line after the first chunk.
    pub fn with_mid_stream_error(mut self, message: impl Into<String>) -> Self {
        self.fail_after_first_chunk = Some(message.into());
        self
    }

    /// Counters that stay readable after the mock is spawned.
    pub fn stats(&self) -> LocalRuntimeStats {
        self.stats.clone()
    }
}

struct MockState {
    models: Vec<String>,
    reply: Vec<String>,
    chunk_delay: Option<Duration>,
    fail_after_first_chunk: Option<String>,
    stats: LocalRuntimeStats,
}

impl MockState {
    /// Untagged names resolve to `:latest`, as the real runtime does.
    fn knows(&self, model: &str) -> bool {
        self.models
            .iter()
            .any(|m| m == model || *m == format!("{model}:latest"))
    }
}

impl TestBackend for LocalRuntimeMock {
    async fn spawn(self) -> anyhow::Result<SpawnedBackend> {
        let models = self.models.clone();

        let state = Arc::new(MockState {
            models: self.models,
            reply: self.reply,
            chunk_delay: self.chunk_delay,
            fail_after_first_chunk: self.fail_after_first_chunk,
            stats: self.stats,
        });

        let app = Router::new()
            .route("/api/tags", get(tags))
            .route("/api/show", post(show))
            .route("/api/chat", post(chat))
            .with_state(state);

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let address = listener.local_addr()?;

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Ok(SpawnedBackend {
            service_id: self.service_id,
            address,
            kind: "local",
            models,
            api_key: None,
        })
    }
}

async fn tags(State(state): State<Arc<MockState>>) -> Json<serde_json::Value> {
    state.stats.tags.fetch_add(1, Ordering::SeqCst);

    let models = state
        .models
        .iter()
        .map(|m| json!({ "name": m, "model": m, "size": 2019393189u64 }))
        .collect::<Vec<_>>();

    Json(json!({ "models": models }))
}

#[derive(Deserialize)]
struct ShowRequest {
    model: String,
}

async fn show(State(state): State<Arc<MockState>>, Json(request): Json<ShowRequest>) -> Response {
    if state.knows(&request.model) {
        Json(json!({ "details": { "family": "llama" } })).into_response()
    } else {
        not_found(&request.model)
    }
}

#[derive(Deserialize)]
struct ChatRequest {
    model: String,
    #[serde(default)]
    stream: bool,
}

async fn chat(State(state): State<Arc<MockState>>, Json(request): Json<ChatRequest>) -> Response {
    state.stats.chats.fetch_add(1, Ordering::SeqCst);

    if !state.knows(&request.model) {
        return not_found(&request.model);
    }

    assert!(request.stream, "the router always streams");

    let model = request.model;
    let mut lines = Vec::new();

    for (i, chunk) in state.reply.iter().enumerate() {
        lines.push(json!({
            "model": model,
            "created_at": "2025-01-01T00:00:00Z",
            "message": { "role": "assistant", "content": chunk },
            "done": false
        }));

        if i == 0
            && let Some(message) = &state.fail_after_first_chunk
        {
            lines.push(json!({ "error": message }));
            break;
        }
    }

    if state.fail_after_first_chunk.is_none() {
        lines.push(json!({
            "model": model,
            "created_at": "2025-01-01T00:00:00Z",
            "message": { "role": "assistant", "content": "" },
            "done": true,
            "done_reason": "stop"
        }));
    }

    let delay = state.chunk_delay;

    let body = stream::iter(lines).then(move |line| async move {
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        Ok::<_, Infallible>(format!("{line}\n"))
    });

    Response::builder()
        .header("content-type", "application/x-ndjson")
        .body(Body::from_stream(body))
        .unwrap()
}

fn not_found(model: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": format!("model '{model}' not found") })),
    )
        .into_response()
}
