//! Model routing and streaming sessions.
//!
//! Chat requests are resolved to one of the configured backend services by model name,
//! streamed back as a uniform sequence of events, and can be stopped by session id while
//! they run.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::State,
    http::HeaderValue,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
};
use config::{LlmConfig, ServicesRecord};

mod admin;
mod backend;
mod error;
mod event;
mod filename;
mod inventory;
mod messages;
mod normalizer;
mod registry;
mod router;
mod session;
mod sse;
mod store;
#[cfg(test)]
mod testing;

pub use backend::{Backend, BackendFactory, DeltaStream, HttpBackendFactory, stream_chat};
pub use config::strip_tag;
pub use error::LlmError;
pub use event::{EventStream, NormalizedEvent};
pub use inventory::{Inventory, ModelHealth, ModelStatus, ServiceState, ServiceStatus};
pub use messages::ChatMessage;
pub use registry::{ModelMapping, Routing, ServiceReport, ServiceRegistry, TestReport};
pub use router::{ChatRouter, Route};
pub use session::{Session, SessionInfo, SessionManager, SessionOutcome};
pub use store::{ConfigStore, MemoryStore};

use messages::{ChatStreamRequest, FilenameRequest, FilenameResponse, StopRequest, StopResponse, StreamStatus};

pub type Result<T> = std::result::Result<T, LlmError>;

const STREAM_ID_HEADER: &str = "x-stream-id";

/// Builds the chat router for a configuration, backed by the HTTP backends.
pub fn chat_router(config: &LlmConfig, record: ServicesRecord, store: Arc<dyn ConfigStore>) -> ChatRouter {
    build(config, record, Arc::new(HttpBackendFactory), store)
}

/// Builds the chat router with a custom backend factory.
pub fn build(
    config: &LlmConfig,
    record: ServicesRecord,
    factory: Arc<dyn BackendFactory>,
    store: Arc<dyn ConfigStore>,
) -> ChatRouter {
    let registry = ServiceRegistry::new(record, factory, store, config.probe_cache_ttl);

    log::debug!(
        "Service registry initialized with {} services",
        registry.snapshot().services().len()
    );

    ChatRouter::new(Arc::new(registry), SessionManager::new(), config.stream_pacing)
}

/// Creates an axum router for the chat, model and service endpoints, mounted at the
/// configured path.
pub fn router(config: &LlmConfig, chat: ChatRouter) -> Router {
    let routes = Router::new()
        .route("/chat/stream", post(chat_stream))
        .route("/chat/stop", post(stop_stream))
        .route("/chat/status", get(stream_status))
        .route("/models", get(admin::list_models))
        .route("/models/refresh", post(admin::refresh_models))
        .route("/models/default", post(admin::set_default_model))
        .route("/models/{model}/health", get(admin::model_health))
        .route("/services", get(admin::list_services).post(admin::add_service))
        .route("/services/test", post(admin::test_service))
        .route("/services/{service_id}", delete(admin::remove_service))
        .route("/services/{service_id}/enabled", post(admin::set_service_enabled))
        .route("/generate-filename", post(generate_filename))
        .with_state(chat);

    Router::new().nest(&config.path, routes)
}

/// Streams a chat completion as server-sent events.
///
/// The response always succeeds; routing and backend failures arrive as the final
/// `error` event. The session id is echoed in the `x-stream-id` header so the caller can
/// stop the stream.
async fn chat_stream(State(chat): State<ChatRouter>, Json(request): Json<ChatStreamRequest>) -> Response {
    let model = request.model.clone();
    let session_id = request.stream_id.clone();
    let messages = request.into_messages();

    log::debug!(
        "Chat stream requested for model '{}' with {} messages",
        model.as_deref().unwrap_or("<default>"),
        messages.len()
    );

    let (session_id, events) = chat.stream(messages, model.as_deref(), session_id);
    let mut response = sse::into_sse(events).into_response();

    match HeaderValue::from_str(&session_id) {
        Ok(value) => {
            response.headers_mut().insert(STREAM_ID_HEADER, value);
        }
        Err(_) => log::debug!("Stream id '{session_id}' is not a valid header value"),
    }

    response
}

async fn stop_stream(State(chat): State<ChatRouter>, Json(request): Json<StopRequest>) -> Json<StopResponse> {
    let stopped = chat.cancel(&request.stream_id);

    let message = if stopped {
        "Stream stopped successfully"
    } else {
        "Stream not found or already stopped"
    };

    Json(StopResponse {
        stopped,
        stream_id: request.stream_id,
        message,
    })
}

async fn stream_status(State(chat): State<ChatRouter>) -> Json<StreamStatus> {
    let sessions = chat.sessions().sessions();
    let stream_ids = chat.sessions().active_ids();

    Json(StreamStatus {
        active_streams: stream_ids.len(),
        stream_ids,
        sessions,
    })
}

async fn generate_filename(
    State(chat): State<ChatRouter>,
    Json(request): Json<FilenameRequest>,
) -> Json<FilenameResponse> {
    let filename = filename::generate(&chat, &request.previews).await;

    Json(FilenameResponse { filename })
}
