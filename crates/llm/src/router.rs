use std::{sync::Arc, time::Duration};

use futures::{StreamExt, stream};
use uuid::Uuid;

use crate::{
    backend::{self, Backend},
    error::LlmError,
    event::{EventStream, NormalizedEvent},
    messages::ChatMessage,
    registry::ServiceRegistry,
    session::SessionManager,
};

/// Where a chat request goes.
pub struct Route {
    pub service_id: String,
    pub model: String,
    pub backend: Arc<dyn Backend>,
}

/// Resolves chat requests to backends and runs them as cancellable sessions.
#[derive(Clone)]
pub struct ChatRouter {
    registry: Arc<ServiceRegistry>,
    sessions: SessionManager,
    pacing: Option<Duration>,
}

impl ChatRouter {
    pub fn new(registry: Arc<ServiceRegistry>, sessions: SessionManager, pacing: Option<Duration>) -> Self {
        Self {
            registry,
            sessions,
            pacing,
        }
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Picks the backend for `model`, falling back to the default model.
    pub fn resolve(&self, model: Option<&str>) -> crate::Result<Route> {
        let routing = self.registry.snapshot();

        let model = match model.filter(|m| !m.is_empty()) {
            Some(model) => model.to_string(),
            None => routing.default_model().ok_or(LlmError::NoDefaultModel)?.to_string(),
        };

        let (service_id, backend) = routing
            .resolve(&model)
            .ok_or_else(|| LlmError::ModelNotFound(model.clone()))?;

        Ok(Route {
            service_id: service_id.to_string(),
            backend: backend.clone(),
            model,
        })
    }

    /// Streams a chat completion.
    ///
    /// Never fails: a request that cannot be routed yields a single `error` event, and
    /// backend failures end the stream with an `error` event.
    pub fn dispatch(&self, messages: Vec<ChatMessage>, model: Option<&str>) -> EventStream {
        match self.resolve(model) {
            Ok(route) => {
                log::debug!("Routing model '{}' to service '{}'", route.model, route.service_id);
                backend::stream_chat(route.backend, messages, route.model)
            }
            Err(e) => {
                log::debug!("Chat request could not be routed: {e}");
                Box::pin(stream::once(async move { NormalizedEvent::error(e.stream_message(None)) }))
            }
        }
    }

    /// Streams a chat completion as a cancellable session.
    ///
    /// A random id is generated when none is given. Returns the session id with the stream.
    pub fn stream(
        &self,
        messages: Vec<ChatMessage>,
        model: Option<&str>,
        session_id: Option<String>,
    ) -> (String, EventStream) {
        let session_id = session_id
            .filter(|id| !id.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let session = self.sessions.begin(&session_id);
        let events = self.dispatch(messages, model);

        (session_id, self.sessions.gate(session, events, self.pacing))
    }

    /// Requests cancellation of a running session.
    pub fn cancel(&self, session_id: &str) -> bool {
        self.sessions.request_cancel(session_id)
    }

    /// Runs a completion to the end and returns the concatenated content.
    pub async fn collect_text(&self, messages: Vec<ChatMessage>, model: Option<&str>) -> crate::Result<String> {
        let mut events = self.dispatch(messages, model);
        let mut text = String::new();

        while let Some(event) = events.next().await {
            match event {
                NormalizedEvent::Content { content, .. } => text.push_str(&content),
                NormalizedEvent::Error { message, .. } => return Err(LlmError::InternalError(Some(message))),
                NormalizedEvent::Cancelled { message, .. } => return Err(LlmError::InternalError(Some(message))),
                NormalizedEvent::Start { .. } | NormalizedEvent::Complete { .. } => {}
            }
        }

        Ok(text)
    }
}
