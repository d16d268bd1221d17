pub(crate) mod hosted;
mod http;
pub(crate) mod local;
mod ndjson;

use std::{pin::Pin, sync::Arc};

use async_trait::async_trait;
use config::{ConnectionConfig, ServiceKind};
use futures::{FutureExt, Stream};

use self::{hosted::HostedApiBackend, local::LocalRuntimeBackend};
use crate::{event::EventStream, messages::ChatMessage, normalizer};

/// Raw text deltas as the backend produces them, before normalization.
///
/// Empty deltas are allowed and dropped by the normalizer. The first `Err` ends the stream.
pub type DeltaStream = Pin<Box<dyn Stream<Item = crate::Result<String>> + Send>>;

/// One backend protocol behind a uniform streaming interface.
///
/// Implementations only open the provider stream and translate its chunks into text
/// deltas. Start and terminal events, and the conversion of every failure into an
/// in-stream error, are handled once for all backends by [`stream_chat`].
#[async_trait]
pub trait Backend: Send + Sync {
    /// The backend kind, used to label errors.
    fn kind(&self) -> ServiceKind;

    /// Sends the chat request and returns the stream of text deltas.
    async fn open_stream(&self, messages: Vec<ChatMessage>, model: &str) -> crate::Result<DeltaStream>;

    /// Liveness probe.
    ///
    /// For a hosted API this issues a real, minimal completion and therefore costs tokens.
    async fn is_available(&self, test_model: Option<&str>) -> bool;

    /// Models the backend reports, best effort. Empty when the backend cannot enumerate.
    async fn list_models(&self) -> Vec<String>;
}

/// Streams a chat completion as normalized events.
///
/// The returned stream is lazy: nothing is sent to the backend until it is polled past
/// the `start` event.
pub fn stream_chat(backend: Arc<dyn Backend>, messages: Vec<ChatMessage>, model: String) -> EventStream {
    let kind = backend.kind();
    let requested = model.clone();
    let opening = async move { backend.open_stream(messages, &requested).await }.boxed();

    normalizer::normalize(kind, model, opening)
}

/// Builds backends from configuration. The variant is chosen by kind only.
pub trait BackendFactory: Send + Sync {
    /// Constructs a backend, failing with `ConfigInvalid` on missing or malformed fields.
    fn build(&self, kind: ServiceKind, config: &ConnectionConfig) -> crate::Result<Arc<dyn Backend>>;
}

/// Factory for the real HTTP backends.
#[derive(Debug, Default, Clone, Copy)]
pub struct HttpBackendFactory;

impl BackendFactory for HttpBackendFactory {
    fn build(&self, kind: ServiceKind, config: &ConnectionConfig) -> crate::Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match kind {
            ServiceKind::Local => Arc::new(LocalRuntimeBackend::new(config)?),
            ServiceKind::Hosted => Arc::new(HostedApiBackend::new(config)?),
        };

        Ok(backend)
    }
}
