use std::time::Duration;

use async_trait::async_trait;
use config::{ConnectionConfig, ServiceKind};
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Backend, DeltaStream, http, ndjson};
use crate::{error::LlmError, messages::ChatMessage};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// A model runtime on the local machine or network, speaking the Ollama API.
pub(crate) struct LocalRuntimeBackend {
    client: Client,
    host: String,
}

impl LocalRuntimeBackend {
    pub fn new(config: &ConnectionConfig) -> crate::Result<Self> {
        let host = config
            .host
            .as_deref()
            .ok_or_else(|| LlmError::ConfigInvalid("a local service requires a 'host'".to_string()))?;

        Ok(Self {
            client: http::client(config.accept_invalid_certs)?,
            host: http::base_url(host)?,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/{path}", self.host)
    }

    async fn tags(&self) -> crate::Result<TagsResponse> {
        let response = self
            .client
            .get(self.url("tags"))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(format!("Failed to reach local runtime: {e}")))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }

        let body = response.text().await.map_err(|e| {
            log::error!("Failed to read local runtime tags response: {e}");
            LlmError::InternalError(None)
        })?;

        sonic_rs::from_str(&body).map_err(|e| {
            log::error!("Failed to parse local runtime tags response: {e}");
            LlmError::MalformedResponse(format!("unexpected model list: {e}"))
        })
    }
}

#[async_trait]
impl Backend for LocalRuntimeBackend {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Local
    }

    async fn open_stream(&self, messages: Vec<ChatMessage>, model: &str) -> crate::Result<DeltaStream> {
        let request = LocalChatRequest {
            model,
            messages: &messages,
            stream: true,
        };

        let response = self
            .client
            .post(self.url("chat"))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(format!("Failed to send request to local runtime: {e}")))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }

        let deltas = ndjson::lines(response.bytes_stream()).map(|line| {
            let line = line?;

            let chunk: LocalChatChunk = sonic_rs::from_str(&line).map_err(|e| {
                log::warn!("Failed to parse local runtime chunk: {e}");
                LlmError::MalformedResponse(format!("unexpected stream chunk: {e}"))
            })?;

            if let Some(message) = chunk.error {
                return Err(LlmError::UpstreamFailure {
                    kind: ServiceKind::Local,
                    message,
                });
            }

            Ok(chunk.message.map(|m| m.content).unwrap_or_default())
        });

        Ok(Box::pin(deltas))
    }

    async fn is_available(&self, test_model: Option<&str>) -> bool {
        if let Err(e) = self.tags().await {
            log::debug!("Local runtime at {} is unavailable: {e}", self.host);
            return false;
        }

        // Loading metadata warms the model; its outcome does not affect availability.
        if let Some(model) = test_model {
            let result = self
                .client
                .post(self.url("show"))
                .timeout(PROBE_TIMEOUT)
                .json(&ShowRequest { model })
                .send()
                .await;

            match result {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => log::debug!("Model '{model}' metadata lookup returned {}", response.status()),
                Err(e) => log::debug!("Model '{model}' metadata lookup failed: {e}"),
            }
        }

        true
    }

    async fn list_models(&self) -> Vec<String> {
        match self.tags().await {
            Ok(tags) => tags.models.into_iter().map(LocalModel::into_id).collect(),
            Err(e) => {
                log::warn!("Failed to list models from local runtime at {}: {e}", self.host);
                Vec::new()
            }
        }
    }
}

#[derive(Serialize)]
struct LocalChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
}

#[derive(Serialize)]
struct ShowRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct LocalChatChunk {
    #[serde(default)]
    message: Option<LocalChatMessage>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct LocalChatMessage {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<LocalModel>,
}

#[derive(Deserialize)]
struct LocalModel {
    name: String,
    #[serde(default)]
    model: Option<String>,
}

impl LocalModel {
    fn into_id(self) -> String {
        self.model.unwrap_or(self.name)
    }
}
