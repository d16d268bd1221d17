use std::time::Duration;

use async_trait::async_trait;
use config::{ConnectionConfig, ServiceKind};
use eventsource_stream::Eventsource;
use futures::{StreamExt, future};
use reqwest::{Client, RequestBuilder, header::AUTHORIZATION};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use super::{Backend, DeltaStream, http};
use crate::{error::LlmError, messages::ChatMessage};

const DEFAULT_HOSTED_API_URL: &str = "https://api.openai.com/v1";
const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

/// A remote OpenAI-compatible chat completion API.
pub(crate) struct HostedApiBackend {
    client: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl HostedApiBackend {
    pub fn new(config: &ConnectionConfig) -> crate::Result<Self> {
        if config.api_key.is_none() && config.base_url.is_none() {
            return Err(LlmError::ConfigInvalid(
                "a hosted service requires an 'api_key' or a 'base_url'".to_string(),
            ));
        }

        let base_url = http::base_url(config.base_url.as_deref().unwrap_or(DEFAULT_HOSTED_API_URL))?;

        Ok(Self {
            client: http::client(config.accept_invalid_certs)?,
            base_url,
            api_key: config.api_key.clone(),
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => request.header(AUTHORIZATION, format!("Bearer {}", key.expose_secret())),
            None => request,
        }
    }

    async fn models(&self) -> crate::Result<Vec<String>> {
        let url = format!("{}/models", self.base_url);

        let response = self
            .authorized(self.client.get(&url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(format!("Failed to fetch models from hosted API: {e}")))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }

        let body = response.text().await.map_err(|e| {
            log::error!("Failed to read hosted API models response body: {e}");
            LlmError::InternalError(None)
        })?;

        let models: ModelsResponse = sonic_rs::from_str(&body).map_err(|e| {
            log::error!("Failed to parse hosted API models list response: {e}");
            LlmError::MalformedResponse(format!("unexpected model list: {e}"))
        })?;

        Ok(models.data.into_iter().map(|model| model.id).collect())
    }
}

#[async_trait]
impl Backend for HostedApiBackend {
    fn kind(&self) -> ServiceKind {
        ServiceKind::Hosted
    }

    async fn open_stream(&self, messages: Vec<ChatMessage>, model: &str) -> crate::Result<DeltaStream> {
        let url = format!("{}/chat/completions", self.base_url);

        let request = CompletionRequest {
            model,
            messages: &messages,
            stream: true,
            max_tokens: None,
        };

        let response = self
            .authorized(self.client.post(&url))
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(format!("Failed to send streaming request to hosted API: {e}")))?;

        if !response.status().is_success() {
            return Err(http::error_from_response(response).await);
        }

        // `None` marks the end of the stream: either `[DONE]` or the connection closing.
        let deltas = response
            .bytes_stream()
            .eventsource()
            .map(|event| {
                let event = match event {
                    Ok(event) => event,
                    Err(e) => {
                        log::error!("SSE parsing error in hosted API stream: {e}");
                        return Some(Err(LlmError::ConnectionError(format!("Stream error: {e}"))));
                    }
                };

                if event.data.trim() == "[DONE]" {
                    return None;
                }

                Some(parse_chunk(&event.data))
            })
            .take_while(|item| future::ready(item.is_some()))
            .filter_map(future::ready);

        Ok(Box::pin(deltas))
    }

    async fn is_available(&self, test_model: Option<&str>) -> bool {
        let model = match test_model {
            Some(model) => model.to_string(),
            None => match self.models().await.ok().and_then(|models| models.into_iter().next()) {
                Some(model) => model,
                None => {
                    log::debug!("Hosted API at {} offered no model to probe with", self.base_url);
                    return false;
                }
            },
        };

        let messages = [ChatMessage::user("hi")];

        let request = CompletionRequest {
            model: &model,
            messages: &messages,
            stream: false,
            max_tokens: Some(1),
        };

        let url = format!("{}/chat/completions", self.base_url);

        let result = self
            .authorized(self.client.post(&url))
            .timeout(PROBE_TIMEOUT)
            .json(&request)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                let error = http::error_from_response(response).await;
                log::warn!("Hosted API probe with model '{model}' failed: {error}");
                false
            }
            Err(e) => {
                log::warn!("Hosted API at {} is unreachable: {e}", self.base_url);
                false
            }
        }
    }

    async fn list_models(&self) -> Vec<String> {
        match self.models().await {
            Ok(models) => models,
            Err(e) => {
                log::debug!("Hosted API at {} does not list models: {e}", self.base_url);
                Vec::new()
            }
        }
    }
}

fn parse_chunk(data: &str) -> crate::Result<String> {
    let chunk: StreamChunk = sonic_rs::from_str(data).map_err(|e| {
        log::warn!("Failed to parse hosted API streaming chunk: {e}");
        LlmError::MalformedResponse(format!("unexpected stream chunk: {e}"))
    })?;

    if let Some(error) = chunk.error {
        return Err(LlmError::UpstreamFailure {
            kind: ServiceKind::Hosted,
            message: error.message,
        });
    }

    let content = chunk
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.delta.content)
        .unwrap_or_default();

    Ok(content)
}

#[derive(Serialize)]
struct CompletionRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<StreamError>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct StreamError {
    message: String,
}

#[derive(Deserialize)]
struct ModelsResponse {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Deserialize)]
struct ModelEntry {
    id: String,
}
