use config::{ConnectionConfig, ServiceKind};
use serde::{Deserialize, Serialize};

use crate::session::SessionInfo;

/// Chat message passed through to the backend unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ChatMessage {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

fn default_role() -> String {
    "user".to_string()
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// Body of `POST /chat/stream`.
///
/// Either a full `messages` history or a single `message` shorthand for one user turn.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ChatStreamRequest {
    #[serde(default)]
    pub(crate) messages: Vec<ChatMessage>,
    #[serde(default)]
    pub(crate) message: Option<String>,
    #[serde(default)]
    pub(crate) model: Option<String>,
    #[serde(default)]
    pub(crate) stream_id: Option<String>,
}

impl ChatStreamRequest {
    pub(crate) fn into_messages(self) -> Vec<ChatMessage> {
        let mut messages = self.messages;

        if let Some(message) = self.message {
            messages.push(ChatMessage::user(message));
        }

        messages
    }
}

/// Body of `POST /chat/stop`.
#[derive(Debug, Deserialize)]
pub(crate) struct StopRequest {
    pub(crate) stream_id: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct StopResponse {
    pub(crate) stopped: bool,
    pub(crate) stream_id: String,
    pub(crate) message: &'static str,
}

#[derive(Debug, Serialize)]
pub(crate) struct StreamStatus {
    pub(crate) active_streams: usize,
    pub(crate) stream_ids: Vec<String>,
    pub(crate) sessions: Vec<SessionInfo>,
}

/// Body of `POST /services`.
#[derive(Debug, Deserialize)]
pub(crate) struct AddServiceRequest {
    pub(crate) service_id: String,
    pub(crate) service_type: ServiceKind,
    #[serde(default)]
    pub(crate) config: ConnectionConfig,
}

/// Body of `POST /services/test`.
#[derive(Debug, Deserialize)]
pub(crate) struct TestServiceRequest {
    pub(crate) service_type: ServiceKind,
    #[serde(default)]
    pub(crate) config: ConnectionConfig,
}

#[derive(Debug, Serialize)]
pub(crate) struct RemoveServiceResponse {
    pub(crate) service_id: String,
    pub(crate) removed: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetEnabledRequest {
    pub(crate) enabled: bool,
}

#[derive(Debug, Deserialize)]
pub(crate) struct SetDefaultModelRequest {
    pub(crate) model: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct DefaultModelResponse {
    pub(crate) default_model: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct FilenameRequest {
    pub(crate) previews: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct FilenameResponse {
    pub(crate) filename: String,
}
