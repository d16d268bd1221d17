use std::pin::Pin;

use futures::Stream;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};

/// Stream of normalized events, the only thing callers of the routing layer ever see.
pub type EventStream = Pin<Box<dyn Stream<Item = NormalizedEvent> + Send>>;

/// One frame of a chat stream.
///
/// Every stream starts with exactly one `start` and ends with exactly one of `complete`,
/// `error` or `cancelled`. The only exception is a request that never reached a backend
/// (unknown model, no default), which is a lone `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NormalizedEvent {
    Start { timestamp: Timestamp, model: String },
    Content { timestamp: Timestamp, content: String },
    Error { timestamp: Timestamp, message: String },
    Complete { timestamp: Timestamp },
    Cancelled { timestamp: Timestamp, message: String },
}

pub(crate) const CANCELLED_MESSAGE: &str = "Generation stopped by user.";

impl NormalizedEvent {
    pub fn start(model: impl Into<String>) -> Self {
        Self::Start {
            timestamp: Timestamp::now(),
            model: model.into(),
        }
    }

    pub fn content(content: impl Into<String>) -> Self {
        Self::Content {
            timestamp: Timestamp::now(),
            content: content.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            timestamp: Timestamp::now(),
            message: message.into(),
        }
    }

    pub fn complete() -> Self {
        Self::Complete {
            timestamp: Timestamp::now(),
        }
    }

    pub fn cancelled() -> Self {
        Self::Cancelled {
            timestamp: Timestamp::now(),
            message: CANCELLED_MESSAGE.to_string(),
        }
    }

    /// Whether this event closes the stream.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. } | Self::Cancelled { .. })
    }
}
