use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use config::ServiceKind;
use serde::Serialize;
use thiserror::Error;

/// Routing, registry and backend errors.
///
/// Registry operations return these as values. Anything that goes wrong while a
/// stream is running is rendered into a terminal `error` event instead, see
/// [`LlmError::stream_message`].
#[derive(Debug, Error)]
pub enum LlmError {
    /// Malformed or missing connection fields. Never persisted.
    #[error("Invalid service configuration: {0}")]
    ConfigInvalid(String),

    /// The availability probe for a service failed.
    #[error("Service '{service}' is not available")]
    AdapterUnavailable { service: String },

    /// No enabled service routes the requested model.
    #[error("Model '{0}' not available in any configured service")]
    ModelNotFound(String),

    /// No model in the request and no default configured.
    #[error("No model specified and no default model configured")]
    NoDefaultModel,

    /// The backend failed while producing a stream.
    #[error("{} error: {message}", .kind.label())]
    UpstreamFailure { kind: ServiceKind, message: String },

    /// Unknown service id.
    #[error("Service '{0}' not found")]
    ServiceNotFound(String),

    /// Invalid request parameters.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backend rejected our credentials.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The backend answered with a non-success status.
    #[error("Provider API error ({status}): {message}")]
    ProviderApiError { status: u16, message: String },

    /// Network or connection error.
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// The backend answered with something we could not parse.
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// The new service record could not be saved; the registry was left unchanged.
    #[error("Failed to persist service configuration: {0}")]
    PersistFailed(String),

    /// Internal server error.
    /// If Some(message), it came from a backend and can be shown.
    /// If None, it's an internal error and should not leak details.
    #[error("Internal server error")]
    InternalError(Option<String>),
}

impl LlmError {
    /// Get the appropriate HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::ConfigInvalid(_) | Self::InvalidRequest(_) | Self::NoDefaultModel => StatusCode::BAD_REQUEST,
            Self::AuthenticationFailed(_) => StatusCode::UNAUTHORIZED,
            Self::ModelNotFound(_) | Self::ServiceNotFound(_) => StatusCode::NOT_FOUND,
            Self::AdapterUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            Self::ConnectionError(_) | Self::MalformedResponse(_) | Self::UpstreamFailure { .. } => {
                StatusCode::BAD_GATEWAY
            }
            Self::ProviderApiError { status, .. } => match *status {
                400 => StatusCode::BAD_REQUEST,
                401 => StatusCode::UNAUTHORIZED,
                403 => StatusCode::FORBIDDEN,
                404 => StatusCode::NOT_FOUND,
                429 => StatusCode::TOO_MANY_REQUESTS,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::PersistFailed(_) | Self::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type string for the response.
    pub fn error_type(&self) -> &str {
        match self {
            Self::ConfigInvalid(_) => "config_invalid",
            Self::AdapterUnavailable { .. } => "adapter_unavailable",
            Self::ModelNotFound(_) => "model_not_found",
            Self::NoDefaultModel => "no_default_model",
            Self::UpstreamFailure { .. } => "upstream_failure",
            Self::ServiceNotFound(_) => "not_found_error",
            Self::InvalidRequest(_) => "invalid_request_error",
            Self::AuthenticationFailed(_) => "authentication_error",
            Self::ConnectionError(_) | Self::ProviderApiError { .. } | Self::MalformedResponse(_) => "api_error",
            Self::PersistFailed(_) | Self::InternalError(_) => "internal_error",
        }
    }

    /// Maps a non-success backend status to an error.
    pub(crate) fn from_status(status: u16, message: String) -> Self {
        match status {
            401 | 403 => Self::AuthenticationFailed(message),
            400 => Self::InvalidRequest(message),
            _ => Self::ProviderApiError { status, message },
        }
    }

    /// The message carried by a terminal `error` event.
    ///
    /// Routing failures keep their own wording. Everything raised by a backend is
    /// prefixed with the backend kind, so callers can tell adapter failures apart.
    pub fn stream_message(&self, kind: Option<ServiceKind>) -> String {
        match (self, kind) {
            (Self::UpstreamFailure { .. } | Self::ModelNotFound(_) | Self::NoDefaultModel, _) | (_, None) => {
                self.to_string()
            }
            (Self::InternalError(None), Some(kind)) => format!("{} error: unexpected failure", kind.label()),
            (error, Some(kind)) => format!("{} error: {error}", kind.label()),
        }
    }
}

/// Error response format compatible with the OpenAI API.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorDetails,
}

#[derive(Debug, Serialize)]
struct ErrorDetails {
    message: String,
    r#type: String,
    code: u16,
}

impl IntoResponse for LlmError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        if status.is_server_error() {
            match &self {
                Self::InternalError(Some(provider_msg)) => {
                    log::error!("Backend returned internal error: {provider_msg}");
                }
                Self::InternalError(None) => {
                    log::error!("Internal server error occurred");
                }
                _ => {
                    log::error!("Server error ({}): {}", status.as_u16(), self);
                }
            }
        }

        let message = match &self {
            Self::InternalError(Some(provider_msg)) => provider_msg.clone(),
            Self::InternalError(None) => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let error_response = ErrorResponse {
            error: ErrorDetails {
                message,
                r#type: self.error_type().to_string(),
                code: status.as_u16(),
            },
        };

        (status, Json(error_response)).into_response()
    }
}
