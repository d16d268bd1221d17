use std::time::Duration;

use reqwest::{Client, Response};
use serde::Deserialize;
use url::Url;

use crate::error::LlmError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(super) fn client(accept_invalid_certs: bool) -> crate::Result<Client> {
    Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| {
            log::error!("Failed to create HTTP client for backend: {e}");
            LlmError::InternalError(None)
        })
}

/// Validates a base URL and strips the trailing slash so paths can be appended.
pub(super) fn base_url(raw: &str) -> crate::Result<String> {
    Url::parse(raw).map_err(|e| LlmError::ConfigInvalid(format!("'{raw}' is not a valid URL: {e}")))?;

    Ok(raw.trim_end_matches('/').to_string())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ErrorBody {
    Nested { error: ErrorMessage },
    Flat { error: String },
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Turns a non-success response into an error, extracting the backend's own message when
/// the body carries one.
pub(super) async fn error_from_response(response: Response) -> LlmError {
    let status = response.status();
    let body = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());

    log::error!("Backend API error ({status}): {body}");

    let message = match sonic_rs::from_str::<ErrorBody>(&body) {
        Ok(ErrorBody::Nested { error }) => error.message,
        Ok(ErrorBody::Flat { error }) => error,
        Err(_) if body.is_empty() => status.canonical_reason().unwrap_or("Unknown error").to_string(),
        Err(_) => body,
    };

    LlmError::from_status(status.as_u16(), message)
}
