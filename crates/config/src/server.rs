//! HTTP listener settings.

use std::{borrow::Cow, net::SocketAddr};

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on. The command line flag wins over it.
    pub listen_address: Option<SocketAddr>,
    /// Liveness endpoint, served on the main listener.
    #[serde(default)]
    pub health: HealthConfig,
}

/// Health endpoint configuration.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether `GET {path}` answers `{"status":"healthy"}`.
    pub enabled: bool,
    /// Where the endpoint is mounted.
    pub path: Cow<'static, str>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/health"),
        }
    }
}
