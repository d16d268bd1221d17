//! Model routing configuration: configured backend services and streaming knobs.

use std::borrow::Cow;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use duration_str::{deserialize_duration, deserialize_option_duration};
use indexmap::IndexMap;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};

/// Configuration for the routing and streaming layer.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Whether the chat endpoints are exposed at all.
    enabled: bool,

    /// The path where the endpoints will be mounted.
    pub path: Cow<'static, str>,

    /// Model used when a chat request does not name one.
    pub default_model: Option<String>,

    /// Configured backend services keyed by an operator-chosen id.
    ///
    /// Document order is kept: when two services list the same tag-stripped model name,
    /// the one declared later wins.
    pub services: IndexMap<String, ServiceEntry>,

    /// Delay inserted after each forwarded stream event.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub stream_pacing: Option<Duration>,

    /// How long a local service availability probe is reused by inventory reads.
    #[serde(deserialize_with = "deserialize_duration")]
    pub probe_cache_ttl: Duration,

    /// JSON file holding the mutable service record. When it exists at startup it
    /// takes precedence over `services` and `default_model`.
    pub state_file: Option<PathBuf>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: Cow::Borrowed("/api"),
            default_model: None,
            services: IndexMap::new(),
            stream_pacing: None,
            probe_cache_ttl: Duration::from_secs(10),
            state_file: None,
        }
    }
}

impl LlmConfig {
    /// Whether the chat endpoints are enabled.
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    /// Whether there are any services configured.
    pub fn has_services(&self) -> bool {
        !self.services.is_empty()
    }

    /// The mutable part of the configuration, as handed to the service registry.
    pub fn record(&self) -> ServicesRecord {
        ServicesRecord {
            services: self.services.clone(),
            default_model: self.default_model.clone(),
        }
    }
}

/// The persisted service record: every configured service plus the default model.
///
/// This is the document a persistence layer stores and reloads. It is the only
/// serialized form that carries API keys in clear text.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServicesRecord {
    /// Configured services in registration order.
    pub services: IndexMap<String, ServiceEntry>,
    /// Model used when a request does not name one.
    pub default_model: Option<String>,
}

/// Backend kind enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
    /// A model runtime reachable by host that can enumerate its installed models.
    #[serde(alias = "ollama")]
    Local,
    /// A key-authenticated remote completion API.
    #[serde(alias = "openai")]
    Hosted,
}

impl ServiceKind {
    /// Human readable label, used to prefix in-stream error messages.
    pub fn label(self) -> &'static str {
        match self {
            ServiceKind::Local => "Local runtime",
            ServiceKind::Hosted => "Hosted API",
        }
    }
}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceKind::Local => f.write_str("local"),
            ServiceKind::Hosted => f.write_str("hosted"),
        }
    }
}

/// One configured backend service.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceEntry {
    /// Which backend adapter serves this entry.
    #[serde(rename = "type")]
    pub kind: ServiceKind,

    /// Backend specific connection settings and the models routed to it.
    #[serde(default)]
    pub config: ConnectionConfig,

    /// Disabled services keep their configuration but contribute no routes.
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

impl ServiceEntry {
    /// Creates an enabled entry.
    pub fn new(kind: ServiceKind, config: ConnectionConfig) -> Self {
        Self {
            kind,
            config,
            enabled: true,
        }
    }

    /// Display name: the configured name, or the kind label.
    pub fn display_name(&self) -> Cow<'_, str> {
        match self.config.name {
            Some(ref name) => Cow::Borrowed(name),
            None => Cow::Borrowed(self.kind.label()),
        }
    }
}

/// Drops everything from the first `:` on, so `llama3.2:latest` becomes `llama3.2`.
pub fn strip_tag(model: &str) -> &str {
    model.split(':').next().unwrap_or(model)
}

fn enabled_by_default() -> bool {
    true
}

/// Connection settings shared by every backend kind.
///
/// Which fields are required depends on the kind and is checked when the backend is
/// constructed: a local runtime needs `host`, a hosted API needs `api_key` or `base_url`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct ConnectionConfig {
    /// Optional display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Base URL of a local runtime, e.g. `http://localhost:11434`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Base URL of a hosted, OpenAI compatible API.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API key for hosted services.
    #[serde(serialize_with = "expose_secret", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<SecretString>,

    /// Models routed to this service, in operator order.
    pub models: Vec<String>,

    /// Skip TLS certificate verification for this backend.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub accept_invalid_certs: bool,
}

fn expose_secret<S: Serializer>(secret: &Option<SecretString>, serializer: S) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => serializer.serialize_some(secret.expose_secret()),
        None => serializer.serialize_none(),
    }
}
