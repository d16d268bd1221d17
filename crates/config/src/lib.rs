//! Switchyard configuration structures to map the switchyard.toml configuration.

#![deny(missing_docs)]

mod llm;
mod loader;
mod server;

use std::path::Path;

pub use llm::{ConnectionConfig, LlmConfig, ServiceEntry, ServiceKind, ServicesRecord, strip_tag};
use serde::Deserialize;
pub use server::{HealthConfig, ServerConfig};

/// Main configuration structure for the Switchyard application.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// HTTP server configuration settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Model routing and streaming configuration settings.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Returns human-readable warnings about a configuration that parses but will not route
    /// the way the operator probably expects.
    pub fn validate(&self) -> Vec<String> {
        loader::validate(self)
    }
}
