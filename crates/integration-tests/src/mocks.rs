//! Mock backends speaking the local runtime and hosted API protocols.

mod hosted;
mod local;

use std::future::Future;
use std::net::SocketAddr;

use indoc::formatdoc;

pub use hosted::{HostedApiMock, HostedApiStats};
pub use local::{LocalRuntimeMock, LocalRuntimeStats};

/// A spawned mock backend, ready to be referenced from a service configuration.
pub struct SpawnedBackend {
    /// The service id used in the generated configuration.
    pub service_id: String,
    /// Where the mock listens.
    pub address: SocketAddr,
    /// Either `local` or `hosted`.
    pub kind: &'static str,
    /// Models listed in the service configuration.
    pub models: Vec<String>,
    /// API key the mock expects, if any.
    pub api_key: Option<String>,
}

impl SpawnedBackend {
    /// The URL to put in the service configuration.
    pub fn url(&self) -> String {
        match self.kind {
            "local" => format!("http://{}", self.address),
            _ => format!("http://{}/v1", self.address),
        }
    }

    /// The TOML snippet registering this backend as a service.
    pub fn service_config(&self) -> String {
        let url_key = if self.kind == "local" { "host" } else { "base_url" };

        let models = self
            .models
            .iter()
            .map(|m| format!("\"{m}\""))
            .collect::<Vec<_>>()
            .join(", ");

        let api_key = match &self.api_key {
            Some(key) => format!("api_key = \"{key}\""),
            None => String::new(),
        };

        formatdoc! {r#"

            [llm.services.{id}]
            type = "{kind}"

            [llm.services.{id}.config]
            {url_key} = "{url}"
            models = [{models}]
            {api_key}
        "#, id = self.service_id, kind = self.kind, url = self.url()}
    }
}

/// A mock backend that can be started on an ephemeral port.
pub trait TestBackend: Send + 'static {
    /// Starts the mock server.
    fn spawn(self) -> impl Future<Output = anyhow::Result<SpawnedBackend>> + Send;
}
