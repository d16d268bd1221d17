//! Switchyard server library.
//!
//! Provides a reusable server function to serve Switchyard either for the binary, or for the integration tests.

#![deny(missing_docs)]

mod health;
mod store;

use std::{net::SocketAddr, sync::Arc};

use anyhow::anyhow;
use axum::Router;
use config::{Config, LlmConfig, ServicesRecord};
use llm::{ConfigStore, MemoryStore};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;

pub use store::JsonFileStore;

/// Configuration for serving Switchyard.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to
    pub listen_address: SocketAddr,
    /// The deserialized Switchyard TOML configuration.
    pub config: Config,
    /// Cancel to stop accepting connections and shut down gracefully.
    pub shutdown_signal: CancellationToken,
}

/// Starts and runs the Switchyard server with the provided configuration.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let mut app = Router::new();
    let cors = CorsLayer::permissive();

    let llm_exposed = if config.llm.enabled() {
        let (record, store) = services_record(&config.llm)?;
        let chat = llm::chat_router(&config.llm, record, store);

        app = app.merge(llm::router(&config.llm, chat).layer(cors.clone()));
        true
    } else {
        log::debug!("Chat endpoints are disabled in the configuration");
        false
    };

    if config.server.health.enabled {
        app = app.merge(health::router(&config.server.health).layer(cors));
    }

    let listener = TcpListener::bind(listen_address)
        .await
        .map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if llm_exposed {
        log::info!("Chat endpoints available at: http://{listen_address}{}", config.llm.path);
    } else {
        log::warn!("Server starting with no functional endpoints. Enable the llm section to route chat requests.");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal.cancelled_owned())
        .await
        .map_err(|e| anyhow!("Failed to start HTTP server: {e}"))?;

    log::info!("Server stopped");

    Ok(())
}

/// Picks the starting service record and where mutations are saved.
///
/// With a state file, a previously saved record takes precedence over the services in
/// the TOML configuration. Without one, mutations only live in memory.
fn services_record(config: &LlmConfig) -> anyhow::Result<(ServicesRecord, Arc<dyn ConfigStore>)> {
    let Some(path) = &config.state_file else {
        return Ok((config.record(), Arc::new(MemoryStore::new())));
    };

    let store = JsonFileStore::new(path);

    let record = match store.load()? {
        Some(record) => {
            log::info!(
                "Loaded {} services from state file {}",
                record.services.len(),
                path.display()
            );

            record
        }
        None => {
            log::debug!("State file {} does not exist yet, starting from configuration", path.display());
            config.record()
        }
    };

    Ok((record, Arc::new(store)))
}
