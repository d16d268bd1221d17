use std::net::SocketAddr;
use std::pin::Pin;
use std::time::Duration;

use config::Config;
use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use reqwest::StatusCode;
use serde_json::Value;
use server::ServeConfig;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

pub mod mocks;

use mocks::{SpawnedBackend, TestBackend};

/// Test client for making HTTP requests to the test server
#[derive(Clone)]
pub struct TestClient {
    base_url: String,
    client: reqwest::Client,
}

impl TestClient {
    /// Create a new test client for the given base URL
    pub fn new(base_url: String) -> Self {
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    /// Send a POST request to the given path with JSON body
    pub async fn post<T: serde::Serialize>(&self, path: &str, body: &T) -> reqwest::Response {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .json(body)
            .send()
            .await
            .unwrap()
    }

    /// Send a GET request to the given path
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }

    /// Send a DELETE request to the given path
    pub async fn delete(&self, path: &str) -> reqwest::Response {
        self.client
            .delete(format!("{}{}", self.base_url, path))
            .send()
            .await
            .unwrap()
    }
}

/// An open chat stream.
pub struct ChatStream {
    /// The session id from the `x-stream-id` header.
    pub stream_id: String,
    events: Pin<Box<dyn Stream<Item = Value> + Send>>,
}

impl ChatStream {
    /// The next event, or `None` once the server closed the stream.
    pub async fn next(&mut self) -> Option<Value> {
        timeout(Duration::from_secs(5), self.events.next())
            .await
            .expect("timed out waiting for a stream event")
    }

    /// Reads the stream to its end.
    pub async fn collect(mut self) -> Vec<Value> {
        let mut events = Vec::new();

        while let Some(event) = self.next().await {
            events.push(event);
        }

        events
    }
}

/// Client for the chat, model and service endpoints.
pub struct ChatClient {
    client: TestClient,
    path: String,
}

impl ChatClient {
    fn url(&self, path: &str) -> String {
        format!("{}{}", self.path, path)
    }

    /// Opens a chat stream.
    pub async fn stream(&self, body: Value) -> ChatStream {
        let response = self.client.post(&self.url("/chat/stream"), &body).await;

        assert_eq!(response.status(), StatusCode::OK);

        let stream_id = response
            .headers()
            .get("x-stream-id")
            .and_then(|value| value.to_str().ok())
            .unwrap()
            .to_string();

        let events = response
            .bytes_stream()
            .eventsource()
            .map(|event| serde_json::from_str::<Value>(&event.unwrap().data).unwrap());

        ChatStream {
            stream_id,
            events: Box::pin(events),
        }
    }

    /// Streams a chat completion to its end.
    pub async fn chat(&self, body: Value) -> Vec<Value> {
        self.stream(body).await.collect().await
    }

    /// GET a JSON document.
    pub async fn get(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.get(&self.url(path)).await;
        (response.status(), response.json().await.unwrap())
    }

    /// POST a JSON document and read the JSON answer.
    pub async fn post(&self, path: &str, body: Value) -> (StatusCode, Value) {
        let response = self.client.post(&self.url(path), &body).await;
        (response.status(), response.json().await.unwrap())
    }

    /// DELETE and read the JSON answer.
    pub async fn delete(&self, path: &str) -> (StatusCode, Value) {
        let response = self.client.delete(&self.url(path)).await;
        (response.status(), response.json().await.unwrap())
    }
}

/// Builder collecting mock backends before the server starts.
#[derive(Default)]
pub struct TestServerBuilder {
    backends: Vec<SpawnedBackend>,
}

impl TestServerBuilder {
    /// Starts a mock backend and registers it as a configured service.
    pub async fn spawn_backend(&mut self, backend: impl TestBackend) -> &SpawnedBackend {
        let spawned = backend.spawn().await.unwrap();
        self.backends.push(spawned);
        self.backends.last().unwrap()
    }

    /// Starts the server with `config` plus one service per spawned backend.
    pub async fn build(self, config: &str) -> TestServer {
        let mut config = config.to_string();

        for backend in &self.backends {
            config.push_str(&backend.service_config());
        }

        TestServer::start(&config).await
    }
}

/// Test server that manages the lifecycle of a server instance
pub struct TestServer {
    pub client: TestClient,
    pub address: SocketAddr,
    shutdown: CancellationToken,
    _handle: tokio::task::JoinHandle<()>,
}

impl TestServer {
    pub fn builder() -> TestServerBuilder {
        TestServerBuilder::default()
    }

    /// Start a new test server with the given TOML configuration
    pub async fn start(config_toml: &str) -> Self {
        let config: Config = toml::from_str(config_toml).unwrap();

        // Find an available port
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap();
        let shutdown = CancellationToken::new();

        let serve_config = ServeConfig {
            listen_address: address,
            config,
            shutdown_signal: shutdown.clone(),
        };

        let (tx, mut rx) = tokio::sync::oneshot::channel();
        let handle = tokio::spawn(async move {
            // Drop the listener so the server can bind to the address
            drop(listener);

            let _ = tx.send(server::serve(serve_config).await);
        });

        // Wait for the server to start up or fail
        tokio::time::sleep(Duration::from_millis(100)).await;

        if let Ok(Err(e)) = rx.try_recv() {
            eprintln!("Server failed to start: {e}");
            std::process::exit(1);
        }

        let client = TestClient::new(format!("http://{address}"));

        let mut retries = 10;
        while retries > 0 {
            if timeout(Duration::from_millis(100), client.get("/")).await.is_ok() {
                break;
            }
            retries -= 1;
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        TestServer {
            client,
            address,
            shutdown,
            _handle: handle,
        }
    }

    /// A client for the endpoints mounted at `path`.
    pub fn chat_client(&self, path: &str) -> ChatClient {
        ChatClient {
            client: self.client.clone(),
            path: path.to_string(),
        }
    }

    /// Stops accepting connections.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
