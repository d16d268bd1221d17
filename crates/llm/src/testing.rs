use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use config::{ConnectionConfig, ServiceEntry, ServiceKind};
use futures::{channel::mpsc, stream};

use crate::{
    backend::{Backend, BackendFactory, DeltaStream},
    error::LlmError,
    messages::ChatMessage,
};

enum Script {
    Reply(Vec<String>),
    FailOpen(String),
    Channel(Option<mpsc::UnboundedReceiver<crate::Result<String>>>),
}

/// In-process backend with scripted replies and probe counting.
pub(crate) struct FakeBackend {
    kind: ServiceKind,
    available: AtomicBool,
    listed: Vec<String>,
    script: Mutex<Script>,
    probes: AtomicUsize,
    opened: Mutex<Vec<String>>,
}

impl FakeBackend {
    pub(crate) fn new(kind: ServiceKind) -> Self {
        Self {
            kind,
            available: AtomicBool::new(true),
            listed: Vec::new(),
            script: Mutex::new(Script::Reply(Vec::new())),
            probes: AtomicUsize::new(0),
            opened: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn unavailable(self) -> Self {
        self.available.store(false, Ordering::SeqCst);
        self
    }

    pub(crate) fn listing(mut self, models: &[&str]) -> Self {
        self.listed = models.iter().map(|m| m.to_string()).collect();
        self
    }

    pub(crate) fn replying(self, deltas: &[&str]) -> Self {
        *self.script.lock().unwrap() = Script::Reply(deltas.iter().map(|d| d.to_string()).collect());
        self
    }

    pub(crate) fn failing_open(self, message: &str) -> Self {
        *self.script.lock().unwrap() = Script::FailOpen(message.to_string());
        self
    }

    pub(crate) fn channel(self) -> (Self, mpsc::UnboundedSender<crate::Result<String>>) {
        let (tx, rx) = mpsc::unbounded();
        *self.script.lock().unwrap() = Script::Channel(Some(rx));
        (self, tx)
    }

    pub(crate) fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub(crate) fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub(crate) fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl Backend for FakeBackend {
    fn kind(&self) -> ServiceKind {
        self.kind
    }

    async fn open_stream(&self, _messages: Vec<ChatMessage>, model: &str) -> crate::Result<DeltaStream> {
        self.opened.lock().unwrap().push(model.to_string());

        match &mut *self.script.lock().unwrap() {
            Script::Reply(deltas) => Ok(Box::pin(stream::iter(deltas.clone().into_iter().map(Ok)))),
            Script::FailOpen(message) => Err(LlmError::ConnectionError(message.clone())),
            Script::Channel(rx) => match rx.take() {
                Some(rx) => Ok(Box::pin(rx)),
                None => Err(LlmError::InternalError(None)),
            },
        }
    }

    async fn is_available(&self, _test_model: Option<&str>) -> bool {
        self.probes.fetch_add(1, Ordering::SeqCst);
        self.available.load(Ordering::SeqCst)
    }

    async fn list_models(&self) -> Vec<String> {
        self.listed.clone()
    }
}

/// Hands out registered fake backends keyed by the configured `host`, or `base_url`
/// for hosted services. A key of `invalid` fails construction.
#[derive(Default)]
pub(crate) struct FakeFactory {
    backends: Mutex<HashMap<String, Arc<FakeBackend>>>,
}

impl FakeFactory {
    pub(crate) fn with(backends: Vec<(&str, FakeBackend)>) -> Arc<Self> {
        let factory = Self::default();

        for (key, backend) in backends {
            factory.register(key, backend);
        }

        Arc::new(factory)
    }

    pub(crate) fn register(&self, key: &str, backend: FakeBackend) -> Arc<FakeBackend> {
        let backend = Arc::new(backend);
        self.backends.lock().unwrap().insert(key.to_string(), backend.clone());
        backend
    }

    pub(crate) fn backend(&self, key: &str) -> Arc<FakeBackend> {
        self.backends.lock().unwrap()[key].clone()
    }
}

impl BackendFactory for FakeFactory {
    fn build(&self, _kind: ServiceKind, config: &ConnectionConfig) -> crate::Result<Arc<dyn Backend>> {
        let key = config
            .host
            .as_deref()
            .or(config.base_url.as_deref())
            .unwrap_or_default();

        if key == "invalid" {
            return Err(LlmError::ConfigInvalid(format!("'{key}' is not a valid URL")));
        }

        match self.backends.lock().unwrap().get(key) {
            Some(backend) => Ok(backend.clone()),
            None => Err(LlmError::ConfigInvalid(format!("no fake backend for '{key}'"))),
        }
    }
}

pub(crate) fn local(host: &str, models: &[&str]) -> ServiceEntry {
    ServiceEntry::new(
        ServiceKind::Local,
        ConnectionConfig {
            host: Some(host.to_string()),
            models: models.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        },
    )
}

pub(crate) fn hosted(base_url: &str, models: &[&str]) -> ServiceEntry {
    ServiceEntry::new(
        ServiceKind::Hosted,
        ConnectionConfig {
            base_url: Some(base_url.to_string()),
            api_key: Some("sk-test".to_string().into()),
            models: models.iter().map(|m| m.to_string()).collect(),
            ..Default::default()
        },
    )
}
