mod mapping;

use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use config::{ConnectionConfig, ServiceEntry, ServiceKind, ServicesRecord};
use futures::lock::Mutex;
use indexmap::IndexMap;
use mini_moka::sync::Cache;
use serde::Serialize;

pub use self::mapping::ModelMapping;
use crate::{
    backend::{Backend, BackendFactory},
    error::LlmError,
    store::ConfigStore,
};

/// Outcome of adding or enabling a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceReport {
    pub service_id: String,
    pub available: bool,
    pub models: Vec<String>,
}

/// Outcome of probing a configuration without saving it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestReport {
    pub available: bool,
    pub models: Vec<String>,
    /// Hosted only: whether the endpoint answered a model listing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint_supports_model_list: Option<bool>,
    /// Hosted only: whether the probe used operator supplied models.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tested_with_user_models: Option<bool>,
}

/// An immutable routing table: the service record, one backend per enabled service
/// that could be constructed, and the model mapping derived from those.
pub struct Routing {
    record: ServicesRecord,
    backends: HashMap<String, Arc<dyn Backend>>,
    mapping: ModelMapping,
}

impl Routing {
    fn build(record: ServicesRecord, factory: &dyn BackendFactory) -> Self {
        let mut backends = HashMap::new();

        for (id, entry) in record.services.iter().filter(|(_, entry)| entry.enabled) {
            match factory.build(entry.kind, &entry.config) {
                Ok(backend) => {
                    backends.insert(id.clone(), backend);
                }
                Err(e) => log::warn!("Skipping service '{id}': {e}"),
            }
        }

        let mapping = ModelMapping::build(record.services.iter().filter(|(id, _)| backends.contains_key(*id)));

        log::debug!(
            "Routing table built with {} services, {} live backends and {} model routes",
            record.services.len(),
            backends.len(),
            mapping.len()
        );

        Self {
            record,
            backends,
            mapping,
        }
    }

    pub fn record(&self) -> &ServicesRecord {
        &self.record
    }

    pub fn services(&self) -> &IndexMap<String, ServiceEntry> {
        &self.record.services
    }

    pub fn default_model(&self) -> Option<&str> {
        self.record.default_model.as_deref()
    }

    pub fn mapping(&self) -> &ModelMapping {
        &self.mapping
    }

    pub fn backend(&self, service_id: &str) -> Option<&Arc<dyn Backend>> {
        self.backends.get(service_id)
    }

    /// The service and backend serving a model, if any.
    pub fn resolve(&self, model: &str) -> Option<(&str, &Arc<dyn Backend>)> {
        let service_id = self.mapping.resolve(model)?;
        let backend = self.backends.get(service_id)?;

        Some((service_id, backend))
    }
}

/// The authoritative set of configured services and the routing table derived from them.
///
/// Readers take a snapshot and never wait on mutations. Mutations are serialized, build
/// a complete new routing table, persist it through the [`ConfigStore`] and only then
/// swap it in. A failed save leaves the registry untouched.
pub struct ServiceRegistry {
    factory: Arc<dyn BackendFactory>,
    store: Arc<dyn ConfigStore>,
    routing: RwLock<Arc<Routing>>,
    mutations: Mutex<()>,
    probes: Cache<String, bool>,
}

impl ServiceRegistry {
    pub fn new(
        record: ServicesRecord,
        factory: Arc<dyn BackendFactory>,
        store: Arc<dyn ConfigStore>,
        probe_ttl: Duration,
    ) -> Self {
        let routing = Routing::build(record, factory.as_ref());

        Self {
            factory,
            store,
            routing: RwLock::new(Arc::new(routing)),
            mutations: Mutex::new(()),
            probes: Cache::builder().time_to_live(probe_ttl).build(),
        }
    }

    /// The current routing table.
    pub fn snapshot(&self) -> Arc<Routing> {
        self.routing.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub(crate) fn probes(&self) -> &Cache<String, bool> {
        &self.probes
    }

    /// Probes a configuration and stores it under `service_id`, replacing any existing
    /// service with that id.
    ///
    /// A service that fails its probe is stored disabled and never becomes routable
    /// until it is enabled again.
    pub async fn add_service(
        &self,
        service_id: &str,
        kind: ServiceKind,
        config: ConnectionConfig,
    ) -> crate::Result<ServiceReport> {
        if service_id.trim().is_empty() {
            return Err(LlmError::InvalidRequest("service id must not be empty".to_string()));
        }

        let backend = self.factory.build(kind, &config)?;
        let (available, models) = probe(kind, &config, backend.as_ref()).await;

        let mut entry = ServiceEntry::new(kind, config);
        entry.enabled = available;

        let _guard = self.mutations.lock().await;
        let mut record = self.snapshot().record().clone();

        record.services.insert(service_id.to_string(), entry);
        self.commit(record).await?;

        if available {
            log::info!("Service '{service_id}' ({kind}) added");
        } else {
            log::warn!("Service '{service_id}' ({kind}) added but kept disabled: availability probe failed");
        }

        Ok(ServiceReport {
            service_id: service_id.to_string(),
            available,
            models,
        })
    }

    /// Removes a service. Returns whether it existed; removing an unknown id changes nothing.
    pub async fn remove_service(&self, service_id: &str) -> crate::Result<bool> {
        let _guard = self.mutations.lock().await;
        let mut record = self.snapshot().record().clone();

        if record.services.shift_remove(service_id).is_none() {
            log::debug!("Service '{service_id}' is not configured, nothing to remove");
            return Ok(false);
        }

        self.commit(record).await?;
        log::info!("Service '{service_id}' removed");

        Ok(true)
    }

    /// Probes a configuration without storing it.
    ///
    /// Hosted APIs are probed with the first operator supplied model when there is one,
    /// and with the first model the endpoint lists otherwise.
    pub async fn test_service(&self, kind: ServiceKind, config: &ConnectionConfig) -> crate::Result<TestReport> {
        let backend = self.factory.build(kind, config)?;

        let report = match kind {
            ServiceKind::Local => {
                let available = backend.is_available(None).await;
                let models = if available { backend.list_models().await } else { Vec::new() };

                TestReport {
                    available,
                    models,
                    endpoint_supports_model_list: None,
                    tested_with_user_models: None,
                }
            }
            ServiceKind::Hosted => {
                let discovered = backend.list_models().await;
                let tested_with_user_models = !config.models.is_empty();

                let candidates = if tested_with_user_models {
                    config.models.clone()
                } else {
                    discovered.clone()
                };

                let available = match candidates.first() {
                    Some(model) => backend.is_available(Some(model)).await,
                    None => false,
                };

                TestReport {
                    available,
                    models: candidates,
                    endpoint_supports_model_list: Some(!discovered.is_empty()),
                    tested_with_user_models: Some(tested_with_user_models),
                }
            }
        };

        log::debug!("Tested {kind} service configuration: available = {}", report.available);

        Ok(report)
    }

    /// Sets the model used when a request names none. The model must resolve to a backend
    /// the inventory reports as available.
    pub async fn set_default_model(&self, model: &str) -> crate::Result<()> {
        let service_id = self
            .snapshot()
            .resolve(model)
            .map(|(service_id, _)| service_id.to_string())
            .ok_or_else(|| LlmError::ModelNotFound(model.to_string()))?;

        if !self.is_model_available(model).await {
            log::warn!("Refusing default model '{model}': service '{service_id}' is not available");
            return Err(LlmError::AdapterUnavailable { service: service_id });
        }

        let _guard = self.mutations.lock().await;
        let routing = self.snapshot();

        // The serving service may have been removed while we were probing.
        if routing.resolve(model).is_none() {
            return Err(LlmError::ModelNotFound(model.to_string()));
        }

        let mut record = routing.record().clone();
        record.default_model = Some(model.to_string());

        self.commit(record).await?;
        log::info!("Default model set to '{model}'");

        Ok(())
    }

    /// Enables or disables a service. Enabling probes the service first.
    pub async fn set_service_enabled(&self, service_id: &str, enabled: bool) -> crate::Result<ServiceReport> {
        let entry = self
            .snapshot()
            .services()
            .get(service_id)
            .cloned()
            .ok_or_else(|| LlmError::ServiceNotFound(service_id.to_string()))?;

        let models = if enabled {
            let backend = self.factory.build(entry.kind, &entry.config)?;
            let (available, models) = probe(entry.kind, &entry.config, backend.as_ref()).await;

            if !available {
                return Err(LlmError::AdapterUnavailable {
                    service: service_id.to_string(),
                });
            }

            models
        } else {
            entry.config.models.clone()
        };

        let _guard = self.mutations.lock().await;
        let mut record = self.snapshot().record().clone();

        // The service may have been removed while we were probing.
        let current = record
            .services
            .get_mut(service_id)
            .ok_or_else(|| LlmError::ServiceNotFound(service_id.to_string()))?;

        current.enabled = enabled;
        self.commit(record).await?;

        log::info!(
            "Service '{service_id}' {}",
            if enabled { "enabled" } else { "disabled" }
        );

        Ok(ServiceReport {
            service_id: service_id.to_string(),
            available: enabled,
            models,
        })
    }

    /// Reconstructs every backend from the current record and forgets cached probe results.
    pub async fn refresh(&self) {
        let _guard = self.mutations.lock().await;
        let record = self.snapshot().record().clone();

        self.install(Routing::build(record, self.factory.as_ref()));
        log::debug!("Routing table refreshed");
    }

    async fn commit(&self, record: ServicesRecord) -> crate::Result<()> {
        let routing = Routing::build(record, self.factory.as_ref());

        // Stores may touch the filesystem, keep that off the async workers.
        let store = self.store.clone();
        let saved = routing.record().clone();

        tokio::task::spawn_blocking(move || store.save(&saved))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|result| result)
            .map_err(|e| {
                log::error!("Failed to persist service configuration: {e:#}");
                LlmError::PersistFailed(e.to_string())
            })?;

        self.install(routing);

        Ok(())
    }

    fn install(&self, routing: Routing) {
        *self.routing.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(routing);
        self.probes.invalidate_all();
    }
}

/// Probes a freshly built backend. Local runtimes report what they have installed, hosted
/// APIs report the operator's model list.
async fn probe(kind: ServiceKind, config: &ConnectionConfig, backend: &dyn Backend) -> (bool, Vec<String>) {
    let test_model = config.models.first().map(String::as_str);
    let available = backend.is_available(test_model).await;

    let models = match kind {
        ServiceKind::Local if available => backend.list_models().await,
        ServiceKind::Local => Vec::new(),
        ServiceKind::Hosted => config.models.clone(),
    };

    (available, models)
}
