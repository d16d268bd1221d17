use config::{ServiceEntry, ServiceKind, strip_tag};
use futures::{StreamExt, stream::FuturesUnordered};
use indexmap::IndexMap;
use serde::Serialize;

use crate::registry::ServiceRegistry;

/// Every configured service with its health, and every configured model.
#[derive(Debug, Serialize)]
pub struct Inventory {
    pub default_model: Option<String>,
    pub services: IndexMap<String, ServiceStatus>,
    pub all_models: Vec<ModelStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceState {
    /// A local runtime that answered its probe.
    Online,
    /// A local runtime that did not answer, or a service whose backend could not be built.
    Offline,
    /// A hosted API. Assumed reachable, probing it would cost tokens.
    Configured,
    Disabled,
}

#[derive(Debug, Serialize)]
pub struct ServiceStatus {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: ServiceKind,
    pub name: String,
    pub enabled: bool,
    pub available: bool,
    pub status: ServiceState,
    pub models: Vec<String>,
    pub config: ConnectionView,
}

/// Connection settings with the API key reduced to a flag.
#[derive(Debug, Serialize)]
pub struct ConnectionView {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    pub has_api_key: bool,
    pub accept_invalid_certs: bool,
}

impl From<&ServiceEntry> for ConnectionView {
    fn from(entry: &ServiceEntry) -> Self {
        Self {
            host: entry.config.host.clone(),
            base_url: entry.config.base_url.clone(),
            has_api_key: entry.config.api_key.is_some(),
            accept_invalid_certs: entry.config.accept_invalid_certs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModelStatus {
    pub id: String,
    pub name: String,
    pub provider: String,
    pub service: String,
    pub service_type: ServiceKind,
    pub available: bool,
    pub is_default: bool,
}

#[derive(Debug, Serialize)]
pub struct ModelHealth {
    pub model: String,
    pub service: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_type: Option<ServiceKind>,
    pub available: bool,
}

impl ServiceRegistry {
    /// Reports every configured service and model.
    ///
    /// Local runtimes are probed concurrently and their results reused for the probe
    /// cache lifetime. Hosted APIs are never probed here.
    pub async fn inventory(&self) -> Inventory {
        let routing = self.snapshot();
        let default_model = routing.default_model().map(str::to_string);

        let mut probes = routing
            .services()
            .iter()
            .filter(|(_, entry)| entry.enabled && entry.kind == ServiceKind::Local)
            .filter_map(|(id, entry)| {
                let backend = routing.backend(id)?.clone();
                let cache = self.probes().clone();
                let id = id.clone();
                let test_model = entry.config.models.first().cloned();

                Some(async move {
                    if let Some(available) = cache.get(&id) {
                        return (id, available);
                    }

                    let available = backend.is_available(test_model.as_deref()).await;
                    cache.insert(id.clone(), available);

                    (id, available)
                })
            })
            .collect::<FuturesUnordered<_>>();

        let mut local_health = std::collections::HashMap::new();

        while let Some((id, available)) = probes.next().await {
            local_health.insert(id, available);
        }

        let mut services = IndexMap::new();
        let mut all_models = Vec::new();

        for (id, entry) in routing.services() {
            let (status, available) = if !entry.enabled {
                (ServiceState::Disabled, false)
            } else if routing.backend(id).is_none() {
                (ServiceState::Offline, false)
            } else {
                match entry.kind {
                    ServiceKind::Hosted => (ServiceState::Configured, true),
                    ServiceKind::Local if local_health.get(id).copied().unwrap_or(false) => {
                        (ServiceState::Online, true)
                    }
                    ServiceKind::Local => (ServiceState::Offline, false),
                }
            };

            let name = entry.config.name.clone().unwrap_or_else(|| id.clone());

            if entry.enabled && routing.backend(id).is_some() {
                let provider = entry.display_name().into_owned();

                for model in &entry.config.models {
                    all_models.push(ModelStatus {
                        id: model.clone(),
                        name: model.clone(),
                        provider: provider.clone(),
                        service: id.clone(),
                        service_type: entry.kind,
                        available,
                        is_default: is_default(model, default_model.as_deref()),
                    });
                }
            }

            services.insert(
                id.clone(),
                ServiceStatus {
                    id: id.clone(),
                    kind: entry.kind,
                    name,
                    enabled: entry.enabled,
                    available,
                    status,
                    models: entry.config.models.clone(),
                    config: ConnectionView::from(entry),
                },
            );
        }

        Inventory {
            default_model,
            services,
            all_models,
        }
    }

    /// Whether the inventory lists `model`, by literal or tag-stripped id, as available.
    pub async fn is_model_available(&self, model: &str) -> bool {
        self.inventory()
            .await
            .all_models
            .iter()
            .any(|entry| entry.available && (entry.id == model || strip_tag(&entry.id) == model))
    }

    /// Probes the backend serving `model`. Costs a completion for hosted APIs.
    pub async fn model_health(&self, model: &str) -> ModelHealth {
        let routing = self.snapshot();

        let Some((service_id, backend)) = routing.resolve(model) else {
            return ModelHealth {
                model: model.to_string(),
                service: "unknown".to_string(),
                service_type: None,
                available: false,
            };
        };

        let available = backend.is_available(Some(model)).await;

        ModelHealth {
            model: model.to_string(),
            service: service_id.to_string(),
            service_type: Some(backend.kind()),
            available,
        }
    }

    /// Forgets cached local probe results.
    pub fn invalidate_probes(&self) {
        self.probes().invalidate_all();
    }
}

fn is_default(model: &str, default_model: Option<&str>) -> bool {
    default_model.is_some_and(|default| model == default || strip_tag(model) == default)
}
