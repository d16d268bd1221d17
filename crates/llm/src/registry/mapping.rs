use std::collections::HashMap;

use config::{ServiceEntry, strip_tag};

/// Model name to service id.
///
/// Every model of an enabled service is reachable under its literal name and under its
/// tag-stripped name. Services are applied in order, so on a collision the later
/// service wins.
#[derive(Debug, Clone, Default)]
pub struct ModelMapping {
    routes: HashMap<String, String>,
}

impl ModelMapping {
    pub fn build<'a>(services: impl IntoIterator<Item = (&'a String, &'a ServiceEntry)>) -> Self {
        let mut routes = HashMap::new();

        for (id, entry) in services {
            if !entry.enabled {
                continue;
            }

            for model in &entry.config.models {
                routes.insert(model.clone(), id.clone());
                routes.insert(strip_tag(model).to_string(), id.clone());
            }
        }

        Self { routes }
    }

    /// Service id for a model, by literal name first and then by tag-stripped name.
    pub fn resolve(&self, model: &str) -> Option<&str> {
        self.routes
            .get(model)
            .or_else(|| self.routes.get(strip_tag(model)))
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
