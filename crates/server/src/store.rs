use std::{
    fs,
    io::ErrorKind,
    path::PathBuf,
};

use anyhow::Context;
use config::ServicesRecord;
use llm::ConfigStore;

/// Persists the service record as a JSON document.
///
/// Saves go to a sibling temporary file which is then renamed over the target, so a
/// crash never leaves a half written record behind.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// A store backed by the file at `path`. The file does not need to exist yet.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Reads the stored record. Returns `None` when nothing was saved yet.
    pub fn load(&self) -> anyhow::Result<Option<ServicesRecord>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e).with_context(|| format!("Failed to read {}", self.path.display())),
        };

        let record = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse service record in {}", self.path.display()))?;

        Ok(Some(record))
    }
}

impl ConfigStore for JsonFileStore {
    fn save(&self, record: &ServicesRecord) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| format!("Failed to create {}", parent.display()))?;
        }

        let json = serde_json::to_vec_pretty(record)?;
        let staging = self.path.with_extension("json.tmp");

        fs::write(&staging, json).with_context(|| format!("Failed to write {}", staging.display()))?;
        fs::rename(&staging, &self.path).with_context(|| format!("Failed to replace {}", self.path.display()))?;

        log::debug!("Service record saved to {}", self.path.display());

        Ok(())
    }
}
