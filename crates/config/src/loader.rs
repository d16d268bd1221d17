use std::{fmt::Write, path::Path, str::FromStr};

use anyhow::bail;
use serde::Deserialize;
use serde_dynamic_string::DynamicString;
use toml::Value;

use crate::{Config, strip_tag};

pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
    let path = path.as_ref().to_path_buf();
    let content = std::fs::read_to_string(&path)?;
    let mut raw_config: Value = toml::from_str(&content)?;

    expand_dynamic_strings(&mut Vec::new(), &mut raw_config)?;

    Ok(Config::deserialize(raw_config)?)
}

/// Collects warnings for configurations that are valid but probably not what was meant.
pub(crate) fn validate(config: &Config) -> Vec<String> {
    let mut warnings = Vec::new();

    if !config.llm.enabled() {
        return warnings;
    }

    if !config.llm.has_services() && config.llm.state_file.is_none() {
        warnings.push(indoc::formatdoc! {r#"
            No services configured. Chat requests will fail until a service is added, for example:

              [llm.services.ollama]
              type = "local"
              config = {{ host = "http://localhost:11434", models = ["llama3.2:latest"] }}
        "#});
    }

    for (id, entry) in &config.llm.services {
        if entry.enabled && entry.config.models.is_empty() {
            warnings.push(format!(
                "Service '{id}' lists no models and will not receive any requests."
            ));
        }
    }

    if let Some(default_model) = &config.llm.default_model {
        let listed = config
            .llm
            .services
            .values()
            .filter(|entry| entry.enabled)
            .flat_map(|entry| entry.config.models.iter())
            .any(|model| model == default_model || strip_tag(model) == default_model);

        if !listed {
            warnings.push(format!(
                "Default model '{default_model}' is not listed by any enabled service."
            ));
        }
    }

    warnings
}

fn expand_dynamic_strings<'a>(path: &mut Vec<Result<&'a str, usize>>, value: &'a mut Value) -> anyhow::Result<()> {
    match value {
        Value::String(s) => match DynamicString::<String>::from_str(s) {
            Ok(out) => *s = out.into_inner(),
            Err(err) => {
                let mut p = String::new();

                for segment in path {
                    match segment {
                        Ok(s) => {
                            p.push_str(s);
                            p.push('.');
                        }
                        Err(i) => write!(p, "[{i}]")?,
                    }
                }

                if p.ends_with('.') {
                    p.pop();
                }

                bail!("Failed to expand dynamic string at path '{p}': {err}");
            }
        },
        Value::Array(values) => {
            for (i, value) in values.iter_mut().enumerate() {
                path.push(Err(i));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Table(map) => {
            for (key, value) in map {
                path.push(Ok(key.as_str()));
                expand_dynamic_strings(path, value)?;
                path.pop();
            }
        }
        Value::Integer(_) | Value::Float(_) | Value::Boolean(_) | Value::Datetime(_) => (),
    }

    Ok(())
}
