//! Parses an application's declarative manifest, the Rust shape of the
//! original `YamlConfig`: a map of named service definitions.

use std::collections::HashMap;

use mcloud_shared::{McloudError, McloudResult};
use serde::{Deserialize, Deserializer};

/// A service's `wait` field: disabled, or a number of seconds to wait for
/// a readiness line before applying the start-timeout policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Wait {
    Disabled,
    Seconds(f64),
}

impl Default for Wait {
    fn default() -> Self {
        Wait::Disabled
    }
}

impl<'de> Deserialize<'de> for Wait {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        match value {
            serde_json::Value::Bool(false) => Ok(Wait::Disabled),
            serde_json::Value::Bool(true) => Ok(Wait::Seconds(0.0)),
            serde_json::Value::Number(n) => Ok(Wait::Seconds(n.as_f64().unwrap_or(0.0))),
            other => Err(serde::de::Error::custom(format!("invalid `wait` value: {other:?}"))),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceDef {
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub ports: Vec<String>,
    #[serde(default)]
    pub volumes: Vec<String>,
    #[serde(default)]
    pub volumes_from: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
    #[serde(default)]
    pub wait: Wait,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct RawManifest {
    #[serde(default)]
    services: HashMap<String, ServiceDef>,
    #[serde(default)]
    hosts: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub services: HashMap<String, ServiceDef>,
    /// Extra hostnames the manifest asks to have resolvable inside services,
    /// surfaced verbatim by the `config` task.
    pub hosts: Vec<String>,
}

impl Manifest {
    /// `name` is unqualified (no `.app` suffix).
    pub fn get_service(&self, name: &str) -> Option<&ServiceDef> {
        self.services.get(name)
    }

    pub fn volumes(&self) -> Vec<&str> {
        self.services
            .values()
            .flat_map(|s| s.volumes.iter().map(String::as_str))
            .collect()
    }
}

pub trait ManifestParser: Send + Sync {
    /// Parse manifest `source` text for an application named `app_name`.
    fn parse(&self, source: &str, app_name: &str) -> McloudResult<Manifest>;
}

/// Reference parser for the YAML manifest format.
pub struct YamlManifestParser;

impl ManifestParser for YamlManifestParser {
    fn parse(&self, source: &str, app_name: &str) -> McloudResult<Manifest> {
        let raw: RawManifest = serde_yaml::from_str(source)?;
        if raw.services.is_empty() {
            return Err(McloudError::ConfigParseError(format!(
                "manifest for '{app_name}' declares no services"
            )));
        }
        Ok(Manifest { services: raw.services, hosts: raw.hosts })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_services_and_wait_variants() {
        let yaml = r#"
services:
  web:
    image: nginx:latest
    ports: ["80:80"]
    wait: 5
  worker:
    image: worker:latest
    wait: false
"#;
        let manifest = YamlManifestParser.parse(yaml, "demo").unwrap();
        assert_eq!(manifest.services.len(), 2);
        assert_eq!(manifest.get_service("web").unwrap().wait, Wait::Seconds(5.0));
        assert_eq!(manifest.get_service("worker").unwrap().wait, Wait::Disabled);
    }

    #[test]
    fn empty_manifest_is_a_parse_error() {
        let result = YamlManifestParser.parse("services: {}", "demo");
        assert!(matches!(result, Err(McloudError::ConfigParseError(_))));
    }

    #[test]
    fn malformed_yaml_is_a_parse_error() {
        let result = YamlManifestParser.parse("not: valid: yaml: [", "demo");
        assert!(result.is_err());
    }
}
