//! Application records and the store that persists them, grounded in
//! `mfcloud.application.Application`/`ApplicationController`.

use std::sync::Arc;

use futures::future::join_all;
use mcloud_shared::{McloudError, McloudResult};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::engine::ContainerEngine;
use crate::manifest::ManifestParser;
use mcloud_shared::KvStore;

const APPS_HASH: &str = "mcloud-apps";
const DEPLOYMENTS_HASH: &str = "mcloud-deployments";

/// Persisted, keyed by a unique application name.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default)]
    pub env: std::collections::HashMap<String, String>,
    pub deployment: String,
}

impl ApplicationRecord {
    /// Exactly one of `path`/`source`; `deployment` non-empty. The
    /// original constructs (but does not raise) an exception for a
    /// missing deployment name; this fails with `ValueError` instead.
    pub fn validate(&self) -> McloudResult<()> {
        if self.path.is_some() == self.source.is_some() {
            return Err(McloudError::ValueError(
                "exactly one of `path` or `source` is required".into(),
            ));
        }
        if self.deployment.is_empty() {
            return Err(McloudError::ValueError("Deployment name is required!".into()));
        }
        Ok(())
    }
}

pub struct Application {
    pub name: String,
    pub record: ApplicationRecord,
    pub public_url: Option<String>,
}

impl Application {
    pub fn new(name: impl Into<String>, record: ApplicationRecord, public_url: Option<String>) -> Self {
        Self { name: name.into(), record, public_url }
    }

    async fn manifest_source(&self) -> McloudResult<String> {
        if let Some(path) = &self.record.path {
            let file = format!("{}/mfcloud.yml", path.trim_end_matches('/'));
            tokio::fs::read_to_string(&file)
                .await
                .map_err(|e| McloudError::ConfigParseError(format!("reading {file}: {e}")))
        } else if let Some(source) = &self.record.source {
            Ok(source.clone())
        } else {
            Err(McloudError::ConfigParseError("Can not load config.".into()))
        }
    }

    /// Resolve and parse the manifest, propagating failures as errors
    /// rather than the error-shaped detail object `load` returns — for
    /// callers (the task engine) that need real `Service` definitions.
    pub async fn manifest(&self, parser: &dyn ManifestParser) -> McloudResult<crate::manifest::Manifest> {
        let source = self.manifest_source().await?;
        parser.parse(&source, &self.name)
    }

    /// Resolve the manifest and, for `need_details`, enrich it with live
    /// service state. Parse/read failures become an error-shaped detail
    /// object rather than a propagated error, matching the original's
    /// `except ValueError` branch in `Application.load`.
    pub async fn load(
        &self,
        parser: &dyn ManifestParser,
        engine: &dyn ContainerEngine,
        need_details: bool,
        dns_search_suffix: &str,
    ) -> Value {
        let source = match self.manifest_source().await {
            Ok(source) => source,
            Err(e) => return self.error_detail(&e.to_string()),
        };

        let manifest = match parser.parse(&source, &self.name) {
            Ok(manifest) => manifest,
            Err(e) => return self.error_detail(&e.to_string()),
        };

        let inspections = join_all(manifest.services.iter().map(|(svc_name, _def)| {
            let container_name = format!("{}_{}", self.name, svc_name);
            async move { (svc_name.clone(), engine.inspect(&container_name).await) }
        }))
        .await;

        if !need_details {
            return json!({
                "name": self.name,
                "services": manifest.services.keys().collect::<Vec<_>>(),
            });
        }

        let mut services = Vec::new();
        let mut running = true;
        let mut web_ip = None;
        let mut web_service = None;

        for (svc_name, inspection) in inspections {
            let inspection = inspection.unwrap_or_default();
            if !inspection.is_running {
                running = false;
            }
            let is_web = svc_name == "web";
            if is_web {
                web_ip = inspection.ip.clone();
                web_service = Some(svc_name.clone());
            }
            services.push(json!({
                "name": svc_name,
                "ip": inspection.ip,
                "ports": inspection.ports,
                "started_at": inspection.started_at,
                "fullname": format!("{}.{}", svc_name, dns_search_suffix),
                "is_web": is_web,
                "running": inspection.is_running,
                "created": inspection.is_created,
            }));
        }

        json!({
            "name": self.name,
            "fullname": format!("{}.{}", self.name, dns_search_suffix),
            "web_ip": web_ip,
            "web_service": web_service,
            "public_url": self.public_url,
            "services": services,
            "running": running,
            "status": if running { "RUNNING" } else { "STOPPED" },
        })
    }

    fn error_detail(&self, message: &str) -> Value {
        json!({
            "name": self.name,
            "services": [],
            "running": false,
            "status": "error",
            "message": message,
        })
    }
}

pub struct ApplicationStore {
    kv: Arc<dyn KvStore>,
    parser: Arc<dyn ManifestParser>,
    engine: Arc<dyn ContainerEngine>,
    dns_search_suffix: String,
}

impl ApplicationStore {
    pub fn new(
        kv: Arc<dyn KvStore>,
        parser: Arc<dyn ManifestParser>,
        engine: Arc<dyn ContainerEngine>,
        dns_search_suffix: impl Into<String>,
    ) -> Self {
        Self { kv, parser, engine, dns_search_suffix: dns_search_suffix.into() }
    }

    pub async fn create(&self, name: &str, record: ApplicationRecord, skip_validation: bool) -> McloudResult<Application> {
        record.validate()?;
        if self.kv.hget(APPS_HASH, name).await?.is_some() {
            return Err(McloudError::AlreadyExists(name.to_string()));
        }

        if !skip_validation {
            let probe = Application::new(name, record.clone(), None);
            let loaded = probe.load(&*self.parser, &*self.engine, false, &self.dns_search_suffix).await;
            if loaded.get("status").and_then(Value::as_str) == Some("error") {
                let message = loaded.get("message").and_then(Value::as_str).unwrap_or_default();
                return Err(McloudError::ConfigParseError(message.to_string()));
            }
        }

        let json = serde_json::to_string(&record)?;
        self.kv.hset(APPS_HASH, name, json).await?;
        Ok(Application::new(name, record, None))
    }

    pub async fn get(&self, name: &str) -> McloudResult<Application> {
        let raw = self
            .kv
            .hget(APPS_HASH, name)
            .await?
            .ok_or_else(|| McloudError::NotFound(name.to_string()))?;
        let record: ApplicationRecord = serde_json::from_str(&raw)?;
        Ok(Application::new(name, record, None))
    }

    pub async fn update(&self, name: &str, partial: Map<String, Value>) -> McloudResult<()> {
        let existing = self.get(name).await?;
        let mut merged = serde_json::to_value(&existing.record)?;
        if let Value::Object(existing_map) = &mut merged {
            for (key, value) in partial {
                existing_map.insert(key, value);
            }
        }
        let record: ApplicationRecord = serde_json::from_value(merged)?;
        record.validate()?;
        let json = serde_json::to_string(&record)?;
        self.kv.hset(APPS_HASH, name, json).await
    }

    pub async fn remove(&self, name: &str) -> McloudResult<()> {
        self.kv.hdel(APPS_HASH, name).await
    }

    /// Every declared volume across every stored application's manifest,
    /// grounded in the original `ApplicationController.volume_list`.
    /// Applications whose manifest can't currently be resolved are
    /// skipped rather than failing the whole listing.
    pub async fn list_volumes(&self) -> McloudResult<Vec<Value>> {
        let apps = self.kv.hgetall(APPS_HASH).await?;
        let mut volumes = Vec::new();
        for (name, raw) in apps {
            let Ok(record) = serde_json::from_str::<ApplicationRecord>(&raw) else { continue };
            let app = Application::new(&name, record, None);
            let Ok(manifest) = app.manifest(&*self.parser).await else { continue };
            for (service_name, def) in &manifest.services {
                if def.volumes.is_empty() {
                    continue;
                }
                volumes.push(json!({
                    "app": name,
                    "service": service_name,
                    "volumes": def.volumes,
                }));
            }
        }
        Ok(volumes)
    }

    /// Enrich every stored record with live service state and the
    /// `public_url` joined from the matching deployment's
    /// `public_app == name`.
    pub async fn list(&self) -> McloudResult<Vec<Value>> {
        let apps = self.kv.hgetall(APPS_HASH).await?;
        let deployments = self.kv.hgetall(DEPLOYMENTS_HASH).await?;

        let mut public_urls = std::collections::HashMap::new();
        for raw in deployments.values() {
            let Ok(dep) = serde_json::from_str::<Value>(raw) else { continue };
            if let (Some(public_app), Some(public_domain)) = (
                dep.get("public_app").and_then(Value::as_str),
                dep.get("public_domain").and_then(Value::as_str),
            ) {
                public_urls.insert(public_app.to_string(), public_domain.to_string());
            }
        }

        let mut details = Vec::with_capacity(apps.len());
        for (name, raw) in apps {
            let Ok(record) = serde_json::from_str::<ApplicationRecord>(&raw) else { continue };
            let public_url = public_urls.get(&name).cloned();
            let app = Application::new(&name, record, public_url);
            details.push(app.load(&*self.parser, &*self.engine, true, &self.dns_search_suffix).await);
        }
        Ok(details)
    }
}
