//! The deployment collaborator: named target environments, each owning a
//! reverse-proxy publication table. Grounded in `mcloud.deployment`'s
//! import in `tasks.py` and the wire contract in §6 of the design notes.
//! Per the unification decided there, every mutating operation returns a
//! plain success `bool` instead of mixing `bool` and `None`.

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use mcloud_shared::{McloudError, McloudResult, TicketId};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub name: String,
    #[serde(default)]
    pub is_local: bool,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub public_app: Option<String>,
    #[serde(default)]
    pub public_domain: Option<String>,
}

impl DeploymentRecord {
    /// The original's `local → host = "me"` rule.
    pub fn effective_host(&self) -> &str {
        if self.is_local {
            "me"
        } else {
            &self.host
        }
    }
}

#[async_trait]
pub trait DeploymentController: Send + Sync {
    async fn list(&self) -> McloudResult<Vec<DeploymentRecord>>;
    async fn get(&self, name: &str) -> McloudResult<DeploymentRecord>;
    async fn get_default(&self) -> McloudResult<DeploymentRecord>;
    async fn create(&self, record: DeploymentRecord) -> McloudResult<bool>;
    async fn update(&self, name: &str, partial: serde_json::Value) -> McloudResult<bool>;
    async fn remove(&self, name: &str) -> McloudResult<bool>;
    async fn set_default(&self, name: &str) -> McloudResult<bool>;
    async fn publish_app(
        &self,
        deployment: &str,
        domain: &str,
        app: &str,
        service: &str,
        custom_port: Option<u16>,
        ticket_id: TicketId,
    ) -> McloudResult<bool>;
    async fn unpublish_app(&self, deployment: &str, app: &str) -> McloudResult<bool>;
    async fn configure_docker_machine(&self, vars: &HashMap<String, String>) -> McloudResult<bool>;
}

#[derive(Default)]
pub struct InMemoryDeploymentController {
    records: DashMap<String, DeploymentRecord>,
    default_name: Mutex<Option<String>>,
}

impl InMemoryDeploymentController {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DeploymentController for InMemoryDeploymentController {
    async fn list(&self) -> McloudResult<Vec<DeploymentRecord>> {
        Ok(self.records.iter().map(|r| r.value().clone()).collect())
    }

    async fn get(&self, name: &str) -> McloudResult<DeploymentRecord> {
        self.records
            .get(name)
            .map(|r| r.clone())
            .ok_or_else(|| McloudError::NotFound(name.to_string()))
    }

    async fn get_default(&self) -> McloudResult<DeploymentRecord> {
        let name = self
            .default_name
            .lock()
            .await
            .clone()
            .ok_or_else(|| McloudError::NotFound("no default deployment set".into()))?;
        self.get(&name).await
    }

    async fn create(&self, record: DeploymentRecord) -> McloudResult<bool> {
        let is_first = self.records.is_empty();
        self.records.insert(record.name.clone(), record.clone());
        if is_first {
            *self.default_name.lock().await = Some(record.name);
        }
        Ok(true)
    }

    async fn update(&self, name: &str, partial: serde_json::Value) -> McloudResult<bool> {
        let mut record = self.get(name).await?;
        if let Some(host) = partial.get("host").and_then(|v| v.as_str()) {
            record.host = host.to_string();
        }
        if let Some(public_app) = partial.get("public_app").and_then(|v| v.as_str()) {
            record.public_app = Some(public_app.to_string());
        }
        if let Some(public_domain) = partial.get("public_domain").and_then(|v| v.as_str()) {
            record.public_domain = Some(public_domain.to_string());
        }
        self.records.insert(name.to_string(), record);
        Ok(true)
    }

    async fn remove(&self, name: &str) -> McloudResult<bool> {
        Ok(self.records.remove(name).is_some())
    }

    async fn set_default(&self, name: &str) -> McloudResult<bool> {
        self.get(name).await?;
        *self.default_name.lock().await = Some(name.to_string());
        Ok(true)
    }

    async fn publish_app(
        &self,
        deployment: &str,
        domain: &str,
        app: &str,
        _service: &str,
        _custom_port: Option<u16>,
        _ticket_id: TicketId,
    ) -> McloudResult<bool> {
        let mut record = self.get(deployment).await?;
        record.public_app = Some(app.to_string());
        record.public_domain = Some(domain.to_string());
        self.records.insert(deployment.to_string(), record);
        Ok(true)
    }

    async fn unpublish_app(&self, deployment: &str, _app: &str) -> McloudResult<bool> {
        let mut record = self.get(deployment).await?;
        record.public_app = None;
        record.public_domain = None;
        self.records.insert(deployment.to_string(), record);
        Ok(true)
    }

    async fn configure_docker_machine(&self, _vars: &HashMap<String, String>) -> McloudResult<bool> {
        Ok(true)
    }
}
