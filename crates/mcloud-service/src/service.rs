//! `Service`: the lifecycle state machine over one container, the Rust
//! shape of the original `mcloud.service.Service` as driven by `tasks.py`.
//! States: `absent → created → running`, plus transient `paused`.

use std::collections::HashMap;
use std::sync::Arc;

use mcloud_shared::{McloudError, McloudResult};
use mcloud_store::{ContainerEngine, ContainerInspection, ServiceDef};
use tokio::sync::mpsc;

pub struct Service {
    app: String,
    name: String,
    def: ServiceDef,
    engine: Arc<dyn ContainerEngine>,
    inspected: bool,
    is_created: bool,
    is_running: bool,
    inspection: Option<ContainerInspection>,
}

impl Service {
    pub fn new(app: impl Into<String>, name: impl Into<String>, def: ServiceDef, engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            app: app.into(),
            name: name.into(),
            def,
            engine,
            inspected: false,
            is_created: false,
            is_running: false,
            inspection: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `service.app`.
    pub fn qualified(&self) -> String {
        format!("{}.{}", self.name, self.app)
    }

    pub fn container_name(&self) -> String {
        format!("{}_{}", self.app, self.name)
    }

    pub fn wait(&self) -> mcloud_store::Wait {
        self.def.wait
    }

    pub fn volumes(&self) -> &[String] {
        &self.def.volumes
    }

    pub fn volumes_from(&self) -> &[String] {
        &self.def.volumes_from
    }

    fn require_inspected(&self) -> McloudResult<()> {
        if self.inspected {
            Ok(())
        } else {
            Err(McloudError::Internal(format!(
                "service '{}' queried before inspect()",
                self.qualified()
            )))
        }
    }

    pub fn is_created(&self) -> McloudResult<bool> {
        self.require_inspected()?;
        Ok(self.is_created)
    }

    pub fn is_running(&self) -> McloudResult<bool> {
        self.require_inspected()?;
        Ok(self.is_running)
    }

    pub fn ip(&self) -> Option<&str> {
        self.inspection.as_ref().and_then(|i| i.ip.as_deref())
    }

    /// `"<container_port>/tcp" -> host_port`, populated by `inspect()`.
    pub fn ports(&self) -> HashMap<String, u16> {
        self.inspection.as_ref().map(|i| i.ports.clone()).unwrap_or_default()
    }

    pub fn started_at(&self) -> Option<&str> {
        self.inspection.as_ref().and_then(|i| i.started_at.as_deref())
    }

    /// Populates `is_created`/`is_running`; required before the other
    /// queries above.
    pub async fn inspect(&mut self) -> McloudResult<()> {
        let inspection = self.engine.inspect(&self.container_name()).await?;
        self.is_created = inspection.is_created;
        self.is_running = inspection.is_running;
        self.inspection = Some(inspection);
        self.inspected = true;
        Ok(())
    }

    pub async fn create(&mut self) -> McloudResult<()> {
        self.engine.create(&self.container_name(), &self.def).await?;
        self.is_created = true;
        Ok(())
    }

    pub async fn start(&mut self) -> McloudResult<()> {
        self.engine.start(&self.container_name()).await?;
        self.is_running = true;
        Ok(())
    }

    pub async fn stop(&mut self) -> McloudResult<()> {
        self.engine.stop(&self.container_name()).await?;
        self.is_running = false;
        Ok(())
    }

    pub async fn destroy(&mut self) -> McloudResult<()> {
        if self.is_running {
            self.stop().await?;
        }
        self.engine.destroy(&self.container_name()).await?;
        self.is_created = false;
        Ok(())
    }

    pub async fn pause(&mut self) -> McloudResult<()> {
        self.engine.pause(&self.container_name()).await
    }

    pub async fn unpause(&mut self) -> McloudResult<()> {
        self.engine.unpause(&self.container_name()).await
    }

    pub async fn run(&self, cmd: &[String]) -> McloudResult<()> {
        self.engine.run(&self.container_name(), cmd).await
    }

    pub async fn logs(&self, tail: Option<u32>) -> McloudResult<mpsc::Receiver<Vec<u8>>> {
        self.engine.logs(&self.container_name(), tail).await
    }
}
