//! The container-engine collaborator: image build/pull, container
//! lifecycle, and log streaming. Grounded in `mcloud.txdocker.IDockerClient`
//! (create/start/stop/destroy/inspect, raising `NotFound` for a missing
//! container — mapped here to [`McloudError::ContainerMissing`]).

use std::collections::HashMap;

use async_trait::async_trait;
use dashmap::DashMap;
use mcloud_shared::McloudResult;
use tokio::sync::mpsc;

use crate::manifest::ServiceDef;

#[derive(Debug, Clone, Default)]
pub struct ContainerInspection {
    pub is_created: bool,
    pub is_running: bool,
    pub ip: Option<String>,
    pub ports: HashMap<String, u16>,
    pub started_at: Option<String>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Never fails on a missing container: reports `is_created = false`.
    async fn inspect(&self, container_name: &str) -> McloudResult<ContainerInspection>;
    async fn create(&self, container_name: &str, def: &ServiceDef) -> McloudResult<()>;
    async fn start(&self, container_name: &str) -> McloudResult<()>;
    async fn stop(&self, container_name: &str) -> McloudResult<()>;
    async fn destroy(&self, container_name: &str) -> McloudResult<()>;
    async fn pause(&self, container_name: &str) -> McloudResult<()>;
    async fn unpause(&self, container_name: &str) -> McloudResult<()>;
    async fn run(&self, container_name: &str, cmd: &[String]) -> McloudResult<()>;
    /// Streams raw log chunks until the receiver is dropped or the
    /// container disappears, in which case the channel is simply closed.
    async fn logs(&self, container_name: &str, tail: Option<u32>) -> McloudResult<mpsc::Receiver<Vec<u8>>>;
}

#[derive(Debug, Clone, Default)]
struct ContainerState {
    created: bool,
    running: bool,
    ports: HashMap<String, u16>,
}

type LogScript = Vec<Vec<u8>>;

/// Parses a manifest port entry (`"container_port"` or
/// `"host_port:container_port"`) into the `"<container_port>/tcp"` key
/// `ContainerInspection::ports` reports, published at the host port (or the
/// container port itself, when no explicit host mapping is given).
fn parse_port_mapping(spec: &str) -> Option<(String, u16)> {
    let (host_part, container_part) = spec.split_once(':').unwrap_or((spec, spec));
    let host_port: u16 = host_part.parse().ok()?;
    let container_port: u16 = container_part.parse().ok()?;
    Some((format!("{container_port}/tcp"), host_port))
}

/// Reference `ContainerEngine`: an in-process map standing in for a real
/// docker-compatible daemon. Used in tests and as a default so the rest of
/// the workspace can be exercised without a container runtime.
#[derive(Default)]
pub struct InMemoryEngine {
    containers: DashMap<String, ContainerState>,
    scripts: DashMap<String, LogScript>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues `chunks` to be delivered, in order, to whoever calls
    /// `logs(container_name, ...)` next. Lets tests drive the start
    /// task's readiness protocol (a `"@mcloud ready in ..."` line, or
    /// silence to exercise the timeout branches) without a real engine.
    pub fn set_logs(&self, container_name: impl Into<String>, chunks: Vec<Vec<u8>>) {
        self.scripts.insert(container_name.into(), chunks);
    }
}

#[async_trait]
impl ContainerEngine for InMemoryEngine {
    async fn inspect(&self, container_name: &str) -> McloudResult<ContainerInspection> {
        let state = self.containers.get(container_name);
        Ok(match state {
            Some(state) => ContainerInspection {
                is_created: state.created,
                is_running: state.running,
                ip: state.running.then(|| "127.0.0.1".to_string()),
                ports: state.ports.clone(),
                started_at: None,
            },
            None => ContainerInspection::default(),
        })
    }

    async fn create(&self, container_name: &str, def: &ServiceDef) -> McloudResult<()> {
        let ports = def.ports.iter().filter_map(|spec| parse_port_mapping(spec)).collect();
        self.containers.insert(
            container_name.to_string(),
            ContainerState { created: true, running: false, ports },
        );
        Ok(())
    }

    async fn start(&self, container_name: &str) -> McloudResult<()> {
        let mut state = self
            .containers
            .get_mut(container_name)
            .ok_or(mcloud_shared::McloudError::ContainerMissing)?;
        state.running = true;
        Ok(())
    }

    async fn stop(&self, container_name: &str) -> McloudResult<()> {
        let mut state = self
            .containers
            .get_mut(container_name)
            .ok_or(mcloud_shared::McloudError::ContainerMissing)?;
        state.running = false;
        Ok(())
    }

    async fn destroy(&self, container_name: &str) -> McloudResult<()> {
        self.containers
            .remove(container_name)
            .ok_or(mcloud_shared::McloudError::ContainerMissing)?;
        Ok(())
    }

    async fn pause(&self, container_name: &str) -> McloudResult<()> {
        if !self.containers.contains_key(container_name) {
            return Err(mcloud_shared::McloudError::ContainerMissing);
        }
        Ok(())
    }

    async fn unpause(&self, container_name: &str) -> McloudResult<()> {
        if !self.containers.contains_key(container_name) {
            return Err(mcloud_shared::McloudError::ContainerMissing);
        }
        Ok(())
    }

    async fn run(&self, container_name: &str, _cmd: &[String]) -> McloudResult<()> {
        if !self.containers.contains_key(container_name) {
            return Err(mcloud_shared::McloudError::ContainerMissing);
        }
        Ok(())
    }

    async fn logs(&self, container_name: &str, _tail: Option<u32>) -> McloudResult<mpsc::Receiver<Vec<u8>>> {
        if !self.containers.contains_key(container_name) {
            return Err(mcloud_shared::McloudError::ContainerMissing);
        }
        let chunks = self.scripts.get(container_name).map(|s| s.clone()).unwrap_or_default();
        let (tx, rx) = mpsc::channel(chunks.len().max(1));
        for chunk in chunks {
            // Bounded by the channel capacity above, so this never blocks.
            let _ = tx.try_send(chunk);
        }
        Ok(rx)
    }
}
