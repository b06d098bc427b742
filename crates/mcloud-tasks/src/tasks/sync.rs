//! Volume sync: spins up a transient rsync container over either a bare
//! application path or one service's named volume, and returns the
//! credentials a caller needs to reach it. Grounded in
//! `TaskService.task_sync`/`task_sync_stop`.

use std::collections::HashMap;
use std::sync::Arc;

use mcloud_registry::TaskContext;
use mcloud_shared::{McloudError, McloudResult};
use mcloud_store::{ServiceDef, Wait};
use serde_json::{json, Map, Value};

use crate::args::{opt_str, require_str};
use crate::engine::TaskEngine;

const USERNAME_PASSWORD_LEN: usize = 32;
const USERNAME_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";
const PASSWORD_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

/// Draws from `charset` using only `rand::random`, the one part of the
/// crate's surface that has stayed stable across its major revisions.
fn random_string(charset: &[u8], len: usize) -> String {
    (0..len)
        .map(|_| {
            let idx = rand::random::<usize>() % charset.len();
            charset[idx] as char
        })
        .collect()
}

pub async fn task_sync(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let app_name = require_str(&args, &kwargs, 0, "app_name")?;
    let service_name = opt_str(&args, &kwargs, 1, "service_name");
    let volume = opt_str(&args, &kwargs, 2, "volume");

    let app = engine.apps.get(&app_name).await?;
    let manifest = app.manifest(&*engine.parser).await?;

    let (volumes, volumes_from, volume_name) = if let Some(service_name) = &service_name {
        let volume = volume
            .clone()
            .ok_or_else(|| McloudError::VolumeNotFound("In case of service name is provided, volume name is mandatory!".into()))?;
        let def = manifest
            .get_service(service_name)
            .ok_or_else(|| McloudError::VolumeNotFound(format!("Service with name {service_name} was not found!")))?;
        if !def.volumes.iter().any(|v| v == &volume) {
            return Err(McloudError::VolumeNotFound(format!("Volume with name {volume} not found!")));
        }
        (Vec::new(), vec![format!("{service_name}.{app_name}")], volume)
    } else {
        (vec![app.record.path.clone().unwrap_or_default()], Vec::new(), "/volume".to_string())
    };

    let username = random_string(USERNAME_CHARS, USERNAME_PASSWORD_LEN);
    let password = random_string(PASSWORD_CHARS, USERNAME_PASSWORD_LEN);
    let mut env = HashMap::new();
    env.insert("USERNAME".to_string(), username);
    env.insert("PASSWORD".to_string(), password);
    env.insert("ALLOW".to_string(), "*".to_string());

    let def = ServiceDef {
        image: "modera/rsync".to_string(),
        ports: vec!["873".to_string()],
        volumes,
        volumes_from,
        env: env.clone(),
        wait: Wait::Disabled,
    };

    let container_name = format!("{app_name}__rsync_{}", ctx.ticket_id);
    engine.engine.create(&container_name, &def).await?;
    engine.engine.start(&container_name).await?;
    ctx.log(format!("Started sync container {container_name}."));

    let inspection = engine.engine.inspect(&container_name).await?;
    let port = inspection
        .ports
        .get("873/tcp")
        .copied()
        .ok_or_else(|| McloudError::Internal("rsync container did not publish port 873/tcp".into()))?;

    let deployment = engine.deployments.get(&app.record.deployment).await?;

    Ok(json!({
        "env": env,
        "container": container_name,
        "host": deployment.effective_host(),
        "port": port,
        "volume": volume_name,
        "ticket_id": ctx.ticket_id.0,
    }))
}

pub async fn task_sync_stop(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let app_name = require_str(&args, &kwargs, 0, "app_name")?;
    let sync_ticket_id = require_str(&args, &kwargs, 1, "sync_ticket_id")?;
    let container_name = format!("{app_name}__rsync_{sync_ticket_id}");

    let inspection = engine.engine.inspect(&container_name).await?;
    if inspection.is_running {
        ctx.log("Stopping rsync container.");
        engine.engine.stop(&container_name).await?;
    }
    if inspection.is_created {
        ctx.log("Destroying rsync container.");
        engine.engine.destroy(&container_name).await?;
    }
    Ok(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcloud_shared::{ClientId, InMemoryKvStore, TicketId};
    use mcloud_store::{ApplicationRecord, ApplicationStore, DeploymentRecord, InMemoryDeploymentController, InMemoryEngine, YamlManifestParser};
    use mcloud_transport::EventBus;

    fn test_engine() -> Arc<TaskEngine> {
        let kv: Arc<dyn mcloud_shared::KvStore> = Arc::new(InMemoryKvStore::new());
        let parser = Arc::new(YamlManifestParser);
        let container_engine = Arc::new(InMemoryEngine::new());
        let deployments = Arc::new(InMemoryDeploymentController::new());
        let apps = Arc::new(ApplicationStore::new(
            Arc::clone(&kv),
            parser.clone(),
            container_engine.clone(),
            "mcloud.local",
        ));
        Arc::new(TaskEngine::new(apps, kv, parser, container_engine, deployments, mcloud_shared::Settings::default()))
    }

    fn ctx() -> TaskContext {
        TaskContext::new(TicketId(42), ClientId::new(), Arc::new(EventBus::new()))
    }

    async fn seed(engine: &Arc<TaskEngine>) {
        engine.deployments.create(DeploymentRecord { name: "local".into(), is_local: true, ..Default::default() }).await.unwrap();
        engine
            .apps
            .create(
                "demo",
                ApplicationRecord {
                    path: Some("/srv/demo".into()),
                    source: None,
                    env: Default::default(),
                    deployment: "local".into(),
                },
                true,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn sync_without_a_service_mounts_the_app_path() {
        let engine = test_engine();
        seed(&engine).await;
        let result = task_sync(engine, ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result["volume"], "/volume");
        assert_eq!(result["host"], "me");
        assert_eq!(result["port"], 873);
        assert_eq!(result["container"], "demo__rsync_42");
    }

    #[tokio::test]
    async fn sync_with_an_unknown_volume_is_rejected() {
        let engine = test_engine();
        engine.deployments.create(DeploymentRecord { name: "local".into(), is_local: true, ..Default::default() }).await.unwrap();
        engine
            .apps
            .create(
                "demo",
                ApplicationRecord {
                    path: None,
                    source: Some("services:\n  web:\n    image: nginx:latest\n    volumes: [\"/data\"]\n".into()),
                    env: Default::default(),
                    deployment: "local".into(),
                },
                false,
            )
            .await
            .unwrap();
        let mut kwargs = Map::new();
        kwargs.insert("service_name".into(), Value::from("web"));
        kwargs.insert("volume".into(), Value::from("/nope"));
        let result = task_sync(engine, ctx(), vec![Value::from("demo")], kwargs).await;
        assert!(matches!(result, Err(McloudError::VolumeNotFound(_))));
    }

    #[tokio::test]
    async fn sync_stop_tears_down_the_transient_container() {
        let engine = test_engine();
        seed(&engine).await;
        task_sync(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        task_sync_stop(Arc::clone(&engine), ctx(), vec![Value::from("demo"), Value::from(42)], Map::new())
            .await
            .unwrap();
        let inspection = engine.engine.inspect("demo__rsync_42").await.unwrap();
        assert!(!inspection.is_created);
    }
}
