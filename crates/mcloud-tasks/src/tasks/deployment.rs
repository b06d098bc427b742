//! Deployment bookkeeping: listing/creating/updating/removing named target
//! environments, and reading the one an application resolves to. Grounded
//! in `mcloud.deployment`'s wire commands, unified onto a plain `bool`
//! success return per [`mcloud_store::DeploymentController`]'s contract.

use std::sync::Arc;

use mcloud_registry::TaskContext;
use mcloud_shared::{McloudError, McloudResult};
use mcloud_store::DeploymentRecord;
use serde_json::{Map, Value};

use crate::args::{opt_bool, opt_str, require_str};
use crate::engine::TaskEngine;

pub async fn task_deployments(engine: Arc<TaskEngine>, _ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>) -> McloudResult<Value> {
    Ok(serde_json::to_value(engine.deployments.list().await?)?)
}

pub async fn task_deployment_info(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = opt_str(&args, &kwargs, 0, "name");
    let result = match name {
        Some(name) => engine.deployments.get(&name).await,
        None => engine.deployments.get_default().await,
    };
    match result {
        Ok(deployment) => Ok(serde_json::to_value(deployment)?),
        Err(McloudError::NotFound(_)) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}

pub async fn task_app_deployment_info(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let app = engine.apps.get(&name).await?;
    match engine.deployments.get(&app.record.deployment).await {
        Ok(deployment) => Ok(serde_json::to_value(deployment)?),
        Err(McloudError::NotFound(_)) => Ok(Value::Null),
        Err(e) => Err(e),
    }
}

pub async fn task_deployment_create(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let is_local = opt_bool(&args, &kwargs, 1, "is_local", false);
    let host = opt_str(&args, &kwargs, 2, "host").unwrap_or_default();

    let created = engine
        .deployments
        .create(DeploymentRecord { name, is_local, host, public_app: None, public_domain: None })
        .await?;
    Ok(Value::Bool(created))
}

pub async fn task_deployment_update(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let mut partial = kwargs;
    partial.remove("name");
    let updated = engine.deployments.update(&name, Value::Object(partial)).await?;
    Ok(Value::Bool(updated))
}

pub async fn task_deployment_remove(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    Ok(Value::Bool(engine.deployments.remove(&name).await?))
}

pub async fn task_deployment_set_default(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    Ok(Value::Bool(engine.deployments.set_default(&name).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcloud_shared::{ClientId, InMemoryKvStore, TicketId};
    use mcloud_store::{ApplicationRecord, ApplicationStore, InMemoryDeploymentController, InMemoryEngine, YamlManifestParser};
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
        TaskContext::new(TicketId(1), ClientId::new(), Arc::new(EventBus::new()))
    }

    #[tokio::test]
    async fn create_then_list_round_trips() {
        let engine = test_engine();
        task_deployment_create(Arc::clone(&engine), ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        let listed = task_deployments(engine, ctx(), vec![], Map::new()).await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn info_without_a_name_resolves_the_default() {
        let engine = test_engine();
        task_deployment_create(Arc::clone(&engine), ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        let info = task_deployment_info(engine, ctx(), vec![], Map::new()).await.unwrap();
        assert_eq!(info["name"], "local");
    }

    #[tokio::test]
    async fn info_for_an_unknown_deployment_is_null_not_an_error() {
        let engine = test_engine();
        let info = task_deployment_info(engine, ctx(), vec![Value::from("ghost")], Map::new()).await.unwrap();
        assert_eq!(info, Value::Null);
    }

    #[tokio::test]
    async fn app_deployment_info_follows_the_application_s_deployment() {
        let engine = test_engine();
        task_deployment_create(Arc::clone(&engine), ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        engine
            .apps
            .create(
                "demo",
                ApplicationRecord {
                    path: None,
                    source: Some("services:\n  web:\n    image: nginx:latest\n".into()),
                    env: Default::default(),
                    deployment: "local".into(),
                },
                false,
            )
            .await
            .unwrap();
        let info = task_app_deployment_info(engine, ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(info["name"], "local");
    }

    #[tokio::test]
    async fn update_and_remove_round_trip() {
        let engine = test_engine();
        task_deployment_create(Arc::clone(&engine), ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        let mut kwargs = Map::new();
        kwargs.insert("name".into(), Value::from("local"));
        kwargs.insert("host".into(), Value::from("remote.example.com"));
        task_deployment_update(Arc::clone(&engine), ctx(), vec![], kwargs).await.unwrap();
        let info = task_deployment_info(Arc::clone(&engine), ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        assert_eq!(info["host"], "remote.example.com");

        let removed = task_deployment_remove(engine, ctx(), vec![Value::from("local")], Map::new()).await.unwrap();
        assert_eq!(removed, Value::Bool(true));
    }
}
