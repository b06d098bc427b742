//! Application bookkeeping tasks that don't touch container lifecycle:
//! init/update/remove, variable storage, and read-only status/config
//! views. Grounded in `TaskService.task_init` through `task_status`.

use std::sync::Arc;

use mcloud_registry::TaskContext;
use mcloud_shared::{McloudError, McloudResult};
use mcloud_store::ApplicationRecord;
use serde_json::{json, Map, Value};

use crate::args::{opt_env, opt_str, opt_str_vec, require_str};
use crate::engine::TaskEngine;
use crate::support::run_process_to_completion;
use crate::tasks::lifecycle;

pub async fn task_help(_engine: Arc<TaskEngine>, _ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>) -> McloudResult<Value> {
    Ok(Value::String("mcloud task engine".into()))
}

/// `path` is accepted for wire compatibility with the original call
/// signature but unused: every application's manifest resolves from
/// exactly one of `path`/`source`, and `config` (the inline manifest
/// text) is mandatory here, so the created record always stores it as
/// `source`.
pub async fn task_init(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let _path = opt_str(&args, &kwargs, 1, "path");
    let config = opt_str(&args, &kwargs, 2, "config");
    let env = opt_env(&args, &kwargs, 3, "env");
    let deployment = opt_str(&args, &kwargs, 4, "deployment")
        .filter(|d| !d.is_empty())
        .ok_or_else(|| McloudError::ValueError("Deployment name is required!".into()))?;

    match engine.apps.get(&name).await {
        Ok(_) => return Err(McloudError::ValueError("Application already exist".into())),
        Err(McloudError::NotFound(_)) => {}
        Err(e) => return Err(e),
    }

    let config = config.ok_or_else(|| McloudError::ValueError("config must be provided to create an application".into()))?;

    let record = ApplicationRecord {
        path: None,
        source: Some(config),
        env,
        deployment,
    };
    engine.apps.create(&name, record, false).await?;
    Ok(Value::Bool(true))
}

pub async fn task_update(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let config = opt_str(&args, &kwargs, 1, "config");
    let env = opt_env(&args, &kwargs, 2, "env");

    let mut partial = Map::new();
    if let Some(config) = config {
        partial.insert("source".into(), Value::String(config));
        partial.insert("path".into(), Value::Null);
    }
    if !env.is_empty() {
        partial.insert("env".into(), serde_json::to_value(env)?);
    }
    engine.apps.update(&name, partial).await?;

    let apps = engine.apps.list().await?;
    Ok(Value::Array(apps))
}

pub async fn task_list(engine: Arc<TaskEngine>, _ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>) -> McloudResult<Value> {
    Ok(Value::Array(engine.apps.list().await?))
}

pub async fn task_list_volumes(engine: Arc<TaskEngine>, _ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>) -> McloudResult<Value> {
    Ok(Value::Array(engine.apps.list_volumes().await?))
}

pub async fn task_list_vars(engine: Arc<TaskEngine>, _ctx: TaskContext, _args: Vec<Value>, _kwargs: Map<String, Value>) -> McloudResult<Value> {
    let vars = engine.kv.hgetall("vars").await?;
    Ok(Value::Object(vars.into_iter().map(|(k, v)| (k, Value::String(v))).collect()))
}

pub async fn task_set_var(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let val = require_str(&args, &kwargs, 1, "val")?;
    engine.kv.hset("vars", &name, val).await?;
    task_list_vars(engine, ctx, vec![], Map::new()).await
}

pub async fn task_rm_var(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    engine.kv.hdel("vars", &name).await?;
    task_list_vars(engine, ctx, vec![], Map::new()).await
}

pub async fn task_remove(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let mut scrub_kwargs = Map::new();
    scrub_kwargs.insert("scrub_data".into(), Value::Bool(true));
    lifecycle::task_destroy(Arc::clone(&engine), ctx, vec![Value::String(name.clone())], scrub_kwargs).await?;
    engine.apps.remove(&name).await?;
    Ok(Value::String("Done.".into()))
}

pub async fn task_set_deployment(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let app = require_str(&args, &kwargs, 0, "app")?;
    let deployment = require_str(&args, &kwargs, 1, "deployment")?;
    let mut partial = Map::new();
    partial.insert("deployment".into(), Value::String(deployment));
    engine.apps.update(&app, partial).await?;
    Ok(Value::String("Done.".into()))
}

pub async fn task_config(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let app = engine.apps.get(&name).await?;
    let manifest = app.manifest(&*engine.parser).await?;

    Ok(json!({
        "path": app.record.path,
        "env": app.record.env,
        "source": app.record.source.clone().unwrap_or_default(),
        "hosts": manifest.hosts,
        "volumes": manifest.volumes(),
    }))
}

pub async fn task_status(engine: Arc<TaskEngine>, _ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let (_app, services) = engine.load_services(&name).await?;

    let mut data = Vec::with_capacity(services.len());
    for service in &services {
        let running = service.is_running()?;
        data.push(json!([service.qualified(), running, running]));
    }
    Ok(Value::Array(data))
}

pub async fn task_machine(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let command = opt_str_vec(&args, &kwargs, 0, "command");
    let vars = engine.kv.hgetall("vars").await?;

    let mut argv = vec!["docker-machine".to_string()];
    argv.extend(command);
    let env: Vec<(String, String)> = vars.into_iter().collect();

    run_process_to_completion(&ctx, argv, None, env).await?;
    engine.deployments.configure_docker_machine(&Default::default()).await?;
    Ok(Value::Bool(true))
}
