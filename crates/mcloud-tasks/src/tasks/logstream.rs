//! Long-running streaming tasks: `logs` follows a service's raw log
//! stream until the caller's ticket is cancelled or the container goes
//! away; `run` executes a one-off command inside it. Grounded in
//! `TaskService.task_logs`/`task_run`.

use std::sync::Arc;

use mcloud_process::is_stream_header_frame;
use mcloud_registry::TaskContext;
use mcloud_shared::{McloudError, McloudResult};
use serde_json::{Map, Value};

use crate::args::{opt_str_vec, require_str};
use crate::engine::TaskEngine;
use crate::resolve::split_required_service;

pub async fn task_logs(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let reference = require_str(&args, &kwargs, 0, "ref")?;
    let (service_name, app_name) = split_required_service(&reference)?;

    let (_app, services) = engine.load_services(&app_name).await?;
    let service = services
        .into_iter()
        .find(|s| s.name() == service_name)
        .ok_or_else(|| McloudError::NotFound(format!("{service_name}.{app_name}")))?;

    let mut rx = match service.logs(Some(100)).await {
        Ok(rx) => rx,
        Err(McloudError::ContainerMissing) => {
            ctx.log("Container not found by name.");
            return Ok(Value::Null);
        }
        Err(e) => return Err(e),
    };

    while let Some(chunk) = rx.recv().await {
        if is_stream_header_frame(&chunk) {
            continue;
        }
        ctx.log(String::from_utf8_lossy(&chunk).into_owned());
    }

    Ok(Value::Null)
}

pub async fn task_run(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let command = opt_str_vec(&args, &kwargs, 1, "command");
    let (service_name, app_name) = split_required_service(&name)?;

    let (_app, services) = engine.load_services(&app_name).await?;
    let service = services
        .into_iter()
        .find(|s| s.name() == service_name)
        .ok_or_else(|| McloudError::NotFound(format!("{service_name}.{app_name}")))?;

    match service.run(&command).await {
        Ok(()) => Ok(Value::Null),
        Err(McloudError::ContainerMissing) => {
            ctx.log("Container not found by name.");
            Ok(Value::Null)
        }
        Err(e) => Err(e),
    }
}
