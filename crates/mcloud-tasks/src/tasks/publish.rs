//! Publishing an application's service behind a deployment's reverse
//! proxy, and undoing it. Grounded in `TaskService.task_publish`/
//! `task_unpublish`.

use std::sync::Arc;

use mcloud_registry::TaskContext;
use mcloud_shared::McloudResult;
use serde_json::{Map, Value};

use crate::args::{opt_u16, require_str};
use crate::engine::TaskEngine;

pub async fn task_publish(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let domain_name = require_str(&args, &kwargs, 0, "domain_name")?;
    let app_name = require_str(&args, &kwargs, 1, "app_name")?;
    let service_name = require_str(&args, &kwargs, 2, "service_name")?;
    let custom_port = opt_u16(&args, &kwargs, 3, "custom_port");

    let app = engine.apps.get(&app_name).await?;
    engine
        .deployments
        .publish_app(&app.record.deployment, &domain_name, &app_name, &service_name, custom_port, ctx.ticket_id)
        .await?;
    ctx.log(format!("Published {app_name} at {domain_name}."));

    Ok(Value::Array(engine.apps.list().await?))
}

pub async fn task_unpublish(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let domain_name = require_str(&args, &kwargs, 0, "domain_name")?;
    let app_name = require_str(&args, &kwargs, 1, "app_name")?;

    let app = engine.apps.get(&app_name).await?;
    engine.deployments.unpublish_app(&app.record.deployment, &app_name).await?;
    ctx.log(format!("Unpublished {app_name} from {domain_name}."));

    Ok(Value::Array(engine.apps.list().await?))
}
