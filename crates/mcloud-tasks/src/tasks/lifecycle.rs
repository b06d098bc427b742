//! Service lifecycle tasks: create/start/stop/destroy/restart/rebuild and
//! the read-only `inspect`. `task_start` is the flagship handler, grounded
//! in `TaskService.task_start`'s create-then-wait-for-readiness sequence,
//! including the dedicated log follower that turns a `"@mcloud ready in "`
//! line into an `api.<service>.ready` event.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use mcloud_process::is_stream_header_frame;
use mcloud_registry::TaskContext;
use mcloud_service::Service;
use mcloud_shared::{McloudError, McloudResult};
use mcloud_store::Wait;
use serde_json::{json, Map, Value};
use tokio_util::sync::CancellationToken;

use crate::args::{opt_bool, require_str};
use crate::engine::TaskEngine;
use crate::resolve::{qualifies, split_optional_service};

/// The floor a requested wait is raised to when it's positive but tiny, and
/// the sleep used when a service doesn't wait for readiness at all.
const MIN_WAIT_SECONDS: f64 = 0.2;
/// Ceiling applied to an overly long wait, logged as a warning: the original
/// had no such ceiling, but an unbounded per-service wait would pin a ticket
/// (and its log follower) open indefinitely on a service that never prints
/// its readiness line.
const MAX_WAIT_SECONDS: f64 = 3600.0;

fn select_services(services: Vec<Service>, filter: Option<&str>, app_name: &str) -> Vec<Service> {
    services
        .into_iter()
        .filter(|s| qualifies(filter, app_name, &s.qualified()))
        .collect()
}

pub async fn task_create(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let (filter, app_name) = split_optional_service(&name);
    let (_app, services) = engine.load_services(&app_name).await?;
    let mut services = select_services(services, filter.as_deref(), &app_name);

    for service in services.iter_mut() {
        if !service.is_created()? {
            ctx.log(format!("Service {} is not created. Creating.", service.qualified()));
            service.create().await?;
        } else {
            ctx.log(format!("Service {} is already created.", service.qualified()));
        }
    }
    Ok(Value::String("Done.".into()))
}

pub async fn task_start(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let (filter, app_name) = split_optional_service(&name);
    let (_app, services) = engine.load_services(&app_name).await?;
    let mut services = select_services(services, filter.as_deref(), &app_name);

    for service in services.iter_mut() {
        if !service.is_created()? {
            ctx.log(format!("Service {} is not created. Creating.", service.qualified()));
            service.create().await?;
        }

        if service.is_running()? {
            ctx.log(format!("Service {} is already running.", service.qualified()));
            continue;
        }

        ctx.log(format!("Service {} is not running. Starting.", service.qualified()));
        service.start().await?;

        match service.wait() {
            Wait::Disabled => {
                tokio::time::sleep(Duration::from_secs_f64(MIN_WAIT_SECONDS)).await;
            }
            Wait::Seconds(requested) => {
                wait_for_ready(service, &ctx, requested).await?;
            }
        }
    }

    ctx.events.fire("containers-updated", Value::Null);
    Ok(Value::String("Done.".into()))
}

/// `requested == 0` means "wait forever"; a positive value under
/// [`MIN_WAIT_SECONDS`] is raised to it, and anything over
/// [`MAX_WAIT_SECONDS`] is clamped down with a warning. Both ends of this
/// reconcile the original's blanket `if wait <= 0: wait = 0.2` with the
/// documented "zero means unlimited" contract.
fn clamp_wait(requested: f64, ctx: &TaskContext) -> f64 {
    if requested == 0.0 {
        0.0
    } else if requested < MIN_WAIT_SECONDS {
        MIN_WAIT_SECONDS
    } else if requested > MAX_WAIT_SECONDS {
        tracing::warn!(requested, "wait clamped to the maximum to avoid an unbounded log follower");
        ctx.log("WARN: wait is too high, forcibly set to 3600s to prevent memory leaks");
        MAX_WAIT_SECONDS
    } else {
        requested
    }
}

async fn wait_for_ready(service: &mut Service, ctx: &TaskContext, requested: f64) -> McloudResult<()> {
    let effective_wait = clamp_wait(requested, ctx);

    let cancel = CancellationToken::new();
    let follower = spawn_log_follower(service, ctx.clone(), cancel.clone()).await?;

    let cancel_on_failure = cancel.clone();
    let failure_channel = format!("task.failure.{}", ctx.ticket_id);
    let failure_sub = ctx.events.once(failure_channel, move |_channel, _data| {
        cancel_on_failure.cancel();
    });

    ctx.log(if effective_wait == 0.0 {
        "Waiting for container to start without timeout.".to_string()
    } else {
        format!("Waiting for container to start with timeout {effective_wait}s.")
    });

    let ready_channel = format!("api.{}.*", service.name());
    let outcome = ctx.events.wait_for_event(&ready_channel, effective_wait).await;

    let still_running = match outcome {
        Ok(payload) => {
            let settle = ready_sleep_seconds(&payload);
            ctx.log(format!("Container is waiting {settle}s to make sure it's started."));
            tokio::time::sleep(Duration::from_secs_f64(settle)).await;
            service.inspect().await?;
            service.is_running()?
        }
        Err(McloudError::Timeout { .. }) => {
            ctx.log(format!("{effective_wait} seconds passed."));
            service.inspect().await?;
            service.is_running()?
        }
        Err(e) => {
            cancel.cancel();
            ctx.events.unsubscribe(failure_sub);
            let _ = follower.await;
            return Err(e);
        }
    };

    cancel.cancel();
    ctx.events.unsubscribe(failure_sub);
    let _ = follower.await;

    if still_running {
        ctx.log("Container still up. Continue execution.");
        Ok(())
    } else {
        ctx.log("FATAL: service is not running. Stopping application execution.");
        Err(McloudError::Internal("False".into()))
    }
}

/// The readiness line is `"@mcloud ready in <N>s"`: `ARG1` is the literal
/// word `"in"`, `ARG2` the duration to additionally settle for. Anything
/// that doesn't parse that way falls back to a short fixed settle.
fn ready_sleep_seconds(payload: &Value) -> f64 {
    let Some(args) = payload.as_array() else {
        return 0.5;
    };
    if args.len() != 2 {
        return 0.5;
    }
    let (Some(first), Some(second)) = (args[0].as_str(), args[1].as_str()) else {
        return 0.5;
    };
    if first != "in" {
        return 0.5;
    }
    second.strip_suffix('s').and_then(|n| n.parse::<f64>().ok()).unwrap_or(0.5)
}

/// Follows a freshly started service's raw log stream until cancelled,
/// filtering the 8-byte multiplexed-stream header frames Docker-style
/// engines interleave and forwarding everything else as ticket progress,
/// except for the one line that instead fires the service's readiness
/// event.
async fn spawn_log_follower(service: &Service, ctx: TaskContext, cancel: CancellationToken) -> McloudResult<tokio::task::JoinHandle<()>> {
    let mut rx = service.logs(None).await?;
    let service_name = service.name().to_string();
    Ok(tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                chunk = rx.recv() => {
                    let Some(chunk) = chunk else { break };
                    if is_stream_header_frame(&chunk) {
                        continue;
                    }
                    let text = String::from_utf8_lossy(&chunk).into_owned();
                    if let Some(rest) = text.strip_prefix("@mcloud ready in ") {
                        let args: Vec<Value> = rest
                            .trim_end_matches(['\n', '\r'])
                            .split(' ')
                            .filter(|s| !s.is_empty())
                            .map(|s| Value::String(s.to_string()))
                            .collect();
                        ctx.events.fire(&format!("api.{service_name}.ready"), Value::Array(args));
                    } else {
                        ctx.log(text);
                    }
                }
            }
        }
    }))
}

pub async fn task_stop(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let (filter, app_name) = split_optional_service(&name);
    let (_app, services) = engine.load_services(&app_name).await?;
    let mut services = select_services(services, filter.as_deref(), &app_name);

    let results = join_all(services.iter_mut().map(|service| {
        let ctx = ctx.clone();
        async move {
            if service.is_running()? {
                ctx.log(format!("Service {} is running. Stopping.", service.qualified()));
                service.stop().await
            } else {
                ctx.log(format!("Service {} is already stopped.", service.qualified()));
                Ok(())
            }
        }
    }))
    .await;
    for result in results {
        result?;
    }
    Ok(Value::String("Done.".into()))
}

pub async fn task_destroy(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let name = require_str(&args, &kwargs, 0, "name")?;
    let scrub_data = opt_bool(&args, &kwargs, 1, "scrub_data", false);
    let (filter, app_name) = split_optional_service(&name);

    let (_app, services) = match engine.load_services(&app_name).await {
        Ok(loaded) => loaded,
        Err(McloudError::ConfigParseError(message)) => {
            ctx.log("Application location does not exist, use remove command to remove application");
            ctx.log(message);
            return Ok(Value::String("Done.".into()));
        }
        Err(e) => return Err(e),
    };
    let mut services = select_services(services, filter.as_deref(), &app_name);

    let home_dir = engine.settings.home_dir.clone();
    let results = join_all(services.iter_mut().map(|service| {
        let ctx = ctx.clone();
        let home_dir = home_dir.clone();
        async move {
            if service.is_created()? {
                ctx.log(format!("Destroying container: {}", service.qualified()));
                service.destroy().await?;
            } else {
                ctx.log(format!("Service {} container is not yet created.", service.qualified()));
            }

            if scrub_data {
                let dir = std::path::PathBuf::from(&home_dir).join("volumes").join(service.name());
                if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                    tokio::fs::remove_dir_all(&dir).await?;
                    ctx.log(format!("Removed dir: {}", dir.display()));
                } else {
                    ctx.log("Nothing to remove");
                }
            }
            Ok::<(), McloudError>(())
        }
    }))
    .await;
    for result in results {
        result?;
    }
    Ok(Value::String("Done.".into()))
}

pub async fn task_restart(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    task_stop(Arc::clone(&engine), ctx.clone(), args.clone(), kwargs.clone()).await?;
    task_start(engine, ctx, args, kwargs).await
}

pub async fn task_rebuild(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    task_destroy(Arc::clone(&engine), ctx.clone(), args.clone(), kwargs.clone()).await?;
    task_start(engine, ctx, args, kwargs).await
}

pub async fn task_inspect(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let app_name = require_str(&args, &kwargs, 0, "name")?;
    let service_name = require_str(&args, &kwargs, 1, "service_name")?;
    ctx.log(format!("Inspecting application service {service_name}"));

    let (_app, services) = engine.load_services(&app_name).await?;
    let qualified = format!("{service_name}.{app_name}");
    let service = services
        .into_iter()
        .find(|s| s.qualified() == qualified)
        .ok_or_else(|| McloudError::NotFound(qualified.clone()))?;

    if !service.is_created()? {
        return Ok(Value::String("Not created".into()));
    }

    Ok(json!({
        "is_created": service.is_created()?,
        "is_running": service.is_running()?,
        "ip": service.ip(),
        "ports": service.ports(),
        "started_at": service.started_at(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcloud_shared::{ClientId, InMemoryKvStore, TicketId};
    use mcloud_store::{ApplicationStore, ContainerEngine, InMemoryDeploymentController, InMemoryEngine, YamlManifestParser};
    use mcloud_transport::EventBus;

    /// Like [`test_engine`] but also hands back the concrete
    /// [`InMemoryEngine`] so a test can queue log lines or flip a
    /// container's running state out of band.
    fn test_engine_with_container_engine() -> (Arc<TaskEngine>, Arc<InMemoryEngine>) {
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
        let engine = Arc::new(TaskEngine::new(
            apps,
            kv,
            parser,
            container_engine.clone(),
            deployments,
            mcloud_shared::Settings::default(),
        ));
        (engine, container_engine)
    }

    async fn seed_waiting_service(engine: &Arc<TaskEngine>, wait_seconds: f64) {
        engine
            .apps
            .create(
                "demo",
                mcloud_store::ApplicationRecord {
                    path: None,
                    source: Some(format!("services:\n  web:\n    image: nginx:latest\n    wait: {wait_seconds}\n")),
                    env: Default::default(),
                    deployment: "local".into(),
                },
                false,
            )
            .await
            .unwrap();
    }

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

    async fn seed(engine: &Arc<TaskEngine>) {
        engine
            .apps
            .create(
                "demo",
                mcloud_store::ApplicationRecord {
                    path: None,
                    source: Some("services:\n  web:\n    image: nginx:latest\n    wait: false\n".into()),
                    env: Default::default(),
                    deployment: "local".into(),
                },
                false,
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn start_creates_and_starts_a_non_waiting_service() {
        let engine = test_engine();
        seed(&engine).await;
        let result = task_start(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));

        let (_app, services) = engine.load_services("demo").await.unwrap();
        assert!(services[0].is_running().unwrap());
    }

    #[tokio::test]
    async fn stop_on_a_not_running_service_is_a_no_op() {
        let engine = test_engine();
        seed(&engine).await;
        let result = task_stop(engine, ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));
    }

    #[tokio::test]
    async fn destroy_without_manifest_access_reports_done_instead_of_failing() {
        let engine = test_engine();
        engine
            .apps
            .create(
                "ghost",
                mcloud_store::ApplicationRecord {
                    path: Some("/does/not/exist".into()),
                    source: None,
                    env: Default::default(),
                    deployment: "local".into(),
                },
                true,
            )
            .await
            .unwrap();
        let result = task_destroy(engine, ctx(), vec![Value::from("ghost")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));
    }

    #[tokio::test]
    async fn restart_stops_then_starts() {
        let engine = test_engine();
        seed(&engine).await;
        task_start(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        let result = task_restart(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));
        let (_app, services) = engine.load_services("demo").await.unwrap();
        assert!(services[0].is_running().unwrap());
    }

    #[tokio::test]
    async fn inspect_reports_not_created_before_start() {
        let engine = test_engine();
        seed(&engine).await;
        let result = task_inspect(engine, ctx(), vec![Value::from("demo"), Value::from("web")], Map::new())
            .await
            .unwrap();
        assert_eq!(result, Value::String("Not created".into()));
    }

    #[tokio::test]
    async fn inspect_reports_live_state_after_start() {
        let engine = test_engine();
        seed(&engine).await;
        task_start(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        let result = task_inspect(engine, ctx(), vec![Value::from("demo"), Value::from("web")], Map::new())
            .await
            .unwrap();
        assert_eq!(result["is_running"], Value::Bool(true));
    }

    #[test]
    fn wait_clamp_treats_zero_as_unlimited() {
        let ctx = ctx();
        assert_eq!(clamp_wait(0.0, &ctx), 0.0);
        assert_eq!(clamp_wait(0.05, &ctx), MIN_WAIT_SECONDS);
        assert_eq!(clamp_wait(10.0, &ctx), 10.0);
        assert_eq!(clamp_wait(999_999.0, &ctx), MAX_WAIT_SECONDS);
    }

    #[test]
    fn ready_sleep_parses_the_readiness_payload() {
        let payload = Value::Array(vec![Value::String("in".into()), Value::String("2.5s".into())]);
        assert_eq!(ready_sleep_seconds(&payload), 2.5);
        assert_eq!(ready_sleep_seconds(&Value::Array(vec![])), 0.5);
    }

    /// Scenario 4 of the design's end-to-end list: a service whose logs
    /// print the readiness line resolves before its wait timeout elapses.
    #[tokio::test]
    async fn start_resolves_on_the_readiness_line() {
        let (engine, container_engine) = test_engine_with_container_engine();
        seed_waiting_service(&engine, 5.0).await;
        container_engine.set_logs("demo_web", vec![b"@mcloud ready in in 0.01s\n".to_vec()]);

        let result = task_start(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));

        let (_app, services) = engine.load_services("demo").await.unwrap();
        assert!(services[0].is_running().unwrap());
    }

    /// Scenario 5: no readiness line arrives before the wait elapses, but
    /// the container is still up — the handler logs and continues rather
    /// than failing.
    #[tokio::test]
    async fn start_timeout_with_container_still_up_is_not_fatal() {
        let (engine, _container_engine) = test_engine_with_container_engine();
        seed_waiting_service(&engine, MIN_WAIT_SECONDS).await;

        let result = task_start(Arc::clone(&engine), ctx(), vec![Value::from("demo")], Map::new()).await.unwrap();
        assert_eq!(result, Value::String("Done.".into()));
    }

    /// Scenario 6: the wait elapses and the container has since died —
    /// the handler resolves fatally instead of continuing.
    #[tokio::test]
    async fn start_timeout_with_container_dead_is_fatal() {
        let (engine, container_engine) = test_engine_with_container_engine();
        seed_waiting_service(&engine, 0.3).await;

        let running = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { task_start(engine, ctx(), vec![Value::from("demo")], Map::new()).await }
        });
        tokio::time::sleep(Duration::from_millis(50)).await;
        container_engine.stop("demo_web").await.unwrap();

        let result = running.await.unwrap();
        assert!(matches!(result, Err(McloudError::Internal(_))));
    }
}
