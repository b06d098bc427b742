//! Wires the store/service collaborators together and registers every
//! `task_*` handler by name, the Rust shape of the original
//! `TaskService.collect_tasks`'s reflective scan — made explicit per the
//! redesign note that favors a plain lookup table over reflection.

use std::sync::Arc;

use mcloud_registry::{HandlerRegistry, TaskContext};
use mcloud_shared::{KvStore, McloudResult, Settings};
use mcloud_store::{Application, ApplicationStore, ContainerEngine, DeploymentController, ManifestParser};
use mcloud_service::Service;
use serde_json::{Map, Value};

pub struct TaskEngine {
    pub apps: Arc<ApplicationStore>,
    pub kv: Arc<dyn KvStore>,
    pub parser: Arc<dyn ManifestParser>,
    pub engine: Arc<dyn ContainerEngine>,
    pub deployments: Arc<dyn DeploymentController>,
    pub settings: Settings,
}

impl TaskEngine {
    pub fn new(
        apps: Arc<ApplicationStore>,
        kv: Arc<dyn KvStore>,
        parser: Arc<dyn ManifestParser>,
        engine: Arc<dyn ContainerEngine>,
        deployments: Arc<dyn DeploymentController>,
        settings: Settings,
    ) -> Self {
        Self { apps, kv, parser, engine, deployments, settings }
    }

    /// Loads `app_name`'s application record and every service its
    /// manifest declares, each already `inspect()`-ed so lifecycle tasks
    /// can query `is_created`/`is_running` directly, the way the original
    /// assumed `config.get_services()` already carried fresh state.
    pub async fn load_services(&self, app_name: &str) -> McloudResult<(Application, Vec<Service>)> {
        let app = self.apps.get(app_name).await?;
        let manifest = app.manifest(&*self.parser).await?;
        let mut services = Vec::with_capacity(manifest.services.len());
        for (name, def) in manifest.services {
            let mut service = Service::new(app_name, name, def, Arc::clone(&self.engine));
            service.inspect().await?;
            services.push(service);
        }
        Ok((app, services))
    }
}

/// Populates `registry` with every task handler this crate implements.
/// A plain name-to-function table: no reflection, matching the explicit
/// redesign away from the original's `inspect.getmembers` scan.
pub fn register_handlers(registry: &mut HandlerRegistry, engine: Arc<TaskEngine>) {
    macro_rules! task {
        ($name:literal, $func:path) => {
            registry.register($name, {
                let engine = Arc::clone(&engine);
                Arc::new(move |ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>| {
                    let engine = Arc::clone(&engine);
                    async move { $func(engine, ctx, args, kwargs).await }
                })
            });
        };
    }

    use crate::tasks::{backup, deployment, lifecycle, logstream, misc, publish, sync};

    task!("help", misc::task_help);
    task!("init", misc::task_init);
    task!("update", misc::task_update);
    task!("list", misc::task_list);
    task!("list_volumes", misc::task_list_volumes);
    task!("list_vars", misc::task_list_vars);
    task!("set_var", misc::task_set_var);
    task!("rm_var", misc::task_rm_var);
    task!("remove", misc::task_remove);
    task!("set_deployment", misc::task_set_deployment);
    task!("config", misc::task_config);
    task!("status", misc::task_status);
    task!("machine", misc::task_machine);

    task!("start", lifecycle::task_start);
    task!("create", lifecycle::task_create);
    task!("stop", lifecycle::task_stop);
    task!("destroy", lifecycle::task_destroy);
    task!("restart", lifecycle::task_restart);
    task!("rebuild", lifecycle::task_rebuild);
    task!("inspect", lifecycle::task_inspect);

    task!("logs", logstream::task_logs);
    task!("run", logstream::task_run);

    task!("sync", sync::task_sync);
    task!("sync_stop", sync::task_sync_stop);
    task!("backup", backup::task_backup);

    task!("deployments", deployment::task_deployments);
    task!("deployment_info", deployment::task_deployment_info);
    task!("app_deployment_info", deployment::task_app_deployment_info);
    task!("deployment_create", deployment::task_deployment_create);
    task!("deployment_update", deployment::task_deployment_update);
    task!("deployment_remove", deployment::task_deployment_remove);
    task!("deployment_set_default", deployment::task_deployment_set_default);

    task!("publish", publish::task_publish);
    task!("unpublish", publish::task_unpublish);
}
