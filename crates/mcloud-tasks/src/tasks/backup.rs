//! Backs a volume up to (or restores it from) a remote destination via
//! `aws s3 sync`, snapshotting with btrfs when available and otherwise
//! pausing the owning service for the duration of the copy. Grounded in
//! `TaskService.task_backup`.

use std::sync::Arc;

use mcloud_registry::TaskContext;
use mcloud_shared::McloudResult;
use mcloud_store::ApplicationRecord;
use serde_json::{json, Map, Value};

use crate::args::{opt_bool, opt_str, require_str};
use crate::engine::TaskEngine;
use crate::support::run_process_to_completion;

pub async fn task_backup(engine: Arc<TaskEngine>, ctx: TaskContext, args: Vec<Value>, kwargs: Map<String, Value>) -> McloudResult<Value> {
    let app_name = require_str(&args, &kwargs, 0, "app_name")?;
    let service_name = opt_str(&args, &kwargs, 1, "service_name");
    let volume = opt_str(&args, &kwargs, 2, "volume");
    let destination = require_str(&args, &kwargs, 3, "destination")?;
    let restore = opt_bool(&args, &kwargs, 4, "restore", false);

    let (app, services) = engine.load_services(&app_name).await?;

    let (mut volume_path, mut service) = if let Some(service_name) = &service_name {
        let volume = volume
            .clone()
            .ok_or_else(|| mcloud_shared::McloudError::VolumeNotFound("In case of service name is provided, volume name is mandatory!".into()))?;
        let mut services = services;
        let idx = services
            .iter()
            .position(|s| s.name() == service_name)
            .ok_or_else(|| mcloud_shared::McloudError::VolumeNotFound(format!("Service with name {service_name} was not found!")))?;
        let service = services.remove(idx);
        if !service.volumes().iter().any(|v| v == &volume) {
            return Err(mcloud_shared::McloudError::VolumeNotFound(format!("Volume with name {volume} not found!")));
        }
        (volume, Some(service))
    } else {
        (backup_path(&app.record), None)
    };

    if !restore {
        if engine.settings.btrfs {
            let snapshot_path = format!("{}/snapshots_{}", engine.settings.home_dir, uuid::Uuid::new_v4());
            ctx.log(snapshot_path.clone());
            run_process_to_completion(
                &ctx,
                vec!["btrfs".into(), "subvolume".into(), "snapshot".into(), "-r".into(), volume_path.clone(), snapshot_path.clone()],
                None,
                Vec::new(),
            )
            .await?;
            volume_path = snapshot_path;
        } else if let Some(service) = service.as_mut() {
            service.pause().await?;
        }

        run_process_to_completion(&ctx, vec!["aws".into(), "s3".into(), "sync".into(), volume_path.clone(), destination.clone()], None, Vec::new()).await?;

        if engine.settings.btrfs {
            run_process_to_completion(&ctx, vec!["btrfs".into(), "subvolume".into(), "delete".into(), volume_path.clone()], None, Vec::new()).await?;
        } else if let Some(service) = service.as_mut() {
            service.unpause().await?;
        }
    } else {
        run_process_to_completion(&ctx, vec!["aws".into(), "s3".into(), "sync".into(), destination.clone(), volume_path.clone()], None, Vec::new()).await?;
    }

    Ok(json!({ "status": "ok", "path": volume_path }))
}

fn backup_path(record: &ApplicationRecord) -> String {
    record.path.clone().unwrap_or_default()
}
