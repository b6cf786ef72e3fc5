//! `placement.*` (C6): picks a host, reserves a port, and submits an
//! install task. The placement row itself doubles as the port
//! reservation -- created `starting` up front, deleted again if the
//! backing task fails (see [`crate::deploy::after_task_placement_hook`]).
//! The host's action-state lock is held from port selection through
//! task submission so two concurrent requests can't both read the
//! same free port before either row lands.

use axum::{
  extract::Path,
  routing::post,
  Extension, Json, Router,
};
use fleet_client::entities::{
  placement::{PlacementStatus, ServicePlacement},
  task::{DeploymentTask, TaskKind, TaskStatus},
  ServiceKind,
};
use serde::Deserialize;

use super::{audit, ApiError, ApiResult, Operator};
use crate::{helpers::action_state::HostActionState, state};

pub fn router() -> Router {
  Router::new()
    .route("/", post(create_placement).get(list_placements))
    .route("/{id}/drain", post(drain_placement))
    .route("/{id}", axum::routing::delete(delete_placement))
}

/// Ports reserved for application workers. Arbitrary but fixed: a
/// real deployment would make this operator-configurable, but no
/// caller needs more than one range yet.
const APP_WORKER_PORT_RANGE: std::ops::Range<u16> = 20000..21000;

/// Lowest port in [`APP_WORKER_PORT_RANGE`] not already held by an
/// existing placement on the same host.
fn first_free_port(existing: &[ServicePlacement]) -> Option<u16> {
  let used: std::collections::HashSet<u16> = existing.iter().map(|p| p.port).collect();
  APP_WORKER_PORT_RANGE.clone().find(|p| !used.contains(p))
}

#[derive(Deserialize)]
struct CreatePlacementRequest {
  name: String,
  capacity: u32,
  host_id: Option<i64>,
  db_url: Option<String>,
  cache_url: Option<String>,
}

async fn create_placement(
  Extension(operator): Extension<Operator>,
  Json(req): Json<CreatePlacementRequest>,
) -> ApiResult<ServicePlacement> {
  let host = match req.host_id {
    Some(id) => state::hosts().get(id).await?,
    None => state::hosts()
      .pick_for_placement(ServiceKind::AppWorker, None)
      .await?
      .ok_or_else(|| {
        fleet_client::FleetError::new(
          fleet_client::ErrorKind::CapacityExceeded,
          anyhow::anyhow!("no eligible active host available for a new app-worker placement"),
        )
      })?,
  };

  // Held from port reservation through task submission so a second
  // concurrent placement request on the same host can't read the
  // same "existing" port list before this one's row lands.
  let guard = state::action_states()
    .host(host.id)
    .await
    .update(|s: &mut HostActionState| s.probing = true)
    .map_err(|e| fleet_client::FleetError::new(fleet_client::ErrorKind::CapacityExceeded, e))?;

  let existing = state::placements().list_for_host(host.id).await?;
  let port = match first_free_port(&existing) {
    Some(port) => port,
    None => {
      drop(guard);
      return Err(ApiError::from(fleet_client::FleetError::new(
        fleet_client::ErrorKind::CapacityExceeded,
        anyhow::anyhow!("host {} has no free port left in the app-worker range", host.id),
      )));
    }
  };

  audit(&operator, "placement.create", serde_json::json!({ "name": req.name, "host_id": host.id, "port": port })).await?;

  let placement = ServicePlacement {
    id: 0,
    name: req.name,
    host_id: host.id,
    port,
    capacity: req.capacity,
    current: 0,
    status: PlacementStatus::Starting,
    last_seen_ts: None,
    created_ts: fleet_client::fleet_timestamp(),
  };
  let created = match state::placements().create(&placement).await {
    Ok(created) => created,
    Err(e) => {
      drop(guard);
      return Err(e.into());
    }
  };

  let config = serde_json::json!({
    "placement_id": created.id,
    "port": port,
    "db_url": req.db_url,
    "cache_url": req.cache_url,
  });
  let task = DeploymentTask {
    id: 0,
    kind: TaskKind::Install,
    service_kind: Some(ServiceKind::AppWorker),
    source_host_id: None,
    target_host_id: Some(host.id),
    config,
    template_id: None,
    cron_job_id: None,
    status: TaskStatus::Pending,
    progress: 0,
    current_phase: "queued".to_string(),
    log: String::new(),
    error: None,
    created_ts: fleet_client::fleet_timestamp(),
    started_ts: None,
    completed_ts: None,
  };
  let task_row = match state::tasks().create(&task).await {
    Ok(row) => row,
    Err(e) => {
      let _ = state::placements().delete(created.id).await;
      drop(guard);
      return Err(e.into());
    }
  };
  let submit_result = crate::deploy::dispatcher().submit(task_row.id).await;
  drop(guard);
  if let Err(e) = submit_result {
    let _ = state::placements().delete(created.id).await;
    return Err(e.into());
  }

  Ok(Json(created))
}

async fn list_placements() -> ApiResult<Vec<ServicePlacement>> {
  Ok(Json(state::placements().list_all().await?))
}

/// Moves a `running` placement to `draining`: the proxy stops
/// sending new traffic to it but existing connections complete.
/// Nothing here schedules the follow-up transition to `stopped`
/// after the drain window; an operator (or a future scheduled job)
/// calls delete once the drain window has elapsed.
async fn drain_placement(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  audit(&operator, "placement.drain", serde_json::json!({ "id": id })).await?;
  state::placements().set_status(id, PlacementStatus::Draining, None).await?;
  crate::proxy::regenerate_and_apply().await?;
  Ok(())
}

async fn delete_placement(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  audit(&operator, "placement.delete", serde_json::json!({ "id": id })).await?;
  state::placements().set_status(id, PlacementStatus::Stopped, None).await?;
  crate::proxy::regenerate_and_apply().await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  fn placement_on(port: u16) -> ServicePlacement {
    ServicePlacement {
      id: 1,
      name: "worker".to_string(),
      host_id: 1,
      port,
      capacity: 10,
      current: 0,
      status: PlacementStatus::Running,
      last_seen_ts: None,
      created_ts: 0,
    }
  }

  #[test]
  fn first_free_port_picks_range_start_when_empty() {
    assert_eq!(first_free_port(&[]), Some(20000));
  }

  #[test]
  fn first_free_port_skips_taken_ports() {
    let existing = vec![placement_on(20000), placement_on(20001)];
    assert_eq!(first_free_port(&existing), Some(20002));
  }

  #[test]
  fn first_free_port_ignores_gaps_below_lowest_free() {
    let existing = vec![placement_on(20005)];
    assert_eq!(first_free_port(&existing), Some(20000));
  }

  #[test]
  fn first_free_port_none_when_range_exhausted() {
    let existing: Vec<ServicePlacement> = APP_WORKER_PORT_RANGE.map(placement_on).collect();
    assert_eq!(first_free_port(&existing), None);
  }
}
