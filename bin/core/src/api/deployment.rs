//! `deployment.*` (C4) and `scan.*` (C10, a `DeploymentTask` of kind
//! `network-scan` under the hood).

use axum::{
  extract::Path,
  routing::{get, post},
  Extension, Json, Router,
};
use fleet_client::entities::{
  scan::NetworkScanResult,
  task::{DeploymentTask, TaskKind, TaskStatus},
  ServiceKind,
};
use serde::Deserialize;

use super::{audit, ApiError, ApiResult, Operator};
use crate::state;

pub fn router() -> Router {
  Router::new()
    .route("/", post(create_deployment).get(list_deployments))
    .route("/{id}/logs", get(deployment_logs))
    .route("/{id}/cancel", post(cancel_deployment))
    .route("/scan", post(start_scan))
    .route("/scan/{id}", get(scan_status))
}

#[derive(Deserialize)]
struct CreateDeploymentRequest {
  kind: TaskKind,
  service_kind: Option<ServiceKind>,
  target_host_id: Option<i64>,
  source_host_id: Option<i64>,
  config: serde_json::Value,
  template_id: Option<i64>,
}

async fn create_deployment(
  Extension(operator): Extension<Operator>,
  Json(req): Json<CreateDeploymentRequest>,
) -> ApiResult<DeploymentTask> {
  let config = match req.template_id {
    Some(template_id) => state::templates().get(template_id).await?.config,
    None => req.config,
  };

  audit(
    &operator,
    "deployment.create",
    serde_json::json!({ "kind": req.kind, "target_host_id": req.target_host_id }),
  )
  .await?;

  let task = DeploymentTask {
    id: 0,
    kind: req.kind,
    service_kind: req.service_kind,
    source_host_id: req.source_host_id,
    target_host_id: req.target_host_id,
    config,
    template_id: req.template_id,
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
  let created = state::tasks().create(&task).await?;
  crate::deploy::dispatcher().submit(created.id).await?;
  Ok(Json(created))
}

async fn list_deployments() -> ApiResult<Vec<DeploymentTask>> {
  let mut tasks = state::tasks().list_pending().await?;
  tasks.extend(state::tasks().list_running().await?);
  Ok(Json(tasks))
}

async fn deployment_logs(Path(id): Path<i64>) -> ApiResult<String> {
  let task = state::tasks().get(id).await?;
  Ok(Json(task.log))
}

/// Requests cancellation of a task. A `pending` task (never picked up
/// by a worker) is flipped to `cancelled` immediately. A `running`
/// task instead records a cooperative cancellation request that its
/// handler observes at its next checkpoint (see
/// [`crate::deploy::checkpoint`]); already-committed side effects
/// from earlier phases are not rolled back.
async fn cancel_deployment(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  let mut task = state::tasks().get(id).await?;
  if task.status.is_terminal() {
    return Ok(());
  }
  audit(&operator, "deployment.cancel", serde_json::json!({ "id": id })).await?;
  if task.status == TaskStatus::Pending {
    task.status = TaskStatus::Cancelled;
    task.completed_ts = Some(fleet_client::fleet_timestamp());
    state::tasks().save_progress(&task).await?;
  } else {
    crate::deploy::request_cancel(id);
  }
  Ok(())
}

#[derive(Deserialize)]
struct StartScanRequest {
  config: serde_json::Value,
}

async fn start_scan(Extension(operator): Extension<Operator>, Json(req): Json<StartScanRequest>) -> ApiResult<DeploymentTask> {
  audit(&operator, "scan.start", serde_json::json!({})).await?;

  let task = DeploymentTask {
    id: 0,
    kind: TaskKind::NetworkScan,
    service_kind: None,
    source_host_id: None,
    target_host_id: None,
    config: req.config,
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
  let created = state::tasks().create(&task).await?;
  crate::deploy::dispatcher().submit(created.id).await?;
  Ok(Json(created))
}

async fn scan_status(Path(task_id): Path<i64>) -> ApiResult<ScanStatus> {
  let task = state::tasks().get(task_id).await?;
  let results = state::scans().for_task(task_id).await?;
  Ok(Json(ScanStatus { task, results }))
}

#[derive(serde::Serialize)]
struct ScanStatus {
  task: DeploymentTask,
  results: Vec<NetworkScanResult>,
}
