//! `cron.*` (C13 wiring): CRUD over [`CronJob`] rows. Scheduling logic
//! itself lives in [`crate::scheduler`]; this module only manages the
//! job definitions the scheduler reads.

use axum::{
  extract::Path,
  routing::post,
  Extension, Json, Router,
};
use fleet_client::entities::{cron::CronJob, task::TaskKind, ServiceKind};
use serde::Deserialize;

use super::{audit, ApiError, ApiResult, Operator};
use crate::state;

pub fn router() -> Router {
  Router::new()
    .route("/", post(create_cron).get(list_cron))
    .route("/{id}", axum::routing::put(update_cron).delete(delete_cron))
}

#[derive(Deserialize)]
struct CreateCronRequest {
  label: String,
  expression: String,
  task_kind: TaskKind,
  service_kind: Option<ServiceKind>,
  config: serde_json::Value,
  template_id: Option<i64>,
  target_host_id: Option<i64>,
}

async fn create_cron(Extension(operator): Extension<Operator>, Json(req): Json<CreateCronRequest>) -> ApiResult<CronJob> {
  let now = fleet_client::fleet_timestamp();
  let next_run_ts = crate::scheduler::next_run_after(&req.expression, now)?;

  audit(&operator, "cron.create", serde_json::json!({ "label": req.label, "expression": req.expression })).await?;

  let job = CronJob {
    id: 0,
    label: req.label,
    expression: req.expression,
    task_kind: req.task_kind,
    service_kind: req.service_kind,
    config: req.config,
    template_id: req.template_id,
    target_host_id: req.target_host_id,
    enabled: true,
    last_run_ts: None,
    next_run_ts: Some(next_run_ts),
    last_task_id: None,
  };
  Ok(Json(state::cron_jobs().create(&job).await?))
}

async fn list_cron() -> ApiResult<Vec<CronJob>> {
  Ok(Json(state::cron_jobs().list_all().await?))
}

#[derive(Deserialize)]
struct UpdateCronRequest {
  enabled: bool,
}

/// The only mutable field exposed here is `enabled`; changing a
/// job's expression or target is modeled as delete-and-recreate so
/// the scheduler never races a partially-updated definition.
async fn update_cron(
  Extension(operator): Extension<Operator>,
  Path(id): Path<i64>,
  Json(req): Json<UpdateCronRequest>,
) -> Result<(), ApiError> {
  audit(&operator, "cron.update", serde_json::json!({ "id": id, "enabled": req.enabled })).await?;
  state::cron_jobs().set_enabled(id, req.enabled).await?;
  Ok(())
}

async fn delete_cron(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  audit(&operator, "cron.delete", serde_json::json!({ "id": id })).await?;
  state::cron_jobs().delete(id).await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn create_cron_request_deserializes_minimal_body() {
    let body = serde_json::json!({
      "label": "nightly-backup",
      "expression": "0 2 * * *",
      "task_kind": "backup",
      "config": {},
    });
    let req: CreateCronRequest = serde_json::from_value(body).unwrap();
    assert_eq!(req.label, "nightly-backup");
    assert_eq!(req.service_kind, None);
    assert_eq!(req.template_id, None);
  }

  #[test]
  fn create_cron_rejects_malformed_expression_before_audit() {
    // A malformed expression must fail before any state mutation --
    // exercised here at the unit the handler delegates validation to,
    // since the handler itself needs live DB/audit state to invoke.
    assert!(crate::scheduler::next_run_after("not a cron", 0).is_err());
  }
}
