//! `host.*` (C5) and `template.*` (C14) -- template CRUD lives here
//! because templates are installer configuration stored alongside
//! hosts, not runtime placement state.

use axum::{
  extract::Path,
  routing::{delete, get, post},
  Extension, Json, Router,
};
use fleet_client::entities::{
  host::{Host, HostAuth, HostFacts, HostStatus},
  template::ConfigurationTemplate,
  ServiceKind,
};
use serde::Deserialize;

use super::{audit, ApiError, ApiResult, Operator};
use crate::{helpers::credential, probe, state};

pub fn router() -> Router {
  Router::new()
    .route("/", post(add_host).get(list_hosts))
    .route("/{id}", get(host_details))
    .route("/{id}/test", post(test_host))
    .route("/{id}/migrate", post(migrate_host))
    .route("/template", post(create_template).get(list_templates))
    .route("/template/{id}", axum::routing::put(update_template).delete(delete_template))
}

#[derive(Deserialize)]
struct AddHostRequest {
  name: String,
  address: String,
  port: u16,
  user: String,
  password: Option<String>,
  private_key_path: Option<String>,
  declared_roles: Vec<ServiceKind>,
}

async fn add_host(Extension(operator): Extension<Operator>, Json(req): Json<AddHostRequest>) -> ApiResult<Host> {
  let auth = match (req.password, req.private_key_path) {
    (Some(password), _) => HostAuth::Password { ciphertext: credential::encrypt_password(&password)? },
    (None, Some(path)) => HostAuth::PrivateKey { path },
    (None, None) => {
      return Err(ApiError::from(fleet_client::FleetError::new(
        fleet_client::ErrorKind::ConfigInvalid,
        anyhow::anyhow!("host requires either a password or a private_key_path"),
      )))
    }
  };

  audit(&operator, "host.add", serde_json::json!({ "name": req.name, "address": req.address })).await?;

  let host = Host {
    id: 0,
    name: req.name,
    address: req.address,
    port: req.port,
    user: req.user,
    auth,
    declared_roles: req.declared_roles,
    current_services: Vec::new(),
    facts: HostFacts::default(),
    health_score: 100,
    last_probe_ts: None,
    consecutive_probe_failures: 0,
    status: HostStatus::Pending,
    version: 0,
    created_ts: fleet_client::fleet_timestamp(),
  };
  let created = state::hosts().create(&host).await?;
  Ok(Json(created))
}

async fn list_hosts() -> ApiResult<Vec<Host>> {
  Ok(Json(state::hosts().list().await?))
}

async fn host_details(Path(id): Path<i64>) -> ApiResult<Host> {
  Ok(Json(state::hosts().get(id).await?))
}

/// Runs the full host probe inline and returns its report without
/// mutating the host row -- a dry-run connectivity/facts check, not
/// the same as the periodic health tick.
async fn test_host(Path(id): Path<i64>) -> ApiResult<probe::ProbeReport> {
  let host = state::hosts().get(id).await?;
  let auth = crate::deploy::ssh_auth_for(&host).await?;
  let host_keys = state::host_key_store().await;
  let report = probe::full_probe(&host.address, host.port, &host.user, &auth, host_keys).await?;
  Ok(Json(report))
}

#[derive(Deserialize)]
struct MigrateHostRequest {
  target_host_id: i64,
  services: Vec<ServiceKind>,
}

async fn migrate_host(
  Extension(operator): Extension<Operator>,
  Path(source_host_id): Path<i64>,
  Json(req): Json<MigrateHostRequest>,
) -> ApiResult<fleet_client::entities::task::DeploymentTask> {
  audit(
    &operator,
    "host.migrate",
    serde_json::json!({ "source_host_id": source_host_id, "target_host_id": req.target_host_id, "services": req.services }),
  )
  .await?;

  let mut created = None;
  for service_kind in req.services {
    let task = fleet_client::entities::task::DeploymentTask {
      id: 0,
      kind: fleet_client::entities::task::TaskKind::Migrate,
      service_kind: Some(service_kind),
      source_host_id: Some(source_host_id),
      target_host_id: Some(req.target_host_id),
      config: serde_json::json!({}),
      template_id: None,
      cron_job_id: None,
      status: fleet_client::entities::task::TaskStatus::Pending,
      progress: 0,
      current_phase: "queued".to_string(),
      log: String::new(),
      error: None,
      created_ts: fleet_client::fleet_timestamp(),
      started_ts: None,
      completed_ts: None,
    };
    let row = state::tasks().create(&task).await?;
    crate::deploy::dispatcher().submit(row.id).await?;
    created = Some(row);
  }

  created.ok_or_else(|| {
    ApiError::from(fleet_client::FleetError::new(
      fleet_client::ErrorKind::ConfigInvalid,
      anyhow::anyhow!("migrate requires at least one service"),
    ))
  })
}

#[derive(Deserialize)]
struct CreateTemplateRequest {
  label: String,
  service_kind: ServiceKind,
  config: serde_json::Value,
  description: Option<String>,
}

async fn create_template(
  Extension(operator): Extension<Operator>,
  Json(req): Json<CreateTemplateRequest>,
) -> ApiResult<ConfigurationTemplate> {
  audit(&operator, "template.create", serde_json::json!({ "label": req.label })).await?;
  let template = ConfigurationTemplate { id: 0, label: req.label, service_kind: req.service_kind, config: req.config, description: req.description };
  Ok(Json(state::templates().create(&template).await?))
}

async fn list_templates() -> ApiResult<Vec<ConfigurationTemplate>> {
  Ok(Json(state::templates().list_all().await?))
}

#[derive(Deserialize)]
struct UpdateTemplateRequest {
  label: String,
  config: serde_json::Value,
  description: Option<String>,
}

/// `service_kind` is fixed at creation and not updatable here: it
/// selects which installer a referencing task dispatches to, so
/// changing it out from under existing references would silently
/// repoint them at a different installer.
async fn update_template(
  Extension(operator): Extension<Operator>,
  Path(id): Path<i64>,
  Json(req): Json<UpdateTemplateRequest>,
) -> ApiResult<ConfigurationTemplate> {
  audit(&operator, "template.update", serde_json::json!({ "id": id, "label": req.label })).await?;
  let existing = state::templates().get(id).await?;
  let template = ConfigurationTemplate {
    id,
    label: req.label,
    service_kind: existing.service_kind,
    config: req.config,
    description: req.description,
  };
  Ok(Json(state::templates().update(&template).await?))
}

async fn delete_template(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  if state::templates().is_referenced(id).await? {
    return Err(ApiError::from(fleet_client::FleetError::new(
      fleet_client::ErrorKind::DependencyMissing,
      anyhow::anyhow!("template {id} is still referenced by a cron job or an in-flight task"),
    )));
  }
  audit(&operator, "template.delete", serde_json::json!({ "id": id })).await?;
  state::templates().delete(id).await?;
  Ok(())
}
