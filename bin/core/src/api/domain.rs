//! `domain.*` (C8): thin HTTP wrapper over [`crate::domain`].

use axum::{
  extract::Path,
  routing::{get, post},
  Extension, Json, Router,
};
use fleet_client::entities::domain::DomainMapping;
use serde::Deserialize;

use super::{audit, ApiError, ApiResult, Operator};
use crate::domain;

pub fn router() -> Router {
  Router::new()
    .route("/", post(add_domain).get(list_domains))
    .route("/{id}", axum::routing::delete(delete_domain))
    .route("/{id}/verify", get(verify_domain))
}

#[derive(Deserialize)]
struct AddDomainRequest {
  domain: String,
  target: String,
  tls: bool,
  cert_path: Option<String>,
  key_path: Option<String>,
}

async fn add_domain(
  Extension(operator): Extension<Operator>,
  Json(req): Json<AddDomainRequest>,
) -> ApiResult<DomainMapping> {
  audit(&operator, "domain.add", serde_json::json!({ "domain": req.domain, "target": req.target })).await?;

  let mapping = DomainMapping {
    id: 0,
    domain: req.domain,
    target: req.target,
    tls: req.tls,
    cert_path: req.cert_path,
    key_path: req.key_path,
    status: fleet_client::entities::domain::VerificationStatus::Unverified,
    last_verified_ts: None,
    created_ts: fleet_client::fleet_timestamp(),
  };
  Ok(Json(domain::create(mapping).await?))
}

async fn list_domains() -> ApiResult<Vec<DomainMapping>> {
  Ok(Json(domain::list().await?))
}

async fn delete_domain(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  audit(&operator, "domain.delete", serde_json::json!({ "id": id })).await?;
  domain::delete(id).await?;
  Ok(())
}

/// On-demand re-verification of a single mapping, independent of the
/// periodic sweep. Read-only: no audit entry, since nothing mutates
/// but the mapping's own verification status.
async fn verify_domain(Path(id): Path<i64>) -> ApiResult<DomainMapping> {
  let mappings = crate::state::domains().list_all().await?;
  let mut mapping = mappings.into_iter().find(|m| m.id == id).ok_or_else(|| {
    fleet_client::FleetError::new(fleet_client::ErrorKind::Internal, anyhow::anyhow!("domain mapping {id} not found"))
  })?;

  mapping.status = domain::verify_one(&mapping).await;
  mapping.last_verified_ts = Some(fleet_client::fleet_timestamp());
  crate::state::domains().set_verification(id, mapping.status, mapping.last_verified_ts.unwrap()).await?;
  Ok(Json(mapping))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn add_domain_request_defaults_cert_and_key_paths() {
    let body = serde_json::json!({
      "domain": "app.example.test",
      "target": "placement:1",
      "tls": false,
    });
    let req: AddDomainRequest = serde_json::from_value(body).unwrap();
    assert_eq!(req.cert_path, None);
    assert_eq!(req.key_path, None);
    assert!(!req.tls);
  }
}
