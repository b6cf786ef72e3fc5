//! Operator HTTP/JSON API. Every mutating handler writes one
//! [`fleet_client::entities::audit::AuditEntry`] before the state
//! change it guards commits, so a crash mid-change leaves the audit
//! log ahead of reality rather than behind.

mod alert;
mod cron;
mod deployment;
mod domain;
mod host;
mod placement;

use axum::{
  extract::Request,
  http::{header, StatusCode},
  middleware::{self, Next},
  response::Response,
  Router,
};
use tower_http::trace::TraceLayer;

use crate::{config::core_config, state};

/// The authenticated caller of a mutating request. Recorded verbatim
/// on the [`fleet_client::entities::audit::AuditEntry`] it produces.
#[derive(Debug, Clone)]
pub struct Operator {
  pub name: String,
}

pub fn app() -> Router {
  Router::new()
    .nest("/host", host::router())
    .nest("/deployment", deployment::router())
    .nest("/placement", placement::router())
    .nest("/domain", domain::router())
    .nest("/alert", alert::router())
    .nest("/cron", cron::router())
    .route("/version", axum::routing::get(|| async { env!("CARGO_PKG_VERSION") }))
    .layer(middleware::from_fn(require_operator))
    .layer(TraceLayer::new_for_http())
}

/// Validates the `Authorization: Bearer <token>` header against the
/// configured operator token and attaches the caller's name (from
/// `X-Fleet-Actor`, defaulting to `operator`) as an [`Operator`]
/// extension for downstream handlers.
async fn require_operator(mut request: Request, next: Next) -> Result<Response, StatusCode> {
  let token = request
    .headers()
    .get(header::AUTHORIZATION)
    .and_then(|v| v.to_str().ok())
    .and_then(|v| v.strip_prefix("Bearer "));

  match token {
    Some(token) if token == core_config().operator_token => {}
    _ => return Err(StatusCode::UNAUTHORIZED),
  }

  let actor = request
    .headers()
    .get("x-fleet-actor")
    .and_then(|v| v.to_str().ok())
    .unwrap_or("operator")
    .to_string();

  request.extensions_mut().insert(Operator { name: actor });
  Ok(next.run(request).await)
}

/// Writes an audit entry for a mutating action. Callers invoke this
/// before performing the state change it describes.
async fn audit(operator: &Operator, action: &str, detail: serde_json::Value) -> fleet_client::FleetResult<()> {
  state::audit()
    .append(&fleet_client::entities::audit::AuditEntry {
      id: 0,
      actor: operator.name.clone(),
      action: action.to_string(),
      detail,
      source_addr: None,
      ts: fleet_client::fleet_timestamp(),
    })
    .await?;
  Ok(())
}

type ApiResult<T> = Result<axum::Json<T>, ApiError>;

/// Maps a [`fleet_client::error::ErrorKind`] to an HTTP status and
/// renders the error as `{"error": "..."}`. Internal detail (the
/// `anyhow` chain) is logged but the response only ever carries the
/// kind and its display text.
pub struct ApiError(fleet_client::FleetError);

impl From<fleet_client::FleetError> for ApiError {
  fn from(e: fleet_client::FleetError) -> Self {
    Self(e)
  }
}

fn status_for(kind: fleet_client::error::ErrorKind) -> StatusCode {
  use fleet_client::error::ErrorKind;
  match kind {
    ErrorKind::AuthFailed => StatusCode::UNAUTHORIZED,
    ErrorKind::CapacityExceeded => StatusCode::CONFLICT,
    ErrorKind::ConfigInvalid | ErrorKind::DependencyMissing => StatusCode::BAD_REQUEST,
    ErrorKind::Unreachable | ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
    _ => StatusCode::INTERNAL_SERVER_ERROR,
  }
}

impl axum::response::IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = status_for(self.0.kind);
    tracing::error!("api error | {:#}", self.0);
    (status, axum::Json(serde_json::json!({ "error": self.0.kind.to_string(), "detail": self.0.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use fleet_client::error::ErrorKind;

  #[test]
  fn auth_failed_maps_to_unauthorized() {
    assert_eq!(status_for(ErrorKind::AuthFailed), StatusCode::UNAUTHORIZED);
  }

  #[test]
  fn capacity_exceeded_maps_to_conflict() {
    assert_eq!(status_for(ErrorKind::CapacityExceeded), StatusCode::CONFLICT);
  }

  #[test]
  fn config_invalid_and_dependency_missing_map_to_bad_request() {
    assert_eq!(status_for(ErrorKind::ConfigInvalid), StatusCode::BAD_REQUEST);
    assert_eq!(status_for(ErrorKind::DependencyMissing), StatusCode::BAD_REQUEST);
  }

  #[test]
  fn unreachable_and_timeout_map_to_gateway_timeout() {
    assert_eq!(status_for(ErrorKind::Unreachable), StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(status_for(ErrorKind::Timeout), StatusCode::GATEWAY_TIMEOUT);
  }

  #[test]
  fn internal_maps_to_internal_server_error() {
    assert_eq!(status_for(ErrorKind::Internal), StatusCode::INTERNAL_SERVER_ERROR);
  }
}
