//! `alert.*` (C9 wiring): acknowledge and resolve delegate to
//! [`crate::monitor`], which writes its own audit entries since the
//! actor there can be either an operator or the system itself.

use axum::{extract::Path, routing::get, Extension, Json, Router};
use fleet_client::entities::alert::Alert;
use serde::Deserialize;

use super::{ApiError, ApiResult, Operator};
use crate::{monitor, state};

pub fn router() -> Router {
  Router::new()
    .route("/", get(list_alerts))
    .route("/{id}/ack", axum::routing::post(ack_alert))
    .route("/{id}/resolve", axum::routing::post(resolve_alert))
}

async fn list_alerts() -> ApiResult<Vec<Alert>> {
  Ok(Json(state::alerts().list_active().await?))
}

async fn ack_alert(Extension(operator): Extension<Operator>, Path(id): Path<i64>) -> Result<(), ApiError> {
  monitor::acknowledge(id, &operator.name).await?;
  Ok(())
}

#[derive(Deserialize, Default)]
struct ResolveAlertRequest {
  #[serde(default)]
  note: Option<String>,
}

async fn resolve_alert(
  Extension(operator): Extension<Operator>,
  Path(id): Path<i64>,
  Json(req): Json<ResolveAlertRequest>,
) -> Result<(), ApiError> {
  monitor::resolve(id, &operator.name, req.note.as_deref()).await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn resolve_request_defaults_note_when_body_is_empty_object() {
    let req: ResolveAlertRequest = serde_json::from_value(serde_json::json!({})).unwrap();
    assert_eq!(req.note, None);
  }

  #[test]
  fn resolve_request_parses_note_when_present() {
    let req: ResolveAlertRequest = serde_json::from_value(serde_json::json!({ "note": "flapping, acked manually" })).unwrap();
    assert_eq!(req.note.as_deref(), Some("flapping, acked manually"));
  }
}
