use fleet_client::{
  entities::alert::{Alert, AlertSeverity},
  fleet_timestamp,
};
use tracing::error;

use crate::state;

use super::metrics::host_metrics_cache;

/// Warning/critical bands per metric kind. `None` means no critical
/// band is configured (warning-only metric).
struct Threshold {
  kind: &'static str,
  warning: f64,
  critical: f64,
}

const THRESHOLDS: &[Threshold] = &[
  Threshold { kind: "high-cpu-usage", warning: 80.0, critical: 95.0 },
  Threshold { kind: "high-memory-usage", warning: 85.0, critical: 97.0 },
  Threshold { kind: "high-disk-usage", warning: 85.0, critical: 95.0 },
];

/// Minimum age before an active, auto-resolve-enabled alert is
/// reconsidered for auto-resolution.
const AUTO_RESOLVE_MIN_AGE_MS: i64 = 60_000;

pub async fn tick(ts: i64) {
  let samples = host_metrics_cache().get_entries().await;

  for (host_id, sample) in samples {
    let mut breaching = Vec::new();
    if evaluate(host_id, "high-cpu-usage", sample.cpu_pct, ts).await {
      breaching.push("high-cpu-usage");
    }
    if evaluate(host_id, "high-memory-usage", sample.memory_pct, ts).await {
      breaching.push("high-memory-usage");
    }
    if evaluate(host_id, "high-disk-usage", sample.disk_pct, ts).await {
      breaching.push("high-disk-usage");
    }

    if let Err(e) = state::alerts()
      .auto_resolve_for_host(host_id, ts, AUTO_RESOLVE_MIN_AGE_MS, &breaching)
      .await
    {
      error!(host_id, "alert sweep: auto-resolve failed | {e:#}");
    }
  }
}

/// Severity for a metric sample against its configured bands, or
/// `None` if the metric isn't tracked or the sample is within bounds.
fn severity_for(kind: &str, value: f64) -> Option<AlertSeverity> {
  let threshold = THRESHOLDS.iter().find(|t| t.kind == kind)?;
  if value >= threshold.critical {
    Some(AlertSeverity::Critical)
  } else if value >= threshold.warning {
    Some(AlertSeverity::Warning)
  } else {
    None
  }
}

/// Upserts an active alert if `value` breaches its threshold.
/// Returns whether it's currently breaching, so the caller can keep
/// the auto-resolve sweep from immediately closing what this same
/// tick just opened or renewed.
async fn evaluate(host_id: i64, kind: &str, value: Option<f64>, ts: i64) -> bool {
  let Some(value) = value else { return false };
  let Some(severity) = severity_for(kind, value) else { return false };
  let threshold = THRESHOLDS.iter().find(|t| t.kind == kind).expect("severity_for already matched a threshold");

  let alert = Alert {
    id: 0,
    kind: kind.to_string(),
    severity,
    host_id: Some(host_id),
    placement_id: None,
    metric_name: Some(kind.to_string()),
    value: Some(value),
    threshold: Some(if severity == AlertSeverity::Critical { threshold.critical } else { threshold.warning }),
    status: fleet_client::entities::alert::AlertStatus::Active,
    auto_resolve: true,
    first_occurrence_ts: ts,
    last_occurrence_ts: ts,
    acknowledged_by: None,
    resolution_note: None,
    resolved_ts: None,
  };

  if let Err(e) = state::alerts().upsert_active(&alert).await {
    error!(host_id, kind, "alert sweep: upsert failed | {e:#}");
  }
  true
}

/// Operator action: transitions an alert to `acknowledged`.
pub async fn acknowledge(alert_id: i64, actor: &str) -> fleet_client::FleetResult<()> {
  state::alerts().acknowledge(alert_id, actor).await?;
  state::audit()
    .append(&fleet_client::entities::audit::AuditEntry {
      id: 0,
      actor: actor.to_string(),
      action: "alert.ack".to_string(),
      detail: serde_json::json!({ "alert_id": alert_id }),
      source_addr: None,
      ts: fleet_timestamp(),
    })
    .await?;
  Ok(())
}

/// Operator action: transitions an alert to `resolved` with `note`.
pub async fn resolve(alert_id: i64, actor: &str, note: Option<&str>) -> fleet_client::FleetResult<()> {
  state::alerts().resolve(alert_id, note, fleet_timestamp()).await?;
  state::audit()
    .append(&fleet_client::entities::audit::AuditEntry {
      id: 0,
      actor: actor.to_string(),
      action: "alert.resolve".to_string(),
      detail: serde_json::json!({ "alert_id": alert_id, "note": note }),
      source_addr: None,
      ts: fleet_timestamp(),
    })
    .await?;
  Ok(())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn below_warning_band_is_not_an_alert() {
    assert_eq!(severity_for("high-cpu-usage", 50.0), None);
  }

  #[test]
  fn at_warning_band_is_warning() {
    assert_eq!(severity_for("high-cpu-usage", 80.0), Some(AlertSeverity::Warning));
  }

  #[test]
  fn at_critical_band_is_critical() {
    assert_eq!(severity_for("high-cpu-usage", 95.0), Some(AlertSeverity::Critical));
  }

  #[test]
  fn between_warning_and_critical_is_warning() {
    assert_eq!(severity_for("high-memory-usage", 90.0), Some(AlertSeverity::Warning));
  }

  #[test]
  fn unknown_metric_kind_is_not_tracked() {
    assert_eq!(severity_for("unknown-metric", 999.0), None);
  }
}
