use std::str::FromStr;

use fleet_client::entities::alert::{Alert, AlertSeverity, AlertStatus};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

/// Enforces the one-active-alert-per-key invariant with a partial
/// unique index (`alerts_active_dedup_idx`) rather than an
/// application-level check-then-insert, so concurrent monitor ticks
/// can't race past each other.
pub struct AlertRepository {
  pool: PgPool,
}

impl AlertRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn list_active(&self) -> DbResult<Vec<Alert>> {
    let rows = sqlx::query(&format!("{SELECT_COLS} WHERE status = 'active' ORDER BY last_occurrence_ts DESC"))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(row_to_alert).collect()
  }

  /// Raises a new alert, or bumps `last_occurrence_ts`/`value` on the
  /// existing active alert for the same key. Returns the resulting row.
  #[instrument(skip(self, alert))]
  pub async fn upsert_active(&self, alert: &Alert) -> DbResult<Alert> {
    let row = sqlx::query(
      r#"INSERT INTO alerts
           (kind, severity, host_id, placement_id, metric_name, value, threshold,
            status, auto_resolve, first_occurrence_ts, last_occurrence_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, 'active', $8, $9, $9)
         ON CONFLICT (kind, COALESCE(host_id, -1), COALESCE(placement_id, -1)) WHERE status = 'active'
         DO UPDATE SET
           value = excluded.value,
           last_occurrence_ts = excluded.last_occurrence_ts,
           severity = CASE
             WHEN (CASE alerts.severity WHEN 'critical' THEN 3 WHEN 'warning' THEN 2 ELSE 1 END)
                >= (CASE excluded.severity WHEN 'critical' THEN 3 WHEN 'warning' THEN 2 ELSE 1 END)
             THEN alerts.severity ELSE excluded.severity
           END
         RETURNING id, kind, severity, host_id, placement_id, metric_name, value, threshold,
                   status, auto_resolve, first_occurrence_ts, last_occurrence_ts,
                   acknowledged_by, resolution_note, resolved_ts"#,
    )
    .bind(&alert.kind)
    .bind(alert.severity.to_string())
    .bind(alert.host_id)
    .bind(alert.placement_id)
    .bind(&alert.metric_name)
    .bind(alert.value)
    .bind(alert.threshold)
    .bind(alert.auto_resolve)
    .bind(alert.last_occurrence_ts)
    .fetch_one(&self.pool)
    .await?;
    row_to_alert(&row)
  }

  #[instrument(skip(self))]
  pub async fn acknowledge(&self, id: i64, by: &str) -> DbResult<()> {
    sqlx::query("UPDATE alerts SET status = 'acknowledged', acknowledged_by = $1 WHERE id = $2")
      .bind(by)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn resolve(&self, id: i64, note: Option<&str>, ts: i64) -> DbResult<()> {
    sqlx::query("UPDATE alerts SET status = 'resolved', resolution_note = $1, resolved_ts = $2 WHERE id = $3")
      .bind(note)
      .bind(ts)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  /// Auto-resolves every active, `auto_resolve` alert for `host_id`
  /// once its condition clears. Returns the number resolved.
  #[instrument(skip(self))]
  /// Resolves active, auto-resolve-enabled alerts for `host_id` whose
  /// condition has cleared -- i.e. every such alert except the ones
  /// named in `still_breaching`, which the caller just re-upserted as
  /// still over threshold this same tick. Skips any younger than
  /// `min_age_ms` so a metric that dips below threshold for one
  /// sample and immediately re-crosses it doesn't flap the alert
  /// closed and back open.
  pub async fn auto_resolve_for_host(
    &self,
    host_id: i64,
    ts: i64,
    min_age_ms: i64,
    still_breaching: &[&str],
  ) -> DbResult<u64> {
    let result = sqlx::query(
      r#"UPDATE alerts SET status = 'resolved', resolved_ts = $1, resolution_note = 'condition cleared'
         WHERE host_id = $2 AND status = 'active' AND auto_resolve
           AND first_occurrence_ts <= $1 - $3
           AND NOT (metric_name = ANY($4))"#,
    )
    .bind(ts)
    .bind(host_id)
    .bind(min_age_ms)
    .bind(still_breaching)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected())
  }
}

const SELECT_COLS: &str = r#"SELECT id, kind, severity, host_id, placement_id, metric_name, value, threshold,
                   status, auto_resolve, first_occurrence_ts, last_occurrence_ts,
                   acknowledged_by, resolution_note, resolved_ts
         FROM alerts"#;

fn row_to_alert(row: &PgRow) -> DbResult<Alert> {
  let severity: String = row.try_get("severity")?;
  let status: String = row.try_get("status")?;
  Ok(Alert {
    id: row.try_get("id")?,
    kind: row.try_get("kind")?,
    severity: AlertSeverity::from_str(&severity)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "severity".into(), source: e.into() }))?,
    host_id: row.try_get("host_id")?,
    placement_id: row.try_get("placement_id")?,
    metric_name: row.try_get("metric_name")?,
    value: row.try_get("value")?,
    threshold: row.try_get("threshold")?,
    status: AlertStatus::from_str(&status)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "status".into(), source: e.into() }))?,
    auto_resolve: row.try_get("auto_resolve")?,
    first_occurrence_ts: row.try_get("first_occurrence_ts")?,
    last_occurrence_ts: row.try_get("last_occurrence_ts")?,
    acknowledged_by: row.try_get("acknowledged_by")?,
    resolution_note: row.try_get("resolution_note")?,
    resolved_ts: row.try_get("resolved_ts")?,
  })
}
