use std::str::FromStr;

use fleet_client::entities::{cron::CronJob, task::TaskKind, ServiceKind};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

pub struct CronRepository {
  pool: PgPool,
}

impl CronRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  /// Jobs that are enabled and due: `next_run_ts <= now_ts`. Ordered
  /// so the scheduler tick processes the most overdue job first.
  #[instrument(skip(self))]
  pub async fn due(&self, now_ts: i64) -> DbResult<Vec<CronJob>> {
    let rows = sqlx::query(
      &format!("{SELECT_COLS} WHERE enabled AND next_run_ts <= $1 ORDER BY next_run_ts"),
    )
    .bind(now_ts)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_cron).collect()
  }

  #[instrument(skip(self))]
  pub async fn list_all(&self) -> DbResult<Vec<CronJob>> {
    let rows = sqlx::query(&format!("{SELECT_COLS} ORDER BY id")).fetch_all(&self.pool).await?;
    rows.iter().map(row_to_cron).collect()
  }

  #[instrument(skip(self, job))]
  pub async fn create(&self, job: &CronJob) -> DbResult<CronJob> {
    let row = sqlx::query(
      r#"INSERT INTO cron_jobs
           (label, expression, task_kind, service_kind, config, template_id,
            target_host_id, enabled, last_run_ts, next_run_ts, last_task_id)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
         RETURNING id, label, expression, task_kind, service_kind, config, template_id,
                   target_host_id, enabled, last_run_ts, next_run_ts, last_task_id"#,
    )
    .bind(&job.label)
    .bind(&job.expression)
    .bind(job.task_kind.to_string())
    .bind(job.service_kind.map(|k| k.to_string()))
    .bind(&job.config)
    .bind(job.template_id)
    .bind(job.target_host_id)
    .bind(job.enabled)
    .bind(job.last_run_ts)
    .bind(job.next_run_ts)
    .bind(job.last_task_id)
    .fetch_one(&self.pool)
    .await?;
    row_to_cron(&row)
  }

  /// Records a dispatched run and advances `next_run_ts`. Called in
  /// the same transaction the scheduler uses to enqueue the task, so
  /// a crash between enqueue and this update cannot double-fire —
  /// the job is re-read as still-due on the next tick instead, and
  /// the idempotent task lookup wins.
  #[instrument(skip(self))]
  pub async fn record_run(
    &self,
    id: i64,
    last_run_ts: i64,
    next_run_ts: i64,
    task_id: i64,
  ) -> DbResult<()> {
    sqlx::query(
      "UPDATE cron_jobs SET last_run_ts = $1, next_run_ts = $2, last_task_id = $3 WHERE id = $4",
    )
    .bind(last_run_ts)
    .bind(next_run_ts)
    .bind(task_id)
    .bind(id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn set_enabled(&self, id: i64, enabled: bool) -> DbResult<()> {
    sqlx::query("UPDATE cron_jobs SET enabled = $1 WHERE id = $2")
      .bind(enabled)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn delete(&self, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM cron_jobs WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(())
  }
}

const SELECT_COLS: &str = r#"SELECT id, label, expression, task_kind, service_kind, config, template_id,
                   target_host_id, enabled, last_run_ts, next_run_ts, last_task_id
         FROM cron_jobs"#;

fn row_to_cron(row: &PgRow) -> DbResult<CronJob> {
  let task_kind: String = row.try_get("task_kind")?;
  let service_kind: Option<String> = row.try_get("service_kind")?;
  Ok(CronJob {
    id: row.try_get("id")?,
    label: row.try_get("label")?,
    expression: row.try_get("expression")?,
    task_kind: TaskKind::from_str(&task_kind)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "task_kind".into(), source: e.into() }))?,
    service_kind: service_kind
      .map(|s| ServiceKind::from_str(&s))
      .transpose()
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "service_kind".into(), source: e.into() }))?,
    config: row.try_get("config")?,
    template_id: row.try_get("template_id")?,
    target_host_id: row.try_get("target_host_id")?,
    enabled: row.try_get("enabled")?,
    last_run_ts: row.try_get("last_run_ts")?,
    next_run_ts: row.try_get("next_run_ts")?,
    last_task_id: row.try_get("last_task_id")?,
  })
}
