use std::str::FromStr;

use fleet_client::entities::{
  task::{DeploymentTask, TaskKind, TaskStatus},
  ServiceKind,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

/// Repository for deployment tasks. A task is single-writer: only
/// the dispatcher worker that owns it advances `status`/`progress`/
/// `log`, so this repository does not enforce optimistic versioning
/// the way [`super::host::HostRepository`] does.
pub struct TaskRepository {
  pool: PgPool,
}

impl TaskRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn get(&self, id: i64) -> DbResult<DeploymentTask> {
    let row = sqlx::query(SELECT_COLS_WHERE_ID).bind(id).fetch_optional(&self.pool).await?.ok_or(DbError::NotFound)?;
    row_to_task(&row)
  }

  #[instrument(skip(self))]
  pub async fn list_pending(&self) -> DbResult<Vec<DeploymentTask>> {
    let rows = sqlx::query(&format!("{SELECT_COLS} WHERE status = 'pending' ORDER BY created_ts"))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(row_to_task).collect()
  }

  #[instrument(skip(self))]
  pub async fn list_running(&self) -> DbResult<Vec<DeploymentTask>> {
    let rows = sqlx::query(&format!("{SELECT_COLS} WHERE status = 'running' ORDER BY started_ts"))
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(row_to_task).collect()
  }

  #[instrument(skip(self, task))]
  pub async fn create(&self, task: &DeploymentTask) -> DbResult<DeploymentTask> {
    let row = sqlx::query(
      r#"INSERT INTO deployment_tasks
           (kind, service_kind, source_host_id, target_host_id, config,
            template_id, cron_job_id, status, progress, current_phase, log,
            error, created_ts, started_ts, completed_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
         RETURNING id, kind, service_kind, source_host_id, target_host_id, config,
                   template_id, cron_job_id, status, progress, current_phase, log,
                   error, created_ts, started_ts, completed_ts"#,
    )
    .bind(task.kind.to_string())
    .bind(task.service_kind.map(|k| k.to_string()))
    .bind(task.source_host_id)
    .bind(task.target_host_id)
    .bind(&task.config)
    .bind(task.template_id)
    .bind(task.cron_job_id)
    .bind(task.status.to_string())
    .bind(task.progress as i16)
    .bind(&task.current_phase)
    .bind(&task.log)
    .bind(&task.error)
    .bind(task.created_ts)
    .bind(task.started_ts)
    .bind(task.completed_ts)
    .fetch_one(&self.pool)
    .await?;

    row_to_task(&row)
  }

  /// Persists the mutable progress fields of a running task. Called
  /// after every phase transition so a restart can resume from the
  /// last committed phase rather than from scratch.
  #[instrument(skip(self, task))]
  pub async fn save_progress(&self, task: &DeploymentTask) -> DbResult<()> {
    sqlx::query(
      r#"UPDATE deployment_tasks SET
           status = $1, progress = $2, current_phase = $3, log = $4,
           error = $5, started_ts = $6, completed_ts = $7
         WHERE id = $8"#,
    )
    .bind(task.status.to_string())
    .bind(task.progress as i16)
    .bind(&task.current_phase)
    .bind(&task.log)
    .bind(&task.error)
    .bind(task.started_ts)
    .bind(task.completed_ts)
    .bind(task.id)
    .execute(&self.pool)
    .await?;
    Ok(())
  }

  /// Marks every non-terminal task as failed with an `orphaned`
  /// reason. Called once at startup before any new task is
  /// dispatched, so a crash mid-run never leaves a task looking
  /// alive after a restart.
  #[instrument(skip(self))]
  pub async fn fail_orphaned(&self, reason: &str, now_ts: i64) -> DbResult<u64> {
    let result = sqlx::query(
      r#"UPDATE deployment_tasks SET status = 'failed', error = $1, completed_ts = $2
         WHERE status IN ('pending', 'running')"#,
    )
    .bind(reason)
    .bind(now_ts)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected())
  }
}

const SELECT_COLS: &str = r#"SELECT id, kind, service_kind, source_host_id, target_host_id, config,
                   template_id, cron_job_id, status, progress, current_phase, log,
                   error, created_ts, started_ts, completed_ts
         FROM deployment_tasks"#;

const SELECT_COLS_WHERE_ID: &str = r#"SELECT id, kind, service_kind, source_host_id, target_host_id, config,
                   template_id, cron_job_id, status, progress, current_phase, log,
                   error, created_ts, started_ts, completed_ts
         FROM deployment_tasks WHERE id = $1"#;

fn row_to_task(row: &PgRow) -> DbResult<DeploymentTask> {
  let kind: String = row.try_get("kind")?;
  let service_kind: Option<String> = row.try_get("service_kind")?;
  let status: String = row.try_get("status")?;

  Ok(DeploymentTask {
    id: row.try_get("id")?,
    kind: TaskKind::from_str(&kind)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "kind".into(), source: e.into() }))?,
    service_kind: service_kind
      .map(|s| ServiceKind::from_str(&s))
      .transpose()
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "service_kind".into(), source: e.into() }))?,
    source_host_id: row.try_get("source_host_id")?,
    target_host_id: row.try_get("target_host_id")?,
    config: row.try_get("config")?,
    template_id: row.try_get("template_id")?,
    cron_job_id: row.try_get("cron_job_id")?,
    status: TaskStatus::from_str(&status)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "status".into(), source: e.into() }))?,
    progress: row.try_get::<i16, _>("progress")? as u8,
    current_phase: row.try_get("current_phase")?,
    log: row.try_get("log")?,
    error: row.try_get("error")?,
    created_ts: row.try_get("created_ts")?,
    started_ts: row.try_get("started_ts")?,
    completed_ts: row.try_get("completed_ts")?,
  })
}
