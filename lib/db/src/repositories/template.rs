use std::str::FromStr;

use fleet_client::entities::{template::ConfigurationTemplate, ServiceKind};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

pub struct TemplateRepository {
  pool: PgPool,
}

impl TemplateRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn get(&self, id: i64) -> DbResult<ConfigurationTemplate> {
    let row = sqlx::query("SELECT id, label, service_kind, config, description FROM configuration_templates WHERE id = $1")
      .bind(id)
      .fetch_optional(&self.pool)
      .await?
      .ok_or(DbError::NotFound)?;
    row_to_template(&row)
  }

  #[instrument(skip(self))]
  pub async fn list_all(&self) -> DbResult<Vec<ConfigurationTemplate>> {
    let rows = sqlx::query("SELECT id, label, service_kind, config, description FROM configuration_templates ORDER BY id")
      .fetch_all(&self.pool)
      .await?;
    rows.iter().map(row_to_template).collect()
  }

  #[instrument(skip(self, template))]
  pub async fn create(&self, template: &ConfigurationTemplate) -> DbResult<ConfigurationTemplate> {
    let row = sqlx::query(
      r#"INSERT INTO configuration_templates (label, service_kind, config, description)
         VALUES ($1, $2, $3, $4)
         RETURNING id, label, service_kind, config, description"#,
    )
    .bind(&template.label)
    .bind(template.service_kind.to_string())
    .bind(&template.config)
    .bind(&template.description)
    .fetch_one(&self.pool)
    .await?;
    row_to_template(&row)
  }

  /// Overwrites label/config/description in place. Existing
  /// references (cron jobs, pending/running tasks) keep pointing at
  /// the same id and pick up the new config on their next resolve --
  /// this is the one mutation path, since §4.14 models config
  /// *changes* as an in-place update and relies on copy-on-use for
  /// tasks that already resolved the old version.
  #[instrument(skip(self, template))]
  pub async fn update(&self, template: &ConfigurationTemplate) -> DbResult<ConfigurationTemplate> {
    let row = sqlx::query(
      r#"UPDATE configuration_templates SET label = $2, config = $3, description = $4
         WHERE id = $1
         RETURNING id, label, service_kind, config, description"#,
    )
    .bind(template.id)
    .bind(&template.label)
    .bind(&template.config)
    .bind(&template.description)
    .fetch_optional(&self.pool)
    .await?
    .ok_or(DbError::NotFound)?;
    row_to_template(&row)
  }

  /// Callers check this before calling [`Self::delete`]. A template
  /// referenced by any cron job, or by a deployment task that hasn't
  /// reached a terminal state, blocks deletion -- those rows would
  /// need to re-resolve the template later. A template referenced
  /// only by completed/failed/cancelled tasks does not block, since
  /// those tasks already hold their own copy-on-use config.
  #[instrument(skip(self))]
  pub async fn is_referenced(&self, id: i64) -> DbResult<bool> {
    let count: i64 = sqlx::query_scalar(
      "SELECT (SELECT count(*) FROM deployment_tasks WHERE template_id = $1 AND status IN ('pending', 'running'))
              + (SELECT count(*) FROM cron_jobs WHERE template_id = $1)",
    )
    .bind(id)
    .fetch_one(&self.pool)
    .await?;
    Ok(count > 0)
  }

  #[instrument(skip(self))]
  pub async fn delete(&self, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM configuration_templates WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(())
  }
}

fn row_to_template(row: &PgRow) -> DbResult<ConfigurationTemplate> {
  let service_kind: String = row.try_get("service_kind")?;
  Ok(ConfigurationTemplate {
    id: row.try_get("id")?,
    label: row.try_get("label")?,
    service_kind: ServiceKind::from_str(&service_kind)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "service_kind".into(), source: e.into() }))?,
    config: row.try_get("config")?,
    description: row.try_get("description")?,
  })
}
