use fleet_client::entities::audit::AuditEntry;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::DbResult;

/// Audit entries are append-only: there is no `update` or `delete`
/// here by design.
pub struct AuditRepository {
  pool: PgPool,
}

impl AuditRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self, entry))]
  pub async fn append(&self, entry: &AuditEntry) -> DbResult<AuditEntry> {
    let row = sqlx::query(
      r#"INSERT INTO audit_entries (actor, action, detail, source_addr, ts)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING id, actor, action, detail, source_addr, ts"#,
    )
    .bind(&entry.actor)
    .bind(&entry.action)
    .bind(&entry.detail)
    .bind(&entry.source_addr)
    .bind(entry.ts)
    .fetch_one(&self.pool)
    .await?;
    row_to_entry(&row)
  }

  #[instrument(skip(self))]
  pub async fn list_since(&self, since_ts: i64, limit: i64) -> DbResult<Vec<AuditEntry>> {
    let rows = sqlx::query(
      "SELECT id, actor, action, detail, source_addr, ts FROM audit_entries WHERE ts >= $1 ORDER BY ts DESC LIMIT $2",
    )
    .bind(since_ts)
    .bind(limit)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_entry).collect()
  }
}

fn row_to_entry(row: &PgRow) -> DbResult<AuditEntry> {
  Ok(AuditEntry {
    id: row.try_get("id")?,
    actor: row.try_get("actor")?,
    action: row.try_get("action")?,
    detail: row.try_get("detail")?,
    source_addr: row.try_get("source_addr")?,
    ts: row.try_get("ts")?,
  })
}
