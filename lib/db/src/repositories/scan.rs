use fleet_client::entities::scan::NetworkScanResult;
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::DbResult;

pub struct ScanRepository {
  pool: PgPool,
}

impl ScanRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self, result))]
  pub async fn append(&self, result: &NetworkScanResult) -> DbResult<NetworkScanResult> {
    let row = sqlx::query(
      r#"INSERT INTO network_scan_results
           (task_id, address, reachable, matched_credential_label, facts_summary, created_ts)
         VALUES ($1, $2, $3, $4, $5, $6)
         RETURNING id, task_id, address, reachable, matched_credential_label, facts_summary, created_ts"#,
    )
    .bind(result.task_id)
    .bind(&result.address)
    .bind(result.reachable)
    .bind(&result.matched_credential_label)
    .bind(&result.facts_summary)
    .bind(result.created_ts)
    .fetch_one(&self.pool)
    .await?;
    row_to_result(&row)
  }

  #[instrument(skip(self))]
  pub async fn for_task(&self, task_id: i64) -> DbResult<Vec<NetworkScanResult>> {
    let rows = sqlx::query(
      r#"SELECT id, task_id, address, reachable, matched_credential_label, facts_summary, created_ts
         FROM network_scan_results WHERE task_id = $1 ORDER BY id"#,
    )
    .bind(task_id)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_result).collect()
  }
}

fn row_to_result(row: &PgRow) -> DbResult<NetworkScanResult> {
  Ok(NetworkScanResult {
    id: row.try_get("id")?,
    task_id: row.try_get("task_id")?,
    address: row.try_get("address")?,
    reachable: row.try_get("reachable")?,
    matched_credential_label: row.try_get("matched_credential_label")?,
    facts_summary: row.try_get("facts_summary")?,
    created_ts: row.try_get("created_ts")?,
  })
}
