use std::str::FromStr;

use fleet_client::entities::placement::{PlacementStatus, ServicePlacement};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

pub struct PlacementRepository {
  pool: PgPool,
}

impl PlacementRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn list_for_host(&self, host_id: i64) -> DbResult<Vec<ServicePlacement>> {
    let rows = sqlx::query(
      r#"SELECT id, name, host_id, port, capacity, current, status, last_seen_ts, created_ts
         FROM service_placements WHERE host_id = $1 ORDER BY id"#,
    )
    .bind(host_id)
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_placement).collect()
  }

  #[instrument(skip(self))]
  pub async fn list_all(&self) -> DbResult<Vec<ServicePlacement>> {
    let rows = sqlx::query(
      r#"SELECT id, name, host_id, port, capacity, current, status, last_seen_ts, created_ts
         FROM service_placements ORDER BY id"#,
    )
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_placement).collect()
  }

  #[instrument(skip(self, placement))]
  pub async fn create(&self, placement: &ServicePlacement) -> DbResult<ServicePlacement> {
    let row = sqlx::query(
      r#"INSERT INTO service_placements (name, host_id, port, capacity, current, status, last_seen_ts, created_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, name, host_id, port, capacity, current, status, last_seen_ts, created_ts"#,
    )
    .bind(&placement.name)
    .bind(placement.host_id)
    .bind(placement.port as i32)
    .bind(placement.capacity as i32)
    .bind(placement.current as i32)
    .bind(placement.status.to_string())
    .bind(placement.last_seen_ts)
    .bind(placement.created_ts)
    .fetch_one(&self.pool)
    .await?;
    row_to_placement(&row)
  }

  /// Atomically increments `current` if capacity allows, returning
  /// `false` without mutating anything if the host is already full.
  #[instrument(skip(self))]
  pub async fn try_claim_slot(&self, id: i64) -> DbResult<bool> {
    let result = sqlx::query(
      "UPDATE service_placements SET current = current + 1 WHERE id = $1 AND current < capacity",
    )
    .bind(id)
    .execute(&self.pool)
    .await?;
    Ok(result.rows_affected() == 1)
  }

  #[instrument(skip(self))]
  pub async fn release_slot(&self, id: i64) -> DbResult<()> {
    sqlx::query("UPDATE service_placements SET current = GREATEST(current - 1, 0) WHERE id = $1")
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn set_status(&self, id: i64, status: PlacementStatus, last_seen_ts: Option<i64>) -> DbResult<()> {
    sqlx::query("UPDATE service_placements SET status = $1, last_seen_ts = $2 WHERE id = $3")
      .bind(status.to_string())
      .bind(last_seen_ts)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  /// Removes a `starting` placement whose backing install task
  /// failed, freeing its reserved `(host_id, port)` pair.
  #[instrument(skip(self))]
  pub async fn delete(&self, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM service_placements WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(())
  }
}

fn row_to_placement(row: &PgRow) -> DbResult<ServicePlacement> {
  let status: String = row.try_get("status")?;
  Ok(ServicePlacement {
    id: row.try_get("id")?,
    name: row.try_get("name")?,
    host_id: row.try_get("host_id")?,
    port: row.try_get::<i32, _>("port")? as u16,
    capacity: row.try_get::<i32, _>("capacity")? as u32,
    current: row.try_get::<i32, _>("current")? as u32,
    status: PlacementStatus::from_str(&status)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "status".into(), source: e.into() }))?,
    last_seen_ts: row.try_get("last_seen_ts")?,
    created_ts: row.try_get("created_ts")?,
  })
}
