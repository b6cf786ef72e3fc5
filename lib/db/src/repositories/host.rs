use std::str::FromStr;

use fleet_client::entities::{
  host::{Host, HostAuth, HostFacts, HostStatus},
  ServiceKind,
};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

/// Repository for the host inventory. Every mutation goes through
/// `update` and must supply the version it read; a stale version
/// is rejected with [`DbError::VersionConflict`] rather than
/// silently overwriting a concurrent writer.
pub struct HostRepository {
  pool: PgPool,
}

impl HostRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn get(&self, id: i64) -> DbResult<Host> {
    let row = sqlx::query(
      r#"SELECT id, name, address, port, "user", auth, declared_roles,
                current_services, facts, health_score, last_probe_ts,
                consecutive_probe_failures, status, version, created_ts
         FROM hosts WHERE id = $1"#,
    )
    .bind(id)
    .fetch_optional(&self.pool)
    .await?
    .ok_or(DbError::NotFound)?;

    row_to_host(&row)
  }

  #[instrument(skip(self))]
  pub async fn list(&self) -> DbResult<Vec<Host>> {
    let rows = sqlx::query(
      r#"SELECT id, name, address, port, "user", auth, declared_roles,
                current_services, facts, health_score, last_probe_ts,
                consecutive_probe_failures, status, version, created_ts
         FROM hosts ORDER BY id"#,
    )
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(row_to_host).collect()
  }

  #[instrument(skip(self, host))]
  pub async fn create(&self, host: &Host) -> DbResult<Host> {
    let row = sqlx::query(
      r#"INSERT INTO hosts
           (name, address, port, "user", auth, declared_roles, current_services,
            facts, health_score, last_probe_ts, consecutive_probe_failures,
            status, version, created_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, 0, $13)
         RETURNING id, name, address, port, "user", auth, declared_roles,
                   current_services, facts, health_score, last_probe_ts,
                   consecutive_probe_failures, status, version, created_ts"#,
    )
    .bind(&host.name)
    .bind(&host.address)
    .bind(host.port as i32)
    .bind(&host.user)
    .bind(serde_json::to_value(&host.auth).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.declared_roles).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.current_services).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.facts).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(host.health_score)
    .bind(host.last_probe_ts)
    .bind(host.consecutive_probe_failures as i32)
    .bind(host.status.to_string())
    .bind(host.created_ts)
    .fetch_one(&self.pool)
    .await?;

    row_to_host(&row)
  }

  /// Updates `host` if its row is still at `expected_version`,
  /// bumping the stored version by one. Returns the post-update row.
  #[instrument(skip(self, host))]
  pub async fn update(&self, host: &Host, expected_version: i64) -> DbResult<Host> {
    let row = sqlx::query(
      r#"UPDATE hosts SET
           name = $1, address = $2, port = $3, "user" = $4, auth = $5,
           declared_roles = $6, current_services = $7, facts = $8,
           health_score = $9, last_probe_ts = $10,
           consecutive_probe_failures = $11, status = $12, version = version + 1
         WHERE id = $13 AND version = $14
         RETURNING id, name, address, port, "user", auth, declared_roles,
                   current_services, facts, health_score, last_probe_ts,
                   consecutive_probe_failures, status, version, created_ts"#,
    )
    .bind(&host.name)
    .bind(&host.address)
    .bind(host.port as i32)
    .bind(&host.user)
    .bind(serde_json::to_value(&host.auth).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.declared_roles).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.current_services).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(serde_json::to_value(&host.facts).map_err(|e| DbError::Query(sqlx::Error::Encode(e.into())))?)
    .bind(host.health_score)
    .bind(host.last_probe_ts)
    .bind(host.consecutive_probe_failures as i32)
    .bind(host.status.to_string())
    .bind(host.id)
    .bind(expected_version)
    .fetch_optional(&self.pool)
    .await?;

    match row {
      Some(row) => row_to_host(&row),
      None => {
        let current_version: i64 = sqlx::query_scalar("SELECT version FROM hosts WHERE id = $1")
          .bind(host.id)
          .fetch_optional(&self.pool)
          .await?
          .ok_or(DbError::NotFound)?;
        Err(DbError::VersionConflict { expected: expected_version, actual: current_version })
      }
    }
  }

  #[instrument(skip(self))]
  pub async fn delete(&self, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM hosts WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(())
  }

  /// Hosts that are `active` and declare `role` among their eligible
  /// service kinds.
  #[instrument(skip(self))]
  pub async fn list_by_role(&self, role: ServiceKind) -> DbResult<Vec<Host>> {
    let rows = sqlx::query(
      r#"SELECT id, name, address, port, "user", auth, declared_roles,
                current_services, facts, health_score, last_probe_ts,
                consecutive_probe_failures, status, version, created_ts
         FROM hosts
         WHERE status = 'active' AND declared_roles @> $1::jsonb
         ORDER BY id"#,
    )
    .bind(serde_json::json!([role.to_string()]))
    .fetch_all(&self.pool)
    .await?;

    rows.iter().map(row_to_host).collect()
  }

  /// Picks the best host for a new placement of `role`: active,
  /// role-eligible, ranked by health score descending, then by
  /// current placement count ascending (spreads load), then by free
  /// memory descending. Ties broken by lowest id.
  ///
  /// `weights` is accepted for forward compatibility with an
  /// operator-tunable scoring function; the current implementation
  /// uses a fixed lexicographic ranking rather than a weighted sum,
  /// since no caller supplies non-default weights yet.
  #[instrument(skip(self))]
  pub async fn pick_for_placement(&self, role: ServiceKind, _weights: Option<&PlacementWeights>) -> DbResult<Option<Host>> {
    let row = sqlx::query(
      r#"SELECT h.id, h.name, h.address, h.port, h."user", h.auth, h.declared_roles,
                h.current_services, h.facts, h.health_score, h.last_probe_ts,
                h.consecutive_probe_failures, h.status, h.version, h.created_ts
         FROM hosts h
         LEFT JOIN (
           SELECT host_id, count(*) AS placement_count
           FROM service_placements
           WHERE status IN ('starting', 'running')
           GROUP BY host_id
         ) p ON p.host_id = h.id
         WHERE h.status = 'active' AND h.declared_roles @> $1::jsonb
         ORDER BY h.health_score DESC, COALESCE(p.placement_count, 0) ASC,
                  (h.facts ->> 'memory_gb')::float8 DESC NULLS LAST, h.id ASC
         LIMIT 1"#,
    )
    .bind(serde_json::json!([role.to_string()]))
    .fetch_optional(&self.pool)
    .await?;

    row.as_ref().map(row_to_host).transpose()
  }
}

/// Placeholder for an operator-tunable scoring weight set; reserved
/// for when `pick_for_placement` grows a configurable scoring
/// function instead of its current fixed ranking.
#[derive(Debug, Clone, Default)]
pub struct PlacementWeights {
  pub health_weight: f64,
  pub load_weight: f64,
  pub free_memory_weight: f64,
}

fn row_to_host(row: &PgRow) -> DbResult<Host> {
  let status: String = row.try_get("status")?;
  let declared_roles: serde_json::Value = row.try_get("declared_roles")?;
  let current_services: serde_json::Value = row.try_get("current_services")?;
  let auth: serde_json::Value = row.try_get("auth")?;
  let facts: serde_json::Value = row.try_get("facts")?;

  Ok(Host {
    id: row.try_get("id")?,
    name: row.try_get("name")?,
    address: row.try_get("address")?,
    port: row.try_get::<i32, _>("port")? as u16,
    user: row.try_get("user")?,
    auth: serde_json::from_value::<HostAuth>(auth)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "auth".into(), source: e.into() }))?,
    declared_roles: serde_json::from_value::<Vec<ServiceKind>>(declared_roles)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "declared_roles".into(), source: e.into() }))?,
    current_services: serde_json::from_value::<Vec<ServiceKind>>(current_services)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "current_services".into(), source: e.into() }))?,
    facts: serde_json::from_value::<HostFacts>(facts)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "facts".into(), source: e.into() }))?,
    health_score: row.try_get("health_score")?,
    last_probe_ts: row.try_get("last_probe_ts")?,
    consecutive_probe_failures: row.try_get::<i32, _>("consecutive_probe_failures")? as u32,
    status: HostStatus::from_str(&status)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "status".into(), source: e.into() }))?,
    version: row.try_get("version")?,
    created_ts: row.try_get("created_ts")?,
  })
}
