use std::str::FromStr;

use fleet_client::entities::domain::{DomainMapping, VerificationStatus};
use sqlx::{postgres::PgRow, PgPool, Row};
use tracing::instrument;

use crate::error::{DbError, DbResult};

pub struct DomainRepository {
  pool: PgPool,
}

impl DomainRepository {
  pub fn new(pool: PgPool) -> Self {
    Self { pool }
  }

  #[instrument(skip(self))]
  pub async fn list_all(&self) -> DbResult<Vec<DomainMapping>> {
    let rows = sqlx::query(
      r#"SELECT id, domain, target, tls, cert_path, key_path, status, last_verified_ts, created_ts
         FROM domain_mappings ORDER BY id"#,
    )
    .fetch_all(&self.pool)
    .await?;
    rows.iter().map(row_to_domain).collect()
  }

  #[instrument(skip(self, mapping))]
  pub async fn create(&self, mapping: &DomainMapping) -> DbResult<DomainMapping> {
    let row = sqlx::query(
      r#"INSERT INTO domain_mappings (domain, target, tls, cert_path, key_path, status, last_verified_ts, created_ts)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
         RETURNING id, domain, target, tls, cert_path, key_path, status, last_verified_ts, created_ts"#,
    )
    .bind(&mapping.domain)
    .bind(&mapping.target)
    .bind(mapping.tls)
    .bind(&mapping.cert_path)
    .bind(&mapping.key_path)
    .bind(mapping.status.to_string())
    .bind(mapping.last_verified_ts)
    .bind(mapping.created_ts)
    .fetch_one(&self.pool)
    .await?;
    row_to_domain(&row)
  }

  #[instrument(skip(self))]
  pub async fn set_verification(&self, id: i64, status: VerificationStatus, ts: i64) -> DbResult<()> {
    sqlx::query("UPDATE domain_mappings SET status = $1, last_verified_ts = $2 WHERE id = $3")
      .bind(status.to_string())
      .bind(ts)
      .bind(id)
      .execute(&self.pool)
      .await?;
    Ok(())
  }

  #[instrument(skip(self))]
  pub async fn delete(&self, id: i64) -> DbResult<()> {
    sqlx::query("DELETE FROM domain_mappings WHERE id = $1").bind(id).execute(&self.pool).await?;
    Ok(())
  }
}

fn row_to_domain(row: &PgRow) -> DbResult<DomainMapping> {
  let status: String = row.try_get("status")?;
  Ok(DomainMapping {
    id: row.try_get("id")?,
    domain: row.try_get("domain")?,
    target: row.try_get("target")?,
    tls: row.try_get("tls")?,
    cert_path: row.try_get("cert_path")?,
    key_path: row.try_get("key_path")?,
    status: VerificationStatus::from_str(&status)
      .map_err(|e| DbError::Query(sqlx::Error::ColumnDecode { index: "status".into(), source: e.into() }))?,
    last_verified_ts: row.try_get("last_verified_ts")?,
    created_ts: row.try_get("created_ts")?,
  })
}
