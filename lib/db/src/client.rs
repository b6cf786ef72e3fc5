use sqlx::postgres::{PgPool, PgPoolOptions};

/// Connects to Postgres and runs pending migrations. Call once at
/// startup; the returned pool is shared by every repository.
pub async fn connect(database_url: &str, max_connections: u32) -> anyhow::Result<PgPool> {
  let pool = PgPoolOptions::new()
    .max_connections(max_connections)
    .connect(database_url)
    .await?;

  sqlx::migrate!("./migrations").run(&pool).await?;

  Ok(pool)
}
