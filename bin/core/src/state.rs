use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, Context};
use db::{
  AlertRepository, AuditRepository, CronRepository, DomainRepository,
  HostRepository, PlacementRepository, ScanRepository, TaskRepository,
  TemplateRepository,
};
use ssh::HostKeyStore;
use tracing::error;

use crate::{config::core_config, helpers::action_state::ActionStates};

static DB_POOL: OnceLock<sqlx::PgPool> = OnceLock::new();

pub fn db_pool() -> &'static sqlx::PgPool {
  DB_POOL.get().unwrap_or_else(|| {
    error!(
      "FATAL: db_pool accessed before initialized | ensure init_db_pool() runs during startup"
    );
    std::process::exit(1)
  })
}

/// Must be called once during startup, before any repository is used.
pub async fn init_db_pool() {
  let init = async {
    let pool =
      db::connect(&core_config().database_url, core_config().database_max_connections)
        .await
        .context("failed to connect to database")?;
    DB_POOL
      .set(pool)
      .map_err(|_| anyhow!("db pool initialized more than once"))?;
    anyhow::Ok(())
  }
  .await;
  if let Err(e) = init {
    error!("FATAL: failed to initialize database pool | {e:#}");
    std::process::exit(1);
  }
}

pub fn hosts() -> HostRepository {
  HostRepository::new(db_pool().clone())
}

pub fn tasks() -> TaskRepository {
  TaskRepository::new(db_pool().clone())
}

pub fn placements() -> PlacementRepository {
  PlacementRepository::new(db_pool().clone())
}

pub fn domains() -> DomainRepository {
  DomainRepository::new(db_pool().clone())
}

pub fn alerts() -> AlertRepository {
  AlertRepository::new(db_pool().clone())
}

pub fn cron_jobs() -> CronRepository {
  CronRepository::new(db_pool().clone())
}

pub fn templates() -> TemplateRepository {
  TemplateRepository::new(db_pool().clone())
}

pub fn audit() -> AuditRepository {
  AuditRepository::new(db_pool().clone())
}

pub fn scans() -> ScanRepository {
  ScanRepository::new(db_pool().clone())
}

pub async fn host_key_store() -> Arc<HostKeyStore> {
  static STORE: OnceLock<Arc<HostKeyStore>> = OnceLock::new();
  if let Some(store) = STORE.get() {
    return store.clone();
  }
  let store = HostKeyStore::load(&core_config().host_key_store_path)
    .await
    .unwrap_or_else(|e| {
      error!("FATAL: failed to load host key store | {e:#}");
      std::process::exit(1)
    });
  let _ = STORE.set(store.clone());
  store
}

pub fn action_states() -> &'static ActionStates {
  static ACTION_STATES: OnceLock<ActionStates> = OnceLock::new();
  ACTION_STATES.get_or_init(ActionStates::default)
}
