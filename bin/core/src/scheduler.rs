//! Cron-expression-driven recurring task creation, independent of
//! the monitor's always-on timers. A single tick loop at a fixed
//! interval (default 30s); `next_run_ts` is always recomputed from
//! the expression itself, never drifted by accumulated tick error.

use std::str::FromStr;

use croner::Cron;
use fleet_client::{
  entities::{
    cron::CronJob,
    task::{DeploymentTask, TaskStatus},
  },
  fleet_timestamp, FleetResult,
};
use tracing::{error, info};

use crate::{config::core_config, state};

pub fn spawn() {
  tokio::spawn(async move {
    loop {
      tokio::time::sleep(std::time::Duration::from_secs(core_config().scheduler_tick_secs)).await;
      tick(fleet_timestamp()).await;
    }
  });
}

async fn tick(ts: i64) {
  let due = match state::cron_jobs().due(ts).await {
    Ok(jobs) => jobs,
    Err(e) => {
      error!("scheduler tick: failed to list due jobs | {e:#}");
      return;
    }
  };

  for job in due {
    if let Err(e) = run_job(&job, ts).await {
      error!(cron_job_id = job.id, "scheduler tick: failed to dispatch job | {e:#}");
    }
  }
}

async fn run_job(job: &CronJob, ts: i64) -> FleetResult<()> {
  let config = match job.template_id {
    Some(template_id) => state::templates().get(template_id).await?.config,
    None => job.config.clone(),
  };

  let task = DeploymentTask {
    id: 0,
    kind: job.task_kind,
    service_kind: job.service_kind,
    source_host_id: None,
    target_host_id: job.target_host_id,
    config,
    template_id: job.template_id,
    cron_job_id: Some(job.id),
    status: TaskStatus::Pending,
    progress: 0,
    current_phase: "queued".to_string(),
    log: String::new(),
    error: None,
    created_ts: ts,
    started_ts: None,
    completed_ts: None,
  };

  let created = state::tasks().create(&task).await?;
  crate::deploy::dispatcher().submit(created.id).await?;
  info!(cron_job_id = job.id, task_id = created.id, "scheduler: dispatched task from cron job");

  let next_run_ts = next_run_after(&job.expression, ts)?;
  state::cron_jobs().record_run(job.id, ts, next_run_ts, created.id).await?;
  Ok(())
}

/// Computes the next fire time strictly after `from_ts` (epoch ms),
/// in epoch ms. Exposed so the `cron.create` handler can reject a
/// malformed expression at creation time instead of only at the next
/// tick.
pub fn next_run_after(expression: &str, from_ts: i64) -> FleetResult<i64> {
  let cron = Cron::from_str(expression)
    .map_err(|e| domain_cfg_err(format!("invalid cron expression {expression:?}: {e}")))?;
  let from = chrono::DateTime::from_timestamp_millis(from_ts)
    .ok_or_else(|| domain_cfg_err("cron tick timestamp out of range"))?;
  let next = cron
    .find_next_occurrence(&from, false)
    .map_err(|e| domain_cfg_err(format!("no next occurrence for {expression:?}: {e}")))?;
  Ok(next.timestamp_millis())
}

fn domain_cfg_err(msg: impl Into<String>) -> fleet_client::FleetError {
  fleet_client::FleetError::new(fleet_client::ErrorKind::ConfigInvalid, anyhow::anyhow!(msg.into()))
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn computes_next_minute_boundary() {
    // 2024-01-01T00:00:30Z, expression fires on every minute boundary.
    let from_ts = 1704067230_000;
    let next = next_run_after("* * * * *", from_ts).unwrap();
    assert_eq!(next, 1704067260_000);
  }

  #[test]
  fn rejects_malformed_expression() {
    assert!(next_run_after("not a cron", 0).is_err());
  }
}
