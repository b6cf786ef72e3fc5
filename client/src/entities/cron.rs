use serde::{Deserialize, Serialize};

use super::{ServiceKind, task::TaskKind};

pub type CronJobId = i64;

/// Cron-expression-driven definition that periodically instantiates
/// a [`super::task::DeploymentTask`] on a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CronJob {
  pub id: CronJobId,
  pub label: String,
  /// Standard 5-field cron expression, evaluated in UTC.
  pub expression: String,
  pub task_kind: TaskKind,
  pub service_kind: Option<ServiceKind>,
  pub config: serde_json::Value,
  pub template_id: Option<i64>,
  pub target_host_id: Option<i64>,
  pub enabled: bool,
  pub last_run_ts: Option<i64>,
  pub next_run_ts: Option<i64>,
  pub last_task_id: Option<i64>,
}
