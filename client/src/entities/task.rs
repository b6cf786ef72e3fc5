use serde::{Deserialize, Serialize};

use super::{ServiceKind, host::HostId};

pub type TaskId = i64;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskKind {
  Install,
  Migrate,
  Backup,
  NetworkScan,
  FullSetup,
}

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Serialize,
  Deserialize,
  Default,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum TaskStatus {
  #[default]
  Pending,
  Running,
  Completed,
  Failed,
  Cancelled,
}

impl TaskStatus {
  pub fn is_terminal(&self) -> bool {
    matches!(self, TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled)
  }
}

/// A durable, resumable unit of orchestration work. See the
/// Deployment Engine for the state machine and dispatch table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeploymentTask {
  pub id: TaskId,
  pub kind: TaskKind,
  pub service_kind: Option<ServiceKind>,
  pub source_host_id: Option<HostId>,
  pub target_host_id: Option<HostId>,
  pub config: serde_json::Value,
  pub template_id: Option<i64>,
  pub cron_job_id: Option<i64>,
  pub status: TaskStatus,
  /// Monotonically non-decreasing, 0..100.
  pub progress: u8,
  pub current_phase: String,
  /// Append-only, size-bounded. Older lines are dropped with a
  /// truncation marker rather than growing without limit.
  pub log: String,
  pub error: Option<String>,
  pub created_ts: i64,
  pub started_ts: Option<i64>,
  pub completed_ts: Option<i64>,
}

/// Hard cap on `DeploymentTask.log`, in bytes.
pub const TASK_LOG_CAP_BYTES: usize = 256 * 1024;

pub const TASK_LOG_TRUNCATION_MARKER: &str = "\n...[truncated, oldest lines dropped]...\n";

impl DeploymentTask {
  /// Appends a line to the log, truncating the oldest content if
  /// the row would exceed [`TASK_LOG_CAP_BYTES`].
  pub fn push_log_line(&mut self, line: &str) {
    self.log.push_str(line);
    self.log.push('\n');
    if self.log.len() > TASK_LOG_CAP_BYTES {
      let keep_from = self.log.len() - (TASK_LOG_CAP_BYTES * 3 / 4);
      let boundary = self.log[keep_from..]
        .find('\n')
        .map(|i| keep_from + i + 1)
        .unwrap_or(keep_from);
      self.log = format!("{TASK_LOG_TRUNCATION_MARKER}{}", &self.log[boundary..]);
    }
  }

  pub fn set_progress(&mut self, phase: &str, progress: u8) {
    debug_assert!(progress >= self.progress, "progress must not regress");
    self.current_phase = phase.to_string();
    self.progress = self.progress.max(progress);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn log_truncates_past_cap() {
    let mut task = DeploymentTask {
      id: 1,
      kind: TaskKind::Install,
      service_kind: Some(ServiceKind::ContainerEngine),
      source_host_id: None,
      target_host_id: Some(1),
      config: serde_json::json!({}),
      template_id: None,
      cron_job_id: None,
      status: TaskStatus::Running,
      progress: 0,
      current_phase: "connect".into(),
      log: String::new(),
      error: None,
      created_ts: 0,
      started_ts: None,
      completed_ts: None,
    };
    for i in 0..20_000 {
      task.push_log_line(&format!("line {i} {}", "x".repeat(20)));
    }
    assert!(task.log.len() <= TASK_LOG_CAP_BYTES + TASK_LOG_TRUNCATION_MARKER.len());
    assert!(task.log.starts_with(TASK_LOG_TRUNCATION_MARKER));
  }

  #[test]
  fn progress_never_regresses() {
    let mut task = DeploymentTask {
      id: 1,
      kind: TaskKind::Install,
      service_kind: None,
      source_host_id: None,
      target_host_id: None,
      config: serde_json::json!({}),
      template_id: None,
      cron_job_id: None,
      status: TaskStatus::Running,
      progress: 50,
      current_phase: "verify".into(),
      log: String::new(),
      error: None,
      created_ts: 0,
      started_ts: None,
      completed_ts: None,
    };
    task.set_progress("verify", 10);
    assert_eq!(task.progress, 50);
  }
}
