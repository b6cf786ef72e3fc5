use serde::{Deserialize, Serialize};

use super::task::TaskId;

pub type ScanResultId = i64;

/// One probed address from a network-scan task. Persisted as it
/// completes so results remain queryable after the task finishes,
/// not only through its log text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkScanResult {
  pub id: ScanResultId,
  pub task_id: TaskId,
  pub address: String,
  pub reachable: bool,
  pub matched_credential_label: Option<String>,
  pub facts_summary: Option<String>,
  pub created_ts: i64,
}
