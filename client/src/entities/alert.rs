use serde::{Deserialize, Serialize};

use super::{host::HostId, placement::PlacementId};

pub type AlertId = i64;

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum AlertSeverity {
  Info,
  Warning,
  Critical,
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
pub enum AlertStatus {
  #[default]
  Active,
  Acknowledged,
  Resolved,
}

/// Deduplication key: at most one `active` alert may exist per tuple.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlertKey {
  pub kind: String,
  pub host_id: Option<HostId>,
  pub placement_id: Option<PlacementId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
  pub id: AlertId,
  pub kind: String,
  pub severity: AlertSeverity,
  pub host_id: Option<HostId>,
  pub placement_id: Option<PlacementId>,
  pub metric_name: Option<String>,
  pub value: Option<f64>,
  pub threshold: Option<f64>,
  pub status: AlertStatus,
  pub auto_resolve: bool,
  pub first_occurrence_ts: i64,
  pub last_occurrence_ts: i64,
  pub acknowledged_by: Option<String>,
  pub resolution_note: Option<String>,
  pub resolved_ts: Option<i64>,
}

impl Alert {
  pub fn key(&self) -> AlertKey {
    AlertKey {
      kind: self.kind.clone(),
      host_id: self.host_id,
      placement_id: self.placement_id,
    }
  }
}
