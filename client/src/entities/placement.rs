use serde::{Deserialize, Serialize};

use super::host::HostId;

pub type PlacementId = i64;

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
pub enum PlacementStatus {
  #[default]
  Starting,
  Running,
  Draining,
  Stopped,
  Failed,
}

/// A single application worker instance placed on a host.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePlacement {
  pub id: PlacementId,
  /// Globally unique logical name, e.g. `tenant-odoo-017`.
  pub name: String,
  pub host_id: HostId,
  pub port: u16,
  pub capacity: u32,
  pub current: u32,
  pub status: PlacementStatus,
  pub last_seen_ts: Option<i64>,
  pub created_ts: i64,
}

impl ServicePlacement {
  pub fn has_capacity(&self) -> bool {
    self.current < self.capacity
  }
}
