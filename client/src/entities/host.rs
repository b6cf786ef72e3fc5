use serde::{Deserialize, Serialize};

use super::ServiceKind;

pub type HostId = i64;

/// A managed remote machine under the control plane's authority.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
  pub id: HostId,
  pub name: String,
  pub address: String,
  pub port: u16,
  pub user: String,
  pub auth: HostAuth,
  /// Service roles this host is eligible to run.
  pub declared_roles: Vec<ServiceKind>,
  /// Service roles actually installed and verified on this host.
  /// Invariant: always a subset of `declared_roles`.
  pub current_services: Vec<ServiceKind>,
  pub facts: HostFacts,
  /// 0..100, recomputed by the monitor each health tick.
  pub health_score: i32,
  pub last_probe_ts: Option<i64>,
  pub consecutive_probe_failures: u32,
  pub status: HostStatus,
  /// Optimistic concurrency counter. Every write through the
  /// inventory repository must supply the version it read and
  /// bumps it by one; a mismatch means a concurrent writer won.
  pub version: i64,
  pub created_ts: i64,
}

impl Host {
  /// True once every currently-installed service is also declared.
  /// Should hold for every row at rest; checked in repository tests
  /// rather than enforced by the type system, since facts/services
  /// are independently refreshed.
  pub fn current_services_within_declared(&self) -> bool {
    self
      .current_services
      .iter()
      .all(|s| self.declared_roles.contains(s))
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum HostAuth {
  /// AES-GCM ciphertext of the password, base64 encoded. See
  /// the credential store for the encrypt/decrypt boundary;
  /// plaintext never reaches this struct.
  Password { ciphertext: String },
  /// Path to private key material on the control-plane host.
  PrivateKey { path: String },
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
pub enum HostStatus {
  #[default]
  Pending,
  Active,
  Maintenance,
  Failed,
  Decommissioned,
}

/// System facts collected by the host probe. Any field that
/// failed to parse is left `None` rather than failing the probe.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HostFacts {
  pub cpu_cores: Option<u32>,
  pub memory_gb: Option<f64>,
  pub disk_gb: Option<f64>,
  pub os_family: Option<String>,
  pub os_version: Option<String>,
  pub kernel: Option<String>,
  pub sudo: bool,
  pub environment: Option<EnvironmentKind>,
}

/// Drives which installer strategy (§4.3) is selected for a host.
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
pub enum EnvironmentKind {
  MetalOrVm,
  ContainerHostWithSocket,
  ContainerNested,
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn declared_superset_holds_for_clean_host() {
    let host = Host {
      id: 1,
      name: "h1".into(),
      address: "10.0.0.1".into(),
      port: 22,
      user: "deployer".into(),
      auth: HostAuth::PrivateKey { path: "/k".into() },
      declared_roles: vec![ServiceKind::ContainerEngine, ServiceKind::AppWorker],
      current_services: vec![ServiceKind::ContainerEngine],
      facts: HostFacts::default(),
      health_score: 100,
      last_probe_ts: None,
      consecutive_probe_failures: 0,
      status: HostStatus::Active,
      version: 0,
      created_ts: 0,
    };
    assert!(host.current_services_within_declared());
  }
}
