use serde::{Deserialize, Serialize};

pub type DomainId = i64;

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
pub enum VerificationStatus {
  #[default]
  Unverified,
  Verified,
  Failed,
}

/// Maps an external, operator-owned domain to an internal target
/// (a [`super::placement::ServicePlacement`] name). Changes here
/// drive regeneration of the reverse-proxy configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainMapping {
  pub id: DomainId,
  pub domain: String,
  pub target: String,
  pub tls: bool,
  pub cert_path: Option<String>,
  pub key_path: Option<String>,
  pub status: VerificationStatus,
  pub last_verified_ts: Option<i64>,
  pub created_ts: i64,
}
