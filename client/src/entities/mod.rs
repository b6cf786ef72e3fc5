pub mod alert;
pub mod audit;
pub mod cron;
pub mod domain;
pub mod host;
pub mod logger;
pub mod placement;
pub mod scan;
pub mod task;
pub mod template;

use serde::{Deserialize, Serialize};

/// Kind of service the orchestrator knows how to install and manage.
/// Shared across [`host::Host`] declared/current roles,
/// [`task::DeploymentTask`] targets, and installer selection.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum ServiceKind {
  ContainerEngine,
  ReverseProxy,
  RelationalDb,
  Cache,
  AppWorker,
}

/// How often a periodic loop runs. Mirrors the small set of
/// intervals operators actually configure, rather than accepting
/// arbitrary durations everywhere.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Default,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
)]
#[strum(serialize_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum Timelength {
  FiveSeconds,
  ThirtySeconds,
  #[default]
  OneMinute,
  TwoMinutes,
  FiveMinutes,
  ThirtyMinutes,
  OneHour,
}

impl Timelength {
  pub fn as_secs(&self) -> u64 {
    match self {
      Timelength::FiveSeconds => 5,
      Timelength::ThirtySeconds => 30,
      Timelength::OneMinute => 60,
      Timelength::TwoMinutes => 120,
      Timelength::FiveMinutes => 300,
      Timelength::ThirtyMinutes => 1_800,
      Timelength::OneHour => 3_600,
    }
  }
}

/// Converts an empty string to `None`, mirroring how the database
/// layer and config loader represent "unset" for plain strings.
pub fn optional_string(s: String) -> Option<String> {
  if s.is_empty() { None } else { Some(s) }
}
