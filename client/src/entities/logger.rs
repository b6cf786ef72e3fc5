use serde::{Deserialize, Serialize};

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
  Error,
  Warn,
  Info,
  Debug,
  Trace,
}

impl Default for LogLevel {
  fn default() -> Self {
    LogLevel::Info
  }
}

impl From<LogLevel> for tracing::Level {
  fn from(value: LogLevel) -> Self {
    match value {
      LogLevel::Error => tracing::Level::ERROR,
      LogLevel::Warn => tracing::Level::WARN,
      LogLevel::Info => tracing::Level::INFO,
      LogLevel::Debug => tracing::Level::DEBUG,
      LogLevel::Trace => tracing::Level::TRACE,
    }
  }
}

#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::EnumString, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum StdioLogMode {
  #[default]
  Standard,
  Json,
  None,
}

/// Configuration for [`logger::init`], parsed as part of
/// [`crate::config`]'s `Env`/`ControlPlaneConfig` layering.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
  #[serde(default)]
  pub level: LogLevel,
  #[serde(default)]
  pub stdio: StdioLogMode,
  #[serde(default)]
  pub pretty: bool,
  #[serde(default)]
  pub location: bool,
  #[serde(default = "default_true")]
  pub ansi: bool,
  #[serde(default)]
  pub otlp_endpoint: String,
  #[serde(default = "default_service_name")]
  pub opentelemetry_service_name: String,
  #[serde(default = "default_scope_name")]
  pub opentelemetry_scope_name: String,
}

fn default_true() -> bool {
  true
}

fn default_service_name() -> String {
  "fleet-core".to_string()
}

fn default_scope_name() -> String {
  "fleet-core".to_string()
}

impl Default for LogConfig {
  fn default() -> Self {
    Self {
      level: LogLevel::default(),
      stdio: StdioLogMode::default(),
      pretty: false,
      location: false,
      ansi: true,
      otlp_endpoint: String::new(),
      opentelemetry_service_name: default_service_name(),
      opentelemetry_scope_name: default_scope_name(),
    }
  }
}
