use serde::{Deserialize, Serialize};

/// The closed set of error kinds a caller can branch on.
///
/// Internal context (the `anyhow` chain) is logged but never
/// returned to an operator; only the kind and a free-text detail
/// cross the API boundary.
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
pub enum ErrorKind {
  Unreachable,
  AuthFailed,
  HostKeyChanged,
  CommandFailed,
  VerifyFailed,
  DependencyMissing,
  CapacityExceeded,
  ConfigInvalid,
  Orphaned,
  Timeout,
  /// Catch-all for errors that don't fit the taxonomy above
  /// (bad request shape, not-found, etc).
  Internal,
}

#[derive(Debug, thiserror::Error)]
#[error("{kind}: {source}")]
pub struct FleetError {
  pub kind: ErrorKind,
  #[source]
  pub source: anyhow::Error,
}

impl FleetError {
  pub fn new(kind: ErrorKind, source: impl Into<anyhow::Error>) -> Self {
    Self { kind, source: source.into() }
  }
}

pub trait WithErrorKind<T> {
  fn kind(self, kind: ErrorKind) -> Result<T, FleetError>;
}

impl<T, E: Into<anyhow::Error>> WithErrorKind<T> for Result<T, E> {
  fn kind(self, kind: ErrorKind) -> Result<T, FleetError> {
    self.map_err(|e| FleetError::new(kind, e.into()))
  }
}

pub type FleetResult<T> = Result<T, FleetError>;
