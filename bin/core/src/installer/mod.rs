//! One installer per [`ServiceKind`]. Each declares applicability
//! over host facts, a detect step, a strategy (container-engine
//! only), an ordered install plan, and a verify step distinct from
//! the plan itself.

mod app_worker;
mod cache;
mod container_engine;
mod relational_db;
mod reverse_proxy;

use std::time::Duration;

use fleet_client::{
  entities::{host::HostFacts, ServiceKind},
  error::ErrorKind,
  FleetResult,
};
use ssh::Session;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
  Absent,
  PresentInactive { version: Option<String> },
  PresentActive { version: Option<String> },
  Incompatible { reason: String },
}

/// Behavior tags carried by each [`InstallStep`]. Multiple tags may
/// apply to the same step.
#[derive(Debug, Clone, Copy, Default)]
pub struct StepTags {
  pub ignore_errors: bool,
  pub retryable: bool,
  pub idempotent: bool,
}

#[derive(Debug, Clone)]
pub enum InstallStep {
  Command { command: String, tags: StepTags },
  Upload { remote_path: String, content: Vec<u8>, mode: u32, tags: StepTags },
}

impl InstallStep {
  pub fn command(command: impl Into<String>, tags: StepTags) -> Self {
    Self::Command { command: command.into(), tags }
  }
}

/// Container-engine installer strategy, chosen from C2's
/// environment classification. Other installers always use
/// `Standard`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Mount the host daemon socket, install CLI only.
  HostSocket,
  /// Run a daemon inside the host with a container-safe storage
  /// driver and no iptables/bridge management.
  Nested,
  /// System package install, enable as a system service.
  Standard,
}

#[async_trait::async_trait]
pub trait Installer: Send + Sync {
  fn service_kind(&self) -> ServiceKind;

  /// Predicates over host facts (OS family, minimum RAM, etc).
  fn applicable(&self, facts: &HostFacts) -> bool;

  /// Extra requirements beyond host facts, e.g. the app-worker
  /// installer requiring a reachable DB/cache in `config`. Returns
  /// `Err(DependencyMissing)` if unmet.
  async fn preflight(&self, config: &serde_json::Value) -> FleetResult<()> {
    let _ = config;
    Ok(())
  }

  fn strategy(&self, facts: &HostFacts) -> Strategy {
    let _ = facts;
    Strategy::Standard
  }

  fn plan(&self, strategy: Strategy, config: &serde_json::Value) -> Vec<InstallStep>;

  async fn detect(&self, session: &Session, timeout: Duration) -> FleetResult<Detection>;

  async fn verify(&self, session: &Session, timeout: Duration) -> FleetResult<()>;

  async fn uninstall(&self, session: &Session, timeout: Duration) -> FleetResult<()>;
}

pub fn for_kind(kind: ServiceKind) -> Box<dyn Installer> {
  match kind {
    ServiceKind::ContainerEngine => Box::new(container_engine::ContainerEngineInstaller),
    ServiceKind::ReverseProxy => Box::new(reverse_proxy::ReverseProxyInstaller),
    ServiceKind::RelationalDb => Box::new(relational_db::RelationalDbInstaller),
    ServiceKind::Cache => Box::new(cache::CacheInstaller),
    ServiceKind::AppWorker => Box::new(app_worker::AppWorkerInstaller),
  }
}

/// Stderr substrings that are never a real failure: debconf
/// frontend notices, init-system absence inside a container,
/// "already exists" races on idempotent re-runs. Anything not
/// matched here is a genuine failure.
const HARMLESS_STDERR_PATTERNS: &[&str] = &[
  "debconf: delaying package configuration",
  "debconf: unable to initialize frontend",
  "System has not been booted with systemd",
  "Failed to connect to bus",
  "already exists",
  "Unit not found within timeout",
];

pub fn classify_stderr(stderr: &str) -> bool {
  HARMLESS_STDERR_PATTERNS.iter().any(|p| stderr.contains(p))
}

/// Runs `step`, classifying failures via [`classify_stderr`] when
/// the step is tagged `ignore_errors`. Retries up to 3 times total
/// when tagged `retryable`.
pub async fn run_step(session: &Session, step: &InstallStep, timeout: Duration) -> FleetResult<()> {
  let (command, tags) = match step {
    InstallStep::Command { command, tags } => (command.clone(), *tags),
    InstallStep::Upload { remote_path, content, mode, tags } => {
      return run_upload(session, remote_path, content, *mode, *tags).await;
    }
  };

  let attempts = if tags.retryable { 3 } else { 1 };
  let mut last_err = None;
  for attempt in 0..attempts {
    match session.execute(&command, timeout).await {
      Ok(_) => return Ok(()),
      Err(e) => {
        if let ssh::SshError::CommandFailed { stderr, .. } = &e {
          if tags.ignore_errors && classify_stderr(stderr) {
            return Ok(());
          }
        }
        last_err = Some(e);
        if attempt + 1 < attempts {
          tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
      }
    }
  }
  Err(fleet_client::error::FleetError::new(ErrorKind::CommandFailed, last_err.unwrap()))
}

async fn run_upload(
  session: &Session,
  remote_path: &str,
  content: &[u8],
  mode: u32,
  tags: StepTags,
) -> FleetResult<()> {
  let attempts = if tags.retryable { 3 } else { 1 };
  let mut last_err = None;
  for attempt in 0..attempts {
    match session.upload(remote_path, content, mode).await {
      Ok(()) => return Ok(()),
      Err(e) => {
        last_err = Some(e);
        if attempt + 1 < attempts {
          tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
        }
      }
    }
  }
  if tags.ignore_errors {
    return Ok(());
  }
  Err(fleet_client::error::FleetError::new(ErrorKind::CommandFailed, last_err.unwrap()))
}
