//! Host validation: a five-step chain that stops at the first
//! failure, plus the lighter probe the health tick runs against
//! hosts already marked active.

use std::{net::ToSocketAddrs, sync::Arc, time::Duration};

use fleet_client::{
  entities::host::{EnvironmentKind, HostFacts},
  error::{ErrorKind, WithErrorKind},
  FleetResult,
};
use ssh::{HostKeyStore, Session, SshAuth};
use tracing::instrument;

use crate::config::core_config;

/// Outcome of a single step in the probe chain, kept for the
/// operator-facing debug transcript.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProbeStep {
  pub name: String,
  pub success: bool,
  pub detail: String,
  pub elapsed_ms: u64,
}

/// Hard cap on the transcript kept per probe, in bytes.
const TRANSCRIPT_CAP_BYTES: usize = 32 * 1024;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ProbeReport {
  pub steps: Vec<ProbeStep>,
  pub facts: Option<HostFacts>,
  pub transcript: String,
}

impl ProbeReport {
  fn push(&mut self, name: &str, success: bool, detail: impl Into<String>, elapsed: Duration) {
    let detail = detail.into();
    self.transcript.push_str(&format!("[{name}] {detail}\n"));
    if self.transcript.len() > TRANSCRIPT_CAP_BYTES {
      let keep_from = self.transcript.len() - TRANSCRIPT_CAP_BYTES;
      self.transcript = format!("...[truncated]...\n{}", &self.transcript[keep_from..]);
    }
    self.steps.push(ProbeStep { name: name.to_string(), success, detail, elapsed_ms: elapsed.as_millis() as u64 });
  }
}

/// Runs the full five-step validation: address format, TCP reach,
/// credential usability, sentinel command, fact collection.
#[instrument(skip(auth, host_keys))]
pub async fn full_probe(
  address: &str,
  port: u16,
  user: &str,
  auth: &SshAuth,
  host_keys: Arc<HostKeyStore>,
) -> FleetResult<ProbeReport> {
  let mut report = ProbeReport { steps: Vec::new(), facts: None, transcript: String::new() };

  let t0 = std::time::Instant::now();
  if format!("{address}:{port}").to_socket_addrs().is_err() {
    report.push("address-format", false, "address did not resolve to a socket address", t0.elapsed());
    return Err(fleet_client::error::FleetError::new(
      ErrorKind::Unreachable,
      anyhow::anyhow!("invalid address: {address}"),
    ));
  }
  report.push("address-format", true, "ok", t0.elapsed());

  let connect_timeout = Duration::from_secs(core_config().ssh_connect_timeout_secs);
  let t0 = std::time::Instant::now();
  let session = match Session::connect(address, port, user, auth, host_keys, connect_timeout).await {
    Ok(s) => {
      report.push("connect", true, "tcp reachable, credentials accepted", t0.elapsed());
      s
    }
    Err(e) => {
      report.push("connect", false, e.to_string(), t0.elapsed());
      return Err(fleet_client::error::FleetError::new(e.kind(), e));
    }
  };

  let command_timeout = Duration::from_secs(core_config().command_timeout_secs.min(5));
  let t0 = std::time::Instant::now();
  match session.execute("echo fleet-core-probe-ok", command_timeout).await {
    Ok(out) if out.stdout.trim() == "fleet-core-probe-ok" => {
      report.push("sentinel", true, "sentinel echoed back", t0.elapsed());
    }
    Ok(out) => {
      report.push("sentinel", false, format!("unexpected sentinel output: {}", out.stdout), t0.elapsed());
      return Err(fleet_client::error::FleetError::new(
        ErrorKind::CommandFailed,
        anyhow::anyhow!("sentinel mismatch"),
      ));
    }
    Err(e) => {
      report.push("sentinel", false, e.to_string(), t0.elapsed());
      return Err(fleet_client::error::FleetError::new(e.kind(), e));
    }
  }

  let t0 = std::time::Instant::now();
  let facts = collect_facts(&session, command_timeout).await;
  report.push("facts", true, "collected (unparseable fields left unknown)", t0.elapsed());
  report.facts = Some(facts);

  let _ = session.close().await;
  Ok(report)
}

/// Lighter probe used by the health tick: connectivity and a
/// per-declared-service status check, no full fact collection.
#[instrument(skip(auth, host_keys))]
pub async fn probe_lite(
  address: &str,
  port: u16,
  user: &str,
  auth: &SshAuth,
  host_keys: Arc<HostKeyStore>,
  declared_services: &[fleet_client::entities::ServiceKind],
) -> FleetResult<Vec<(fleet_client::entities::ServiceKind, bool)>> {
  let connect_timeout = Duration::from_secs(core_config().ssh_connect_timeout_secs);
  let session = Session::connect(address, port, user, auth, host_keys, connect_timeout)
    .await
    .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;

  let command_timeout = Duration::from_secs(5);
  let mut results = Vec::with_capacity(declared_services.len());
  for service in declared_services {
    let healthy = crate::installer::for_kind(*service)
      .detect(&session, command_timeout)
      .await
      .map(|d| matches!(d, crate::installer::Detection::PresentActive { .. }))
      .unwrap_or(false);
    results.push((*service, healthy));
  }

  let _ = session.close().await;
  Ok(results)
}

async fn collect_facts(session: &Session, timeout: Duration) -> HostFacts {
  let cpu_cores = run_and_parse(session, "nproc", timeout).await;
  let memory_gb = run_and_parse::<f64>(session, "awk '/MemTotal/ {printf \"%.2f\", $2/1024/1024}' /proc/meminfo", timeout)
    .await;
  let disk_gb = run_and_parse::<f64>(session, "df -BG --output=size / | tail -1 | tr -dc '0-9.'", timeout).await;
  let os_family = session
    .execute(". /etc/os-release 2>/dev/null; echo \"$ID\"", timeout)
    .await
    .ok()
    .map(|o| o.stdout.trim().to_string())
    .filter(|s| !s.is_empty());
  let os_version = session
    .execute(". /etc/os-release 2>/dev/null; echo \"$VERSION_ID\"", timeout)
    .await
    .ok()
    .map(|o| o.stdout.trim().to_string())
    .filter(|s| !s.is_empty());
  let kernel = session
    .execute("uname -r", timeout)
    .await
    .ok()
    .map(|o| o.stdout.trim().to_string())
    .filter(|s| !s.is_empty());
  let sudo = session
    .execute("sudo -n true", timeout)
    .await
    .map(|o| o.exit_code == Some(0))
    .unwrap_or(false);
  let environment = classify_environment(session, timeout).await;

  HostFacts { cpu_cores, memory_gb, disk_gb, os_family, os_version, kernel, sudo, environment }
}

async fn run_and_parse<T: std::str::FromStr>(
  session: &Session,
  command: &str,
  timeout: Duration,
) -> Option<T> {
  session.execute(command, timeout).await.ok().and_then(|o| o.stdout.trim().parse().ok())
}

/// Inspects `/` filesystem markers, init-system presence, and
/// container-socket visibility to classify the environment, which
/// in turn drives installer strategy selection.
async fn classify_environment(session: &Session, timeout: Duration) -> Option<EnvironmentKind> {
  let in_container = session
    .execute("test -f /.dockerenv -o -f /run/.containerenv && echo yes || echo no", timeout)
    .await
    .ok()
    .map(|o| o.stdout.trim() == "yes")
    .unwrap_or(false);

  if !in_container {
    return Some(EnvironmentKind::MetalOrVm);
  }

  let socket_visible = session
    .execute("test -S /var/run/docker.sock && echo yes || echo no", timeout)
    .await
    .ok()
    .map(|o| o.stdout.trim() == "yes")
    .unwrap_or(false);

  Some(if socket_visible {
    EnvironmentKind::ContainerHostWithSocket
  } else {
    EnvironmentKind::ContainerNested
  })
}
