use std::{net::SocketAddr, time::Duration};

use fleet_client::{
  entities::{scan::NetworkScanResult, task::DeploymentTask},
  error::ErrorKind,
  fleet_timestamp, FleetResult,
};
use futures_util::stream::{FuturesUnordered, StreamExt};
use ipnetwork::IpNetwork;
use serde::Deserialize;
use ssh::{Session, SshAuth};
use tokio::sync::Semaphore;

use crate::state;

/// Default bound on simultaneous per-host probes during a scan.
const DEFAULT_CONCURRENCY: usize = 32;
const TCP_PROBE_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Deserialize)]
struct CredentialBundle {
  label: String,
  user: String,
  #[serde(flatten)]
  auth: CredentialAuth,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
enum CredentialAuth {
  Password { password: String },
  PrivateKey { path: String },
}

impl From<&CredentialAuth> for SshAuth {
  fn from(auth: &CredentialAuth) -> Self {
    match auth {
      CredentialAuth::Password { password } => SshAuth::Password(password.clone()),
      CredentialAuth::PrivateKey { path } => SshAuth::PrivateKey { path: path.clone(), passphrase: None },
    }
  }
}

#[derive(Debug, Deserialize)]
struct ScanConfig {
  cidr: String,
  credentials: Vec<CredentialBundle>,
  #[serde(default)]
  port: Option<u16>,
  #[serde(default)]
  concurrency: Option<usize>,
}

/// Drives the network-scan handler: sweeps a CIDR with a bounded
/// worker pool, persisting each probed address as soon as it
/// completes rather than only appending it to the task log.
pub async fn run(task: &mut DeploymentTask) -> FleetResult<()> {
  let cfg: ScanConfig = serde_json::from_value(task.config.clone())
    .map_err(|e| fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, e))?;
  let network: IpNetwork = cfg
    .cidr
    .parse()
    .map_err(|e: ipnetwork::IpNetworkError| fleet_client::error::FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!(e.to_string())))?;
  let port = cfg.port.unwrap_or(22);
  let concurrency = cfg.concurrency.unwrap_or(DEFAULT_CONCURRENCY).max(1);

  let addresses: Vec<std::net::IpAddr> = match network {
    IpNetwork::V4(net) => net.iter().map(std::net::IpAddr::V4).collect(),
    IpNetwork::V6(net) => net.iter().map(std::net::IpAddr::V6).collect(),
  };
  task.push_log_line(&format!("scanning {} addresses in {}", addresses.len(), cfg.cidr));
  task.set_progress("scan", 10);
  state::tasks().save_progress(task).await?;

  let semaphore = std::sync::Arc::new(Semaphore::new(concurrency));
  let host_keys = state::host_key_store().await;
  let mut futures = FuturesUnordered::new();

  for address in addresses {
    let semaphore = semaphore.clone();
    let host_keys = host_keys.clone();
    let credentials: Vec<(String, String, SshAuth)> = cfg
      .credentials
      .iter()
      .map(|c| (c.label.clone(), c.user.clone(), SshAuth::from(&c.auth)))
      .collect();
    futures.push(async move {
      let _permit = semaphore.acquire_owned().await.expect("semaphore closed");
      probe_one(address, port, &credentials, host_keys).await
    });
  }

  let total = futures.len();
  let mut done = 0usize;
  while let Some(mut result) = futures.next().await {
    done += 1;
    result.task_id = task.id;
    state::scans().append(&result).await?;
    task.push_log_line(&format!(
      "{} reachable={} matched={:?}",
      result.address, result.reachable, result.matched_credential_label
    ));
    task.set_progress("scan", 10 + (80 * done / total.max(1)) as u8);
    state::tasks().save_progress(task).await?;
    super::checkpoint(task.id)?;
  }

  task.set_progress("scan", 100);
  Ok(())
}

async fn probe_one(
  address: std::net::IpAddr,
  port: u16,
  credentials: &[(String, String, SshAuth)],
  host_keys: std::sync::Arc<ssh::HostKeyStore>,
) -> NetworkScanResult {
  let sock_addr = SocketAddr::new(address, port);
  let reachable = tokio::time::timeout(TCP_PROBE_TIMEOUT, tokio::net::TcpStream::connect(sock_addr))
    .await
    .map(|r| r.is_ok())
    .unwrap_or(false);

  let mut matched_credential_label = None;
  let mut facts_summary = None;

  if reachable {
    for (label, user, auth) in credentials {
      let connect = Session::connect(&address.to_string(), port, user, auth, host_keys.clone(), Duration::from_secs(5)).await;
      if let Ok(session) = connect {
        matched_credential_label = Some(label.clone());
        facts_summary = session
          .execute("uname -a", Duration::from_secs(5))
          .await
          .ok()
          .map(|o| o.stdout.trim().to_string());
        let _ = session.close().await;
        break;
      }
    }
  }

  NetworkScanResult {
    id: 0,
    task_id: 0,
    address: address.to_string(),
    reachable,
    matched_credential_label,
    facts_summary,
    created_ts: fleet_timestamp(),
  }
}
