use std::sync::OnceLock;

use cache::CloneCache;
use fleet_client::entities::host::HostId;
use tracing::{error, warn};

use crate::state;

/// One sample of system metrics for a host, kept in an ephemeral
/// cache the monitor writes and other components may read. Not a
/// durable time-series store.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct HostMetrics {
  pub cpu_pct: Option<f64>,
  pub memory_pct: Option<f64>,
  pub disk_pct: Option<f64>,
  pub load_average: Option<f64>,
  pub sampled_ts: i64,
}

pub fn host_metrics_cache() -> &'static CloneCache<HostId, HostMetrics> {
  static CACHE: OnceLock<CloneCache<HostId, HostMetrics>> = OnceLock::new();
  CACHE.get_or_init(Default::default)
}

pub async fn tick(ts: i64) {
  let hosts = match state::hosts().list().await {
    Ok(hosts) => hosts,
    Err(e) => {
      error!("metrics tick: failed to list hosts | {e:#}");
      return;
    }
  };

  for host in hosts.iter().filter(|h| h.status == fleet_client::entities::host::HostStatus::Active) {
    let sample = sample_host(host, ts).await;
    host_metrics_cache().insert(host.id, sample).await;
  }

  let samples = host_metrics_cache().get_values().await;
  let avg_cpu = average(samples.iter().filter_map(|s| s.cpu_pct));
  let avg_mem = average(samples.iter().filter_map(|s| s.memory_pct));
  tracing::debug!(avg_cpu, avg_mem, host_count = samples.len(), "metrics tick aggregate");
}

async fn sample_host(host: &fleet_client::entities::host::Host, ts: i64) -> HostMetrics {
  let auth = match crate::deploy::ssh_auth_for(host).await {
    Ok(auth) => auth,
    Err(e) => {
      warn!(host_id = host.id, "metrics tick: could not resolve credentials | {e:#}");
      return HostMetrics { sampled_ts: ts, ..Default::default() };
    }
  };
  let host_keys = state::host_key_store().await;
  let session = match ssh::Session::connect(&host.address, host.port, &host.user, &auth, host_keys, std::time::Duration::from_secs(5)).await {
    Ok(s) => s,
    Err(_) => return HostMetrics { sampled_ts: ts, ..Default::default() },
  };

  let timeout = std::time::Duration::from_secs(5);
  let cpu_pct = run_and_parse(
    &session,
    "top -bn1 | grep '%Cpu' | awk '{print 100-$8}'",
    timeout,
  )
  .await;
  let memory_pct = run_and_parse(
    &session,
    "free | awk '/Mem:/ {printf \"%.2f\", $3/$2*100}'",
    timeout,
  )
  .await;
  let disk_pct = run_and_parse(&session, "df --output=pcent / | tail -1 | tr -dc '0-9.'", timeout).await;
  let load_average = run_and_parse(&session, "awk '{print $1}' /proc/loadavg", timeout).await;

  let _ = session.close().await;
  HostMetrics { cpu_pct, memory_pct, disk_pct, load_average, sampled_ts: ts }
}

async fn run_and_parse(session: &ssh::Session, command: &str, timeout: std::time::Duration) -> Option<f64> {
  session.execute(command, timeout).await.ok().and_then(|o| o.stdout.trim().parse().ok())
}

fn average(values: impl Iterator<Item = f64>) -> f64 {
  let mut sum = 0.0;
  let mut count = 0;
  for v in values {
    sum += v;
    count += 1;
  }
  if count == 0 { 0.0 } else { sum / count as f64 }
}
