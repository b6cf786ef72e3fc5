use fleet_client::entities::host::{Host, HostStatus};
use tracing::{error, warn};

use crate::{probe, state};

/// Consecutive probe failures before a host is forced into
/// maintenance and an operator has to bring it back.
const MAINTENANCE_THRESHOLD: u32 = 3;

pub async fn tick(ts: i64) {
  let hosts = match state::hosts().list().await {
    Ok(hosts) => hosts,
    Err(e) => {
      error!("health tick: failed to list hosts | {e:#}");
      return;
    }
  };

  for host in hosts.into_iter().filter(|h| h.status == HostStatus::Active) {
    score_host(host, ts).await;
  }
}

async fn score_host(mut host: Host, ts: i64) {
  let host_id = host.id;
  let auth = match crate::deploy::ssh_auth_for(&host).await {
    Ok(auth) => auth,
    Err(e) => {
      warn!(host_id, "health tick: could not resolve credentials | {e:#}");
      return;
    }
  };

  let host_keys = state::host_key_store().await;
  let probe_result = probe::probe_lite(&host.address, host.port, &host.user, &auth, host_keys, &host.declared_roles).await;

  let (score, failures) = match probe_result {
    Ok(statuses) => {
      let mut score: i32 = 100;
      for (service, healthy) in &statuses {
        if !healthy {
          score -= 20;
          if matches!(service, fleet_client::entities::ServiceKind::RelationalDb) {
            score -= 10;
          }
        }
      }
      (score.max(0), 0)
    }
    Err(_) => (0, host.consecutive_probe_failures + 1),
  };

  host.health_score = score;
  host.last_probe_ts = Some(ts);
  host.consecutive_probe_failures = failures;
  let entered_maintenance = failures >= MAINTENANCE_THRESHOLD && host.status != HostStatus::Maintenance;
  if failures >= MAINTENANCE_THRESHOLD {
    host.status = HostStatus::Maintenance;
    warn!(host_id, "host forced into maintenance after {failures} consecutive probe failures");
  }

  let version = host.version;
  if let Err(e) = state::hosts().update(&host, version).await {
    error!(host_id, "health tick: failed to persist host | {e:#}");
  }

  if entered_maintenance {
    raise_unreachable_alert(host_id, ts, failures).await;
  }
}

async fn raise_unreachable_alert(host_id: i64, ts: i64, failures: u32) {
  let alert = fleet_client::entities::alert::Alert {
    id: 0,
    kind: "host-unreachable".to_string(),
    severity: fleet_client::entities::alert::AlertSeverity::Critical,
    host_id: Some(host_id),
    placement_id: None,
    metric_name: Some(format!("{failures} consecutive probe failures")),
    value: None,
    threshold: None,
    status: fleet_client::entities::alert::AlertStatus::Active,
    auto_resolve: false,
    first_occurrence_ts: ts,
    last_occurrence_ts: ts,
    acknowledged_by: None,
    resolution_note: None,
    resolved_ts: None,
  };
  if let Err(e) = state::alerts().upsert_active(&alert).await {
    error!(host_id, "failed to raise host-unreachable alert | {e:#}");
  }
}
