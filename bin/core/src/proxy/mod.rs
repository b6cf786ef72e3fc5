//! Regenerates and atomically applies the reverse-proxy
//! configuration. The config is a pure function of current inventory
//! state (§4.7); this module never edits the remote file in place.

mod generate;

use std::time::Duration;

use fleet_client::{
  entities::placement::PlacementStatus,
  error::ErrorKind,
  FleetError, FleetResult,
};
use tracing::{error, info, warn};

use crate::{config::core_config, helpers::action_state::ProxyActionState, state};

pub use generate::RESERVED_HEALTH_PATH;

const STAGING_PATH: &str = "/etc/fleet-core/proxy/Caddyfile.staging";
const LIVE_PATH: &str = "/etc/fleet-core/proxy/Caddyfile";
const BACKUP_PATH: &str = "/etc/fleet-core/proxy/Caddyfile.bak";
const APPLY_TIMEOUT: Duration = Duration::from_secs(30);

/// Regenerates the config from current state and applies it to the
/// configured proxy host. No-op (returns `Ok`) if no proxy host is
/// configured yet, since a single-host deployment may not have one.
pub async fn regenerate_and_apply() -> FleetResult<()> {
  let Some(proxy_host_id) = core_config().proxy_host_id else {
    return Ok(());
  };

  let guard = state::action_states()
    .proxy()
    .await
    .update(|s: &mut ProxyActionState| s.applying = true)
    .map_err(|e| FleetError::new(ErrorKind::CapacityExceeded, e))?;

  let result = apply_to_host(proxy_host_id).await;
  drop(guard);
  result
}

async fn apply_to_host(proxy_host_id: i64) -> FleetResult<()> {
  let hosts = state::hosts().list().await?;
  let placements = state::placements().list_all().await?;
  let mappings = state::domains().list_all().await?;

  let live_placements: Vec<_> = placements
    .into_iter()
    .filter(|p| matches!(p.status, PlacementStatus::Running | PlacementStatus::Draining))
    .collect();
  let verified_mappings: Vec<_> = mappings
    .into_iter()
    .filter(|m| m.status == fleet_client::entities::domain::VerificationStatus::Verified)
    .collect();

  let config = generate::generate(&live_placements, &hosts, &verified_mappings);

  let proxy_host = state::hosts().get(proxy_host_id).await?;
  let auth = crate::deploy::ssh_auth_for(&proxy_host).await?;
  let host_keys = state::host_key_store().await;
  let session = ssh::Session::connect(
    &proxy_host.address,
    proxy_host.port,
    &proxy_host.user,
    &auth,
    host_keys,
    Duration::from_secs(core_config().ssh_connect_timeout_secs),
  )
  .await
  .map_err(|e| FleetError::new(e.kind(), e))?;

  let apply_result = apply_via_session(&session, &config).await;
  let _ = session.close().await;

  if let Err(e) = &apply_result {
    error!(proxy_host_id, "proxy config apply failed, rolled back | {e:#}");
    raise_apply_failure_alert(proxy_host_id, &e.to_string()).await;
  } else {
    info!(proxy_host_id, "proxy config applied");
  }
  apply_result
}

async fn apply_via_session(session: &ssh::Session, config: &str) -> FleetResult<()> {
  session
    .upload(STAGING_PATH, config.as_bytes(), 0o644)
    .await
    .map_err(|e| FleetError::new(e.kind(), e))?;

  session
    .execute(&format!("docker exec fleet-proxy caddy validate --config {STAGING_PATH} --adapter caddyfile"), APPLY_TIMEOUT)
    .await
    .map_err(|e| FleetError::new(ErrorKind::ConfigInvalid, anyhow::anyhow!("proxy config syntax check failed: {e}")))?;

  session
    .execute(
      &format!(
        "cp -f {LIVE_PATH} {BACKUP_PATH} 2>/dev/null; mv -f {STAGING_PATH} {LIVE_PATH}"
      ),
      APPLY_TIMEOUT,
    )
    .await
    .map_err(|e| FleetError::new(e.kind(), e))?;

  session
    .execute("docker exec fleet-proxy caddy reload --config /etc/caddy/Caddyfile --adapter caddyfile", APPLY_TIMEOUT)
    .await
    .map_err(|e| FleetError::new(e.kind(), e))?;

  // Give the reload a moment to take effect before probing.
  tokio::time::sleep(Duration::from_millis(500)).await;

  let verify = session
    .execute(
      &format!("curl -fsS -o /dev/null -w '%{{http_code}}' http://127.0.0.1{RESERVED_HEALTH_PATH}"),
      Duration::from_secs(10),
    )
    .await;

  match verify {
    Ok(out) if out.stdout.trim().starts_with('2') => Ok(()),
    other => {
      warn!("proxy health verify failed after reload, restoring backup | {other:?}");
      let _ = session
        .execute(&format!("mv -f {BACKUP_PATH} {LIVE_PATH} && docker exec fleet-proxy caddy reload --config /etc/caddy/Caddyfile --adapter caddyfile"), APPLY_TIMEOUT)
        .await;
      Err(FleetError::new(
        ErrorKind::VerifyFailed,
        anyhow::anyhow!("proxy health path did not return 2xx after reload; restored previous config"),
      ))
    }
  }
}

async fn raise_apply_failure_alert(proxy_host_id: i64, detail: &str) {
  let ts = fleet_client::fleet_timestamp();
  let alert = fleet_client::entities::alert::Alert {
    id: 0,
    kind: "proxy-apply-failed".to_string(),
    severity: fleet_client::entities::alert::AlertSeverity::Critical,
    host_id: Some(proxy_host_id),
    placement_id: None,
    metric_name: Some(detail.to_string()),
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
    error!("failed to raise proxy-apply-failed alert | {e:#}");
  }
}
