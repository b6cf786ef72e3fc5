use std::time::Duration;

use fleet_client::{entities::host::HostFacts, FleetResult};
use ssh::Session;

use super::{Detection, InstallStep, Installer, Strategy, StepTags};

pub struct ReverseProxyInstaller;

#[async_trait::async_trait]
impl Installer for ReverseProxyInstaller {
  fn service_kind(&self) -> fleet_client::entities::ServiceKind {
    fleet_client::entities::ServiceKind::ReverseProxy
  }

  fn applicable(&self, _facts: &HostFacts) -> bool {
    true
  }

  fn plan(&self, _strategy: Strategy, _config: &serde_json::Value) -> Vec<InstallStep> {
    vec![
      InstallStep::command(
        "command -v docker >/dev/null 2>&1 || (echo 'reverse-proxy installer requires container-engine' >&2; exit 1)",
        StepTags::default(),
      ),
      InstallStep::command(
        "docker rm -f fleet-proxy 2>/dev/null; docker run -d --name fleet-proxy --restart unless-stopped \
         -p 80:80 -p 443:443 -v /etc/fleet-core/proxy:/etc/caddy caddy:2-alpine",
        StepTags { retryable: true, idempotent: true, ..Default::default() },
      ),
    ]
  }

  async fn detect(&self, session: &Session, timeout: Duration) -> FleetResult<Detection> {
    let out = session.execute("docker inspect -f '{{.State.Status}}' fleet-proxy", timeout).await;
    match out {
      Ok(o) if o.stdout.trim() == "running" => Ok(Detection::PresentActive { version: None }),
      Ok(o) if !o.stdout.trim().is_empty() => Ok(Detection::PresentInactive { version: None }),
      _ => Ok(Detection::Absent),
    }
  }

  async fn verify(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let out = session
      .execute("curl -fsS -o /dev/null -w '%{http_code}' http://127.0.0.1/__fleet_health", timeout)
      .await
      .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;
    if !out.stdout.trim().starts_with('2') {
      return Err(fleet_client::error::FleetError::new(
        fleet_client::ErrorKind::VerifyFailed,
        anyhow::anyhow!("proxy health path returned {}", out.stdout.trim()),
      ));
    }
    Ok(())
  }

  async fn uninstall(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let _ = session.execute("docker rm -f fleet-proxy", timeout).await;
    Ok(())
  }
}
