use std::time::Duration;

use fleet_client::{entities::host::HostFacts, FleetResult};
use ssh::Session;

use super::{Detection, InstallStep, Installer, Strategy, StepTags};

pub struct CacheInstaller;

#[async_trait::async_trait]
impl Installer for CacheInstaller {
  fn service_kind(&self) -> fleet_client::entities::ServiceKind {
    fleet_client::entities::ServiceKind::Cache
  }

  fn applicable(&self, _facts: &HostFacts) -> bool {
    true
  }

  fn plan(&self, _strategy: Strategy, _config: &serde_json::Value) -> Vec<InstallStep> {
    vec![InstallStep::command(
      "docker rm -f fleet-cache 2>/dev/null; docker run -d --name fleet-cache --restart unless-stopped \
       -p 6379:6379 redis:7-alpine",
      StepTags { retryable: true, idempotent: true, ..Default::default() },
    )]
  }

  async fn detect(&self, session: &Session, timeout: Duration) -> FleetResult<Detection> {
    let out = session.execute("docker inspect -f '{{.State.Status}}' fleet-cache", timeout).await;
    match out {
      Ok(o) if o.stdout.trim() == "running" => Ok(Detection::PresentActive { version: None }),
      Ok(o) if !o.stdout.trim().is_empty() => Ok(Detection::PresentInactive { version: None }),
      _ => Ok(Detection::Absent),
    }
  }

  async fn verify(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let out = session
      .execute("docker exec fleet-cache redis-cli ping", timeout)
      .await
      .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;
    if out.stdout.trim() != "PONG" {
      return Err(fleet_client::error::FleetError::new(
        fleet_client::ErrorKind::VerifyFailed,
        anyhow::anyhow!("redis-cli ping did not return PONG"),
      ));
    }
    Ok(())
  }

  async fn uninstall(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let _ = session.execute("docker rm -f fleet-cache", timeout).await;
    Ok(())
  }
}
