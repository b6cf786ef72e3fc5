use std::time::Duration;

use fleet_client::{entities::host::HostFacts, FleetResult};
use ssh::Session;

use super::{Detection, InstallStep, Installer, Strategy, StepTags};

pub struct RelationalDbInstaller;

#[async_trait::async_trait]
impl Installer for RelationalDbInstaller {
  fn service_kind(&self) -> fleet_client::entities::ServiceKind {
    fleet_client::entities::ServiceKind::RelationalDb
  }

  fn applicable(&self, facts: &HostFacts) -> bool {
    facts.memory_gb.map(|gb| gb >= 1.0).unwrap_or(true)
  }

  fn plan(&self, _strategy: Strategy, config: &serde_json::Value) -> Vec<InstallStep> {
    let password = config.get("password").and_then(|v| v.as_str()).unwrap_or("changeme");
    vec![InstallStep::command(
      format!(
        "docker rm -f fleet-db 2>/dev/null; docker run -d --name fleet-db --restart unless-stopped \
         -e POSTGRES_PASSWORD={password} -p 5432:5432 -v fleet-db-data:/var/lib/postgresql/data postgres:16-alpine"
      ),
      StepTags { retryable: true, idempotent: true, ..Default::default() },
    )]
  }

  async fn detect(&self, session: &Session, timeout: Duration) -> FleetResult<Detection> {
    let out = session.execute("docker inspect -f '{{.State.Status}}' fleet-db", timeout).await;
    match out {
      Ok(o) if o.stdout.trim() == "running" => Ok(Detection::PresentActive { version: None }),
      Ok(o) if !o.stdout.trim().is_empty() => Ok(Detection::PresentInactive { version: None }),
      _ => Ok(Detection::Absent),
    }
  }

  async fn verify(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let out = session
      .execute("docker exec fleet-db pg_isready -U postgres", timeout)
      .await
      .map_err(|e| fleet_client::error::FleetError::new(e.kind(), e))?;
    if out.exit_code != Some(0) {
      return Err(fleet_client::error::FleetError::new(
        fleet_client::ErrorKind::VerifyFailed,
        anyhow::anyhow!("pg_isready reported not ready"),
      ));
    }
    Ok(())
  }

  async fn uninstall(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let _ = session.execute("docker rm -f fleet-db", timeout).await;
    Ok(())
  }
}
