use std::time::Duration;

use fleet_client::{entities::host::HostFacts, FleetResult};
use ssh::Session;

use super::{Detection, InstallStep, Installer, Strategy};

pub struct ContainerEngineInstaller;

#[async_trait::async_trait]
impl Installer for ContainerEngineInstaller {
  fn service_kind(&self) -> fleet_client::entities::ServiceKind {
    fleet_client::entities::ServiceKind::ContainerEngine
  }

  fn applicable(&self, _facts: &HostFacts) -> bool {
    true
  }

  fn strategy(&self, facts: &HostFacts) -> Strategy {
    match facts.environment {
      Some(fleet_client::entities::host::EnvironmentKind::ContainerHostWithSocket) => Strategy::HostSocket,
      Some(fleet_client::entities::host::EnvironmentKind::ContainerNested) => Strategy::Nested,
      _ => Strategy::Standard,
    }
  }

  fn plan(&self, strategy: Strategy, _config: &serde_json::Value) -> Vec<InstallStep> {
    match strategy {
      Strategy::HostSocket => vec![
        InstallStep::command(
          "curl -fsSL https://get.docker.com/cli -o /tmp/docker-cli.sh && sh /tmp/docker-cli.sh --cli-only",
          super::StepTags { retryable: true, idempotent: true, ..Default::default() },
        ),
      ],
      Strategy::Nested => vec![
        InstallStep::command(
          "curl -fsSL https://get.docker.com | sh -s -- --storage-driver=vfs",
          super::StepTags { retryable: true, idempotent: true, ..Default::default() },
        ),
        InstallStep::command(
          "dockerd --iptables=false --bridge=none --storage-driver=vfs > /var/log/dockerd-nested.log 2>&1 &",
          super::StepTags { ignore_errors: true, ..Default::default() },
        ),
      ],
      Strategy::Standard => vec![
        InstallStep::command(
          "curl -fsSL https://get.docker.com | sh",
          super::StepTags { retryable: true, idempotent: true, ..Default::default() },
        ),
        InstallStep::command(
          "systemctl enable --now docker",
          super::StepTags { ignore_errors: true, idempotent: true, ..Default::default() },
        ),
      ],
    }
  }

  async fn detect(&self, session: &Session, timeout: Duration) -> FleetResult<Detection> {
    let out = session.execute("docker --version", timeout).await;
    match out {
      Ok(o) if o.exit_code == Some(0) => {
        let active = session
          .execute("docker info > /dev/null 2>&1 && echo active || echo inactive", timeout)
          .await
          .map(|o| o.stdout.trim() == "active")
          .unwrap_or(false);
        let version = o.stdout.trim().to_string();
        Ok(if active {
          Detection::PresentActive { version: Some(version) }
        } else {
          Detection::PresentInactive { version: Some(version) }
        })
      }
      _ => Ok(Detection::Absent),
    }
  }

  async fn verify(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let out = session.execute("docker --version", timeout).await.map_err(map_err)?;
    if out.stdout.trim().is_empty() {
      return Err(fleet_client::error::FleetError::new(
        fleet_client::ErrorKind::VerifyFailed,
        anyhow::anyhow!("docker --version returned empty output"),
      ));
    }
    Ok(())
  }

  async fn uninstall(&self, session: &Session, timeout: Duration) -> FleetResult<()> {
    let _ = session.execute("systemctl disable --now docker", timeout).await;
    Ok(())
  }
}

fn map_err(e: ssh::SshError) -> fleet_client::FleetError {
  fleet_client::error::FleetError::new(e.kind(), e)
}
