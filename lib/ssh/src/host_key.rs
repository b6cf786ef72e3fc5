use std::{collections::HashMap, path::PathBuf, sync::Arc};

use russh_keys::PublicKey;
use tokio::sync::RwLock;

use crate::error::SshError;

/// Pins host public keys by `address:port` across connections.
/// First contact records the key; any later mismatch is a hard
/// [`SshError::HostKeyChanged`] rather than a silent overwrite.
pub struct HostKeyStore {
  path: PathBuf,
  known: RwLock<HashMap<String, String>>,
}

impl HostKeyStore {
  pub async fn load(path: impl Into<PathBuf>) -> anyhow::Result<Arc<Self>> {
    let path = path.into();
    let known = match tokio::fs::read_to_string(&path).await {
      Ok(contents) => parse_known_hosts(&contents),
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashMap::new(),
      Err(e) => return Err(e.into()),
    };
    Ok(Arc::new(Self { path, known: RwLock::new(known) }))
  }

  /// Verifies `key` against the pinned fingerprint for `host_key`,
  /// pinning it on first contact.
  pub async fn verify_or_pin(
    &self,
    host_key_name: &str,
    key: &PublicKey,
  ) -> Result<(), SshError> {
    let fingerprint = key
      .fingerprint(russh_keys::ssh_key::HashAlg::Sha256)
      .to_string();
    let mut known = self.known.write().await;
    match known.get(host_key_name) {
      Some(pinned) if pinned == &fingerprint => Ok(()),
      Some(pinned) => Err(SshError::HostKeyChanged(format!(
        "{host_key_name}: expected {pinned}, got {fingerprint}"
      ))),
      None => {
        known.insert(host_key_name.to_string(), fingerprint);
        self
          .persist(&known)
          .await
          .map_err(SshError::Other)?;
        Ok(())
      }
    }
  }

  async fn persist(&self, known: &HashMap<String, String>) -> anyhow::Result<()> {
    if let Some(parent) = self.path.parent() {
      tokio::fs::create_dir_all(parent).await.ok();
    }
    let contents = known
      .iter()
      .map(|(host, fp)| format!("{host} {fp}"))
      .collect::<Vec<_>>()
      .join("\n");
    tokio::fs::write(&self.path, contents).await?;
    Ok(())
  }
}

fn parse_known_hosts(contents: &str) -> HashMap<String, String> {
  contents
    .lines()
    .filter_map(|line| {
      let mut parts = line.splitn(2, ' ');
      Some((parts.next()?.to_string(), parts.next()?.to_string()))
    })
    .collect()
}

pub fn host_key_name(address: &str, port: u16) -> String {
  format!("{address}:{port}")
}
