use std::{sync::Arc, time::Duration};

use russh::{client, ChannelMsg, Disconnect};
use russh_keys::PublicKey;
use tokio::time::timeout;

use crate::{
  auth::SshAuth,
  error::{SshError, SshResult},
  host_key::{host_key_name, HostKeyStore},
};

/// Result of a completed (non-streaming) command execution.
#[derive(Debug, Clone)]
pub struct ExecOutput {
  pub stdout: String,
  pub stderr: String,
  pub exit_code: Option<u32>,
}

struct PinningHandler {
  store: Arc<HostKeyStore>,
  host_key_name: String,
}

#[async_trait::async_trait]
impl client::Handler for PinningHandler {
  type Error = SshError;

  async fn check_server_key(
    &mut self,
    server_public_key: &PublicKey,
  ) -> Result<bool, Self::Error> {
    self
      .store
      .verify_or_pin(&self.host_key_name, server_public_key)
      .await?;
    Ok(true)
  }
}

/// An authenticated session to a single remote host. One [`Session`]
/// is opened per dispatched task; it is not pooled or reused across
/// hosts.
pub struct Session {
  handle: client::Handle<PinningHandler>,
}

impl Session {
  pub async fn connect(
    address: &str,
    port: u16,
    user: &str,
    auth: &SshAuth,
    host_keys: Arc<HostKeyStore>,
    connect_timeout: Duration,
  ) -> SshResult<Self> {
    let config = Arc::new(client::Config::default());
    let handler = PinningHandler {
      store: host_keys,
      host_key_name: host_key_name(address, port),
    };

    let mut handle = timeout(
      connect_timeout,
      client::connect(config, (address, port), handler),
    )
    .await
    .map_err(|_| SshError::Timeout(connect_timeout))?
    .map_err(|e| SshError::Unreachable(e.to_string()))?;

    let authenticated = match auth {
      SshAuth::Password(password) => handle
        .authenticate_password(user, password)
        .await
        .map_err(|e| SshError::AuthFailed(e.to_string()))?,
      SshAuth::PrivateKey { path, passphrase } => {
        let key_pair = russh_keys::load_secret_key(path, passphrase.as_deref())
          .map_err(|e| SshError::AuthFailed(e.to_string()))?;
        handle
          .authenticate_publickey(user, Arc::new(key_pair))
          .await
          .map_err(|e| SshError::AuthFailed(e.to_string()))?
      }
    };

    if !authenticated.success() {
      return Err(SshError::AuthFailed(format!(
        "host rejected credentials for {user}"
      )));
    }

    Ok(Self { handle })
  }

  /// Runs `command` to completion and collects its full output.
  pub async fn execute(
    &self,
    command: &str,
    command_timeout: Duration,
  ) -> SshResult<ExecOutput> {
    self
      .execute_streaming(command, command_timeout, |_| {})
      .await
  }

  /// Runs `command`, invoking `line_sink` for each complete line of
  /// stdout as it arrives, and returns the full captured output once
  /// the remote process exits.
  pub async fn execute_streaming(
    &self,
    command: &str,
    command_timeout: Duration,
    mut line_sink: impl FnMut(&str) + Send,
  ) -> SshResult<ExecOutput> {
    let mut channel = self
      .handle
      .channel_open_session()
      .await
      .map_err(|e| SshError::Other(e.into()))?;
    channel
      .exec(true, command)
      .await
      .map_err(|e| SshError::Other(e.into()))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_code = None;
    let mut line_buf = Vec::new();

    let run = async {
      while let Some(msg) = channel.wait().await {
        match msg {
          ChannelMsg::Data { data } => {
            stdout.extend_from_slice(&data);
            line_buf.extend_from_slice(&data);
            while let Some(pos) = line_buf.iter().position(|b| *b == b'\n') {
              let line: Vec<u8> = line_buf.drain(..=pos).collect();
              line_sink(String::from_utf8_lossy(&line).trim_end());
            }
          }
          ChannelMsg::ExtendedData { data, ext: 1 } => {
            stderr.extend_from_slice(&data);
          }
          ChannelMsg::ExitStatus { exit_status } => {
            exit_code = Some(exit_status);
          }
          ChannelMsg::Eof | ChannelMsg::Close => break,
          _ => {}
        }
      }
      if !line_buf.is_empty() {
        line_sink(String::from_utf8_lossy(&line_buf).trim_end());
      }
    };

    timeout(command_timeout, run)
      .await
      .map_err(|_| SshError::Timeout(command_timeout))?;

    let stdout = String::from_utf8_lossy(&stdout).into_owned();
    let stderr = String::from_utf8_lossy(&stderr).into_owned();

    if exit_code != Some(0) {
      return Err(SshError::CommandFailed { exit_code, stderr });
    }

    Ok(ExecOutput { stdout, stderr, exit_code })
  }

  /// Writes `content` to `remote_path` on the host, setting its mode
  /// in the same step. Parent directories are created if missing.
  pub async fn upload(
    &self,
    remote_path: &str,
    content: &[u8],
    mode: u32,
  ) -> SshResult<()> {
    let mut channel = self
      .handle
      .channel_open_session()
      .await
      .map_err(|e| SshError::Other(e.into()))?;
    // `remote_path` is passed as `$1` rather than interpolated into the
    // script body, so it never needs to survive the script's own quoting.
    let quoted_path = shlex::quote(remote_path);
    let command = format!(
      "sh -c 'mkdir -p \"$(dirname \"$1\")\" && install -m {mode:o} /dev/stdin \"$1\"' -- {quoted_path}"
    );
    channel
      .exec(true, command.as_str())
      .await
      .map_err(|e| SshError::Other(e.into()))?;
    channel
      .data(content)
      .await
      .map_err(|e| SshError::Other(e.into()))?;
    channel.eof().await.map_err(|e| SshError::Other(e.into()))?;

    let mut exit_code = None;
    while let Some(msg) = channel.wait().await {
      if let ChannelMsg::ExitStatus { exit_status } = msg {
        exit_code = Some(exit_status);
      }
    }

    if exit_code != Some(0) {
      return Err(SshError::CommandFailed {
        exit_code,
        stderr: format!("upload to {remote_path} failed"),
      });
    }

    Ok(())
  }

  pub async fn close(&self) -> SshResult<()> {
    self
      .handle
      .disconnect(Disconnect::ByApplication, "", "en")
      .await
      .map_err(|e| SshError::Other(e.into()))
  }
}
