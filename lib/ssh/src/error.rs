use fleet_client::ErrorKind;

#[derive(Debug, thiserror::Error)]
pub enum SshError {
  #[error("host unreachable: {0}")]
  Unreachable(String),
  #[error("authentication failed: {0}")]
  AuthFailed(String),
  #[error("host key changed, refusing to connect: {0}")]
  HostKeyChanged(String),
  #[error("command failed (exit {exit_code:?}): {stderr}")]
  CommandFailed { exit_code: Option<u32>, stderr: String },
  #[error("operation timed out after {0:?}")]
  Timeout(std::time::Duration),
  #[error(transparent)]
  Other(#[from] anyhow::Error),
}

impl SshError {
  pub fn kind(&self) -> ErrorKind {
    match self {
      SshError::Unreachable(_) => ErrorKind::Unreachable,
      SshError::AuthFailed(_) => ErrorKind::AuthFailed,
      SshError::HostKeyChanged(_) => ErrorKind::HostKeyChanged,
      SshError::CommandFailed { .. } => ErrorKind::CommandFailed,
      SshError::Timeout(_) => ErrorKind::Timeout,
      SshError::Other(_) => ErrorKind::Internal,
    }
  }
}

pub type SshResult<T> = Result<T, SshError>;
