pub mod auth;
pub mod error;
pub mod host_key;
pub mod session;

pub use auth::SshAuth;
pub use error::{SshError, SshResult};
pub use host_key::HostKeyStore;
pub use session::{ExecOutput, Session};

pub const DEFAULT_CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(30);
pub const DEFAULT_COMMAND_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(300);
