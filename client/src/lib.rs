pub mod entities;
pub mod error;

pub use error::{ErrorKind, FleetError, FleetResult};

/// Current unix time in milliseconds.
pub fn fleet_timestamp() -> i64 {
  chrono::Utc::now().timestamp_millis()
}
