//! Three independent periodic timers: health, metrics, alert-sweep.
//! Each runs on the wall-clock boundary for its [`Timelength`]
//! rather than drifting by accumulated tick error.

mod alert;
mod health;
mod metrics;

use async_timing_util::{wait_until_timelength, Timelength};
use fleet_client::fleet_timestamp;

pub use alert::{acknowledge, resolve};
pub use metrics::{host_metrics_cache, HostMetrics};

const ADDITIONAL_MS: u128 = 500;

pub fn spawn_monitoring_loops() {
  spawn_loop(Timelength::FiveMinutes, health::tick);
  spawn_loop(Timelength::OneMinute, metrics::tick);
  spawn_loop(Timelength::TwoMinutes, alert::tick);
}

fn spawn_loop<F, Fut>(interval: Timelength, tick: F)
where
  F: Fn(i64) -> Fut + Send + 'static,
  Fut: std::future::Future<Output = ()> + Send,
{
  tokio::spawn(async move {
    loop {
      let ts = (wait_until_timelength(interval, ADDITIONAL_MS).await - ADDITIONAL_MS) as i64;
      tick(ts).await;
    }
  });
}

pub(crate) fn now() -> i64 {
  fleet_timestamp()
}
