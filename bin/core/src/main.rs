#[macro_use]
extern crate tracing;

mod api;
mod config;
mod deploy;
mod domain;
mod helpers;
mod installer;
mod monitor;
mod probe;
mod proxy;
mod scheduler;
mod state;

use config::core_config;

async fn app() -> anyhow::Result<()> {
  let config = core_config();
  logger::init(&config.logging)?;

  info!("fleet-core version: v{}", env!("CARGO_PKG_VERSION"));
  info!("{:?}", config.sanitized());

  state::init_db_pool().await;
  state::host_key_store().await;

  let reason = "orphaned by control-plane restart";
  match state::tasks().fail_orphaned(reason, fleet_client::fleet_timestamp()).await {
    Ok(0) => {}
    Ok(n) => warn!("recovered {n} orphaned task(s) left running by a previous crash"),
    Err(e) => error!("failed to sweep orphaned tasks at startup | {e:#}"),
  }

  deploy::spawn(config.dispatcher_workers);
  monitor::spawn_monitoring_loops();
  scheduler::spawn();
  spawn_domain_verify_loop();

  let listener = tokio::net::TcpListener::bind((config.bind_address.as_str(), config.port)).await?;
  info!("fleet-core listening on {}:{}", config.bind_address, config.port);

  axum::serve(listener, api::app())
    .with_graceful_shutdown(shutdown_signal())
    .await?;

  Ok(())
}

/// The periodic domain-mapping reachability sweep (§4.8) isn't one of
/// the monitor's three wall-clock-aligned timers -- it shares the
/// scheduler's plain fixed-interval loop shape instead, since there is
/// no boundary-alignment requirement for it.
fn spawn_domain_verify_loop() {
  tokio::spawn(async move {
    loop {
      tokio::time::sleep(std::time::Duration::from_secs(core_config().monitoring_interval_secs)).await;
      domain::verify_tick(fleet_client::fleet_timestamp()).await;
    }
  });
}

async fn shutdown_signal() {
  let ctrl_c = async {
    tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
  };
  let terminate = async {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
      .expect("failed to install SIGTERM handler")
      .recv()
      .await;
  };
  tokio::select! {
    _ = ctrl_c => {},
    _ = terminate => {},
  }
  info!("shutdown signal received, draining in-flight requests");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  dotenvy::dotenv().ok();
  app().await
}
