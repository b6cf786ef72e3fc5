//! Durable task executor: a bounded dispatcher pool, a kind→handler
//! table, and the host-level mutex that serializes commands against
//! a single remote machine.

mod install;
mod migrate;
mod network_scan;

use std::{
  collections::HashSet,
  sync::{Arc, Mutex, OnceLock},
};

use fleet_client::{
  entities::{
    host::{Host, HostAuth},
    task::{DeploymentTask, TaskKind, TaskStatus},
  },
  error::ErrorKind,
  fleet_timestamp, FleetResult,
};
use ssh::SshAuth;
use tokio::sync::mpsc;
use tracing::{error, info, instrument, warn};

use crate::{
  config::core_config,
  helpers::{action_state::HostActionState, credential},
  state,
};

/// Resolves a task's decrypted SSH credentials from its host row.
/// Plaintext never leaves this function's stack frame except for
/// the duration of the connect it backs.
pub(crate) async fn ssh_auth_for(host: &Host) -> FleetResult<SshAuth> {
  match &host.auth {
    HostAuth::Password { ciphertext } => {
      let plaintext = credential::decrypt_password(ciphertext)?;
      Ok(SshAuth::Password(plaintext))
    }
    HostAuth::PrivateKey { path } => Ok(SshAuth::PrivateKey { path: path.clone(), passphrase: None }),
  }
}

/// Handle used by API handlers to enqueue a task for the dispatcher
/// pool without blocking on its execution.
#[derive(Clone)]
pub struct Dispatcher {
  tx: mpsc::Sender<i64>,
}

impl Dispatcher {
  /// Spawns `workers` worker loops pulling task ids off a shared
  /// channel. Each worker owns no state between tasks; all durable
  /// state lives in the database.
  pub fn spawn_pool(workers: usize) -> Self {
    let (tx, rx) = mpsc::channel(1024);
    let rx = Arc::new(tokio::sync::Mutex::new(rx));
    for worker_id in 0..workers {
      let rx = rx.clone();
      tokio::spawn(async move {
        loop {
          let task_id = {
            let mut rx = rx.lock().await;
            rx.recv().await
          };
          let Some(task_id) = task_id else { break };
          if let Err(e) = run_task(task_id).await {
            error!(worker_id, task_id, "task execution failed | {e:#}");
          }
        }
      });
    }
    Self { tx }
  }

  #[instrument(skip(self))]
  pub async fn submit(&self, task_id: i64) -> FleetResult<()> {
    self
      .tx
      .send(task_id)
      .await
      .map_err(|e| fleet_client::error::FleetError::new(ErrorKind::Internal, anyhow::anyhow!(e.to_string())))
  }
}

static DISPATCHER: OnceLock<Dispatcher> = OnceLock::new();

/// Spawns the dispatcher pool and publishes it for [`dispatcher`].
/// Called once during startup.
pub fn spawn(workers: usize) {
  let instance = Dispatcher::spawn_pool(workers);
  DISPATCHER.set(instance).unwrap_or_else(|_| panic!("dispatcher pool spawned more than once"));
}

/// The process-wide dispatcher handle, for API handlers and the
/// scheduler to submit tasks without threading a `Dispatcher`
/// through every call site.
pub fn dispatcher() -> &'static Dispatcher {
  DISPATCHER.get().expect("dispatcher accessed before deploy::spawn() ran during startup")
}

/// Loads the task, acquires the per-host lock(s) it needs, dispatches
/// to the kind handler, and persists the terminal state.
#[instrument]
async fn run_task(task_id: i64) -> FleetResult<()> {
  let mut task = state::tasks().get(task_id).await?;
  if task.status.is_terminal() {
    return Ok(());
  }

  let host_id = task.target_host_id;
  let _guard = if let Some(host_id) = host_id {
    Some(
      state::action_states()
        .host(host_id)
        .await
        .update(|s: &mut HostActionState| s.executing_task = true)
        .map_err(|e| fleet_client::error::FleetError::new(ErrorKind::CapacityExceeded, e))?,
    )
  } else {
    None
  };

  task.status = TaskStatus::Running;
  task.started_ts = Some(fleet_timestamp());
  task.set_progress("connect", 1);
  state::tasks().save_progress(&task).await?;

  let result = dispatch(&mut task).await;

  task.completed_ts = Some(fleet_timestamp());
  match result {
    Ok(()) => {
      task.status = TaskStatus::Completed;
      task.set_progress(&task.current_phase.clone(), 100);
      info!(task_id, "task completed");
    }
    Err(_e) if take_cancel_request(task_id) => {
      task.status = TaskStatus::Cancelled;
      task.push_log_line("cancelled at checkpoint");
      info!(task_id, "task cancelled");
    }
    Err(e) => {
      task.status = TaskStatus::Failed;
      task.error = Some(e.to_string());
      task.push_log_line(&format!("FAILED: {e:#}"));
      warn!(task_id, "task failed | {e:#}");
    }
  }
  state::tasks().save_progress(&task).await?;

  if let Err(e) = after_task_placement_hook(&task).await {
    error!(task_id, "placement lifecycle hook failed | {e:#}");
  }

  Ok(())
}

/// A worker-placement install task carries its `placement_id` in
/// `config`, set when the placement row was reserved (§4.6). On
/// success the placement moves to `running` and the proxy config is
/// regenerated to include it; on failure the reservation is released
/// since no placement should appear to exist.
async fn after_task_placement_hook(task: &DeploymentTask) -> FleetResult<()> {
  if !matches!(task.kind, TaskKind::Install | TaskKind::FullSetup) {
    return Ok(());
  }
  let Some(placement_id) = task.config.get("placement_id").and_then(|v| v.as_i64()) else {
    return Ok(());
  };

  match task.status {
    TaskStatus::Completed => {
      state::placements()
        .set_status(placement_id, fleet_client::entities::placement::PlacementStatus::Running, Some(fleet_timestamp()))
        .await?;
      crate::proxy::regenerate_and_apply().await?;
    }
    TaskStatus::Failed | TaskStatus::Cancelled => {
      state::placements().delete(placement_id).await?;
    }
    _ => {}
  }
  Ok(())
}

async fn dispatch(task: &mut DeploymentTask) -> FleetResult<()> {
  match task.kind {
    TaskKind::Install | TaskKind::FullSetup => install::run(task).await,
    TaskKind::Migrate => migrate::run(task).await,
    TaskKind::NetworkScan => network_scan::run(task).await,
    TaskKind::Backup => install::run_backup_step(task).await,
  }
}

pub(crate) fn command_timeout() -> std::time::Duration {
  std::time::Duration::from_secs(core_config().command_timeout_secs)
}

/// In-flight cooperative-cancellation requests, keyed by task id.
/// Transient, not persisted: if the process restarts mid-task the
/// startup orphan sweep already fails the task outright, so there is
/// nothing left to cancel cooperatively.
fn cancel_requests() -> &'static Mutex<HashSet<i64>> {
  static CANCEL_REQUESTS: OnceLock<Mutex<HashSet<i64>>> = OnceLock::new();
  CANCEL_REQUESTS.get_or_init(|| Mutex::new(HashSet::new()))
}

/// Records a cancellation request for a running task. A handler
/// observes it the next time it calls [`checkpoint`] between phases.
pub fn request_cancel(task_id: i64) {
  cancel_requests().lock().unwrap_or_else(|e| e.into_inner()).insert(task_id);
}

fn take_cancel_request(task_id: i64) -> bool {
  cancel_requests().lock().unwrap_or_else(|e| e.into_inner()).remove(&task_id)
}

/// Cooperative cancellation checkpoint: handlers call this between
/// phases (after persisting progress, before starting the next
/// phase). Returns an error if a cancellation was requested, which
/// `run_task` below recognizes and turns into `TaskStatus::Cancelled`
/// rather than `Failed`. Already-committed side effects from earlier
/// phases are not rolled back.
pub(crate) fn checkpoint(task_id: i64) -> FleetResult<()> {
  if cancel_requests().lock().unwrap_or_else(|e| e.into_inner()).contains(&task_id) {
    return Err(fleet_client::error::FleetError::new(
      ErrorKind::Internal,
      anyhow::anyhow!("task {task_id} cancelled at checkpoint"),
    ));
  }
  Ok(())
}

#[cfg(test)]
mod cancellation_tests {
  use super::*;

  // Distinct task ids per test: the registry is a process-wide
  // static shared across the whole test binary.

  #[test]
  fn checkpoint_passes_with_no_request() {
    assert!(checkpoint(9001).is_ok());
  }

  #[test]
  fn checkpoint_fails_once_cancel_requested() {
    request_cancel(9002);
    assert!(checkpoint(9002).is_err());
  }

  #[test]
  fn take_cancel_request_consumes_it_exactly_once() {
    request_cancel(9003);
    assert!(take_cancel_request(9003));
    assert!(!take_cancel_request(9003));
  }
}
