//! Thread-safe per-resource busy state, preventing two dispatched
//! operations from touching the same host or the proxy config at
//! once. Mutex-guarded rather than lock-free: contention is rare
//! (one worker per host, one proxy reload at a time) so simplicity
//! wins over throughput here.

use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use cache::CloneCache;
use tracing::error;

/// Whether a state value represents "something is in flight".
pub trait Busy {
  fn busy(&self) -> bool;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostActionState {
  pub probing: bool,
  pub executing_task: bool,
}

impl Busy for HostActionState {
  fn busy(&self) -> bool {
    self.probing || self.executing_task
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProxyActionState {
  pub applying: bool,
}

impl Busy for ProxyActionState {
  fn busy(&self) -> bool {
    self.applying
  }
}

/// Per-host and proxy busy-state registries, keyed by host id (as a
/// string) and a constant key for the single proxy lock.
#[derive(Default)]
pub struct ActionStates {
  pub host: CloneCache<String, Arc<ActionState<HostActionState>>>,
  pub proxy: CloneCache<String, Arc<ActionState<ProxyActionState>>>,
}

impl ActionStates {
  pub async fn host(&self, host_id: i64) -> Arc<ActionState<HostActionState>> {
    self.host.get_or_insert_default(&host_id.to_string()).await
  }

  pub async fn proxy(&self) -> Arc<ActionState<ProxyActionState>> {
    self.proxy.get_or_insert_default(&"proxy".to_string()).await
  }
}

/// RAII-guarded busy flag for a single resource.
#[derive(Default)]
pub struct ActionState<States: Default + Send + 'static>(Mutex<States>);

impl<States: Default + Busy + Copy + Send + 'static> ActionState<States> {
  pub fn get(&self) -> anyhow::Result<States> {
    Ok(*self.0.lock().map_err(|e| anyhow!("action state lock poisoned | {e:?}"))?)
  }

  pub fn busy(&self) -> anyhow::Result<bool> {
    Ok(self.0.lock().map_err(|e| anyhow!("action state lock poisoned | {e:?}"))?.busy())
  }

  /// Marks the resource busy via `update_fn` if it is not already
  /// busy, returning a guard that resets it to default on drop.
  pub fn update(
    &self,
    update_fn: impl Fn(&mut States),
  ) -> anyhow::Result<UpdateGuard<'_, States>> {
    self.update_custom(update_fn, |state| *state = Default::default(), true)
  }

  pub fn update_custom(
    &self,
    update_fn: impl Fn(&mut States),
    return_fn: impl Fn(&mut States) + Send + 'static,
    busy_check: bool,
  ) -> anyhow::Result<UpdateGuard<'_, States>> {
    let mut lock = self.0.lock().map_err(|e| anyhow!("action state lock poisoned | {e:?}"))?;
    if busy_check && lock.busy() {
      return Err(anyhow!("resource is busy"));
    }
    update_fn(&mut lock);
    Ok(UpdateGuard(&self.0, Box::new(return_fn)))
  }
}

pub struct UpdateGuard<'a, States: Default + Send + 'static>(
  &'a Mutex<States>,
  Box<dyn Fn(&mut States) + Send>,
);

impl<States: Default + Send + 'static> Drop for UpdateGuard<'_, States> {
  fn drop(&mut self) {
    let mut lock = match self.0.lock() {
      Ok(lock) => lock,
      Err(e) => {
        error!("action state lock poisoned on drop | {e:?}");
        return;
      }
    };
    self.1(&mut lock);
  }
}
