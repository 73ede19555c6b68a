//! Background sweep lifecycle
//!
//! A [`Sweeper`] runs one [`Sweep`] target on a fixed interval until stopped.
//! Nothing starts at construction; callers own `start()`/`stop()`. A failing
//! or panicking sweep is logged and the loop carries on with the next tick.

use aviary_common::Result;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Periodic cleanup of ephemeral state
pub trait Sweep: Send + Sync {
    /// Label used in logs
    fn name(&self) -> &str;

    /// Remove stale state; returns the number of entries removed
    fn sweep(&self) -> Result<usize>;
}

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Interval-driven runner for one [`Sweep`] target
pub struct Sweeper {
    target: Arc<dyn Sweep>,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl Sweeper {
    pub fn new(target: Arc<dyn Sweep>, period: Duration) -> Self {
        Self {
            target,
            period,
            running: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    /// Spawn the sweep loop; a no-op if already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(sweep_loop(
            self.target.clone(),
            self.period,
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });
    }

    /// Stop the loop and wait for it to exit; a no-op if not running
    pub async fn stop(&self) {
        let running = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        if let Some(Running { cancel, handle }) = running {
            cancel.cancel();
            if let Err(e) = handle.await {
                error!("Sweeper {} task ended abnormally: {}", self.target.name(), e);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        let running = self
            .running
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(running) = running {
            running.cancel.cancel();
        }
    }
}

/// Run one sweep, converting errors and panics into log lines
pub fn run_sweep(target: &dyn Sweep) {
    match catch_unwind(AssertUnwindSafe(|| target.sweep())) {
        Ok(Ok(0)) => {}
        Ok(Ok(removed)) => debug!("Sweeper {}: removed {} entries", target.name(), removed),
        Ok(Err(e)) => error!("Sweeper {}: sweep failed: {}", target.name(), e),
        Err(_) => error!("Sweeper {}: sweep panicked", target.name()),
    }
}

async fn sweep_loop(target: Arc<dyn Sweep>, period: Duration, cancel: CancellationToken) {
    info!("Sweeper {} started (interval: {:?})", target.name(), period);

    let mut timer = interval(period);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // The first tick completes immediately; sweep one period after start
    timer.tick().await;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = timer.tick() => run_sweep(target.as_ref()),
        }
    }

    info!("Sweeper {} stopped", target.name());
}
