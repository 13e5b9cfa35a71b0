//! Scheduler background loop.
//!
//! Spawns a tokio task that wakes every tick, and once the configured
//! interval has passed since its own previous run asks the
//! [`UpdateManager`] to check for updates. The manager still applies its
//! own due-check on top of this timer.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{Result, ZioError};
use crate::update::{CheckOutcome, UpdateManager};

/// Granularity at which the loop notices a stop request.
const DEFAULT_TICK: Duration = Duration::from_secs(1);

/// Upper bound on how long [`UpdateScheduler::stop`] waits for the loop.
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Background driver for periodic update checks.
pub struct UpdateScheduler {
    manager: Arc<UpdateManager>,
    interval: Duration,
    tick: Duration,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl UpdateScheduler {
    /// Create a scheduler using the manager's configured check interval.
    pub fn new(manager: Arc<UpdateManager>) -> Self {
        let interval = manager
            .config()
            .check_interval()
            .to_std()
            .unwrap_or(Duration::ZERO);
        Self {
            manager,
            interval,
            tick: DEFAULT_TICK,
            cancel: CancellationToken::new(),
            handle: None,
        }
    }

    /// Override the spacing between scheduled checks.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Override the wake-up granularity (minimum 1 ms).
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    /// Change the spacing between checks. Takes effect on the next [`start`](Self::start).
    pub fn set_interval(&mut self, interval: Duration) {
        self.interval = interval;
    }

    /// Spacing between scheduled checks.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Returns `true` while the background loop is alive.
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Spawn the background loop. Does nothing if it is already running.
    ///
    /// # Errors
    ///
    /// Returns [`ZioError::Scheduler`] when called outside a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        if self.is_running() {
            warn!("update scheduler is already running");
            return Ok(());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ZioError::Scheduler(format!("cannot start without a runtime: {e}")))?;

        self.cancel = CancellationToken::new();
        let manager = Arc::clone(&self.manager);
        let cancel = self.cancel.clone();
        let (interval, tick) = (self.interval, self.tick);

        self.handle = Some(runtime.spawn(run_loop(manager, interval, tick, cancel)));
        info!(
            "update scheduler started (every {}s)",
            self.interval.as_secs_f64()
        );
        Ok(())
    }

    /// Signal the loop to stop and wait (bounded) for it to exit.
    ///
    /// A check that is already executing is not interrupted; if it outlives
    /// the wait it finishes in the background.
    pub async fn stop(&mut self) {
        self.cancel.cancel();
        let Some(handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(STOP_TIMEOUT, handle).await {
            Ok(Ok(())) => debug!("update scheduler joined"),
            Ok(Err(e)) => warn!("update scheduler task ended abnormally: {e}"),
            Err(_) => warn!(
                "update scheduler still busy after {}s; leaving the running check to finish",
                STOP_TIMEOUT.as_secs()
            ),
        }
    }
}

impl Drop for UpdateScheduler {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_loop(
    manager: Arc<UpdateManager>,
    interval: Duration,
    tick: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut last_run: Option<Instant> = None;

    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        if last_run.is_some_and(|at| at.elapsed() < interval) {
            continue;
        }
        last_run = Some(Instant::now());

        debug!("running scheduled update check");
        match manager.check_for_updates().await {
            Ok(CheckOutcome::Updated { from, to, .. }) => {
                info!("scheduled update installed: {from} -> {to}");
            }
            Ok(CheckOutcome::NoUpdate(reason)) => {
                debug!(?reason, "scheduled update check finished");
            }
            Err(e) => warn!("scheduled update check failed: {e}"),
        }
    }

    info!("update scheduler stopped");
}
