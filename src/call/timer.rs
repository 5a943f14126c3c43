use std::time::Duration;

use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::state::ElapsedTime;

/// Elapsed-seconds counter for a connected call.
///
/// Pure bookkeeping: the controller calls `tick` from the ticker task and
/// owns start/stop, so a stopped timer can never produce another value.
#[derive(Debug, Default)]
pub struct CallTimer {
    elapsed: ElapsedTime,
    running: bool,
    /// Bumped on every start so ticks from a previous run are recognisable.
    epoch: u64,
}

impl CallTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset to zero and run. Restarts from zero if already running.
    pub fn start(&mut self) -> u64 {
        self.elapsed = ElapsedTime(0);
        self.running = true;
        self.epoch += 1;
        self.epoch
    }

    /// Idempotent.
    pub fn stop(&mut self) {
        self.running = false;
    }

    /// Stop and forget the count of the finished call.
    pub fn reset(&mut self) {
        self.running = false;
        self.elapsed = ElapsedTime(0);
    }

    /// Advance one second. `None` once stopped.
    pub fn tick(&mut self) -> Option<ElapsedTime> {
        if !self.running {
            return None;
        }
        self.elapsed = ElapsedTime(self.elapsed.0 + 1);
        Some(self.elapsed)
    }

    /// Advance only if `epoch` names the current run.
    pub fn tick_for(&mut self, epoch: u64) -> Option<ElapsedTime> {
        if epoch != self.epoch {
            return None;
        }
        self.tick()
    }

    pub fn elapsed(&self) -> ElapsedTime {
        self.elapsed
    }

    pub fn is_running(&self) -> bool {
        self.running
    }
}

/// Fire `on_tick` every `period` until `cancel` fires. The first tick comes one
/// full period after start.
pub async fn run_ticker<F, Fut>(period: Duration, cancel: CancellationToken, mut on_tick: F)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut interval = time::interval_at(time::Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("Call timer stopped");
                return;
            }
            _ = interval.tick() => on_tick().await,
        }
    }
}
