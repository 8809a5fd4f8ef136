use std::time::Duration;

use tokio::time::{interval_at, Instant};
use tracing::debug;

use crate::epoch::{Epoch, EpochCounter};

const TICK_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CountdownTick {
    pub epoch: Epoch,
    pub remaining: u32,
}

/// Local once-per-second countdown seeded from a server-declared duration.
///
/// Purely presentational: reaching zero stops the ticking but ends nothing.
#[derive(Debug, Default)]
pub struct CountdownTimer {
    epochs: EpochCounter,
    active: Option<Epoch>,
}

impl CountdownTimer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start<F>(&mut self, initial_seconds: u32, mut on_tick: F) -> Epoch
    where
        F: FnMut(CountdownTick) + Send + 'static,
    {
        self.stop();
        let epoch = self.epochs.advance();
        let mut watcher = self.epochs.watcher();
        self.active = Some(epoch);
        debug!(epoch = epoch.value(), initial_seconds, "countdown: started");

        tokio::spawn(async move {
            let mut remaining = initial_seconds;
            let mut ticker = interval_at(Instant::now() + TICK_PERIOD, TICK_PERIOD);
            while remaining > 0 {
                tokio::select! {
                    _ = watcher.superseded() => return,
                    _ = ticker.tick() => {}
                }
                if !watcher.is_live() {
                    return;
                }
                remaining -= 1;
                on_tick(CountdownTick { epoch, remaining });
            }
            debug!(epoch = epoch.value(), "countdown: reached zero");
        });

        epoch
    }

    /// Safe to call repeatedly or before any `start`.
    pub fn stop(&mut self) {
        if let Some(epoch) = self.active.take() {
            self.epochs.advance();
            debug!(epoch = epoch.value(), "countdown: stopped");
        }
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.active == Some(epoch)
    }

    pub fn active(&self) -> Option<Epoch> {
        self.active
    }
}

impl Drop for CountdownTimer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/countdown_tests.rs"]
mod tests;
