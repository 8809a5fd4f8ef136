//! Generation tokens for cancellable background activities.
//!
//! Every activity the controller spawns (a discovery poll loop, a countdown,
//! an event channel pump) is stamped with the epoch current at start. Stopping
//! the activity advances the epoch, which both wakes the task so it can exit
//! and lets the controller recognise any callback that was already queued.

use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Epoch(u64);

impl Epoch {
    pub fn value(self) -> u64 {
        self.0
    }
}

#[derive(Debug)]
pub struct EpochCounter {
    tx: watch::Sender<u64>,
}

impl Default for EpochCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl EpochCounter {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(0);
        Self { tx }
    }

    pub fn current(&self) -> Epoch {
        Epoch(*self.tx.borrow())
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.current() == epoch
    }

    pub fn advance(&self) -> Epoch {
        self.tx.send_modify(|value| *value += 1);
        self.current()
    }

    /// Watcher bound to the epoch current right now.
    pub fn watcher(&self) -> EpochWatcher {
        EpochWatcher {
            rx: self.tx.subscribe(),
            epoch: self.current(),
        }
    }
}

#[derive(Debug)]
pub struct EpochWatcher {
    rx: watch::Receiver<u64>,
    epoch: Epoch,
}

impl EpochWatcher {
    pub fn epoch(&self) -> Epoch {
        self.epoch
    }

    pub fn is_live(&self) -> bool {
        *self.rx.borrow() == self.epoch.0
    }

    /// Resolves once the counter has moved past this watcher's epoch, or the
    /// counter itself was dropped.
    pub async fn superseded(&mut self) {
        while self.is_live() {
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn advancing_invalidates_existing_watchers() {
        let counter = EpochCounter::new();
        let watcher = counter.watcher();
        assert!(watcher.is_live());
        assert!(counter.is_current(watcher.epoch()));

        counter.advance();
        assert!(!watcher.is_live());
        assert!(!counter.is_current(watcher.epoch()));
        assert!(counter.watcher().is_live());
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_wakes_on_advance() {
        let counter = EpochCounter::new();
        let mut watcher = counter.watcher();

        let waiting = tokio::spawn(async move {
            watcher.superseded().await;
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiting.is_finished());

        counter.advance();
        waiting.await.expect("watcher task");
    }

    #[tokio::test]
    async fn superseded_returns_when_counter_dropped() {
        let counter = EpochCounter::new();
        let mut watcher = counter.watcher();
        drop(counter);
        watcher.superseded().await;
    }
}
