use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use shared::domain::HeadsetDescriptor;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::{
    epoch::{Epoch, EpochCounter},
    error::GatewayError,
    gateway::CommandGateway,
};

pub const DEFAULT_DISCOVERY_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_DISCOVERY_ATTEMPTS: u32 = 3;

/// Anything that can enumerate headsets once.
#[async_trait]
pub trait HeadsetSource: Send + Sync {
    async fn poll_headsets(&self) -> Result<Vec<HeadsetDescriptor>, GatewayError>;
}

#[async_trait]
impl<G> HeadsetSource for G
where
    G: CommandGateway + ?Sized,
{
    async fn poll_headsets(&self) -> Result<Vec<HeadsetDescriptor>, GatewayError> {
        CommandGateway::list_headsets(self).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoverySettings {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_DISCOVERY_INTERVAL,
            max_attempts: DEFAULT_DISCOVERY_ATTEMPTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryOutcome {
    Found(Vec<HeadsetDescriptor>),
    /// Every attempt came back empty or failed. Not an error.
    Exhausted { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub epoch: Epoch,
    pub outcome: DiscoveryOutcome,
}

/// Bounded headset polling: one immediate poll, then one per interval, until
/// a non-empty list arrives or the attempt budget runs out. Either way the
/// loop ends itself after reporting once.
#[derive(Debug, Default)]
pub struct DiscoveryPoller {
    settings: DiscoverySettings,
    epochs: EpochCounter,
    active: Option<Epoch>,
}

impl DiscoveryPoller {
    pub fn new(settings: DiscoverySettings) -> Self {
        Self {
            settings,
            epochs: EpochCounter::new(),
            active: None,
        }
    }

    pub fn start<S, F>(&mut self, source: Arc<S>, mut on_report: F) -> Epoch
    where
        S: HeadsetSource + ?Sized + 'static,
        F: FnMut(DiscoveryReport) + Send + 'static,
    {
        self.stop();
        let epoch = self.epochs.advance();
        let mut watcher = self.epochs.watcher();
        self.active = Some(epoch);
        let DiscoverySettings {
            interval: period,
            max_attempts,
        } = self.settings;
        info!(epoch = epoch.value(), max_attempts, "discovery: started");

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            for attempt in 1..=max_attempts {
                tokio::select! {
                    biased;
                    _ = watcher.superseded() => return,
                    _ = ticker.tick() => {}
                }

                // An in-flight poll is never interrupted; a stale result is
                // simply dropped once it lands.
                let result = source.poll_headsets().await;
                if !watcher.is_live() {
                    debug!(epoch = epoch.value(), attempt, "discovery: discarding stale poll");
                    return;
                }

                match result {
                    Ok(headsets) if !headsets.is_empty() => {
                        info!(attempt, found = headsets.len(), "discovery: headsets found");
                        on_report(DiscoveryReport {
                            epoch,
                            outcome: DiscoveryOutcome::Found(headsets),
                        });
                        return;
                    }
                    Ok(_) => debug!(attempt, "discovery: no headsets yet"),
                    Err(err) => warn!(attempt, error = %err, "discovery: poll failed"),
                }
            }

            info!(attempts = max_attempts, "discovery: nothing found");
            on_report(DiscoveryReport {
                epoch,
                outcome: DiscoveryOutcome::Exhausted {
                    attempts: max_attempts,
                },
            });
        });

        epoch
    }

    /// Safe to call repeatedly or before any `start`.
    pub fn stop(&mut self) {
        if let Some(epoch) = self.active.take() {
            self.epochs.advance();
            debug!(epoch = epoch.value(), "discovery: stopped");
        }
    }

    pub fn is_current(&self, epoch: Epoch) -> bool {
        self.active == Some(epoch)
    }
}

impl Drop for DiscoveryPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
#[path = "tests/discovery_tests.rs"]
mod tests;
