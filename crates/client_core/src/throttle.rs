use std::time::Duration;

use tokio::time::Instant;

pub const DEFAULT_THROTTLE_INTERVAL: Duration = Duration::from_secs(1);

/// Time-windowed suppression of high-frequency values.
///
/// A value is forwarded only when strictly more than `min_interval` has passed
/// since the previously forwarded one. Suppressed values are dropped, never
/// queued, so whatever is forwarded is always the value handed in by that call.
#[derive(Debug, Clone)]
pub struct Throttle {
    min_interval: Duration,
    last_forwarded: Option<Instant>,
}

impl Default for Throttle {
    fn default() -> Self {
        Self::new(DEFAULT_THROTTLE_INTERVAL)
    }
}

impl Throttle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_forwarded: None,
        }
    }

    pub fn emit<T>(&mut self, value: T) -> Option<T> {
        self.emit_at(value, Instant::now())
    }

    pub fn emit_at<T>(&mut self, value: T, now: Instant) -> Option<T> {
        let open = match self.last_forwarded {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.min_interval,
        };
        if !open {
            return None;
        }
        self.last_forwarded = Some(now);
        Some(value)
    }

    /// Forget the last forwarded timestamp so the next value passes.
    pub fn reset(&mut self) {
        self.last_forwarded = None;
    }
}
