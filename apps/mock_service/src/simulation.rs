//! Simulated band-power scoring for the mock device.

use std::time::Duration;

use shared::{domain::HeadsetDescriptor, protocol::ServerEvent};
use tokio::{
    sync::broadcast,
    time::{interval_at, Instant},
};
use tracing::debug;

/// Population mean alpha/beta ratio at rest. Maps to a score of 50.
pub const BASELINE_ALPHA_BETA_RATIO: f64 = 12.4438;
const SCALE_FACTOR: f64 = 10.0;
const MIN_RATIO: f64 = 0.01;
const SCORE_PERIOD: Duration = Duration::from_secs(1);

pub fn catalogue() -> Vec<HeadsetDescriptor> {
    [
        ("EPOCX-MOCK-1234", "Mock EPOC X 1"),
        ("EPOCX-MOCK-5678", "Mock EPOC X 2"),
        ("EPOCX-MOCK-9101", "Mock EPOC X 3"),
        ("INSIGHT-MOCK-1234", "Mock Insight 1"),
        ("INSIGHT-MOCK-5678", "Mock Insight 2"),
        ("INSIGHT-MOCK-9101", "Mock Insight 3"),
    ]
    .into_iter()
    .map(|(id, name)| HeadsetDescriptor::new(id, Some(name.to_string())))
    .collect()
}

/// Log-scale score in 0..=100; the baseline ratio scores 50.
pub fn score_from_ratio(ratio: f64) -> u32 {
    let safe_ratio = ratio.max(MIN_RATIO);
    let score = 50.0 + (safe_ratio / BASELINE_ALPHA_BETA_RATIO).ln() * SCALE_FACTOR;
    score.clamp(0.0, 100.0) as u32
}

/// Alpha/beta ratio for the `step`-th second, swinging between a stressed and
/// a relaxed state around the baseline.
pub fn simulated_ratio(step: u32) -> f64 {
    let mental_state = (f64::from(step) / 8.0).sin();
    BASELINE_ALPHA_BETA_RATIO * (1.5 * mental_state).exp()
}

/// Truncated mean, 0 when nothing was scored.
pub fn average_score(scores: &[u32]) -> u32 {
    if scores.is_empty() {
        return 0;
    }
    let total: u64 = scores.iter().map(|score| u64::from(*score)).sum();
    (total / scores.len() as u64) as u32
}

/// Emits one `new_score` per second for `duration` seconds and returns the
/// session average.
pub async fn record(duration: u32, events: &broadcast::Sender<ServerEvent>) -> u32 {
    let mut ticker = interval_at(Instant::now() + SCORE_PERIOD, SCORE_PERIOD);
    let mut scores = Vec::with_capacity(duration as usize);
    for step in 1..=duration {
        ticker.tick().await;
        let ratio = simulated_ratio(step);
        let score = score_from_ratio(ratio);
        debug!(step, ratio, score, "mock: scored window");
        scores.push(score);
        let _ = events.send(ServerEvent::NewScore {
            score: f64::from(score),
        });
    }
    average_score(&scores)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn baseline_ratio_scores_fifty() {
        assert_eq!(score_from_ratio(BASELINE_ALPHA_BETA_RATIO), 50);
    }

    #[test]
    fn extreme_ratios_are_clamped() {
        assert_eq!(score_from_ratio(0.0), 0);
        assert_eq!(score_from_ratio(-4.0), 0);
        assert_eq!(score_from_ratio(1.0e9), 100);
    }

    #[test]
    fn simulated_scores_stay_in_a_plausible_band() {
        for step in 0..200 {
            let score = score_from_ratio(simulated_ratio(step));
            assert!((34..=66).contains(&score), "step {step} scored {score}");
        }
    }

    #[test]
    fn average_truncates_and_handles_empty() {
        assert_eq!(average_score(&[]), 0);
        assert_eq!(average_score(&[50, 51]), 50);
        assert_eq!(average_score(&[10, 20, 31]), 20);
    }

    #[test]
    fn catalogue_ids_are_unique() {
        let headsets = catalogue();
        let mut ids: Vec<_> = headsets.iter().map(|h| h.id.as_str()).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), headsets.len());
    }
}
