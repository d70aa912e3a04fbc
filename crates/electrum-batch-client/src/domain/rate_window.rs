//! # Sliding Rate Window
//!
//! Tracks `{timestamp, size}` samples of dispatched wire batches and
//! answers how many more requests fit into the current window.
//!
//! Samples older than one interval (`timestamp + interval <= now`) no longer
//! count against the budget.

use std::collections::VecDeque;
use std::time::Duration;
use tokio::time::Instant;

use crate::config::RateLimit;

/// One dispatched wire batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateSample {
    /// When the batch was sent.
    pub timestamp: Instant,
    /// Number of requests in the batch.
    pub size: usize,
}

/// Sliding window over dispatched batches.
#[derive(Clone, Debug)]
pub struct RateWindow {
    limit: RateLimit,
    samples: VecDeque<RateSample>,
}

impl RateWindow {
    /// Empty window for the given budget.
    pub fn new(limit: RateLimit) -> Self {
        Self {
            limit,
            samples: VecDeque::new(),
        }
    }

    /// Budget of this window.
    pub fn limit(&self) -> RateLimit {
        self.limit
    }

    /// Drop samples that fell out of the window.
    fn prune(&mut self, now: Instant) {
        let interval = self.limit.interval();
        while let Some(oldest) = self.samples.front() {
            if oldest.timestamp + interval > now {
                break;
            }
            self.samples.pop_front();
        }
    }

    /// Requests counted in the current window.
    pub fn consumed(&mut self, now: Instant) -> usize {
        self.prune(now);
        self.samples.iter().map(|s| s.size).sum()
    }

    /// How many requests may be sent right now, capped at `chunk_cap`.
    pub fn available(&mut self, now: Instant, chunk_cap: usize) -> usize {
        let consumed = self.consumed(now);
        self.limit.max.saturating_sub(consumed).min(chunk_cap)
    }

    /// Record a dispatched batch.
    pub fn record(&mut self, now: Instant, size: usize) {
        self.samples.push_back(RateSample {
            timestamp: now,
            size,
        });
    }

    /// Delay until the oldest sample leaves the window, plus `margin`.
    ///
    /// Never shorter than `margin`.
    pub fn retry_delay(&self, now: Instant, margin: Duration) -> Duration {
        match self.samples.front() {
            Some(oldest) => {
                let elapsed = now.saturating_duration_since(oldest.timestamp);
                self.limit.interval().saturating_sub(elapsed) + margin
            }
            None => margin,
        }
    }

    /// Samples currently tracked, oldest first.
    pub fn samples(&self) -> impl Iterator<Item = &RateSample> {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn limit(max: usize, interval_ms: u64) -> RateLimit {
        RateLimit { max, interval_ms }
    }

    #[test]
    fn test_available_respects_chunk_cap() {
        let mut window = RateWindow::new(limit(500, 20_000));
        let now = Instant::now();
        assert_eq!(window.available(now, 100), 100);
        window.record(now, 100);
        assert_eq!(window.available(now, 1000), 400);
    }

    #[test]
    fn test_samples_expire_after_interval() {
        let mut window = RateWindow::new(limit(10, 1_000));
        let start = Instant::now();
        window.record(start, 10);
        assert_eq!(window.available(start + Duration::from_millis(999), 100), 0);
        // timestamp + interval <= now drops the sample
        assert_eq!(window.available(start + Duration::from_millis(1_000), 100), 10);
    }

    #[test]
    fn test_retry_delay() {
        let mut window = RateWindow::new(limit(10, 1_000));
        let start = Instant::now();
        let margin = Duration::from_millis(200);
        assert_eq!(window.retry_delay(start, margin), margin);

        window.record(start, 10);
        let delay = window.retry_delay(start + Duration::from_millis(300), margin);
        assert_eq!(delay, Duration::from_millis(900));

        // Stale sample: never below the margin
        let delay = window.retry_delay(start + Duration::from_millis(5_000), margin);
        assert_eq!(delay, margin);
    }

    proptest! {
        /// Greedy dispatching at arbitrary times never puts more than `max`
        /// requests inside any window of length `interval`.
        #[test]
        fn prop_window_never_exceeds_max(
            max in 1usize..50,
            interval_ms in 10u64..2_000,
            steps in proptest::collection::vec((0u64..500, 1usize..80), 1..60),
        ) {
            let rate = limit(max, interval_ms);
            let mut window = RateWindow::new(rate);
            let start = Instant::now();
            let mut now = start;
            let mut dispatched: Vec<(Instant, usize)> = Vec::new();

            for (advance_ms, wanted) in steps {
                now += Duration::from_millis(advance_ms);
                let take = window.available(now, 100).min(wanted);
                if take > 0 {
                    window.record(now, take);
                    dispatched.push((now, take));
                }
            }

            for (i, (t0, _)) in dispatched.iter().enumerate() {
                let in_window: usize = dispatched[i..]
                    .iter()
                    .take_while(|(t, _)| *t < *t0 + rate.interval())
                    .map(|(_, n)| *n)
                    .sum();
                prop_assert!(in_window <= max, "window from {:?} held {}", t0, in_window);
            }
        }
    }
}
