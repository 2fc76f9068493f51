// Copyright © Aptos Foundation
// SPDX-License-Identifier: Apache-2.0

#![forbid(unsafe_code)]

use std::collections::VecDeque;

/// Windowed throughput tracker, e.g. documents processed per second.
///
/// Samples older than the window are evicted as new ones arrive; the average
/// is computed over whatever span the retained samples cover.
pub struct MovingAverage {
    window_millis: u64,
    // (timestamp_millis, count)
    samples: VecDeque<(u64, u64)>,
    window_sum: u64,
}

impl MovingAverage {
    pub fn new(window_millis: u64) -> Self {
        let mut samples = VecDeque::new();
        // Seed with an empty sample so the span is measurable from creation.
        samples.push_back((now_millis(), 0));
        Self {
            window_millis,
            samples,
            window_sum: 0,
        }
    }

    pub fn tick_now(&mut self, count: u64) -> f64 {
        self.tick(now_millis(), count)
    }

    pub fn tick(&mut self, timestamp_millis: u64, count: u64) -> f64 {
        self.samples.push_back((timestamp_millis, count));
        self.window_sum += count;
        // Keep at least two samples so the elapsed span stays non-trivial.
        while self.samples.len() > 2 {
            let (oldest, evicted) = self.samples[0];
            if timestamp_millis.saturating_sub(oldest) <= self.window_millis {
                break;
            }
            self.window_sum -= evicted;
            self.samples.pop_front();
        }
        self.avg()
    }

    /// Average count per second over the retained window. Zero until at
    /// least two samples exist.
    pub fn avg(&self) -> f64 {
        match (self.samples.front(), self.samples.back()) {
            (Some((first, _)), Some((last, _))) if last > first => {
                (self.window_sum * 1000) as f64 / (last - first) as f64
            },
            _ => 0.0,
        }
    }
}

fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn average_over_window() {
        let mut ma = MovingAverage::new(10_000);
        let base = 1_000_000;
        ma.tick(base, 0);
        ma.tick(base + 1_000, 1_000);
        ma.tick(base + 2_000, 1_000);
        // 2000 over 2 seconds -> 1000/s.
        assert_eq!(ma.avg() as u64, 1_000);
    }

    #[test]
    fn old_samples_are_evicted() {
        let mut ma = MovingAverage::new(1_000);
        let base = 1_000_000;
        ma.tick(base, 100);
        ma.tick(base + 5_000, 100);
        ma.tick(base + 5_500, 100);
        // The first sample fell out of the window; 200 over 500ms -> 400/s.
        assert_eq!(ma.avg() as u64, 400);
    }

    #[test]
    fn no_rate_before_second_sample() {
        let mut ma = MovingAverage::new(1_000);
        assert_eq!(ma.avg(), 0.0);
        ma.tick_now(10);
        // Same-millisecond ticks cannot divide by a zero span.
        let _ = ma.avg();
    }
}
