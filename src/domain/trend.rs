//! Short-term heart-rate trend over a rolling window.

use std::collections::VecDeque;

/// Number of samples held in the rolling window.
pub const TREND_WINDOW: usize = 5;

/// Samples needed before a direction is reported.
pub const MIN_TREND_SAMPLES: usize = 3;

/// Difference between half-window means that counts as movement.
///
/// Anything within the band is noise and reads as stable.
pub const HYSTERESIS: f64 = 1.0;

/// Direction of the signal over the current window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrendDirection {
    Insufficient,
    Rising,
    Falling,
    Stable,
}

impl TrendDirection {
    /// Label used by the viewer ("TREND: ...").
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::Insufficient => "--",
            Self::Rising => "RISING",
            Self::Falling => "FALLING",
            Self::Stable => "STABLE",
        }
    }
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "TREND: {}", self.label())
    }
}

/// Rolling FIFO window of one numeric signal.
#[derive(Debug, Clone, Default)]
pub struct TrendEstimator {
    window: VecDeque<f64>,
}

impl TrendEstimator {
    #[must_use]
    pub fn new() -> Self {
        Self {
            window: VecDeque::with_capacity(TREND_WINDOW),
        }
    }

    /// Append a sample, evicting the oldest once full, and classify.
    pub fn observe(&mut self, value: f64) -> TrendDirection {
        if self.window.len() == TREND_WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(value);
        self.direction()
    }

    /// Classify the current window without observing anything.
    #[must_use]
    pub fn direction(&self) -> TrendDirection {
        let len = self.window.len();
        if len < MIN_TREND_SAMPLES {
            return TrendDirection::Insufficient;
        }

        // With an odd length the middle sample belongs to neither half.
        let first_avg = mean(self.window.range(..len / 2));
        let second_avg = mean(self.window.range(len.div_ceil(2)..));

        if second_avg > first_avg + HYSTERESIS {
            TrendDirection::Rising
        } else if second_avg < first_avg - HYSTERESIS {
            TrendDirection::Falling
        } else {
            TrendDirection::Stable
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Window contents, oldest first.
    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.window.iter().copied()
    }

    pub fn reset(&mut self) {
        self.window.clear();
    }
}

fn mean<'a>(values: impl ExactSizeIterator<Item = &'a f64>) -> f64 {
    let n = values.len();
    values.sum::<f64>() / n as f64
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(values: &[f64]) -> (TrendEstimator, TrendDirection) {
        let mut trend = TrendEstimator::new();
        let mut last = TrendDirection::Insufficient;
        for &v in values {
            last = trend.observe(v);
        }
        (trend, last)
    }

    #[test]
    fn test_insufficient_until_three_samples() {
        assert_eq!(feed(&[70.0]).1, TrendDirection::Insufficient);
        assert_eq!(feed(&[70.0, 90.0]).1, TrendDirection::Insufficient);
        assert_ne!(feed(&[70.0, 90.0, 95.0]).1, TrendDirection::Insufficient);
    }

    #[test]
    fn test_flat_window_is_stable() {
        assert_eq!(feed(&[70.0, 70.0, 70.0]).1, TrendDirection::Stable);
    }

    #[test]
    fn test_rising() {
        // first half [60, 60], second half [80, 80]
        assert_eq!(feed(&[60.0, 60.0, 60.0, 80.0, 80.0]).1, TrendDirection::Rising);
    }

    #[test]
    fn test_falling() {
        assert_eq!(feed(&[90.0, 90.0, 90.0, 70.0, 70.0]).1, TrendDirection::Falling);
    }

    #[test]
    fn test_hysteresis_band() {
        // first half [70], second half [71]: diff exactly 1 is not movement
        assert_eq!(feed(&[70.0, 99.0, 71.0]).1, TrendDirection::Stable);
        assert_eq!(feed(&[70.0, 99.0, 71.5]).1, TrendDirection::Rising);
        assert_eq!(feed(&[70.0, 10.0, 69.0]).1, TrendDirection::Stable);
        assert_eq!(feed(&[70.0, 10.0, 68.5]).1, TrendDirection::Falling);
    }

    #[test]
    fn test_odd_window_skips_middle_sample() {
        // Middle value would flip the average if it were included.
        assert_eq!(feed(&[70.0, 200.0, 70.0]).1, TrendDirection::Stable);
    }

    #[test]
    fn test_even_window_split() {
        // len 4: [80, 80] vs [70, 70]
        assert_eq!(feed(&[80.0, 80.0, 70.0, 70.0]).1, TrendDirection::Falling);
    }

    #[test]
    fn test_fifo_eviction() {
        let (trend, last) = feed(&[200.0, 60.0, 60.0, 60.0, 80.0, 80.0]);
        assert_eq!(trend.len(), TREND_WINDOW);
        assert_eq!(trend.values().collect::<Vec<_>>(), vec![60.0, 60.0, 60.0, 80.0, 80.0]);
        assert_eq!(last, TrendDirection::Rising);
    }

    #[test]
    fn test_window_never_exceeds_capacity() {
        let mut trend = TrendEstimator::new();
        for i in 0..50 {
            trend.observe(f64::from(i));
            assert!(trend.len() <= TREND_WINDOW);
        }
        assert_eq!(trend.values().next(), Some(45.0));
    }

    #[test]
    fn test_direction_is_pure() {
        let (trend, last) = feed(&[90.0, 90.0, 90.0, 70.0, 70.0]);
        assert_eq!(trend.direction(), last);
        assert_eq!(trend.direction(), last);
        assert_eq!(trend.len(), 5);
    }

    #[test]
    fn test_reset() {
        let (mut trend, _) = feed(&[70.0, 70.0, 70.0]);
        trend.reset();
        assert!(trend.is_empty());
        assert_eq!(trend.observe(70.0), TrendDirection::Insufficient);
    }

    #[test]
    fn test_display() {
        assert_eq!(TrendDirection::Rising.to_string(), "TREND: RISING");
        assert_eq!(TrendDirection::Insufficient.to_string(), "TREND: --");
    }
}
