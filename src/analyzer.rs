//! Power quality analysis over a rolling sample window
//!
//! Keeps the last N input-power samples in a fixed-capacity,
//! index-wrapped ring and derives the statistics the spike detector and
//! the flow calculators need. Memory use is bounded at construction.

use serde::{Deserialize, Serialize};

/// Verdict issued for one sample before it enters the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpikeVerdict {
    /// True when the sample is a statistically significant spike
    pub spike: bool,
    /// Window mean at assessment time (W)
    pub window_mean_w: f64,
    /// Window standard deviation at assessment time (W)
    pub window_stddev_w: f64,
}

impl SpikeVerdict {
    /// Verdict used while the window is still warming up.
    pub fn quiet() -> Self {
        Self {
            spike: false,
            window_mean_w: 0.0,
            window_stddev_w: 0.0,
        }
    }
}

/// Rolling-window analyzer for harvested input power.
#[derive(Debug, Clone)]
pub struct PowerQualityAnalyzer {
    window: Vec<f64>,
    capacity: usize,
    next: usize,
    filled: usize,
    sigma: f64,
    ratio: f64,
    min_samples: usize,
}

impl PowerQualityAnalyzer {
    /// Create an analyzer over a window of `capacity` samples. A sample
    /// is a spike when it exceeds `mean + sigma·stddev` and is at least
    /// `ratio` times the mean, once `min_samples` samples are present.
    pub fn new(capacity: usize, sigma: f64, ratio: f64, min_samples: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: vec![0.0; capacity],
            capacity,
            next: 0,
            filled: 0,
            sigma,
            ratio,
            min_samples: min_samples.max(2),
        }
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.filled
    }

    pub fn is_empty(&self) -> bool {
        self.filled == 0
    }

    /// Mean of the window (0 when empty).
    pub fn mean(&self) -> f64 {
        if self.filled == 0 {
            return 0.0;
        }
        self.window[..self.filled.min(self.capacity)]
            .iter()
            .sum::<f64>()
            / self.filled as f64
    }

    /// Population standard deviation of the window.
    pub fn std_dev(&self) -> f64 {
        if self.filled < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let variance = self.window[..self.filled.min(self.capacity)]
            .iter()
            .map(|v| {
                let d = v - mean;
                d * d
            })
            .sum::<f64>()
            / self.filled as f64;
        variance.sqrt()
    }

    /// Coefficient of variation: stddev / mean. 0 when the mean is 0.
    pub fn variation_coefficient(&self) -> f64 {
        let mean = self.mean();
        if mean.abs() < f64::EPSILON {
            return 0.0;
        }
        self.std_dev() / mean
    }

    /// Assess a sample against the current window, before recording it.
    pub fn assess(&self, sample_w: f64) -> SpikeVerdict {
        if self.filled < self.min_samples {
            return SpikeVerdict::quiet();
        }
        let mean = self.mean();
        let stddev = self.std_dev();
        let spike = sample_w > mean + self.sigma * stddev && sample_w >= self.ratio * mean;
        SpikeVerdict {
            spike,
            window_mean_w: mean,
            window_stddev_w: stddev,
        }
    }

    /// Push a sample into the ring, evicting the oldest once full.
    pub fn record(&mut self, sample_w: f64) {
        self.window[self.next] = sample_w;
        self.next = (self.next + 1) % self.capacity;
        if self.filled < self.capacity {
            self.filled += 1;
        }
    }

    /// Drop all samples.
    pub fn reset(&mut self) {
        self.next = 0;
        self.filled = 0;
    }
}
