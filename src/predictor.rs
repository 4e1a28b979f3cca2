//! One-step-ahead power prediction
//!
//! Harvested power tracks suspension velocity closely, so a short linear
//! regression of power against velocity gives a usable one-step
//! estimate. The estimate informs the base power distribution; it never
//! gates it.

use std::collections::VecDeque;

#[derive(Debug, Clone, Copy)]
struct Sample {
    t_s: f64,
    power_w: f64,
    velocity_mps: f64,
}

/// Sliding-window velocity→power estimator.
#[derive(Debug, Clone)]
pub struct PowerPredictor {
    samples: VecDeque<Sample>,
    window_s: f64,
}

impl PowerPredictor {
    /// Keep samples no older than `window_s` seconds.
    pub fn new(window_s: f64) -> Self {
        Self {
            samples: VecDeque::new(),
            window_s: window_s.max(f64::EPSILON),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Record a (power, velocity) observation at elapsed time `t_s`,
    /// pruning samples that fell out of the window.
    pub fn record(&mut self, t_s: f64, power_w: f64, velocity_mps: f64) {
        self.samples.push_back(Sample {
            t_s,
            power_w,
            velocity_mps,
        });
        let horizon = t_s - self.window_s;
        while self
            .samples
            .front()
            .is_some_and(|s| s.t_s < horizon)
        {
            self.samples.pop_front();
        }
    }

    /// Estimate power at the given velocity by least squares over the
    /// window. Falls back to the window mean when velocity variance is
    /// degenerate; `None` with fewer than two samples.
    pub fn predict(&self, velocity_mps: f64) -> Option<f64> {
        let n = self.samples.len();
        if n < 2 {
            return None;
        }
        let n_f = n as f64;
        let mean_v = self.samples.iter().map(|s| s.velocity_mps).sum::<f64>() / n_f;
        let mean_p = self.samples.iter().map(|s| s.power_w).sum::<f64>() / n_f;

        let mut cov = 0.0;
        let mut var_v = 0.0;
        for s in &self.samples {
            let dv = s.velocity_mps - mean_v;
            cov += dv * (s.power_w - mean_p);
            var_v += dv * dv;
        }

        if var_v < 1e-9 {
            return Some(mean_p.max(0.0));
        }
        let slope = cov / var_v;
        let intercept = mean_p - slope * mean_v;
        Some((intercept + slope * velocity_mps).max(0.0))
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_few_samples_yield_none() {
        let mut p = PowerPredictor::new(30.0);
        assert!(p.predict(1.0).is_none());
        p.record(0.0, 100.0, 0.5);
        assert!(p.predict(1.0).is_none());
    }

    #[test]
    fn recovers_linear_relation() {
        let mut p = PowerPredictor::new(30.0);
        // power = 200 * velocity + 50
        for i in 0..20 {
            let v = 0.1 * i as f64;
            p.record(i as f64 * 0.1, 200.0 * v + 50.0, v);
        }
        let estimate = p.predict(1.0).unwrap();
        assert!((estimate - 250.0).abs() < 1e-6);
    }

    #[test]
    fn degenerate_velocity_falls_back_to_mean() {
        let mut p = PowerPredictor::new(30.0);
        for i in 0..10 {
            p.record(i as f64 * 0.1, 80.0 + (i % 2) as f64 * 40.0, 0.5);
        }
        let estimate = p.predict(2.0).unwrap();
        assert!((estimate - 100.0).abs() < 1e-9);
    }

    #[test]
    fn old_samples_are_pruned() {
        let mut p = PowerPredictor::new(30.0);
        p.record(0.0, 1000.0, 1.0);
        for i in 0..5 {
            p.record(40.0 + i as f64, 100.0, 0.5);
        }
        assert_eq!(p.len(), 5);
    }

    #[test]
    fn prediction_never_negative() {
        let mut p = PowerPredictor::new(30.0);
        // steeply positive slope; extrapolating to negative velocity
        // would go below zero without the floor
        for i in 0..10 {
            let v = 0.2 * i as f64;
            p.record(i as f64 * 0.1, 500.0 * v, v);
        }
        assert_eq!(p.predict(-2.0).unwrap(), 0.0);
    }
}
