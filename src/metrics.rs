//! Energy-flow counters and performance statistics
//!
//! Counters accumulate monotonically across cycles and are cleared only
//! by an explicit reset.

use serde::{Deserialize, Serialize};

/// Accumulated energy movement (Wh).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnergyFlowMetrics {
    /// Energy harvested at the input (Wh)
    pub energy_in_wh: f64,
    /// Energy delivered to the load (Wh)
    pub energy_out_wh: f64,
    /// Conversion losses (Wh)
    pub energy_loss_wh: f64,
    /// Gross energy through the capacitor bank, charge + discharge (Wh)
    pub capacitor_throughput_wh: f64,
    /// Gross energy through the battery pack, charge + discharge (Wh)
    pub battery_throughput_wh: f64,
}

impl EnergyFlowMetrics {
    /// Delivered / harvested energy ratio. 0 until any energy has been
    /// harvested.
    pub fn round_trip_efficiency(&self) -> f64 {
        if self.energy_in_wh <= 0.0 {
            return 0.0;
        }
        (self.energy_out_wh / self.energy_in_wh).clamp(0.0, 1.0)
    }

    /// Fraction of harvested energy that was neither lost nor is still
    /// unaccounted: (out + retained-as-useful) heuristic the dashboards
    /// use, computed as 1 − loss/in.
    pub fn harvesting_efficiency(&self) -> f64 {
        if self.energy_in_wh <= 0.0 {
            return 0.0;
        }
        (1.0 - self.energy_loss_wh / self.energy_in_wh).clamp(0.0, 1.0)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Per-cycle performance statistics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    /// Successfully processed cycles
    pub cycles: u64,
    /// Mean harvested power over all cycles (W)
    pub average_input_power_w: f64,
    /// Largest single-cycle harvested power (W)
    pub peak_input_power_w: f64,
    /// Mean delivered power over all cycles (W)
    pub average_output_power_w: f64,
    /// Largest single-cycle delivered power (W)
    pub peak_output_power_w: f64,
}

impl PerformanceMetrics {
    /// Fold one cycle's powers into the running statistics.
    pub fn record_cycle(&mut self, input_power_w: f64, output_power_w: f64) {
        let n = self.cycles as f64;
        self.average_input_power_w = (self.average_input_power_w * n + input_power_w) / (n + 1.0);
        self.average_output_power_w =
            (self.average_output_power_w * n + output_power_w) / (n + 1.0);
        self.peak_input_power_w = self.peak_input_power_w.max(input_power_w);
        self.peak_output_power_w = self.peak_output_power_w.max(output_power_w);
        self.cycles += 1;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
