//! Capacity-weighted load balancing between storage components
//!
//! Splits a power budget between the capacitor bank and the battery pack
//! using their instantaneous power ceilings as weights. The ceilings
//! already encode SOC headroom and temperature derating, so the split
//! automatically steers power away from a nearly full or cold component.

use serde::{Deserialize, Serialize};

/// A charge or discharge allocation across both components (W).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PowerSplit {
    pub capacitor_w: f64,
    pub battery_w: f64,
}

impl PowerSplit {
    pub fn total(&self) -> f64 {
        self.capacitor_w + self.battery_w
    }
}

/// Weighted splitter for charge and discharge budgets.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    /// Multiplier on the capacitor's weight: the bank absorbs transients
    /// far faster than the battery, so it takes a larger share of the
    /// same ceiling.
    capacitor_bias: f64,
}

impl Default for LoadBalancer {
    fn default() -> Self {
        Self {
            capacitor_bias: 2.0,
        }
    }
}

impl LoadBalancer {
    pub fn new(capacitor_bias: f64) -> Self {
        Self {
            capacitor_bias: capacitor_bias.max(0.0),
        }
    }

    /// Split a charge budget proportionally to the weighted ceilings,
    /// re-allocating any clipped remainder to the other component.
    pub fn split_charge(
        &self,
        total_w: f64,
        capacitor_ceiling_w: f64,
        battery_ceiling_w: f64,
    ) -> PowerSplit {
        let total_w = total_w.max(0.0);
        let cap_ceiling = capacitor_ceiling_w.max(0.0);
        let batt_ceiling = battery_ceiling_w.max(0.0);

        let cap_weight = cap_ceiling * self.capacitor_bias;
        let weight_sum = cap_weight + batt_ceiling;
        if weight_sum <= 0.0 {
            return PowerSplit::default();
        }

        let mut capacitor_w = (total_w * cap_weight / weight_sum).min(cap_ceiling);
        let battery_w = (total_w - capacitor_w).min(batt_ceiling);
        // if the battery clipped, hand the remainder back to the capacitor
        capacitor_w = (total_w - battery_w).min(cap_ceiling);

        PowerSplit {
            capacitor_w,
            battery_w,
        }
    }

    /// Serve a discharge demand from the preferred component first and
    /// the other for the remainder.
    pub fn split_discharge(
        &self,
        demand_w: f64,
        capacitor_available_w: f64,
        battery_available_w: f64,
        prefer_capacitor: bool,
    ) -> PowerSplit {
        let demand_w = demand_w.max(0.0);
        let cap_avail = capacitor_available_w.max(0.0);
        let batt_avail = battery_available_w.max(0.0);

        if prefer_capacitor {
            let capacitor_w = demand_w.min(cap_avail);
            let battery_w = (demand_w - capacitor_w).min(batt_avail);
            PowerSplit {
                capacitor_w,
                battery_w,
            }
        } else {
            let battery_w = demand_w.min(batt_avail);
            let capacitor_w = (demand_w - battery_w).min(cap_avail);
            PowerSplit {
                capacitor_w,
                battery_w,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charge_split_respects_ceilings() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_charge(1000.0, 300.0, 400.0);
        assert!(split.capacitor_w <= 300.0 + 1e-9);
        assert!(split.battery_w <= 400.0 + 1e-9);
        assert!(split.total() <= 700.0 + 1e-9);
    }

    #[test]
    fn charge_split_favors_capacitor() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_charge(300.0, 1000.0, 1000.0);
        assert!(split.capacitor_w > split.battery_w);
        assert!((split.total() - 300.0).abs() < 1e-9);
    }

    #[test]
    fn charge_split_with_no_headroom_is_zero() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_charge(500.0, 0.0, 0.0);
        assert_eq!(split, PowerSplit::default());
    }

    #[test]
    fn discharge_prefers_capacitor_when_asked() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_discharge(400.0, 300.0, 1000.0, true);
        assert_eq!(split.capacitor_w, 300.0);
        assert_eq!(split.battery_w, 100.0);
    }

    #[test]
    fn discharge_prefers_battery_otherwise() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_discharge(50.0, 300.0, 1000.0, false);
        assert_eq!(split.battery_w, 50.0);
        assert_eq!(split.capacitor_w, 0.0);
    }

    #[test]
    fn discharge_cannot_exceed_availability() {
        let balancer = LoadBalancer::default();
        let split = balancer.split_discharge(2000.0, 300.0, 400.0, true);
        assert!((split.total() - 700.0).abs() < 1e-9);
    }
}
