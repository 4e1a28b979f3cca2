//! Power-flow commands and the flow-calculator seam
//!
//! Both flow calculators (the built-in mode-based one here and the
//! power management unit in [`crate::power_management`]) implement
//! [`FlowStrategy`], so the controller carries exactly one copy of the
//! mode semantics and the calculators differ only in how they shape the
//! distribution.

use crate::analyzer::SpikeVerdict;
use crate::config::EnergyStorageSystemConfig;
use crate::types::{OperatingMode, PowerFlowDirection, SuspensionEnergyInputs};
use serde::{Deserialize, Serialize};

const POWER_EPSILON_W: f64 = 1e-6;

/// Urgency tag attached to a power-flow command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowPriority {
    Low,
    Medium,
    High,
    /// Reserved for protection mode
    Critical,
}

impl std::fmt::Display for FlowPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FlowPriority::Low => write!(f, "low"),
            FlowPriority::Medium => write!(f, "medium"),
            FlowPriority::High => write!(f, "high"),
            FlowPriority::Critical => write!(f, "critical"),
        }
    }
}

/// Target charge/discharge power for both storage components (W, ≥0).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PowerFlowCommand {
    pub capacitor_charge_w: f64,
    pub capacitor_discharge_w: f64,
    pub battery_charge_w: f64,
    pub battery_discharge_w: f64,
    pub priority: FlowPriority,
}

impl PowerFlowCommand {
    /// Command that moves no power.
    pub fn idle(priority: FlowPriority) -> Self {
        Self {
            capacitor_charge_w: 0.0,
            capacitor_discharge_w: 0.0,
            battery_charge_w: 0.0,
            battery_discharge_w: 0.0,
            priority,
        }
    }

    /// Clamp every target into [0, component V×I rating].
    pub fn clamp_to_ratings(&mut self, config: &EnergyStorageSystemConfig) {
        let cap_rated = config.capacitor.rated_power_w();
        self.capacitor_charge_w = self.capacitor_charge_w.clamp(0.0, cap_rated);
        self.capacitor_discharge_w = self.capacitor_discharge_w.clamp(0.0, cap_rated);
        self.battery_charge_w = self
            .battery_charge_w
            .clamp(0.0, config.battery.rated_charge_power_w());
        self.battery_discharge_w = self
            .battery_discharge_w
            .clamp(0.0, config.battery.rated_discharge_power_w());
    }

    /// Dominant direction of energy movement implied by the targets.
    pub fn direction(&self) -> PowerFlowDirection {
        let cap_c = self.capacitor_charge_w > POWER_EPSILON_W;
        let cap_d = self.capacitor_discharge_w > POWER_EPSILON_W;
        let batt_c = self.battery_charge_w > POWER_EPSILON_W;
        let batt_d = self.battery_discharge_w > POWER_EPSILON_W;

        match (cap_c, cap_d, batt_c, batt_d) {
            (false, true, true, false) => PowerFlowDirection::CapacitorToBattery,
            (true, false, true, false) => PowerFlowDirection::InputToStorage,
            (true, false, false, false) => PowerFlowDirection::InputToCapacitor,
            (false, false, true, false) => PowerFlowDirection::InputToBattery,
            (false, true, false, true) => PowerFlowDirection::StorageToLoad,
            (false, true, false, false) => PowerFlowDirection::CapacitorToLoad,
            (false, false, false, true) => PowerFlowDirection::BatteryToLoad,
            _ => PowerFlowDirection::Idle,
        }
    }
}

/// Per-cycle view handed to the active flow calculator.
///
/// SOC and temperature arrive by value: the controller is the only owner
/// of the authoritative state.
#[derive(Debug, Clone, Copy)]
pub struct FlowContext<'a> {
    pub inputs: &'a SuspensionEnergyInputs,
    pub config: &'a EnergyStorageSystemConfig,
    pub mode: OperatingMode,
    pub smoothed_power_w: f64,
    pub capacitor_soc: f64,
    pub battery_soc: f64,
    pub temperature_c: f64,
    pub spike: SpikeVerdict,
    /// Controller-local elapsed time (s), advancing one control period
    /// per cycle
    pub elapsed_s: f64,
}

/// A flow calculator: turns the cycle context into per-component power
/// targets.
pub trait FlowStrategy: Send {
    fn calculate(&mut self, ctx: &FlowContext<'_>) -> PowerFlowCommand;

    /// Drop any accumulated internal state (histories, integrators).
    fn reset(&mut self) {}
}

/// Priority shared by both calculators: critical in protection, high for
/// large spikes or heavy demand, low when nothing moves.
pub(crate) fn priority_for(ctx: &FlowContext<'_>) -> FlowPriority {
    let p = &ctx.config.power;
    if ctx.mode == OperatingMode::Protection {
        return FlowPriority::Critical;
    }
    if ctx.spike.spike && ctx.inputs.input_power_w > p.spike_priority_power_w {
        return FlowPriority::High;
    }
    if ctx.inputs.load_demand_w > p.high_demand_threshold_w {
        return FlowPriority::High;
    }
    match ctx.mode {
        OperatingMode::Standby | OperatingMode::Maintenance => FlowPriority::Low,
        _ => FlowPriority::Medium,
    }
}

/// Capacitor charge power that offsets self-discharge in standby,
/// limited to whatever trickle the harvester provides.
pub(crate) fn standby_compensation_w(ctx: &FlowContext<'_>) -> f64 {
    let cap = &ctx.config.capacitor;
    let leak_w = cap.energy_wh(ctx.capacitor_soc) * cap.self_discharge_per_s * 3600.0;
    (leak_w / cap.charge_efficiency).min(ctx.inputs.input_power_w.max(0.0))
}

/// The controller's built-in calculator: straight mode-based
/// distribution with capacitor priority and a raw-input spike bypass.
#[derive(Debug, Clone, Default)]
pub struct SimpleFlowCalculator;

impl FlowStrategy for SimpleFlowCalculator {
    fn calculate(&mut self, ctx: &FlowContext<'_>) -> PowerFlowCommand {
        let p = &ctx.config.power;
        let cap = &ctx.config.capacitor;
        let batt = &ctx.config.battery;
        let margin = p.soc_derate_margin;

        let cap_charge_ceiling = cap.max_charge_power_w(ctx.capacitor_soc, margin);
        let batt_charge_ceiling =
            batt.max_charge_power_w(ctx.battery_soc, ctx.temperature_c, margin);
        let batt_discharge_ceiling =
            batt.max_discharge_power_w(ctx.battery_soc, ctx.temperature_c, margin);

        let mut command = PowerFlowCommand::idle(priority_for(ctx));

        match ctx.mode {
            OperatingMode::Charging => {
                if ctx.spike.spike {
                    // spikes bypass smoothing: the raw sample goes to
                    // the bank, overflow (if any) to the battery
                    command.capacitor_charge_w =
                        ctx.inputs.input_power_w.min(cap_charge_ceiling);
                    command.battery_charge_w = (ctx.inputs.input_power_w
                        - command.capacitor_charge_w)
                        .min(batt_charge_ceiling);
                } else {
                    command.capacitor_charge_w = ctx.smoothed_power_w.min(cap_charge_ceiling);
                    command.battery_charge_w = (ctx.smoothed_power_w
                        - command.capacitor_charge_w)
                        .min(batt_charge_ceiling);
                }
            }
            OperatingMode::Discharging => {
                let demand = ctx.inputs.load_demand_w;
                let cap_available = if ctx.capacitor_soc > p.capacitor_reserve_threshold {
                    cap.max_discharge_power_w(ctx.capacitor_soc, margin)
                } else {
                    0.0
                };
                if demand > p.capacitor_load_priority_w {
                    command.capacitor_discharge_w = demand.min(cap_available);
                    command.battery_discharge_w =
                        (demand - command.capacitor_discharge_w).min(batt_discharge_ceiling);
                } else {
                    command.battery_discharge_w = demand.min(batt_discharge_ceiling);
                    command.capacitor_discharge_w =
                        (demand - command.battery_discharge_w).min(cap_available);
                }
            }
            OperatingMode::Balancing => {
                let cap_discharge_ceiling =
                    cap.max_discharge_power_w(ctx.capacitor_soc, margin);
                let transfer = p
                    .balancing_power_w
                    .min(cap_discharge_ceiling)
                    .min(batt_charge_ceiling);
                command.capacitor_discharge_w = transfer;
                command.battery_charge_w = transfer;
            }
            OperatingMode::Standby => {
                command.capacitor_charge_w =
                    standby_compensation_w(ctx).min(cap_charge_ceiling);
            }
            OperatingMode::Protection | OperatingMode::Maintenance => {}
        }

        command.clamp_to_ratings(ctx.config);
        command
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SuspensionEnergyInputs;

    fn context<'a>(
        inputs: &'a SuspensionEnergyInputs,
        config: &'a EnergyStorageSystemConfig,
        mode: OperatingMode,
        smoothed: f64,
        spike: SpikeVerdict,
    ) -> FlowContext<'a> {
        FlowContext {
            inputs,
            config,
            mode,
            smoothed_power_w: smoothed,
            capacitor_soc: 0.5,
            battery_soc: 0.5,
            temperature_c: 25.0,
            spike,
            elapsed_s: 0.0,
        }
    }

    #[test]
    fn charging_prioritizes_the_capacitor() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.input_power_w = 500.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Charging,
            500.0,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert!((command.capacitor_charge_w - 500.0).abs() < 1e-9);
        assert_eq!(command.battery_charge_w, 0.0);
        assert_eq!(command.direction(), PowerFlowDirection::InputToCapacitor);
    }

    #[test]
    fn spike_routes_raw_input_to_capacitor() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.input_power_w = 400.0;
        let spike = SpikeVerdict {
            spike: true,
            window_mean_w: 50.0,
            window_stddev_w: 1.0,
        };
        // smoothed power lags well below the raw sample
        let ctx = context(&inputs, &config, OperatingMode::Charging, 90.0, spike);
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert!((command.capacitor_charge_w - 400.0).abs() < 1e-9);
        assert_eq!(command.direction(), PowerFlowDirection::InputToCapacitor);
    }

    #[test]
    fn small_load_is_served_by_the_battery() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.load_demand_w = 50.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Discharging,
            0.0,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert!((command.battery_discharge_w - 50.0).abs() < 1e-9);
        assert_eq!(command.capacitor_discharge_w, 0.0);
        assert_eq!(command.direction(), PowerFlowDirection::BatteryToLoad);
    }

    #[test]
    fn heavy_load_is_served_capacitor_first() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.load_demand_w = 300.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Discharging,
            0.0,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert!((command.capacitor_discharge_w - 300.0).abs() < 1e-9);
        assert_eq!(command.battery_discharge_w, 0.0);
    }

    #[test]
    fn balancing_moves_power_capacitor_to_battery() {
        let config = EnergyStorageSystemConfig::default();
        let inputs = SuspensionEnergyInputs::idle(25.0);
        let mut ctx = context(
            &inputs,
            &config,
            OperatingMode::Balancing,
            0.0,
            SpikeVerdict::quiet(),
        );
        ctx.capacitor_soc = 0.85;
        ctx.battery_soc = 0.4;
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert!(command.capacitor_discharge_w > 0.0);
        assert!((command.capacitor_discharge_w - command.battery_charge_w).abs() < 1e-9);
        assert_eq!(command.direction(), PowerFlowDirection::CapacitorToBattery);
    }

    #[test]
    fn standby_compensates_self_discharge_from_trickle() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.input_power_w = 5.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Standby,
            1.5,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        // the trickle covers the leak; a dry harvester yields no command
        assert!(command.capacitor_charge_w > 0.0);
        assert!(command.capacitor_charge_w <= 5.0);
        assert_eq!(command.direction(), PowerFlowDirection::InputToCapacitor);

        let dry = SuspensionEnergyInputs::idle(25.0);
        let ctx = context(
            &dry,
            &config,
            OperatingMode::Standby,
            0.0,
            SpikeVerdict::quiet(),
        );
        assert_eq!(calc.calculate(&ctx).direction(), PowerFlowDirection::Idle);
    }

    #[test]
    fn protection_zeroes_everything_with_critical_priority() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.input_power_w = 2000.0;
        inputs.load_demand_w = 2000.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Protection,
            2000.0,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert_eq!(command.direction(), PowerFlowDirection::Idle);
        assert_eq!(command.priority, FlowPriority::Critical);
    }

    #[test]
    fn heavy_demand_raises_priority() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.load_demand_w = 800.0;
        let ctx = context(
            &inputs,
            &config,
            OperatingMode::Discharging,
            0.0,
            SpikeVerdict::quiet(),
        );
        let mut calc = SimpleFlowCalculator;
        assert_eq!(calc.calculate(&ctx).priority, FlowPriority::High);
    }

    #[test]
    fn depleted_capacitor_is_not_discharged() {
        let config = EnergyStorageSystemConfig::default();
        let mut inputs = SuspensionEnergyInputs::idle(25.0);
        inputs.load_demand_w = 300.0;
        let mut ctx = context(
            &inputs,
            &config,
            OperatingMode::Discharging,
            0.0,
            SpikeVerdict::quiet(),
        );
        ctx.capacitor_soc = 0.1;
        let mut calc = SimpleFlowCalculator;
        let command = calc.calculate(&ctx);
        assert_eq!(command.capacitor_discharge_w, 0.0);
        assert!(command.battery_discharge_w > 0.0);
    }
}
