//! Advanced flow calculator
//!
//! Layers a short-horizon power predictor, a PID regulator holding the
//! capacitor reserve near its target, and the proportional load balancer
//! on top of the same mode semantics the simple calculator uses. The
//! pipeline per cycle:
//!
//! 1. base distribution (balancer, prediction-informed)
//! 2. spike mitigation (excess above the window mean to the capacitor)
//! 3. efficiency optimization (shift flows near SOC extremes)
//! 4. safety clamps

use crate::balancer::LoadBalancer;
use crate::config::EnergyStorageSystemConfig;
use crate::flow::{
    priority_for, standby_compensation_w, FlowContext, FlowStrategy, PowerFlowCommand,
};
use crate::pid::PidRegulator;
use crate::predictor::PowerPredictor;
use crate::types::OperatingMode;

/// Share of the capacitor's charge budget handed to the battery when the
/// bank is nearly full.
const FULL_BANK_SHIFT: f64 = 0.5;
/// Share of the battery's discharge load shifted to the capacitor when
/// the pack runs low.
const LOW_PACK_SHIFT: f64 = 0.3;

pub struct PowerManagementUnit {
    predictor: PowerPredictor,
    reserve_pid: PidRegulator,
    balancer: LoadBalancer,
}

impl PowerManagementUnit {
    pub fn new(config: &EnergyStorageSystemConfig) -> Self {
        let mut reserve_pid = PidRegulator::with_limits(
            400.0, 20.0, 0.0, // reserve error is a SOC fraction
            -10.0, 10.0, // integral clamp in SOC-seconds
            -config.capacitor.rated_power_w(),
            config.capacitor.rated_power_w(),
        );
        reserve_pid.set_setpoint(config.power.capacitor_soc_target);
        Self {
            predictor: PowerPredictor::new(config.power.prediction_window_s),
            reserve_pid,
            balancer: LoadBalancer::default(),
        }
    }

    /// Bias applied to the charge budget: positive when the bank sits
    /// below its reserve target and the near-term harvest looks weak.
    fn reserve_bias_w(&mut self, ctx: &FlowContext<'_>) -> f64 {
        let correction = self
            .reserve_pid
            .update(ctx.capacitor_soc, ctx.config.power.control_period_s);
        match self.predictor.predict(ctx.inputs.suspension_velocity_mps) {
            // an expected harvest covers part of the deficit
            Some(expected_w) => correction - expected_w * 0.1,
            None => correction,
        }
    }
}

impl FlowStrategy for PowerManagementUnit {
    fn calculate(&mut self, ctx: &FlowContext<'_>) -> PowerFlowCommand {
        let p = &ctx.config.power;
        let cap = &ctx.config.capacitor;
        let batt = &ctx.config.battery;
        let margin = p.soc_derate_margin;

        self.predictor.record(
            ctx.elapsed_s,
            ctx.inputs.input_power_w,
            ctx.inputs.suspension_velocity_mps,
        );

        let cap_charge_ceiling = cap.max_charge_power_w(ctx.capacitor_soc, margin);
        let batt_charge_ceiling =
            batt.max_charge_power_w(ctx.battery_soc, ctx.temperature_c, margin);
        let batt_discharge_ceiling =
            batt.max_discharge_power_w(ctx.battery_soc, ctx.temperature_c, margin);

        let mut command = PowerFlowCommand::idle(priority_for(ctx));

        match ctx.mode {
            OperatingMode::Charging => {
                let bias = self.reserve_bias_w(ctx);
                // a starved reserve steepens the capacitor's share
                let cap_ceiling = if bias > 0.0 {
                    cap_charge_ceiling
                } else {
                    (cap_charge_ceiling + bias).max(0.0)
                };
                let split = self.balancer.split_charge(
                    ctx.smoothed_power_w,
                    cap_ceiling,
                    batt_charge_ceiling,
                );
                command.capacitor_charge_w = split.capacitor_w;
                command.battery_charge_w = split.battery_w;

                if ctx.spike.spike {
                    // route the excess above the rolling mean into the bank
                    let excess =
                        (ctx.inputs.input_power_w - ctx.spike.window_mean_w).max(0.0);
                    log::debug!(
                        "spike mitigation: {:.0} W excess over {:.0} W mean to capacitor",
                        excess,
                        ctx.spike.window_mean_w
                    );
                    command.capacitor_charge_w =
                        (command.capacitor_charge_w + excess).min(cap_charge_ceiling);
                }
            }
            OperatingMode::Discharging => {
                let _ = self.reserve_bias_w(ctx);
                let cap_available = if ctx.capacitor_soc > p.capacitor_reserve_threshold {
                    cap.max_discharge_power_w(ctx.capacitor_soc, margin)
                } else {
                    0.0
                };
                let prefer_capacitor =
                    ctx.inputs.load_demand_w > p.capacitor_load_priority_w;
                let split = self.balancer.split_discharge(
                    ctx.inputs.load_demand_w,
                    cap_available,
                    batt_discharge_ceiling,
                    prefer_capacitor,
                );
                command.capacitor_discharge_w = split.capacitor_w;
                command.battery_discharge_w = split.battery_w;
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

        // efficiency pass: keep flows away from the SOC extremes
        if ctx.capacitor_soc > p.capacitor_charge_threshold && command.capacitor_charge_w > 0.0
        {
            let shifted = command.capacitor_charge_w * FULL_BANK_SHIFT;
            command.capacitor_charge_w -= shifted;
            command.battery_charge_w =
                (command.battery_charge_w + shifted).min(batt_charge_ceiling);
        }
        if ctx.battery_soc < p.battery_low_threshold
            && command.battery_discharge_w > 0.0
            && ctx.capacitor_soc > p.capacitor_discharge_floor
        {
            let shifted = command.battery_discharge_w * LOW_PACK_SHIFT;
            command.battery_discharge_w -= shifted;
            command.capacitor_discharge_w = (command.capacitor_discharge_w + shifted)
                .min(cap.max_discharge_power_w(ctx.capacitor_soc, margin));
        }

        command.clamp_to_ratings(ctx.config);
        command
    }

    fn reset(&mut self) {
        self.predictor.reset();
        self.reserve_pid.reset();
    }
}
