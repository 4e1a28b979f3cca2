//! Configuration for the energy storage system
//!
//! All physical limits and tunable thresholds live here as named fields
//! with defaults matching the reference 48 V / 200 A capacitor bank and
//! 5 kWh / 48 V battery pack. Configuration is immutable after
//! construction; the controller replaces whole sections atomically via
//! [`ConfigUpdate`] between cycles.
//!
//! The derating and terminal-voltage helpers live on the component
//! configs so every flow calculator shares a single implementation.

use crate::error::{ControlError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Corner (or central) mounting position of a storage unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstallLocation {
    FrontLeft,
    FrontRight,
    RearLeft,
    RearRight,
    Central,
}

impl std::fmt::Display for InstallLocation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstallLocation::FrontLeft => write!(f, "front_left"),
            InstallLocation::FrontRight => write!(f, "front_right"),
            InstallLocation::RearLeft => write!(f, "rear_left"),
            InstallLocation::RearRight => write!(f, "rear_right"),
            InstallLocation::Central => write!(f, "central"),
        }
    }
}

impl std::str::FromStr for InstallLocation {
    type Err = ControlError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "front_left" => Ok(InstallLocation::FrontLeft),
            "front_right" => Ok(InstallLocation::FrontRight),
            "rear_left" => Ok(InstallLocation::RearLeft),
            "rear_right" => Ok(InstallLocation::RearRight),
            "central" => Ok(InstallLocation::Central),
            _ => Err(ControlError::Config(format!(
                "unknown install location: {}",
                s
            ))),
        }
    }
}

/// Which flow calculator drives power distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStrategyKind {
    /// The controller's built-in mode-based calculator.
    Simple,
    /// The power management unit with prediction, PID reserve regulation
    /// and balancing.
    Advanced,
}

/// Static description of the supercapacitor bank.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CapacitorBankConfig {
    /// Total bank capacitance (F)
    pub capacitance_f: f64,
    /// Terminal voltage at full charge (V)
    pub max_voltage_v: f64,
    /// Absolute current rating (A)
    pub max_current_a: f64,
    /// Charge conversion efficiency (0-1)
    pub charge_efficiency: f64,
    /// Discharge conversion efficiency (0-1)
    pub discharge_efficiency: f64,
    /// Self-discharge as fraction of SOC lost per second
    pub self_discharge_per_s: f64,
    /// Minimum operating temperature (°C)
    pub min_temp_c: f64,
    /// Maximum operating temperature (°C)
    pub max_temp_c: f64,
}

impl Default for CapacitorBankConfig {
    fn default() -> Self {
        Self {
            capacitance_f: 165.0, // 48 V module class
            max_voltage_v: 48.0,
            max_current_a: 200.0,
            charge_efficiency: 0.95,
            discharge_efficiency: 0.98,
            self_discharge_per_s: 2.0e-5,
            min_temp_c: -40.0,
            max_temp_c: 65.0,
        }
    }
}

impl CapacitorBankConfig {
    /// Smaller, faster bank for corners with aggressive damping.
    pub fn high_power_bank() -> Self {
        Self {
            capacitance_f: 83.0,
            max_current_a: 300.0,
            ..Default::default()
        }
    }

    /// Usable energy at full charge (Wh), from E = ½CV².
    pub fn energy_capacity_wh(&self) -> f64 {
        0.5 * self.capacitance_f * self.max_voltage_v * self.max_voltage_v / 3600.0
    }

    /// Stored energy at the given state of charge (Wh).
    pub fn energy_wh(&self, soc: f64) -> f64 {
        self.energy_capacity_wh() * soc.clamp(0.0, 1.0)
    }

    /// Terminal voltage at the given state of charge.
    ///
    /// SOC here is the energy fraction, so V = Vmax·√soc.
    pub fn terminal_voltage_v(&self, soc: f64) -> f64 {
        self.max_voltage_v * soc.clamp(0.0, 1.0).sqrt()
    }

    /// Absolute V×I power rating (W).
    pub fn rated_power_w(&self) -> f64 {
        self.max_voltage_v * self.max_current_a
    }

    /// Instantaneous charge-power ceiling at the given SOC, derated
    /// linearly to zero across `margin` of SOC below full.
    pub fn max_charge_power_w(&self, soc: f64, margin: f64) -> f64 {
        let headroom = ((1.0 - soc) / margin.max(f64::EPSILON)).clamp(0.0, 1.0);
        self.rated_power_w() * headroom
    }

    /// Instantaneous discharge-power ceiling at the given SOC, derated
    /// linearly to zero across `margin` of SOC above empty.
    pub fn max_discharge_power_w(&self, soc: f64, margin: f64) -> f64 {
        let depth = (soc / margin.max(f64::EPSILON)).clamp(0.0, 1.0);
        self.rated_power_w() * depth
    }
}

/// Static description of the battery pack.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatteryPackConfig {
    /// Nameplate capacity (Wh)
    pub capacity_wh: f64,
    /// Nominal pack voltage (V)
    pub nominal_voltage_v: f64,
    /// Continuous charge current limit (A)
    pub max_charge_current_a: f64,
    /// Continuous discharge current limit (A)
    pub max_discharge_current_a: f64,
    /// Charge conversion efficiency (0-1)
    pub charge_efficiency: f64,
    /// Discharge conversion efficiency (0-1)
    pub discharge_efficiency: f64,
    /// Lower bound of the SOC operating window (0-1)
    pub soc_min: f64,
    /// Upper bound of the SOC operating window (0-1)
    pub soc_max: f64,
    /// Minimum operating temperature (°C)
    pub min_temp_c: f64,
    /// Maximum operating temperature (°C)
    pub max_temp_c: f64,
    /// Center of the full-power temperature band (°C)
    pub derate_nominal_temp_c: f64,
    /// Half-width of the full-power band (°C); no derating inside it
    pub derate_band_c: f64,
    /// Power reduction per °C outside the band (fraction)
    pub derate_slope_per_c: f64,
    /// Floor of the temperature derate factor
    pub derate_floor: f64,
}

impl Default for BatteryPackConfig {
    fn default() -> Self {
        Self {
            capacity_wh: 5000.0,
            nominal_voltage_v: 48.0,
            max_charge_current_a: 50.0,
            max_discharge_current_a: 100.0,
            charge_efficiency: 0.92,
            discharge_efficiency: 0.95,
            soc_min: 0.1,
            soc_max: 0.95,
            min_temp_c: -20.0,
            max_temp_c: 55.0,
            derate_nominal_temp_c: 25.0,
            derate_band_c: 10.0,
            derate_slope_per_c: 0.01,
            derate_floor: 0.8,
        }
    }
}

impl BatteryPackConfig {
    /// Larger pack for central installations.
    pub fn long_range_pack() -> Self {
        Self {
            capacity_wh: 10_000.0,
            max_discharge_current_a: 150.0,
            ..Default::default()
        }
    }

    /// Stored energy at the given state of charge (Wh).
    pub fn energy_wh(&self, soc: f64) -> f64 {
        self.capacity_wh * soc.clamp(0.0, 1.0)
    }

    /// Usable energy between the SOC window bounds (Wh).
    pub fn usable_capacity_wh(&self) -> f64 {
        self.capacity_wh * (self.soc_max - self.soc_min).max(0.0)
    }

    /// Absolute V×I charge rating (W).
    pub fn rated_charge_power_w(&self) -> f64 {
        self.nominal_voltage_v * self.max_charge_current_a
    }

    /// Absolute V×I discharge rating (W).
    pub fn rated_discharge_power_w(&self) -> f64 {
        self.nominal_voltage_v * self.max_discharge_current_a
    }

    /// Temperature derate factor: 1.0 inside the nominal band, falling
    /// by `derate_slope_per_c` per °C outside it, floored at
    /// `derate_floor`.
    pub fn temperature_derate(&self, temp_c: f64) -> f64 {
        let deviation = (temp_c - self.derate_nominal_temp_c).abs();
        if deviation <= self.derate_band_c {
            return 1.0;
        }
        let factor = 1.0 - (deviation - self.derate_band_c) * self.derate_slope_per_c;
        factor.max(self.derate_floor)
    }

    /// Instantaneous charge-power ceiling at the given SOC and
    /// temperature, derated linearly across `margin` of SOC below the
    /// operating-window top.
    pub fn max_charge_power_w(&self, soc: f64, temp_c: f64, margin: f64) -> f64 {
        let headroom = ((self.soc_max - soc) / margin.max(f64::EPSILON)).clamp(0.0, 1.0);
        self.rated_charge_power_w() * headroom * self.temperature_derate(temp_c)
    }

    /// Instantaneous discharge-power ceiling at the given SOC and
    /// temperature, derated linearly across `margin` of SOC above the
    /// operating-window bottom.
    pub fn max_discharge_power_w(&self, soc: f64, temp_c: f64, margin: f64) -> f64 {
        let depth = ((soc - self.soc_min) / margin.max(f64::EPSILON)).clamp(0.0, 1.0);
        self.rated_discharge_power_w() * depth * self.temperature_derate(temp_c)
    }

    /// Clamp a SOC value into the configured operating window.
    pub fn clamp_soc(&self, soc: f64) -> f64 {
        soc.clamp(self.soc_min, self.soc_max)
    }
}

/// Tunable thresholds for mode selection and power distribution.
///
/// Every numeric threshold of the control algorithm is a named field
/// here; the defaults reproduce the reference behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerManagementConfig {
    /// Fixed control step (s)
    pub control_period_s: f64,
    /// EMA factor for input-power smoothing (0-1, higher = faster)
    pub smoothing_factor: f64,
    /// Smoothed power above which charging is considered (W)
    pub charge_power_threshold_w: f64,
    /// Load demand above which discharging is considered (W)
    pub discharge_demand_threshold_w: f64,
    /// Capacitor SOC above which charging stops targeting it
    pub capacitor_full_threshold: f64,
    /// Capacitor SOC below which it no longer serves load alone
    pub capacitor_reserve_threshold: f64,
    /// Capacitor SOC above which balancing to the battery starts
    pub capacitor_charge_threshold: f64,
    /// Battery SOC below which balancing may still charge it
    pub battery_charge_threshold: f64,
    /// Battery SOC considered low for discharge shifting
    pub battery_low_threshold: f64,
    /// Minimum capacitor SOC required to absorb shifted discharge
    pub capacitor_discharge_floor: f64,
    /// Load demand above which the capacitor serves first (W)
    pub capacitor_load_priority_w: f64,
    /// Load demand that raises command priority to high (W)
    pub high_demand_threshold_w: f64,
    /// Spike power that raises command priority to high (W)
    pub spike_priority_power_w: f64,
    /// Spike threshold in standard deviations above the window mean
    pub spike_sigma: f64,
    /// Minimum spike-to-mean ratio
    pub spike_ratio: f64,
    /// Analyzer rolling-window length (samples)
    pub sample_window: usize,
    /// Samples required before spike verdicts are issued
    pub min_spike_samples: usize,
    /// Predictor history horizon (s)
    pub prediction_window_s: f64,
    /// SOC margin over which power ceilings derate linearly
    pub soc_derate_margin: f64,
    /// Capacitor→battery transfer rate in balancing mode (W)
    pub balancing_power_w: f64,
    /// Capacitor SOC setpoint for PID reserve regulation
    pub capacitor_soc_target: f64,
    /// Cycle-history depth kept by the controller (records)
    pub history_depth: usize,
}

impl Default for PowerManagementConfig {
    fn default() -> Self {
        Self {
            control_period_s: 0.1,
            smoothing_factor: 0.3,
            charge_power_threshold_w: 10.0,
            discharge_demand_threshold_w: 5.0,
            capacitor_full_threshold: 0.9,
            capacitor_reserve_threshold: 0.2,
            capacitor_charge_threshold: 0.8,
            battery_charge_threshold: 0.8,
            battery_low_threshold: 0.2,
            capacitor_discharge_floor: 0.3,
            capacitor_load_priority_w: 100.0,
            high_demand_threshold_w: 500.0,
            spike_priority_power_w: 1000.0,
            spike_sigma: 2.0,
            spike_ratio: 1.5,
            sample_window: 100,
            min_spike_samples: 10,
            prediction_window_s: 30.0,
            soc_derate_margin: 0.1,
            balancing_power_w: 200.0,
            capacitor_soc_target: 0.5,
            history_depth: 600,
        }
    }
}

/// Safety thresholds and thermal-model constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SafetyLimits {
    /// Temperature that forces protection mode (°C)
    pub max_operating_temp_c: f64,
    /// Temperature that raises an elevated-temperature warning (°C)
    pub temp_warning_c: f64,
    /// Output voltage alarm threshold (V)
    pub max_output_voltage_v: f64,
    /// Output current alarm threshold (A)
    pub max_output_current_a: f64,
    /// First-order thermal lag time constant (s)
    pub thermal_time_constant_s: f64,
    /// Steady-state temperature rise per watt of conversion loss (°C/W)
    pub loss_heating_c_per_w: f64,
    /// Combined SOC below which a low-storage warning is raised
    pub low_storage_warning_soc: f64,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            max_operating_temp_c: 60.0,
            temp_warning_c: 50.0,
            max_output_voltage_v: 60.0,
            max_output_current_a: 250.0,
            thermal_time_constant_s: 30.0,
            loss_heating_c_per_w: 0.02,
            low_storage_warning_soc: 0.15,
        }
    }
}

/// Construction-time configuration bundle for one storage unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnergyStorageSystemConfig {
    /// Unit identifier, free-form
    #[serde(default = "default_system_id")]
    pub system_id: String,
    /// Mounting position
    #[serde(default = "default_location")]
    pub location: InstallLocation,
    /// Active flow calculator
    #[serde(default = "default_strategy")]
    pub flow_strategy: FlowStrategyKind,
    /// Supercapacitor bank description
    #[serde(default)]
    pub capacitor: CapacitorBankConfig,
    /// Battery pack description
    #[serde(default)]
    pub battery: BatteryPackConfig,
    /// Mode-selection and distribution thresholds
    #[serde(default)]
    pub power: PowerManagementConfig,
    /// Safety thresholds and thermal constants
    #[serde(default)]
    pub safety: SafetyLimits,
}

fn default_system_id() -> String {
    "ess-0".to_string()
}

fn default_location() -> InstallLocation {
    InstallLocation::Central
}

fn default_strategy() -> FlowStrategyKind {
    FlowStrategyKind::Simple
}

impl Default for EnergyStorageSystemConfig {
    fn default() -> Self {
        Self {
            system_id: default_system_id(),
            location: default_location(),
            flow_strategy: default_strategy(),
            capacitor: CapacitorBankConfig::default(),
            battery: BatteryPackConfig::default(),
            power: PowerManagementConfig::default(),
            safety: SafetyLimits::default(),
        }
    }
}

impl EnergyStorageSystemConfig {
    /// Load configuration from a TOML file.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ControlError::Config(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = toml::from_str(&contents)
            .map_err(|e| ControlError::Config(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| ControlError::Config(format!("failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)
            .map_err(|e| ControlError::Config(format!("failed to write {}: {}", path.display(), e)))?;
        Ok(())
    }

    /// Reject configurations with non-finite or physically meaningless
    /// limits before they reach the control loop.
    pub fn validate(&self) -> Result<()> {
        fn positive(name: &str, value: f64) -> Result<()> {
            if !value.is_finite() || value <= 0.0 {
                return Err(ControlError::Config(format!(
                    "{} must be positive and finite, got {}",
                    name, value
                )));
            }
            Ok(())
        }
        fn fraction(name: &str, value: f64) -> Result<()> {
            if !value.is_finite() || value <= 0.0 || value > 1.0 {
                return Err(ControlError::Config(format!(
                    "{} must be in (0, 1], got {}",
                    name, value
                )));
            }
            Ok(())
        }

        positive("capacitor.capacitance_f", self.capacitor.capacitance_f)?;
        positive("capacitor.max_voltage_v", self.capacitor.max_voltage_v)?;
        positive("capacitor.max_current_a", self.capacitor.max_current_a)?;
        fraction("capacitor.charge_efficiency", self.capacitor.charge_efficiency)?;
        fraction(
            "capacitor.discharge_efficiency",
            self.capacitor.discharge_efficiency,
        )?;

        positive("battery.capacity_wh", self.battery.capacity_wh)?;
        positive("battery.nominal_voltage_v", self.battery.nominal_voltage_v)?;
        positive(
            "battery.max_charge_current_a",
            self.battery.max_charge_current_a,
        )?;
        positive(
            "battery.max_discharge_current_a",
            self.battery.max_discharge_current_a,
        )?;
        fraction("battery.charge_efficiency", self.battery.charge_efficiency)?;
        fraction(
            "battery.discharge_efficiency",
            self.battery.discharge_efficiency,
        )?;
        if !(0.0..=1.0).contains(&self.battery.soc_min)
            || !(0.0..=1.0).contains(&self.battery.soc_max)
            || self.battery.soc_min >= self.battery.soc_max
        {
            return Err(ControlError::Config(format!(
                "battery SOC window [{}, {}] is not a valid sub-range of [0, 1]",
                self.battery.soc_min, self.battery.soc_max
            )));
        }

        positive("power.control_period_s", self.power.control_period_s)?;
        fraction("power.smoothing_factor", self.power.smoothing_factor)?;
        positive("power.soc_derate_margin", self.power.soc_derate_margin)?;
        if self.power.sample_window == 0 {
            return Err(ControlError::Config(
                "power.sample_window must be at least 1".to_string(),
            ));
        }
        positive("safety.thermal_time_constant_s", self.safety.thermal_time_constant_s)?;
        positive("safety.max_operating_temp_c", self.safety.max_operating_temp_c)?;

        Ok(())
    }
}

/// Partial reconfiguration applied atomically between cycles.
///
/// Each populated section replaces the corresponding section wholesale;
/// unset sections are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub capacitor: Option<CapacitorBankConfig>,
    pub battery: Option<BatteryPackConfig>,
    pub power: Option<PowerManagementConfig>,
    pub safety: Option<SafetyLimits>,
    pub flow_strategy: Option<FlowStrategyKind>,
}

impl ConfigUpdate {
    /// True when the update would change nothing.
    pub fn is_empty(&self) -> bool {
        self.capacitor.is_none()
            && self.battery.is_none()
            && self.power.is_none()
            && self.safety.is_none()
            && self.flow_strategy.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = EnergyStorageSystemConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.capacitor.max_voltage_v, 48.0);
        assert_eq!(config.capacitor.max_current_a, 200.0);
        assert_eq!(config.battery.capacity_wh, 5000.0);
        assert_eq!(config.battery.nominal_voltage_v, 48.0);
    }

    #[test]
    fn config_round_trips_through_toml() {
        let config = EnergyStorageSystemConfig::default();
        let text = toml::to_string(&config).unwrap();
        let parsed: EnergyStorageSystemConfig = toml::from_str(&text).unwrap();
        assert_eq!(config, parsed);
    }

    #[test]
    fn invalid_soc_window_is_rejected() {
        let mut config = EnergyStorageSystemConfig::default();
        config.battery.soc_min = 0.9;
        config.battery.soc_max = 0.2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn capacitor_terminal_voltage_follows_sqrt_soc() {
        let cap = CapacitorBankConfig::default();
        assert!((cap.terminal_voltage_v(1.0) - 48.0).abs() < 1e-9);
        assert!((cap.terminal_voltage_v(0.25) - 24.0).abs() < 1e-9);
        assert_eq!(cap.terminal_voltage_v(0.0), 0.0);
    }

    #[test]
    fn capacitor_charge_ceiling_derates_near_full() {
        let cap = CapacitorBankConfig::default();
        let rated = cap.rated_power_w();
        assert!((cap.max_charge_power_w(0.5, 0.1) - rated).abs() < 1e-9);
        assert!((cap.max_charge_power_w(0.95, 0.1) - rated * 0.5).abs() < 1e-9);
        assert_eq!(cap.max_charge_power_w(1.0, 0.1), 0.0);
    }

    #[test]
    fn battery_temperature_derate_band() {
        let batt = BatteryPackConfig::default();
        assert_eq!(batt.temperature_derate(25.0), 1.0);
        assert_eq!(batt.temperature_derate(34.9), 1.0);
        // 20 °C outside the band: 1.0 - 0.01 * 10 = 0.9
        assert!((batt.temperature_derate(45.0) - 0.9).abs() < 1e-9);
        // far outside: floored at 0.8
        assert!((batt.temperature_derate(70.0) - 0.8).abs() < 1e-9);
        assert!((batt.temperature_derate(-20.0) - 0.8).abs() < 1e-9);
    }

    #[test]
    fn battery_discharge_ceiling_hits_zero_at_soc_min() {
        let batt = BatteryPackConfig::default();
        assert_eq!(batt.max_discharge_power_w(batt.soc_min, 25.0, 0.1), 0.0);
        assert!(batt.max_discharge_power_w(0.5, 25.0, 0.1) > 0.0);
    }

    #[test]
    fn install_location_parses() {
        assert_eq!(
            "front_left".parse::<InstallLocation>().unwrap(),
            InstallLocation::FrontLeft
        );
        assert!("top_left".parse::<InstallLocation>().is_err());
    }

    #[test]
    fn empty_update_is_detected() {
        assert!(ConfigUpdate::default().is_empty());
        let update = ConfigUpdate {
            safety: Some(SafetyLimits::default()),
            ..Default::default()
        };
        assert!(!update.is_empty());
    }
}
