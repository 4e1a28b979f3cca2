//! Core data model: cycle inputs, status snapshots, alarms and faults

use crate::error::{ControlError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Per-cycle input produced by the harvester and vehicle collaborators.
///
/// Consumed once per control cycle; not retained beyond validation and
/// the rolling analysis windows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SuspensionEnergyInputs {
    /// Harvested power (W, ≥0)
    pub input_power_w: f64,
    /// Harvester output voltage (V, ≥0)
    pub input_voltage_v: f64,
    /// Harvester output current (A)
    pub input_current_a: f64,
    /// Suspension velocity (m/s, signed)
    pub suspension_velocity_mps: f64,
    /// Vehicle speed (km/h, ≥0)
    pub vehicle_speed_kmh: f64,
    /// Ambient temperature (°C)
    pub ambient_temp_c: f64,
    /// Power requested by vehicle energy management (W, ≥0)
    pub load_demand_w: f64,
}

impl SuspensionEnergyInputs {
    /// Zeroed inputs at the given ambient temperature. Useful for idle
    /// cycles and tests.
    pub fn idle(ambient_temp_c: f64) -> Self {
        Self {
            input_power_w: 0.0,
            input_voltage_v: 0.0,
            input_current_a: 0.0,
            suspension_velocity_mps: 0.0,
            vehicle_speed_kmh: 0.0,
            ambient_temp_c,
            load_demand_w: 0.0,
        }
    }

    /// Range-check every field the controller depends on. The first
    /// violation wins; nothing is mutated on failure.
    pub fn validate(&self) -> Result<()> {
        if !self.input_power_w.is_finite() || !(0.0..=5000.0).contains(&self.input_power_w) {
            return Err(ControlError::validation(
                "input_power_w",
                self.input_power_w,
                "must be in [0, 5000]",
            ));
        }
        if !self.input_voltage_v.is_finite() || !(0.0..=100.0).contains(&self.input_voltage_v) {
            return Err(ControlError::validation(
                "input_voltage_v",
                self.input_voltage_v,
                "must be in [0, 100]",
            ));
        }
        if !self.load_demand_w.is_finite() || !(0.0..=10_000.0).contains(&self.load_demand_w) {
            return Err(ControlError::validation(
                "load_demand_w",
                self.load_demand_w,
                "must be in [0, 10000]",
            ));
        }
        if !self.ambient_temp_c.is_finite() || !(-40.0..=80.0).contains(&self.ambient_temp_c) {
            return Err(ControlError::validation(
                "ambient_temp_c",
                self.ambient_temp_c,
                "must be in [-40, 80]",
            ));
        }
        if !self.input_current_a.is_finite() {
            return Err(ControlError::validation(
                "input_current_a",
                self.input_current_a,
                "must be finite",
            ));
        }
        if !self.suspension_velocity_mps.is_finite() {
            return Err(ControlError::validation(
                "suspension_velocity_mps",
                self.suspension_velocity_mps,
                "must be finite",
            ));
        }
        if !self.vehicle_speed_kmh.is_finite() || self.vehicle_speed_kmh < 0.0 {
            return Err(ControlError::validation(
                "vehicle_speed_kmh",
                self.vehicle_speed_kmh,
                "must be finite and ≥ 0",
            ));
        }
        Ok(())
    }
}

/// Discrete control state governing the power-flow computation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperatingMode {
    /// Harvested power is routed into storage
    Charging,
    /// Stored energy serves the load
    Discharging,
    /// Energy is moved capacitor → battery
    Balancing,
    /// Self-discharge compensation only
    Standby,
    /// All power transfer zeroed; exit only via restart
    Protection,
    /// Reserved administrative state, never entered automatically
    Maintenance,
}

impl std::fmt::Display for OperatingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperatingMode::Charging => write!(f, "charging"),
            OperatingMode::Discharging => write!(f, "discharging"),
            OperatingMode::Balancing => write!(f, "balancing"),
            OperatingMode::Standby => write!(f, "standby"),
            OperatingMode::Protection => write!(f, "protection"),
            OperatingMode::Maintenance => write!(f, "maintenance"),
        }
    }
}

/// Dominant direction of energy movement this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerFlowDirection {
    InputToCapacitor,
    InputToBattery,
    InputToStorage,
    CapacitorToLoad,
    BatteryToLoad,
    StorageToLoad,
    CapacitorToBattery,
    Idle,
}

impl std::fmt::Display for PowerFlowDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PowerFlowDirection::InputToCapacitor => write!(f, "input_to_capacitor"),
            PowerFlowDirection::InputToBattery => write!(f, "input_to_battery"),
            PowerFlowDirection::InputToStorage => write!(f, "input_to_storage"),
            PowerFlowDirection::CapacitorToLoad => write!(f, "capacitor_to_load"),
            PowerFlowDirection::BatteryToLoad => write!(f, "battery_to_load"),
            PowerFlowDirection::StorageToLoad => write!(f, "storage_to_load"),
            PowerFlowDirection::CapacitorToBattery => write!(f, "capacitor_to_battery"),
            PowerFlowDirection::Idle => write!(f, "idle"),
        }
    }
}

/// Critical conditions that force the unit non-operational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlarmCode {
    OverTemperature,
    OverVoltage,
    OverCurrent,
    EmergencyStop,
}

/// An active alarm. Its presence forces `operational = false` and mode
/// `protection` on the next cycle evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmCondition {
    pub code: AlarmCode,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

/// Non-fatal degraded conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningCode {
    CapacitorLow,
    BatteryLow,
    StorageLow,
    TemperatureElevated,
}

/// An active warning. Informational only; does not affect operational
/// status or mode selection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarningCondition {
    pub code: WarningCode,
    pub message: String,
}

/// Severity of a recorded fault event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultSeverity {
    Warning,
    Critical,
}

impl std::fmt::Display for FaultSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FaultSeverity::Warning => write!(f, "warning"),
            FaultSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Timestamped record of a fault event. Appended on emergency shutdown
/// or a detected critical condition; mutated only to mark resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaultRecord {
    pub code: AlarmCode,
    pub description: String,
    pub severity: FaultSeverity,
    pub occurred_at: DateTime<Utc>,
    pub resolved: bool,
}

impl FaultRecord {
    pub fn new(
        code: AlarmCode,
        description: impl Into<String>,
        severity: FaultSeverity,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            description: description.into(),
            severity,
            occurred_at,
            resolved: false,
        }
    }

    /// Mark the fault resolved. The only permitted mutation.
    pub fn resolve(&mut self) {
        self.resolved = true;
    }
}

/// Authoritative, externally observable system state. Recomputed every
/// cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageSystemStatus {
    pub operational: bool,
    pub capacitor_soc: f64,
    pub battery_soc: f64,
    pub temperature_c: f64,
    pub mode: OperatingMode,
    pub flow_direction: PowerFlowDirection,
    pub alarms: Vec<AlarmCondition>,
    pub warnings: Vec<WarningCondition>,
}

impl StorageSystemStatus {
    /// One-line human-readable summary.
    pub fn summary(&self) -> String {
        format!(
            "{} | cap {:.0}% batt {:.0}% | {:.1}°C | {} alarm(s), {} warning(s)",
            self.mode,
            self.capacitor_soc * 100.0,
            self.battery_soc * 100.0,
            self.temperature_c,
            self.alarms.len(),
            self.warnings.len()
        )
    }

    /// JSON rendering for monitoring collaborators.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| ControlError::Config(format!("failed to serialize status: {}", e)))
    }
}

/// Result of one successful control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleOutputs {
    /// Power delivered to the load (W)
    pub output_power_w: f64,
    /// Bus voltage presented to the load (V)
    pub output_voltage_v: f64,
    /// Current delivered to the load (A)
    pub output_current_a: f64,
    /// Instantaneous conversion efficiency (0-1)
    pub efficiency: f64,
    /// Energy held across both components (Wh)
    pub total_stored_energy_wh: f64,
    /// Discharge power the unit could deliver right now (W)
    pub available_discharge_w: f64,
    /// Full status snapshot after the cycle
    pub status: StorageSystemStatus,
}

/// One entry of the controller's bounded cycle history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub timestamp: DateTime<Utc>,
    pub mode: OperatingMode,
    pub input_power_w: f64,
    pub output_power_w: f64,
    pub capacitor_soc: f64,
    pub battery_soc: f64,
    pub temperature_c: f64,
}
