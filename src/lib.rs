//! # Hybrid Energy Storage Controller (hestor)
//!
//! A control library for hybrid suspension-energy storage units that pair a
//! supercapacitor bank with a battery pack. The controller runs a fixed-step
//! closed loop: it validates harvester inputs, smooths the power signal,
//! detects spikes, selects an operating mode, distributes power between the
//! two storage components, integrates state of charge, and enforces thermal
//! and electrical safety limits.
//!
//! ## Features
//!
//! - **Hybrid Distribution**: capacitor-priority routing for transients,
//!   battery for sustained demand
//! - **Spike Mitigation**: statistical spike detection over a rolling window
//!   with a raw-input bypass into the capacitor bank
//! - **Two Flow Calculators**: a simple mode-based calculator and an advanced
//!   power management unit with prediction, PID reserve regulation and load
//!   balancing
//! - **Safety Envelope**: over-temperature, over-voltage and over-current
//!   alarms with a latched protection mode and an operator-gated restart
//! - **Deterministic**: identical input sequences produce identical state
//!   trajectories, so the loop can be replayed and tested offline
//!
//! ## Quick Start
//!
//! ```
//! use hestor::{EnergyStorageController, EnergyStorageSystemConfig, SuspensionEnergyInputs};
//!
//! # fn main() -> Result<(), hestor::ControlError> {
//! let config = EnergyStorageSystemConfig::default();
//! let mut controller = EnergyStorageController::new(config)?;
//!
//! let inputs = SuspensionEnergyInputs {
//!     input_power_w: 500.0,
//!     input_voltage_v: 24.0,
//!     input_current_a: 20.8,
//!     suspension_velocity_mps: 0.8,
//!     vehicle_speed_kmh: 60.0,
//!     ambient_temp_c: 25.0,
//!     load_demand_w: 0.0,
//! };
//!
//! let outputs = controller.process_cycle(&inputs)?;
//! println!("{}", outputs.status.summary());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod balancer;
pub mod clock;
pub mod config;
pub mod controller;
pub mod error;
pub mod flow;
pub mod metrics;
pub mod pid;
pub mod power_management;
pub mod predictor;
pub mod types;

pub use analyzer::{PowerQualityAnalyzer, SpikeVerdict};
pub use balancer::{LoadBalancer, PowerSplit};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    BatteryPackConfig, CapacitorBankConfig, ConfigUpdate, EnergyStorageSystemConfig,
    FlowStrategyKind, InstallLocation, PowerManagementConfig, SafetyLimits,
};
pub use controller::EnergyStorageController;
pub use error::{ControlError, Result};
pub use flow::{FlowContext, FlowPriority, FlowStrategy, PowerFlowCommand, SimpleFlowCalculator};
pub use metrics::{EnergyFlowMetrics, PerformanceMetrics};
pub use pid::PidRegulator;
pub use power_management::PowerManagementUnit;
pub use predictor::PowerPredictor;
pub use types::{
    AlarmCode, AlarmCondition, CycleOutputs, CycleRecord, FaultRecord, FaultSeverity,
    OperatingMode, PowerFlowDirection, StorageSystemStatus, SuspensionEnergyInputs, WarningCode,
    WarningCondition,
};
