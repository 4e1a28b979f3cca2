//! Error types for the energy storage controller

use thiserror::Error;

/// Result type alias for controller operations
pub type Result<T> = std::result::Result<T, ControlError>;

/// Hard errors surfaced by the controller.
///
/// Only input validation and administrative preconditions are errors;
/// every abnormal runtime condition (over-temperature, over-current, low
/// state of charge) is reported as an alarm or warning entry in the
/// status snapshot so the control loop can keep running in a degraded
/// state.
#[derive(Error, Debug)]
pub enum ControlError {
    /// Cycle input outside its legal range. The offending cycle performs
    /// no state mutation; callers should treat it as "this cycle did not
    /// happen".
    #[error("invalid input {field}: {value} ({message})")]
    Validation {
        /// Name of the offending input field
        field: &'static str,
        /// The rejected value
        value: f64,
        /// Legal-range description
        message: &'static str,
    },

    /// Administrative operation invoked in a state that forbids it,
    /// e.g. `restart()` while alarms are still active.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Configuration rejected by validation or failed to load/save.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ControlError {
    pub(crate) fn validation(field: &'static str, value: f64, message: &'static str) -> Self {
        ControlError::Validation {
            field,
            value,
            message,
        }
    }
}
