//! PID regulation primitive
//!
//! Stateful proportional-integral-derivative regulator used to steer a
//! process variable toward a setpoint. The time delta is always passed
//! by the caller so the regulator stays free of wall-clock reads.

/// PID regulator with anti-windup and output clamping.
#[derive(Debug, Clone)]
pub struct PidRegulator {
    kp: f64,
    ki: f64,
    kd: f64,
    setpoint: f64,
    integral: f64,
    previous_error: f64,
    integral_min: f64,
    integral_max: f64,
    output_min: f64,
    output_max: f64,
}

impl PidRegulator {
    /// Regulator with wide default limits.
    pub fn new(kp: f64, ki: f64, kd: f64) -> Self {
        Self::with_limits(
            kp,
            ki,
            kd,
            -1000.0,
            1000.0,
            f64::NEG_INFINITY,
            f64::INFINITY,
        )
    }

    /// Regulator with explicit integral and output clamps.
    pub fn with_limits(
        kp: f64,
        ki: f64,
        kd: f64,
        integral_min: f64,
        integral_max: f64,
        output_min: f64,
        output_max: f64,
    ) -> Self {
        Self {
            kp,
            ki,
            kd,
            setpoint: 0.0,
            integral: 0.0,
            previous_error: 0.0,
            integral_min,
            integral_max,
            output_min,
            output_max,
        }
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.setpoint = setpoint;
    }

    pub fn setpoint(&self) -> f64 {
        self.setpoint
    }

    /// Clear accumulated state.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
    }

    /// Advance the regulator by `dt` seconds given the measured process
    /// value, returning the clamped control output.
    pub fn update(&mut self, process_value: f64, dt: f64) -> f64 {
        let error = self.setpoint - process_value;

        let p_term = self.kp * error;

        self.integral = (self.integral + error * dt).clamp(self.integral_min, self.integral_max);
        let i_term = self.ki * self.integral;

        let d_term = if dt > 0.0 {
            self.kd * (error - self.previous_error) / dt
        } else {
            0.0
        };

        self.previous_error = error;

        (p_term + i_term + d_term).clamp(self.output_min, self.output_max)
    }

    /// Accumulated integral term, for diagnostics.
    pub fn integral(&self) -> f64 {
        self.integral
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proportional_only() {
        let mut pid = PidRegulator::new(1.0, 0.0, 0.0);
        pid.set_setpoint(100.0);
        let out = pid.update(90.0, 0.1);
        assert!((out - 10.0).abs() < 1e-9);
    }

    #[test]
    fn integral_accumulates() {
        let mut pid = PidRegulator::new(0.0, 1.0, 0.0);
        pid.set_setpoint(100.0);
        let _ = pid.update(90.0, 1.0);
        let out = pid.update(90.0, 1.0);
        assert!((out - 20.0).abs() < 1e-9);
    }

    #[test]
    fn derivative_responds_to_error_change() {
        let mut pid = PidRegulator::new(0.0, 0.0, 1.0);
        pid.set_setpoint(100.0);
        let _ = pid.update(90.0, 1.0); // error 10
        let out = pid.update(95.0, 1.0); // error 5, d = -5
        assert!((out + 5.0).abs() < 1e-9);
    }

    #[test]
    fn output_is_clamped() {
        let mut pid = PidRegulator::with_limits(1.0, 0.0, 0.0, -100.0, 100.0, -50.0, 50.0);
        pid.set_setpoint(200.0);
        assert_eq!(pid.update(0.0, 1.0), 50.0);
    }

    #[test]
    fn integral_windup_is_bounded() {
        let mut pid = PidRegulator::with_limits(0.0, 1.0, 0.0, -10.0, 10.0, -1e6, 1e6);
        pid.set_setpoint(100.0);
        for _ in 0..100 {
            let _ = pid.update(0.0, 1.0);
        }
        assert!(pid.integral() <= 10.0);
    }

    #[test]
    fn reset_clears_state() {
        let mut pid = PidRegulator::new(1.0, 1.0, 1.0);
        pid.set_setpoint(10.0);
        let _ = pid.update(0.0, 1.0);
        pid.reset();
        assert_eq!(pid.integral(), 0.0);
    }

    #[test]
    fn zero_dt_skips_derivative() {
        let mut pid = PidRegulator::new(0.0, 0.0, 1.0);
        pid.set_setpoint(10.0);
        assert_eq!(pid.update(0.0, 0.0), 0.0);
    }
}
