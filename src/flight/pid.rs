// src/flight/pid.rs

use crate::config::{ControllerVariant, PidGains};

/// Single-axis PID with a clamped output and a clamped integral.
#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    output_limit: f32,
    integral_limit: f32,
    integral: f32,
    previous_error: Option<f32>,
    output: f32,
}

impl Pid {
    pub fn new(gains: PidGains, output_limit: f32, integral_limit: f32) -> Self {
        Self {
            gains,
            output_limit: output_limit.abs(),
            integral_limit: integral_limit.abs(),
            integral: 0.0,
            previous_error: None,
            output: 0.0,
        }
    }

    /// Same axis but with the integral and derivative terms switched off.
    pub fn proportional(gains: PidGains, output_limit: f32) -> Self {
        Self::new(
            PidGains {
                kp: gains.kp,
                ki: 0.0,
                kd: 0.0,
            },
            output_limit,
            0.0,
        )
    }

    pub fn for_variant(
        variant: ControllerVariant,
        gains: PidGains,
        output_limit: f32,
        integral_limit: f32,
    ) -> Self {
        match variant {
            ControllerVariant::Pid => Self::new(gains, output_limit, integral_limit),
            ControllerVariant::Proportional => Self::proportional(gains, output_limit),
        }
    }

    /// Feed a new error. `dt` is seconds since the previous update; `None`
    /// on the first update after a reset, which skips the I and D terms.
    pub fn update(&mut self, error: f32, dt: Option<f32>) -> f32 {
        if !error.is_finite() {
            return self.output;
        }

        let mut derivative = 0.0;
        if let Some(dt) = dt.filter(|dt| *dt > 1e-4) {
            if self.gains.ki != 0.0 {
                self.integral += self.gains.ki * error * dt;
                self.integral = self.integral.clamp(-self.integral_limit, self.integral_limit);
            }
            if let Some(previous) = self.previous_error {
                derivative = (error - previous) / dt;
            }
        }

        self.previous_error = Some(error);
        let raw = self.gains.kp * error + self.integral + self.gains.kd * derivative;
        self.output = raw.clamp(-self.output_limit, self.output_limit);
        self.output
    }

    pub fn output(&self) -> f32 {
        self.output
    }

    pub fn gains(&self) -> PidGains {
        self.gains
    }

    /// Zero the output and forget accumulated state.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = None;
        self.output = 0.0;
    }
}
