use crate::antenna::driver::Direction;
use crate::prelude::{LocalizerError, LocalizerResult};
use std::time::Duration;

pub const STEPS_PER_REVOLUTION: u32 = 400;
pub const MICROSTEPS_PER_STEP: u32 = 32;

/// Mechanical resolution of the stepper and its driver.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperGeometry {
    pub steps_per_revolution: u32,
    pub microsteps_per_step: u32,
}

impl StepperGeometry {
    pub fn degrees_per_step(&self) -> f64 {
        360.0 / f64::from(self.steps_per_revolution)
    }

    pub fn degrees_per_microstep(&self) -> f64 {
        self.degrees_per_step() / f64::from(self.microsteps_per_step)
    }
}

impl Default for StepperGeometry {
    fn default() -> Self {
        Self {
            steps_per_revolution: STEPS_PER_REVOLUTION,
            microsteps_per_step: MICROSTEPS_PER_STEP,
        }
    }
}

/// Pulse train needed to sweep a signed angle over a fixed duration.
#[derive(Debug, Clone, PartialEq)]
pub struct RotationPlan {
    pub pulse_count: u64,
    pub per_pulse_wait: Duration,
    pub direction: Direction,
    duration: Duration,
}

impl RotationPlan {
    pub fn new(
        degrees: f64,
        duration: Duration,
        geometry: &StepperGeometry,
    ) -> LocalizerResult<Self> {
        if duration.is_zero() {
            return Err(LocalizerError::InvalidSession(
                "rotation duration must be greater than zero".into(),
            ));
        }
        if !degrees.is_finite() {
            return Err(LocalizerError::InvalidSession(format!(
                "cannot rotate {} degrees",
                degrees
            )));
        }

        let direction = if degrees < 0.0 {
            Direction::Reverse
        } else {
            Direction::Forward
        };
        let pulse_count = (degrees.abs() / geometry.degrees_per_microstep()).round() as u64;
        let per_pulse_wait = if pulse_count == 0 {
            Duration::ZERO
        } else {
            duration.div_f64(pulse_count as f64)
        };

        Ok(Self {
            pulse_count,
            per_pulse_wait,
            direction,
            duration,
        })
    }

    pub fn is_noop(&self) -> bool {
        self.pulse_count == 0
    }

    /// Offset of pulse `index` from the loop origin, derived from the total
    /// duration rather than accumulated per pulse.
    pub fn pulse_offset(&self, index: u64) -> Duration {
        if self.pulse_count == 0 {
            return Duration::ZERO;
        }
        self.duration
            .mul_f64(index as f64 / self.pulse_count as f64)
    }
}
