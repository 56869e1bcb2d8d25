use crate::antenna::clock::{unix_time, MonotonicClock, PulseClock};
use crate::antenna::driver::MotorDriver;
use crate::antenna::plan::{RotationPlan, StepperGeometry};
use crate::prelude::{LocalizerError, LocalizerResult};
use crate::sync::SessionBarrier;
use crate::telemetry::log::LogManager;
use std::ops::{Deref, DerefMut};
use std::time::Duration;

/// Reset turns at a fixed five seconds per revolution.
pub const RESET_SECONDS_PER_REVOLUTION: f64 = 5.0;

/// Actual timing of a completed sweep, in UNIX seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepperReport {
    pub start: f64,
    pub stop: f64,
    pub expected_wait: f64,
    pub average_wait: f64,
}

/// Drives the antenna through a timed sweep with a precomputed pulse train.
pub struct StepperController<D: MotorDriver, C: PulseClock = MonotonicClock> {
    driver: D,
    clock: C,
    geometry: StepperGeometry,
    logger: LogManager,
}

impl<D: MotorDriver> StepperController<D> {
    pub fn new(driver: D) -> Self {
        Self::with_clock(driver, MonotonicClock::new())
    }
}

impl<D: MotorDriver, C: PulseClock> StepperController<D, C> {
    pub fn with_clock(driver: D, clock: C) -> Self {
        Self {
            driver,
            clock,
            geometry: StepperGeometry::default(),
            logger: LogManager::for_component("antenna"),
        }
    }

    pub fn geometry(mut self, geometry: StepperGeometry) -> Self {
        self.geometry = geometry;
        self
    }

    /// Rotates `degrees` over `duration`, starting the pulse train the
    /// instant the barrier's start gate opens.
    pub fn rotate(
        &mut self,
        degrees: f64,
        bearing: f64,
        duration: Duration,
        barrier: &SessionBarrier,
    ) -> LocalizerResult<StepperReport> {
        let plan = RotationPlan::new(degrees, duration, &self.geometry)?;

        self.driver.set_direction(plan.direction)?;
        let mut driver = EnabledDriver::engage(&mut self.driver)?;

        log::info!("Waiting for synchronization flag");
        barrier.wait_start()?;

        let loop_start = self.clock.now();
        let start = unix_time();

        if plan.is_noop() {
            log::warn!("Rotation of {} degrees needs no pulses", degrees);
            return Ok(StepperReport {
                start,
                stop: start,
                expected_wait: 0.0,
                average_wait: 0.0,
            });
        }

        let half_wait = plan.per_pulse_wait / 2;
        // Each deadline closes its own pulse period, so the last pulse ends
        // at `duration` and the measured sweep covers the whole window.
        for index in 0..plan.pulse_count {
            let deadline = loop_start + plan.pulse_offset(index + 1);

            driver.set_pulse(true)?;
            if let Some(falling) = deadline.checked_sub(half_wait) {
                self.clock.sleep_until(falling);
            }
            driver.set_pulse(false)?;
            self.clock.sleep_until(deadline);
        }
        drop(driver);

        let elapsed = self.clock.now().saturating_sub(loop_start);
        let report = StepperReport {
            start,
            stop: start + elapsed.as_secs_f64(),
            expected_wait: plan.per_pulse_wait.as_secs_f64(),
            average_wait: elapsed.as_secs_f64() / plan.pulse_count as f64,
        };

        self.logger.record(&format!(
            "Rotated antenna {} degrees from bearing {} for {:.2}s (expected {}s)",
            degrees,
            bearing,
            elapsed.as_secs_f64(),
            duration.as_secs_f64()
        ));
        Ok(report)
    }

    /// Turns `degrees` at the fixed reset rate without a session barrier.
    pub fn reset(&mut self, degrees: f64) -> LocalizerResult<f64> {
        if degrees == 0.0 {
            return Ok(0.0);
        }
        let seconds = RESET_SECONDS_PER_REVOLUTION * degrees.abs() / 360.0;
        let duration = Duration::try_from_secs_f64(seconds).map_err(|err| {
            LocalizerError::InvalidSession(format!("reset of {} degrees: {}", degrees, err))
        })?;
        log::info!("Resetting antenna {} degrees over {:.2}s", degrees, duration.as_secs_f64());
        self.rotate(degrees, 0.0, duration, &SessionBarrier::released())?;
        Ok(degrees)
    }
}

/// Homes the antenna by turning `degrees` at the reset rate.
pub fn reset<D: MotorDriver>(driver: D, degrees: f64) -> LocalizerResult<f64> {
    StepperController::new(driver).reset(degrees)
}

/// Keeps the driver enabled for its lifetime; disabled again on every exit path.
struct EnabledDriver<'a, D: MotorDriver> {
    driver: &'a mut D,
}

impl<'a, D: MotorDriver> EnabledDriver<'a, D> {
    fn engage(driver: &'a mut D) -> LocalizerResult<Self> {
        driver.set_enabled(true)?;
        Ok(Self { driver })
    }
}

impl<D: MotorDriver> Deref for EnabledDriver<'_, D> {
    type Target = D;

    fn deref(&self) -> &D {
        self.driver
    }
}

impl<D: MotorDriver> DerefMut for EnabledDriver<'_, D> {
    fn deref_mut(&mut self) -> &mut D {
        self.driver
    }
}

impl<D: MotorDriver> Drop for EnabledDriver<'_, D> {
    fn drop(&mut self) {
        if let Err(err) = self.driver.set_enabled(false) {
            log::error!("failed to disable stepper driver: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::antenna::clock::sim::SimClock;
    use crate::antenna::driver::fake::{Line, RecordingDriver};
    use crate::antenna::driver::Direction;

    fn controller(driver: &RecordingDriver) -> StepperController<RecordingDriver, SimClock> {
        StepperController::with_clock(driver.clone(), SimClock::default())
    }

    #[test]
    fn sleeps_add_up_to_the_duration() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        let duration = Duration::from_secs(10);
        let report = stepper
            .rotate(90.0, 0.0, duration, &SessionBarrier::released())
            .unwrap();

        let slept: Duration = stepper.clock.sleeps.iter().sum();
        let wait = Duration::from_secs_f64(report.expected_wait);
        assert!(slept <= duration);
        assert!(duration - slept <= wait + Duration::from_micros(1));
        assert_eq!(driver.rising_edges(), 3200);
        assert!((report.expected_wait - 0.003125).abs() < 1e-9);
        assert!((report.stop - report.start - slept.as_secs_f64()).abs() < 1e-6);
    }

    #[test]
    fn scheduler_latency_does_not_accumulate() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        stepper.clock.overshoot = Duration::from_millis(1);
        let duration = Duration::from_secs(2);
        let report = stepper
            .rotate(90.0, 0.0, duration, &SessionBarrier::released())
            .unwrap();

        let wait = Duration::from_secs_f64(report.expected_wait);
        let elapsed = Duration::from_secs_f64(report.stop - report.start);
        assert!(elapsed + wait >= duration - Duration::from_millis(1));
        assert!(elapsed <= duration + Duration::from_millis(2));
        // Late half-periods are skipped rather than slept.
        assert!(stepper.clock.sleeps.len() < 2 * 3200);
        assert_eq!(driver.rising_edges(), 3200);
    }

    #[test]
    fn direction_follows_sign_and_driver_is_released() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        stepper
            .rotate(-1.0, 0.0, Duration::from_secs(1), &SessionBarrier::released())
            .unwrap();

        let events = driver.events();
        assert_eq!(events[0], Line::Direction(Direction::Reverse));
        assert_eq!(events[1], Line::Enabled(true));
        assert_eq!(events.last(), Some(&Line::Enabled(false)));
        assert_eq!(driver.rising_edges(), 36);
    }

    #[test]
    fn zero_degrees_rotates_nothing() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        let report = stepper
            .rotate(0.0, 10.0, Duration::from_secs(10), &SessionBarrier::released())
            .unwrap();
        assert_eq!(driver.rising_edges(), 0);
        assert_eq!(report.start, report.stop);
        assert_eq!(report.average_wait, 0.0);
        assert_eq!(driver.events().last(), Some(&Line::Enabled(false)));
    }

    #[test]
    fn aborted_barrier_disables_driver() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        let barrier = SessionBarrier::new();
        barrier.abort();
        let result = stepper.rotate(90.0, 0.0, Duration::from_secs(10), &barrier);
        assert!(matches!(result, Err(LocalizerError::Cancelled)));
        assert_eq!(driver.rising_edges(), 0);
        assert_eq!(driver.events().last(), Some(&Line::Enabled(false)));
    }

    #[test]
    fn reset_runs_at_five_seconds_per_revolution() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        assert_eq!(stepper.reset(180.0).unwrap(), 180.0);
        let slept: Duration = stepper.clock.sleeps.iter().sum();
        assert!(slept <= Duration::from_secs_f64(2.5));
        assert!(slept >= Duration::from_secs_f64(2.49));
        assert_eq!(stepper.reset(0.0).unwrap(), 0.0);
    }

    #[test]
    fn unbounded_reset_is_refused_before_enabling() {
        let driver = RecordingDriver::default();
        let mut stepper = controller(&driver);
        for degrees in [f64::INFINITY, f64::NAN, 1e300] {
            assert!(matches!(
                stepper.reset(degrees),
                Err(LocalizerError::InvalidSession(_))
            ));
        }
        assert!(driver.events().is_empty());
    }
}
