use crate::prelude::{LocalizerError, LocalizerResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Rotation direction as latched on the driver's DIR line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Positive degrees, DIR high.
    Forward,
    /// Negative degrees, DIR low.
    Reverse,
}

/// Output lines of a step/direction/enable stepper driver.
pub trait MotorDriver {
    fn set_direction(&mut self, direction: Direction) -> LocalizerResult<()>;
    fn set_enabled(&mut self, enabled: bool) -> LocalizerResult<()>;
    fn set_pulse(&mut self, high: bool) -> LocalizerResult<()>;
}

impl<D: MotorDriver + ?Sized> MotorDriver for Box<D> {
    fn set_direction(&mut self, direction: Direction) -> LocalizerResult<()> {
        (**self).set_direction(direction)
    }

    fn set_enabled(&mut self, enabled: bool) -> LocalizerResult<()> {
        (**self).set_enabled(enabled)
    }

    fn set_pulse(&mut self, high: bool) -> LocalizerResult<()> {
        (**self).set_pulse(high)
    }
}

/// BCM line numbers wired to the stepper driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioPins {
    pub pulse: u32,
    pub direction: u32,
    pub enable: u32,
}

impl Default for GpioPins {
    fn default() -> Self {
        Self {
            pulse: 21,
            direction: 20,
            enable: 16,
        }
    }
}

impl GpioPins {
    fn all(&self) -> [u32; 3] {
        [self.pulse, self.direction, self.enable]
    }
}

pub const SYSFS_GPIO_ROOT: &str = "/sys/class/gpio";

/// Stepper driver on Linux sysfs GPIO lines.
///
/// The lines are exported and configured as outputs on construction; on drop
/// the driver is disabled and every line is unexported again, so an aborted
/// session never leaves the motor energised.
pub struct SysfsMotorDriver {
    root: PathBuf,
    pins: GpioPins,
}

impl SysfsMotorDriver {
    pub fn new(pins: GpioPins) -> LocalizerResult<Self> {
        Self::with_root(SYSFS_GPIO_ROOT, pins)
    }

    pub fn with_root(root: impl AsRef<Path>, pins: GpioPins) -> LocalizerResult<Self> {
        let driver = Self {
            root: root.as_ref().to_path_buf(),
            pins,
        };

        for pin in pins.all() {
            if !driver.line_dir(pin).exists() {
                write_line(&driver.root.join("export"), &pin.to_string())?;
            }
        }
        // "low" configures an output whose initial level is low.
        write_line(&driver.line_dir(pins.pulse).join("direction"), "low")?;
        write_line(&driver.line_dir(pins.direction).join("direction"), "out")?;
        write_line(&driver.line_dir(pins.enable).join("direction"), "out")?;

        log::info!(
            "GPIO lines ready (pulse {}, direction {}, enable {})",
            pins.pulse,
            pins.direction,
            pins.enable
        );
        Ok(driver)
    }

    fn line_dir(&self, pin: u32) -> PathBuf {
        self.root.join(format!("gpio{}", pin))
    }

    fn write_value(&self, pin: u32, high: bool) -> LocalizerResult<()> {
        write_line(
            &self.line_dir(pin).join("value"),
            if high { "1" } else { "0" },
        )
    }
}

impl MotorDriver for SysfsMotorDriver {
    fn set_direction(&mut self, direction: Direction) -> LocalizerResult<()> {
        self.write_value(self.pins.direction, direction == Direction::Forward)
    }

    fn set_enabled(&mut self, enabled: bool) -> LocalizerResult<()> {
        self.write_value(self.pins.enable, enabled)
    }

    fn set_pulse(&mut self, high: bool) -> LocalizerResult<()> {
        self.write_value(self.pins.pulse, high)
    }
}

impl Drop for SysfsMotorDriver {
    fn drop(&mut self) {
        log::info!("Cleaning up GPIO");
        if let Err(err) = self.set_enabled(false) {
            log::warn!("could not disable stepper driver: {}", err);
        }
        for pin in self.pins.all() {
            if let Err(err) = write_line(&self.root.join("unexport"), &pin.to_string()) {
                log::debug!("could not unexport GPIO {}: {}", pin, err);
            }
        }
    }
}

fn write_line(path: &Path, value: &str) -> LocalizerResult<()> {
    fs::write(path, value)
        .map_err(|err| LocalizerError::Hardware(format!("{}: {}", path.display(), err)))
}
