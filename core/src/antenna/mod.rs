pub mod clock;
pub mod driver;
pub mod plan;
pub mod stepper;

pub use clock::{MonotonicClock, PulseClock};
pub use driver::{Direction, GpioPins, MotorDriver, SysfsMotorDriver};
pub use plan::{RotationPlan, StepperGeometry};
pub use stepper::{reset, StepperController, StepperReport};
