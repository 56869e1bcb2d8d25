//! Core acquisition and correlation engine for the WiFi direction finder.
//!
//! A capture session sweeps a directional antenna while beacon frames, GPS
//! fixes and channel hops are recorded in lockstep; the correlation pass later
//! maps every captured beacon back onto the bearing the antenna faced.

pub mod antenna;
pub mod capture;
pub mod gps;
pub mod math;
pub mod prelude;
pub mod process;
pub mod records;
pub mod sync;
pub mod telemetry;
pub mod wifi;

pub use prelude::{CaptureSession, LocalizerError, LocalizerResult};
