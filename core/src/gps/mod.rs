//! GPS service seam: fix quality polling before a session and position
//! averaging over the synchronized window.

pub mod gpsd;
pub mod recorder;

use crate::prelude::LocalizerResult;
use crate::sync::SessionBarrier;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub use gpsd::GpsdClient;
pub use recorder::GpsRecorder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FixMode {
    NoFix,
    TwoD,
    ThreeD,
}

impl FixMode {
    /// Maps the gpsd TPV `mode` value.
    pub fn from_gpsd(mode: u8) -> Self {
        match mode {
            3 => FixMode::ThreeD,
            2 => FixMode::TwoD,
            _ => FixMode::NoFix,
        }
    }
}

/// Position averaged over the capture window with per-axis error estimates.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GpsAverages {
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub lat_err: f64,
    pub lon_err: f64,
    pub alt_err: f64,
}

pub trait GpsService: Send + Sync {
    fn fix_mode(&self) -> LocalizerResult<FixMode>;

    /// Blocks on the start gate, then logs NMEA to `nmea` and fixes to
    /// `coords` for `duration`, returning the averaged position.
    fn record(
        &self,
        barrier: &SessionBarrier,
        duration: Duration,
        nmea: &Path,
        coords: &Path,
    ) -> LocalizerResult<GpsAverages>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpsd_modes_map_to_fix_quality() {
        assert_eq!(FixMode::from_gpsd(0), FixMode::NoFix);
        assert_eq!(FixMode::from_gpsd(1), FixMode::NoFix);
        assert_eq!(FixMode::from_gpsd(2), FixMode::TwoD);
        assert_eq!(FixMode::from_gpsd(3), FixMode::ThreeD);
        assert!(FixMode::ThreeD > FixMode::TwoD);
    }
}
