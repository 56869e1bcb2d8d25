use anyhow::Context;
use localizercore::antenna::GpioPins;
use localizercore::capture::DEFAULT_CAPTURE_TOOL;
use localizercore::gps::gpsd::DEFAULT_GPSD_ADDR;
use localizercore::prelude::CaptureSession;
use localizercore::process::DEFAULT_PROCESS_WORKERS;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// One capture session as written in a session YAML file.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    pub test: String,
    pub duration: u64,
    pub degrees: f64,
    #[serde(default)]
    pub bearing: f64,
    pub iface: String,
    #[serde(default = "default_hop_int")]
    pub hop_int: f64,
}

fn default_hop_int() -> f64 {
    0.2
}

impl SessionConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref)
            .with_context(|| format!("reading session config {}", path_ref.display()))?;
        let config: SessionConfig = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing session config {}", path_ref.display()))?;
        Ok(config)
    }

    pub fn from_args(
        test: String,
        duration: u64,
        degrees: f64,
        bearing: f64,
        iface: String,
        hop_int: f64,
    ) -> Self {
        Self {
            test,
            duration,
            degrees,
            bearing,
            iface,
            hop_int,
        }
    }

    pub fn to_session(&self) -> anyhow::Result<CaptureSession> {
        let session = CaptureSession {
            test: self.test.clone(),
            duration: self.duration,
            degrees: self.degrees,
            bearing: self.bearing,
            iface: self.iface.clone(),
            hop_int: self.hop_int,
        };
        session
            .validate()
            .with_context(|| format!("checking session '{}'", self.test))?;
        Ok(session)
    }
}

/// Hardware and service endpoints of the capture station.
#[derive(Clone, Debug, PartialEq)]
pub struct StationConfig {
    pub gpsd: String,
    pub capture_tool: String,
    pub pins: GpioPins,
    pub monitor_deadline: Duration,
    pub workers: usize,
}

impl Default for StationConfig {
    fn default() -> Self {
        Self {
            gpsd: DEFAULT_GPSD_ADDR.to_string(),
            capture_tool: DEFAULT_CAPTURE_TOOL.to_string(),
            pins: GpioPins::default(),
            monitor_deadline: Duration::from_secs(10),
            workers: DEFAULT_PROCESS_WORKERS,
        }
    }
}
