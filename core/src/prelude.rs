use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for one synchronized capture session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaptureSession {
    /// Test name, also used as the working directory.
    pub test: String,
    /// Sweep and capture duration in whole seconds.
    pub duration: u64,
    /// Signed rotation extent; the sign encodes the direction.
    pub degrees: f64,
    /// Bearing of the antenna at the start of the sweep.
    pub bearing: f64,
    pub iface: String,
    /// Seconds between channel hops.
    pub hop_int: f64,
}

impl CaptureSession {
    pub fn validate(&self) -> LocalizerResult<()> {
        if self.duration == 0 {
            return Err(LocalizerError::InvalidSession(
                "duration must be greater than zero".into(),
            ));
        }
        if self.iface.trim().is_empty() {
            return Err(LocalizerError::InvalidSession(
                "no capture interface given".into(),
            ));
        }
        if !self.degrees.is_finite() || !self.bearing.is_finite() {
            return Err(LocalizerError::InvalidSession(
                "degrees and bearing must be finite".into(),
            ));
        }
        if !(self.hop_int > 0.0 && self.hop_int.is_finite()) {
            return Err(LocalizerError::InvalidSession(
                "hop interval must be positive and finite".into(),
            ));
        }
        self.hop_interval().map(|_| ())
    }

    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration)
    }

    pub fn hop_interval(&self) -> LocalizerResult<Duration> {
        Duration::try_from_secs_f64(self.hop_int).map_err(|err| {
            LocalizerError::InvalidSession(format!("hop interval {}: {}", self.hop_int, err))
        })
    }
}

/// Common error type for the capture and correlation pipeline.
#[derive(thiserror::Error, Debug)]
pub enum LocalizerError {
    #[error("invalid session: {0}")]
    InvalidSession(String),
    #[error("i/o failure on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("hardware failure: {0}")]
    Hardware(String),
    #[error("required tool '{0}' is not installed")]
    MissingTool(String),
    #[error("interface {iface} did not enter monitor mode within {waited:?}")]
    MonitorModeTimeout { iface: String, waited: Duration },
    #[error("interface command failed: {0}")]
    Interface(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("gps failure: {0}")]
    Gps(String),
    #[error("frame source failure: {0}")]
    FrameSource(String),
    #[error("csv failure: {0}")]
    Csv(#[from] csv::Error),
    #[error("worker pool failure: {0}")]
    WorkerPool(String),
    #[error("{0} worker exited without publishing a result")]
    WorkerLost(&'static str),
    #[error("operation cancelled")]
    Cancelled,
}

impl LocalizerError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        LocalizerError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type LocalizerResult<T> = Result<T, LocalizerError>;
