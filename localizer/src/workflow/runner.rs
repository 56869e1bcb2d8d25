use crate::workflow::config::StationConfig;
use anyhow::Context;
use localizercore::antenna::{self, SysfsMotorDriver};
use localizercore::capture::{
    CaptureOrchestrator, CaptureTool, Collaborators, OrchestratorSettings, SessionOutcome,
};
use localizercore::gps::GpsdClient;
use localizercore::prelude::CaptureSession;
use localizercore::process::{DirectoryProcessor, FrameSource, ProcessSummary, TsharkFrameSource};
use localizercore::sync::CancelToken;
use localizercore::wifi::IwInterfaceManager;
use std::path::PathBuf;
use std::sync::Arc;

/// Wires the station's real hardware and services into the core.
#[derive(Clone)]
pub struct Runner {
    station: StationConfig,
    root: PathBuf,
}

impl Runner {
    pub fn new(station: StationConfig, root: impl Into<PathBuf>) -> Self {
        Self {
            station,
            root: root.into(),
        }
    }

    pub fn capture(
        &self,
        session: CaptureSession,
        cancel: &CancelToken,
    ) -> anyhow::Result<SessionOutcome> {
        let capture_tool = CaptureTool::locate(&self.station.capture_tool)
            .context("checking for the packet capture tool")?;
        let motor = SysfsMotorDriver::new(self.station.pins)
            .context("claiming the stepper driver GPIO lines")?;

        let collaborators = Collaborators {
            gps: Arc::new(GpsdClient::new(self.station.gpsd.clone())),
            wifi: Arc::new(IwInterfaceManager::new()),
            motor: Box::new(motor),
            capture_tool,
        };
        let settings = OrchestratorSettings {
            root: self.root.clone(),
            monitor_deadline: self.station.monitor_deadline,
            ..Default::default()
        };

        let test = session.test.clone();
        CaptureOrchestrator::new(session, collaborators)
            .settings(settings)
            .run(cancel)
            .with_context(|| format!("running capture session '{}'", test))
    }

    pub fn process(&self) -> anyhow::Result<ProcessSummary> {
        self.process_with(TsharkFrameSource::new())
    }

    fn process_with<S: FrameSource>(&self, source: S) -> anyhow::Result<ProcessSummary> {
        DirectoryProcessor::new(source)
            .workers(self.station.workers)
            .show_progress(true)
            .process(&self.root)
            .with_context(|| format!("processing captures under {}", self.root.display()))
    }

    pub fn reset(&self, degrees: f64) -> anyhow::Result<f64> {
        let motor = SysfsMotorDriver::new(self.station.pins)
            .context("claiming the stepper driver GPIO lines")?;
        antenna::reset(motor, degrees).context("resetting antenna")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn session() -> CaptureSession {
        CaptureSession {
            test: "roof".into(),
            duration: 5,
            degrees: 90.0,
            bearing: 0.0,
            iface: "wlan0".into(),
            hop_int: 0.2,
        }
    }

    #[test]
    fn missing_capture_tool_is_fatal_before_any_worker() {
        let dir = TempDir::new().unwrap();
        let station = StationConfig {
            capture_tool: "localizer-no-such-capture-tool".into(),
            ..Default::default()
        };
        let runner = Runner::new(station, dir.path());
        let err = runner.capture(session(), &CancelToken::new()).unwrap_err();
        assert!(format!("{:#}", err).contains("not installed"));
        assert!(!dir.path().join("roof").exists());
    }

    #[test]
    fn processing_an_empty_tree_finds_nothing() {
        let dir = TempDir::new().unwrap();
        let runner = Runner::new(StationConfig::default(), dir.path());
        let summary = runner.process_with(TsharkFrameSource::new()).unwrap();
        assert_eq!(summary, ProcessSummary::default());
    }
}
