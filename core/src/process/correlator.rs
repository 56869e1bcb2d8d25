use crate::math::StatsHelper;
use crate::prelude::LocalizerResult;
use crate::process::frames::FrameSource;
use crate::records::files::results_file_name;
use crate::records::{BeaconRecord, BeaconWriter, CaptureMetadata};
use crate::telemetry::{LogManager, MetricsRecorder};
use chrono::Local;
use std::fs;
use std::path::{Path, PathBuf};

/// Result of correlating one capture directory.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Correlation {
    pub beacons: usize,
    pub failures: usize,
    /// `None` when the run failed and its partial output was removed.
    pub output: Option<PathBuf>,
}

/// Tags every beacon of a capture with the antenna bearing at its arrival.
pub struct BearingCorrelator<S: FrameSource> {
    source: S,
    logger: LogManager,
}

impl<S: FrameSource> BearingCorrelator<S> {
    pub fn new(source: S) -> Self {
        Self {
            source,
            logger: LogManager::for_component("process"),
        }
    }

    /// Correlates the capture described by `meta_file` inside `dir`.
    ///
    /// Unrecoverable failures delete the partial results file and report
    /// zero beacons, leaving the directory eligible for another run.
    pub fn correlate(&self, dir: &Path, meta_file: &Path) -> Correlation {
        let results = dir.join(results_file_name(&Local::now()));
        match self.write_results(dir, meta_file, &results) {
            Ok(correlation) => correlation,
            Err(err) => {
                log::error!("Processing {} failed: {}", dir.display(), err);
                if results.exists() {
                    if let Err(err) = fs::remove_file(&results) {
                        log::warn!("could not remove {}: {}", results.display(), err);
                    }
                }
                Correlation::default()
            }
        }
    }

    fn write_results(
        &self,
        dir: &Path,
        meta_file: &Path,
        results: &Path,
    ) -> LocalizerResult<Correlation> {
        let mut meta = CaptureMetadata::read(&dir.join(meta_file))?;
        meta.relocate();
        log::info!("Processing capture (meta: {:?})", meta);

        let metrics = MetricsRecorder::new();
        let position = meta.position();
        let mut writer = BeaconWriter::create(results)?;

        for frame in self.source.beacon_frames(&dir.join(&meta.pcap))? {
            let Some(frame) = frame?.complete() else {
                metrics.record_error();
                continue;
            };
            writer.write(&BeaconRecord {
                timestamp: frame.timestamp,
                bssid: frame.bssid,
                ssi: frame.ssi,
                channel: frame.channel,
                bearing: bearing_at(&meta, frame.timestamp),
                lat: position.lat,
                lon: position.lon,
                alt: position.alt,
                lat_err: position.lat_err,
                lon_error: position.lon_err,
                alt_error: position.alt_err,
            })?;
            metrics.record_processed();
        }

        let output = writer.finish()?;
        let (beacons, failures) = metrics.snapshot();
        self.logger.record(&format!(
            "Completed processing {} beacons to {}",
            beacons,
            output.display()
        ));
        self.logger
            .record(&format!("Failed to process {} beacons", failures));
        Ok(Correlation {
            beacons,
            failures,
            output: Some(output),
        })
    }
}

/// Bearing of the antenna at `timestamp`, interpolated over the sweep.
///
/// Frames before the sweep map to its first bearing and frames after it to
/// its last; a zero-length sweep stays at the starting bearing.
pub fn bearing_at(meta: &CaptureMetadata, timestamp: f64) -> f64 {
    let progress = StatsHelper::progress(timestamp - meta.start, meta.end - meta.start);
    progress * meta.degrees + meta.bearing
}
