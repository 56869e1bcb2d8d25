use crate::antenna::{MotorDriver, StepperController, StepperGeometry, StepperReport};
use crate::capture::tool::CaptureTool;
use crate::capture::worker::PacketCaptureWorker;
use crate::gps::{FixMode, GpsAverages, GpsService};
use crate::prelude::{CaptureSession, LocalizerError, LocalizerResult};
use crate::records::{CaptureFiles, CaptureMetadata};
use crate::sync::{CancelToken, SessionBarrier};
use crate::wifi::{ChannelHopper, InterfaceManager};
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

const CANCEL_POLL: Duration = Duration::from_millis(100);

/// External systems a capture session drives.
pub struct Collaborators {
    pub gps: Arc<dyn GpsService>,
    pub wifi: Arc<dyn InterfaceManager>,
    pub motor: Box<dyn MotorDriver + Send>,
    pub capture_tool: CaptureTool,
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    /// Directory the session's working directory is created under.
    pub root: PathBuf,
    pub monitor_deadline: Duration,
    pub fix_poll_interval: Duration,
    pub geometry: StepperGeometry,
    pub show_progress: bool,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            monitor_deadline: Duration::from_secs(10),
            fix_poll_interval: Duration::from_secs(1),
            geometry: StepperGeometry::default(),
            show_progress: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionOutcome {
    Completed {
        dir: PathBuf,
        metadata: CaptureMetadata,
    },
    Cancelled,
}

/// Runs one synchronized capture session end to end.
pub struct CaptureOrchestrator {
    session: CaptureSession,
    collaborators: Collaborators,
    settings: OrchestratorSettings,
}

impl CaptureOrchestrator {
    pub fn new(session: CaptureSession, collaborators: Collaborators) -> Self {
        Self {
            session,
            collaborators,
            settings: OrchestratorSettings::default(),
        }
    }

    pub fn settings(mut self, settings: OrchestratorSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn run(self, cancel: &CancelToken) -> LocalizerResult<SessionOutcome> {
        let Self {
            session,
            collaborators,
            settings,
        } = self;
        session.validate()?;

        let hop_interval = session.hop_interval()?;

        let dir = prepare_working_dir(&settings.root.join(&session.test))?;
        let files = CaptureFiles::stamped(&Local::now());
        let paths = files.in_dir(&dir);
        let barrier = Arc::new(SessionBarrier::new());

        log::info!("Setting up capture threads");

        let mut gps_worker = {
            let gps = collaborators.gps.clone();
            let duration = session.duration();
            let (nmea, coords) = (paths.nmea.clone(), paths.coords.clone());
            spawn_worker("gps", &barrier, move |barrier| {
                gps.record(barrier, duration, &nmea, &coords)
            })?
        };

        let antenna_worker = {
            let mut stepper =
                StepperController::new(collaborators.motor).geometry(settings.geometry);
            let (degrees, bearing, duration) =
                (session.degrees, session.bearing, session.duration());
            spawn_worker("antenna", &barrier, move |barrier| {
                stepper.rotate(degrees, bearing, duration, barrier)
            })
        };
        let mut antenna_worker = match antenna_worker {
            Ok(worker) => worker,
            Err(err) => return Err(abandon(&barrier, [gps_worker.handle], err)),
        };

        let capture_worker = {
            let worker = PacketCaptureWorker::new(
                collaborators.capture_tool,
                session.iface.clone(),
                session.duration,
                paths.pcap.clone(),
                cancel.clone(),
            )
            .monitor_deadline(settings.monitor_deadline);
            let wifi = collaborators.wifi.clone();
            spawn_worker("capture", &barrier, move |barrier| {
                worker.run(wifi.as_ref(), barrier)
            })
        };
        let mut capture_worker = match capture_worker {
            Ok(worker) => worker,
            Err(err) => {
                let started = [antenna_worker.handle, gps_worker.handle];
                return Err(abandon(&barrier, started, err));
            }
        };

        let hopper_worker = {
            let hopper = ChannelHopper::new(
                collaborators.wifi.clone(),
                session.iface.clone(),
                session.duration(),
                hop_interval,
            );
            spawn_worker("channel-hopper", &barrier, move |barrier| hopper.run(barrier))
        };
        let mut hopper_worker = match hopper_worker {
            Ok(worker) => worker,
            Err(err) => {
                let started = [
                    antenna_worker.handle,
                    gps_worker.handle,
                    capture_worker.handle,
                ];
                return Err(abandon(&barrier, started, err));
            }
        };

        if wait_for_fix(collaborators.gps.as_ref(), &settings, &barrier, cancel) {
            log::info!("Triggering synchronized threads");
            barrier.set_initialize();
            show_progress(session.duration + 1, &settings, &barrier);
        }

        let antenna = antenna_worker.collect();
        let position = gps_worker.collect();
        let capture = capture_worker.collect();
        let hops = hopper_worker.collect();

        let outcome = match (antenna, position, capture) {
            (Ok(antenna), Ok(position), Ok(capture)) => {
                log::info!(
                    "Captured {} packets ({} dropped)",
                    capture.captured,
                    capture.dropped
                );
                if let Ok(hops) = &hops {
                    log::debug!("Channel hopper made {} hops", hops);
                }
                log::info!("Writing test metadata to csv");
                let metadata = build_metadata(&session, &dir, &files, &antenna, &position);
                metadata.write(&paths.meta).map(|_| SessionOutcome::Completed {
                    dir: dir.clone(),
                    metadata,
                })
            }
            (antenna, position, capture) => settle_failure([
                antenna.err(),
                position.err(),
                capture.err(),
                hops.err(),
            ]),
        };

        for handle in [
            hopper_worker.handle,
            antenna_worker.handle,
            gps_worker.handle,
            capture_worker.handle,
        ] {
            join_worker(handle);
        }

        if matches!(outcome, Ok(SessionOutcome::Cancelled)) {
            log::warn!("Capture cancelled");
        }
        outcome
    }
}

/// Creates the session's working directory and confirms it is writable.
fn prepare_working_dir(dir: &Path) -> LocalizerResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|err| LocalizerError::io(dir, err))?;
    let check = dir.join(".localizer-write-check");
    fs::write(&check, b"").map_err(|err| LocalizerError::io(dir, err))?;
    if let Err(err) = fs::remove_file(&check) {
        log::debug!("could not remove {}: {}", check.display(), err);
    }
    Ok(dir.to_path_buf())
}

/// Polls the GPS service until it reports a 3D fix. Returns false when the
/// session should not proceed, in which case the barrier has been aborted.
fn wait_for_fix(
    gps: &dyn GpsService,
    settings: &OrchestratorSettings,
    barrier: &SessionBarrier,
    cancel: &CancelToken,
) -> bool {
    log::info!("Waiting for GPS 3D fix");
    let waiting_since = Instant::now();
    loop {
        if barrier.is_aborted() {
            return false;
        }
        if cancel.is_cancelled() {
            barrier.abort();
            return false;
        }

        match gps.fix_mode() {
            Ok(FixMode::ThreeD) => return true,
            Ok(mode) => log::info!(
                "Waiting for {}s for 3D gps fix (current mode = {:?}) - press Ctrl-C to cancel",
                waiting_since.elapsed().as_secs(),
                mode
            ),
            Err(err) => log::warn!("GPS fix poll failed: {}", err),
        }

        let pause_until = Instant::now() + settings.fix_poll_interval;
        while Instant::now() < pause_until && !cancel.is_cancelled() && !barrier.is_aborted() {
            thread::sleep(CANCEL_POLL.min(settings.fix_poll_interval));
        }
    }
}

fn show_progress(seconds: u64, settings: &OrchestratorSettings, barrier: &SessionBarrier) {
    let bar = if settings.show_progress {
        let bar = ProgressBar::new(seconds);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{msg:<35} [{bar:40.cyan/blue}] {pos}/{len}s")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    } else {
        ProgressBar::hidden()
    };
    bar.set_message(format!("Capturing packets for {}s", seconds.saturating_sub(1)));

    let started = Instant::now();
    let total = Duration::from_secs(seconds);
    while started.elapsed() < total && !barrier.is_aborted() {
        thread::sleep(CANCEL_POLL);
        bar.set_position(started.elapsed().as_secs().min(seconds));
    }
    bar.finish_and_clear();
}

fn build_metadata(
    session: &CaptureSession,
    dir: &Path,
    files: &CaptureFiles,
    antenna: &StepperReport,
    position: &GpsAverages,
) -> CaptureMetadata {
    CaptureMetadata {
        name: session.test.clone(),
        path: dir.to_string_lossy().into_owned(),
        iface: session.iface.clone(),
        duration: session.duration,
        pos_lat: position.lat,
        pos_lon: position.lon,
        pos_alt: position.alt,
        pos_lat_err: position.lat_err,
        pos_lon_err: position.lon_err,
        pos_alt_err: position.alt_err,
        start: antenna.start,
        end: antenna.stop,
        degrees: session.degrees,
        bearing: session.bearing,
        pcap: files.pcap.clone(),
        nmea: files.nmea.clone(),
        coords: files.coords.clone(),
    }
}

/// The first real failure wins; a session whose workers all report
/// cancellation ends as [`SessionOutcome::Cancelled`].
fn settle_failure<const N: usize>(
    errors: [Option<LocalizerError>; N],
) -> LocalizerResult<SessionOutcome> {
    let mut errors = errors.into_iter().flatten();
    match errors.find(|err| !matches!(err, LocalizerError::Cancelled)) {
        Some(err) => Err(err),
        None => Ok(SessionOutcome::Cancelled),
    }
}

struct Worker<T> {
    name: &'static str,
    handle: JoinHandle<()>,
    result: Option<oneshot::Receiver<LocalizerResult<T>>>,
}

impl<T> Worker<T> {
    /// Blocks until the worker publishes its result.
    fn collect(&mut self) -> LocalizerResult<T> {
        self.result
            .take()
            .and_then(|result| result.blocking_recv().ok())
            .unwrap_or(Err(LocalizerError::WorkerLost(self.name)))
    }
}

/// Starts `work` on its own named thread. A failing worker aborts the
/// barrier so its peers stop waiting.
fn spawn_worker<T, F>(
    name: &'static str,
    barrier: &Arc<SessionBarrier>,
    work: F,
) -> LocalizerResult<Worker<T>>
where
    T: Send + 'static,
    F: FnOnce(&SessionBarrier) -> LocalizerResult<T> + Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    let barrier = Arc::clone(barrier);
    let handle = thread::Builder::new()
        .name(name.to_string())
        .spawn(move || {
            let result = work(&barrier);
            match &result {
                Ok(_) => log::debug!("{} worker finished", name),
                Err(LocalizerError::Cancelled) => log::debug!("{} worker cancelled", name),
                Err(err) => log::error!("{} worker failed: {}", name, err),
            }
            if result.is_err() {
                barrier.abort();
            }
            if tx.send(result).is_err() {
                log::warn!("{} result was not collected", name);
            }
        })
        .map_err(|err| LocalizerError::io(format!("<{} thread>", name), err))?;

    Ok(Worker {
        name,
        handle,
        result: Some(rx),
    })
}

/// Stops the workers already started when a later one could not be, so none
/// of them is left blocked on the barrier.
fn abandon<const N: usize>(
    barrier: &SessionBarrier,
    started: [JoinHandle<()>; N],
    err: LocalizerError,
) -> LocalizerError {
    log::error!("Could not start every capture thread: {}", err);
    barrier.abort();
    for handle in started {
        join_worker(handle);
    }
    err
}

fn join_worker(handle: JoinHandle<()>) {
    let name = handle.thread().name().unwrap_or("worker").to_string();
    if handle.join().is_err() {
        log::error!("{} thread panicked", name);
    }
}
