use crate::prelude::{LocalizerError, LocalizerResult};
use crate::process::correlator::{BearingCorrelator, Correlation};
use crate::process::frames::FrameSource;
use crate::records::files::META_SUFFIX;
use crate::records::{CAPTURE_SUFFIXES, RESULTS_SUFFIX};
use indicatif::ProgressBar;
use rayon::prelude::*;
use rayon::ThreadPoolBuilder;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const DEFAULT_PROCESS_WORKERS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureDirectoryState {
    NotCapture,
    Unprocessed,
    Processed,
}

impl CaptureDirectoryState {
    /// Classifies a directory from the names of the files it holds.
    pub fn classify<S: AsRef<str>>(files: &[S]) -> Self {
        let has_suffix =
            |suffix: &str| files.iter().any(|file| file.as_ref().ends_with(suffix));

        if !CAPTURE_SUFFIXES.iter().all(|suffix| has_suffix(*suffix)) {
            CaptureDirectoryState::NotCapture
        } else if has_suffix(RESULTS_SUFFIX) {
            CaptureDirectoryState::Processed
        } else {
            CaptureDirectoryState::Unprocessed
        }
    }
}

/// A capture directory still waiting for correlation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingCapture {
    pub dir: PathBuf,
    pub meta_file: PathBuf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProcessSummary {
    pub datasets: usize,
    pub beacons: usize,
}

/// Finds unprocessed captures below a root and correlates them in parallel.
pub struct DirectoryProcessor<S: FrameSource> {
    correlator: BearingCorrelator<S>,
    workers: usize,
    show_progress: bool,
}

impl<S: FrameSource> DirectoryProcessor<S> {
    pub fn new(source: S) -> Self {
        Self {
            correlator: BearingCorrelator::new(source),
            workers: DEFAULT_PROCESS_WORKERS,
            show_progress: false,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn show_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn process(&self, root: &Path) -> LocalizerResult<ProcessSummary> {
        log::info!("Building list of directories to process");
        let pending = scan(root)?;
        log::info!("Found {} unprocessed data sets", pending.len());
        if pending.is_empty() {
            return Ok(ProcessSummary::default());
        }

        let pool = ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .thread_name(|index| format!("correlate-{}", index))
            .build()
            .map_err(|err| LocalizerError::WorkerPool(err.to_string()))?;

        let bar = if self.show_progress {
            ProgressBar::new(pending.len() as u64)
        } else {
            ProgressBar::hidden()
        };

        let beacons: usize = pool.install(|| {
            pending
                .par_iter()
                .map(|capture| {
                    let Correlation { beacons, .. } =
                        self.correlator.correlate(&capture.dir, &capture.meta_file);
                    bar.inc(1);
                    beacons
                })
                .sum()
        });
        bar.finish_and_clear();

        log::info!(
            "Processed {} packets in {} directories",
            beacons,
            pending.len()
        );
        Ok(ProcessSummary {
            datasets: pending.len(),
            beacons,
        })
    }
}

/// Every unprocessed capture directory below `root`, in walk order.
///
/// Only an unreadable `root` is an error; subdirectories that cannot be
/// listed are logged and skipped.
pub fn scan(root: &Path) -> LocalizerResult<Vec<PendingCapture>> {
    let mut pending = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) if err.depth() == 0 => {
                let path = err.path().unwrap_or(root).to_path_buf();
                return Err(LocalizerError::io(path, err.into()));
            }
            Err(err) => {
                log::warn!("Skipping unreadable path: {}", err);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let files = match file_names(entry.path()) {
            Ok(files) => files,
            Err(err) => {
                log::warn!("Skipping {}: {}", entry.path().display(), err);
                continue;
            }
        };
        if CaptureDirectoryState::classify(&files) != CaptureDirectoryState::Unprocessed {
            continue;
        }
        if let Some(meta) = files.iter().find(|file| file.ends_with(META_SUFFIX)) {
            pending.push(PendingCapture {
                dir: entry.path().to_path_buf(),
                meta_file: PathBuf::from(meta),
            });
        }
    }
    Ok(pending)
}

fn file_names(dir: &Path) -> LocalizerResult<Vec<String>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir).map_err(|err| LocalizerError::io(dir, err))? {
        let entry = entry.map_err(|err| LocalizerError::io(dir, err))?;
        let is_file = entry
            .file_type()
            .map(|kind| kind.is_file())
            .unwrap_or(false);
        if is_file {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}
