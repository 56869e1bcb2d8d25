//! Post-capture correlation of beacon frames with antenna bearing.

pub mod correlator;
pub mod directory;
pub mod frames;

pub use correlator::{bearing_at, BearingCorrelator, Correlation};
pub use directory::{
    scan, CaptureDirectoryState, DirectoryProcessor, PendingCapture, ProcessSummary,
    DEFAULT_PROCESS_WORKERS,
};
pub use frames::{BeaconFrame, FrameSource, TsharkFrameSource};
