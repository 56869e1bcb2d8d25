pub mod beacon;
pub mod files;
pub mod metadata;

pub use beacon::{read_beacons, BeaconRecord, BeaconWriter};
pub use files::{CaptureFiles, CapturePaths, CAPTURE_SUFFIXES, RESULTS_SUFFIX};
pub use metadata::CaptureMetadata;
