use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

pub const PCAP_SUFFIX: &str = ".pcapng";
pub const NMEA_SUFFIX: &str = ".nmea";
pub const META_SUFFIX: &str = "-test.csv";
pub const COORDS_SUFFIX: &str = "-gps.csv";
pub const RESULTS_SUFFIX: &str = "-results.csv";

/// Suffixes that must all be present for a directory to hold a capture.
pub const CAPTURE_SUFFIXES: [&str; 4] = [NMEA_SUFFIX, PCAP_SUFFIX, META_SUFFIX, COORDS_SUFFIX];

const STAMP_FORMAT: &str = "%Y%m%d-%H-%M-%S";

pub fn timestamp_stem(at: &DateTime<Local>) -> String {
    at.format(STAMP_FORMAT).to_string()
}

/// File names of one capture set, all sharing the session's time stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFiles {
    pub pcap: String,
    pub nmea: String,
    pub coords: String,
    pub meta: String,
}

impl CaptureFiles {
    pub fn stamped(at: &DateTime<Local>) -> Self {
        let stem = timestamp_stem(at);
        Self {
            pcap: format!("{}{}", stem, PCAP_SUFFIX),
            nmea: format!("{}{}", stem, NMEA_SUFFIX),
            coords: format!("{}{}", stem, COORDS_SUFFIX),
            meta: format!("{}{}", stem, META_SUFFIX),
        }
    }

    pub fn in_dir(&self, dir: &Path) -> CapturePaths {
        CapturePaths {
            pcap: dir.join(&self.pcap),
            nmea: dir.join(&self.nmea),
            coords: dir.join(&self.coords),
            meta: dir.join(&self.meta),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturePaths {
    pub pcap: PathBuf,
    pub nmea: PathBuf,
    pub coords: PathBuf,
    pub meta: PathBuf,
}

pub fn results_file_name(at: &DateTime<Local>) -> String {
    format!("{}{}", timestamp_stem(at), RESULTS_SUFFIX)
}
