use crate::prelude::{LocalizerError, LocalizerResult};
use crate::records::metadata::unix_writer;
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::{Path, PathBuf};

/// One correlated beacon, one row per `-results.csv`.
///
/// Field order is the on-disk column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeaconRecord {
    pub timestamp: f64,
    pub bssid: String,
    pub ssi: i32,
    pub channel: u32,
    pub bearing: f64,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub lat_err: f64,
    pub lon_error: f64,
    pub alt_error: f64,
}

pub const BEACON_COLUMNS: [&str; 11] = [
    "timestamp",
    "bssid",
    "ssi",
    "channel",
    "bearing",
    "lat",
    "lon",
    "alt",
    "lat_err",
    "lon_error",
    "alt_error",
];

/// Streams beacon records to a results file as they are produced.
pub struct BeaconWriter {
    path: PathBuf,
    writer: Writer<File>,
}

impl BeaconWriter {
    pub fn create(path: &Path) -> LocalizerResult<Self> {
        let file = File::create(path).map_err(|err| LocalizerError::io(path, err))?;
        // The header goes out even when no beacon follows.
        let mut writer = unix_writer().has_headers(false).from_writer(file);
        writer.write_record(BEACON_COLUMNS)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer,
        })
    }

    pub fn write(&mut self, record: &BeaconRecord) -> LocalizerResult<()> {
        self.writer.serialize(record)?;
        Ok(())
    }

    pub fn finish(mut self) -> LocalizerResult<PathBuf> {
        self.writer
            .flush()
            .map_err(|err| LocalizerError::io(&self.path, err))?;
        Ok(self.path)
    }
}

pub fn read_beacons(path: &Path) -> LocalizerResult<Vec<BeaconRecord>> {
    let file = File::open(path).map_err(|err| LocalizerError::io(path, err))?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();
    for row in reader.deserialize::<BeaconRecord>() {
        records.push(row?);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn results_file_has_expected_header_and_rows() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x-results.csv");
        let record = BeaconRecord {
            timestamp: 1_562_245_514.5,
            bssid: "aa:bb:cc:dd:ee:ff".into(),
            ssi: -61,
            channel: 2437,
            bearing: 45.0,
            lat: 40.7,
            lon: -73.9,
            alt: 12.0,
            lat_err: 3.0,
            lon_error: 2.0,
            alt_error: 7.0,
        };

        let mut writer = BeaconWriter::create(&path).unwrap();
        writer.write(&record).unwrap();
        let written = writer.finish().unwrap();
        assert_eq!(written, path);

        let contents = fs::read_to_string(&path).unwrap();
        assert!(contents.starts_with(
            "\"timestamp\",\"bssid\",\"ssi\",\"channel\",\"bearing\",\"lat\",\"lon\",\"alt\",\
             \"lat_err\",\"lon_error\",\"alt_error\"\n"
        ));
        assert_eq!(read_beacons(&path).unwrap(), vec![record]);
    }
}
