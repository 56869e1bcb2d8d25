use crate::gps::GpsAverages;
use crate::prelude::{LocalizerError, LocalizerResult};
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::path::Path;

/// Persisted description of one capture session, one row per `-test.csv`.
///
/// Field order is the on-disk column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureMetadata {
    pub name: String,
    pub path: String,
    pub iface: String,
    pub duration: u64,
    pub pos_lat: f64,
    pub pos_lon: f64,
    pub pos_alt: f64,
    pub pos_lat_err: f64,
    pub pos_lon_err: f64,
    pub pos_alt_err: f64,
    pub start: f64,
    pub end: f64,
    pub degrees: f64,
    pub bearing: f64,
    pub pcap: String,
    pub nmea: String,
    pub coords: String,
}

impl CaptureMetadata {
    pub fn position(&self) -> GpsAverages {
        GpsAverages {
            lat: self.pos_lat,
            lon: self.pos_lon,
            alt: self.pos_alt,
            lat_err: self.pos_lat_err,
            lon_err: self.pos_lon_err,
            alt_err: self.pos_alt_err,
        }
    }

    pub fn write(&self, path: &Path) -> LocalizerResult<()> {
        let file = File::create(path).map_err(|err| LocalizerError::io(path, err))?;
        let mut writer = unix_writer().from_writer(file);
        writer.serialize(self)?;
        writer.flush().map_err(|err| LocalizerError::io(path, err))?;
        Ok(())
    }

    pub fn read(path: &Path) -> LocalizerResult<Self> {
        let file = File::open(path).map_err(|err| LocalizerError::io(path, err))?;
        let mut reader = ReaderBuilder::new().from_reader(file);
        match reader.deserialize::<CaptureMetadata>().next() {
            Some(row) => Ok(row?),
            None => Err(LocalizerError::CaptureFailed(format!(
                "{} holds no metadata row",
                path.display()
            ))),
        }
    }

    /// Reduces the recorded capture file references to bare file names.
    pub fn relocate(&mut self) {
        for name in [&mut self.pcap, &mut self.nmea, &mut self.coords] {
            let file_name = Path::new(name.as_str())
                .file_name()
                .map(|file_name| file_name.to_string_lossy().into_owned());
            if let Some(file_name) = file_name {
                *name = file_name;
            }
        }
    }
}

/// "unix" dialect: every field quoted, `\n` terminated, header first.
pub(crate) fn unix_writer() -> WriterBuilder {
    let mut builder = WriterBuilder::new();
    builder
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'));
    builder
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn sample() -> CaptureMetadata {
        CaptureMetadata {
            name: "rooftop".into(),
            path: "rooftop".into(),
            iface: "wlan0".into(),
            duration: 10,
            pos_lat: 40.741895,
            pos_lon: -73.989308,
            pos_alt: 12.5,
            pos_lat_err: 3.2,
            pos_lon_err: 2.9,
            pos_alt_err: 7.1,
            start: 1_562_245_509.123_456_7,
            end: 1_562_245_519.130_987_2,
            degrees: -90.5,
            bearing: 12.25,
            pcap: "20190704-13-05-09.pcapng".into(),
            nmea: "20190704-13-05-09.nmea".into(),
            coords: "20190704-13-05-09-gps.csv".into(),
        }
    }

    #[test]
    fn round_trip_preserves_timing_exactly() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("20190704-13-05-09-test.csv");
        let meta = sample();
        meta.write(&path).unwrap();

        let loaded = CaptureMetadata::read(&path).unwrap();
        assert_eq!(loaded.start.to_bits(), meta.start.to_bits());
        assert_eq!(loaded.end.to_bits(), meta.end.to_bits());
        assert_eq!(loaded.degrees, meta.degrees);
        assert_eq!(loaded.bearing, meta.bearing);
        assert_eq!(loaded, meta);
    }

    #[test]
    fn header_matches_column_order() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("meta-test.csv");
        sample().write(&path).unwrap();
        let contents = fs::read_to_string(&path).unwrap();
        let header = contents.lines().next().unwrap();
        assert_eq!(
            header,
            "\"name\",\"path\",\"iface\",\"duration\",\"pos_lat\",\"pos_lon\",\"pos_alt\",\
             \"pos_lat_err\",\"pos_lon_err\",\"pos_alt_err\",\"start\",\"end\",\"degrees\",\
             \"bearing\",\"pcap\",\"nmea\",\"coords\""
        );
        assert!(!contents.contains('\r'));
    }

    #[test]
    fn relocate_strips_directories() {
        let mut meta = sample();
        meta.pcap = "/old/place/rooftop/a.pcapng".into();
        meta.coords = "rooftop/a-gps.csv".into();
        meta.relocate();
        assert_eq!(meta.pcap, "a.pcapng");
        assert_eq!(meta.coords, "a-gps.csv");
        assert_eq!(meta.nmea, "20190704-13-05-09.nmea");
    }

    #[test]
    fn empty_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty-test.csv");
        fs::write(&path, "").unwrap();
        assert!(CaptureMetadata::read(&path).is_err());
    }
}
