use crate::gps::{FixMode, GpsAverages};
use crate::math::StatsHelper;
use crate::prelude::{LocalizerError, LocalizerResult};
use crate::records::metadata::unix_writer;
use csv::Writer;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Subset of a gpsd report relevant to position logging.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "class")]
pub enum GpsdReport {
    #[serde(rename = "TPV")]
    Tpv(Tpv),
    #[serde(rename = "POLL")]
    Poll {
        #[serde(default)]
        tpv: Vec<Tpv>,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Tpv {
    #[serde(default)]
    pub mode: u8,
    pub time: Option<String>,
    pub lat: Option<f64>,
    pub lon: Option<f64>,
    pub alt: Option<f64>,
    #[serde(rename = "altMSL")]
    pub alt_msl: Option<f64>,
    pub epx: Option<f64>,
    pub epy: Option<f64>,
    pub epv: Option<f64>,
}

impl Tpv {
    pub fn fix_mode(&self) -> FixMode {
        FixMode::from_gpsd(self.mode)
    }

    fn sample(&self) -> Option<GpsSample> {
        if self.fix_mode() != FixMode::ThreeD {
            return None;
        }
        Some(GpsSample {
            time: self.time.clone().unwrap_or_default(),
            lat: self.lat?,
            lon: self.lon?,
            alt: self.alt.or(self.alt_msl)?,
            lat_err: self.epy.unwrap_or(0.0),
            lon_err: self.epx.unwrap_or(0.0),
            alt_err: self.epv.unwrap_or(0.0),
        })
    }
}

/// One row of the `-gps.csv` coordinate export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpsSample {
    pub time: String,
    pub lat: f64,
    pub lon: f64,
    pub alt: f64,
    pub lat_err: f64,
    pub lon_err: f64,
    pub alt_err: f64,
}

pub fn parse_report(line: &str) -> Option<GpsdReport> {
    serde_json::from_str(line.trim()).ok()
}

/// Splits a gpsd stream into the raw NMEA log and the 3D fix export.
pub struct GpsRecorder {
    nmea: BufWriter<File>,
    coords: Writer<File>,
    samples: Vec<GpsSample>,
}

impl GpsRecorder {
    pub fn create(nmea: &Path, coords: &Path) -> LocalizerResult<Self> {
        let nmea_file = File::create(nmea).map_err(|err| LocalizerError::io(nmea, err))?;
        let coords_file = File::create(coords).map_err(|err| LocalizerError::io(coords, err))?;
        Ok(Self {
            nmea: BufWriter::new(nmea_file),
            coords: unix_writer().from_writer(coords_file),
            samples: Vec::new(),
        })
    }

    pub fn ingest(&mut self, line: &str) -> LocalizerResult<()> {
        let line = line.trim_end();
        if line.starts_with('$') || line.starts_with('!') {
            writeln!(self.nmea, "{}", line)
                .map_err(|err| LocalizerError::Gps(format!("writing NMEA log: {}", err)))?;
            return Ok(());
        }

        if let Some(GpsdReport::Tpv(tpv)) = parse_report(line) {
            if let Some(sample) = tpv.sample() {
                self.coords.serialize(&sample)?;
                self.samples.push(sample);
            }
        }
        Ok(())
    }

    pub fn sample_count(&self) -> usize {
        self.samples.len()
    }

    pub fn finish(mut self) -> LocalizerResult<GpsAverages> {
        self.nmea
            .flush()
            .map_err(|err| LocalizerError::Gps(format!("flushing NMEA log: {}", err)))?;
        self.coords
            .flush()
            .map_err(|err| LocalizerError::Gps(format!("flushing coordinates: {}", err)))?;

        if self.samples.is_empty() {
            return Err(LocalizerError::Gps(
                "no 3D fixes were recorded during the capture".into(),
            ));
        }

        let axis = |pick: fn(&GpsSample) -> f64| {
            StatsHelper::mean(&self.samples.iter().map(pick).collect::<Vec<_>>())
        };
        Ok(GpsAverages {
            lat: axis(|s| s.lat),
            lon: axis(|s| s.lon),
            alt: axis(|s| s.alt),
            lat_err: axis(|s| s.lat_err),
            lon_err: axis(|s| s.lon_err),
            alt_err: axis(|s| s.alt_err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const TPV_A: &str = r#"{"class":"TPV","mode":3,"time":"2019-07-04T13:05:10.000Z","lat":40.0,"lon":-74.0,"alt":10.0,"epx":2.0,"epy":4.0,"epv":6.0}"#;
    const TPV_B: &str = r#"{"class":"TPV","mode":3,"time":"2019-07-04T13:05:11.000Z","lat":42.0,"lon":-76.0,"altMSL":20.0,"epx":4.0,"epy":6.0,"epv":8.0}"#;
    const TPV_2D: &str = r#"{"class":"TPV","mode":2,"lat":1.0,"lon":1.0}"#;

    #[test]
    fn averages_three_d_fixes_only() {
        let dir = TempDir::new().unwrap();
        let nmea = dir.path().join("a.nmea");
        let coords = dir.path().join("a-gps.csv");
        let mut recorder = GpsRecorder::create(&nmea, &coords).unwrap();

        for line in [
            r#"{"class":"VERSION","release":"3.17"}"#,
            "$GPGGA,130510.00,4000.0000,N,07400.0000,W,1,08,0.9,10.0,M,,M,,*47",
            TPV_A,
            TPV_2D,
            TPV_B,
            "not json at all",
        ] {
            recorder.ingest(line).unwrap();
        }
        assert_eq!(recorder.sample_count(), 2);

        let averages = recorder.finish().unwrap();
        assert_eq!(averages.lat, 41.0);
        assert_eq!(averages.lon, -75.0);
        assert_eq!(averages.alt, 15.0);
        assert_eq!(averages.lat_err, 5.0);
        assert_eq!(averages.lon_err, 3.0);
        assert_eq!(averages.alt_err, 7.0);

        let log = fs::read_to_string(&nmea).unwrap();
        assert!(log.starts_with("$GPGGA"));
        assert_eq!(fs::read_to_string(&coords).unwrap().lines().count(), 3);
    }

    #[test]
    fn no_fixes_is_an_error() {
        let dir = TempDir::new().unwrap();
        let recorder =
            GpsRecorder::create(&dir.path().join("b.nmea"), &dir.path().join("b-gps.csv"))
                .unwrap();
        assert!(matches!(recorder.finish(), Err(LocalizerError::Gps(_))));
    }

    #[test]
    fn poll_reports_carry_current_mode() {
        let report =
            parse_report(r#"{"class":"POLL","active":1,"tpv":[{"class":"TPV","mode":3}]}"#);
        match report {
            Some(GpsdReport::Poll { tpv }) => assert_eq!(tpv[0].fix_mode(), FixMode::ThreeD),
            other => panic!("unexpected report {:?}", other),
        }
    }
}
