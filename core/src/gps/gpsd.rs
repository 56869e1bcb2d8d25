use crate::gps::recorder::{parse_report, GpsdReport};
use crate::gps::{FixMode, GpsAverages, GpsRecorder, GpsService};
use crate::prelude::{LocalizerError, LocalizerResult};
use crate::sync::SessionBarrier;
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::net::TcpStream;
use std::path::Path;
use std::time::{Duration, Instant};

pub const DEFAULT_GPSD_ADDR: &str = "127.0.0.1:2947";

const POLL_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true};?POLL;\n";
const STREAM_COMMAND: &str = "?WATCH={\"enable\":true,\"json\":true,\"nmea\":true};\n";
const READ_TIMEOUT: Duration = Duration::from_secs(1);

/// GPS service backed by a local gpsd instance.
#[derive(Debug, Clone)]
pub struct GpsdClient {
    addr: String,
}

impl GpsdClient {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }

    fn connect(&self, command: &str) -> LocalizerResult<BufReader<TcpStream>> {
        let mut stream = TcpStream::connect(&self.addr)
            .map_err(|err| LocalizerError::Gps(format!("connecting to gpsd at {}: {}", self.addr, err)))?;
        stream
            .set_read_timeout(Some(READ_TIMEOUT))
            .and_then(|_| stream.write_all(command.as_bytes()))
            .map_err(|err| LocalizerError::Gps(format!("talking to gpsd: {}", err)))?;
        Ok(BufReader::new(stream))
    }
}

impl Default for GpsdClient {
    fn default() -> Self {
        Self::new(DEFAULT_GPSD_ADDR)
    }
}

impl GpsService for GpsdClient {
    fn fix_mode(&self) -> LocalizerResult<FixMode> {
        let mut reader = self.connect(POLL_COMMAND)?;
        let deadline = Instant::now() + Duration::from_secs(3);
        let mut line = String::new();

        // A timed-out read keeps its partial line for the next attempt.
        while Instant::now() < deadline {
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {
                    if let Some(GpsdReport::Poll { tpv }) = parse_report(&line) {
                        return Ok(tpv
                            .first()
                            .map(|report| report.fix_mode())
                            .unwrap_or(FixMode::NoFix));
                    }
                    line.clear();
                }
                Err(err) if is_timeout(&err) => continue,
                Err(err) => return Err(LocalizerError::Gps(format!("reading gpsd: {}", err))),
            }
        }
        Err(LocalizerError::Gps("gpsd did not answer the poll".into()))
    }

    fn record(
        &self,
        barrier: &SessionBarrier,
        duration: Duration,
        nmea: &Path,
        coords: &Path,
    ) -> LocalizerResult<GpsAverages> {
        let mut recorder = GpsRecorder::create(nmea, coords)?;

        barrier.wait_start()?;
        let mut reader = self.connect(STREAM_COMMAND)?;
        let deadline = Instant::now() + duration;
        let mut line = String::new();

        while Instant::now() < deadline {
            match reader.read_line(&mut line) {
                Ok(0) => {
                    log::warn!("gpsd closed the stream early");
                    break;
                }
                Ok(_) => {
                    recorder.ingest(&line)?;
                    line.clear();
                }
                Err(err) if is_timeout(&err) => continue,
                Err(err) => return Err(LocalizerError::Gps(format!("reading gpsd: {}", err))),
            }
        }

        log::info!("Recorded {} GPS fixes", recorder.sample_count());
        recorder.finish()
    }
}

fn is_timeout(err: &std::io::Error) -> bool {
    matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut)
}
