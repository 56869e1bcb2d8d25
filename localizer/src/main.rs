use anyhow::Context;
use clap::Parser;
use localizercore::antenna::GpioPins;
use localizercore::capture::SessionOutcome;
use localizercore::sync::CancelToken;
use std::path::PathBuf;
use std::thread;
use std::time::Duration;
use tokio::runtime::Builder as TokioBuilder;
use tokio::signal;
use workflow::config::{SessionConfig, StationConfig};
use workflow::runner::Runner;

mod workflow;

#[derive(Parser)]
#[command(author, version, about = "WiFi direction finding with a rotating antenna")]
struct Args {
    /// Run a synchronized capture session
    #[arg(long, default_value_t = false)]
    capture: bool,
    /// Correlate every unprocessed capture below --root
    #[arg(long, default_value_t = false)]
    process: bool,
    /// Turn the antenna by this many degrees at the reset rate
    #[arg(long, allow_hyphen_values = true)]
    reset: Option<f64>,
    /// Load the capture session from YAML instead of flags
    #[arg(long)]
    session: Option<PathBuf>,
    #[arg(long, default_value = ".")]
    root: PathBuf,
    #[arg(long, default_value = "capture")]
    test: String,
    #[arg(long, default_value_t = 15)]
    duration: u64,
    #[arg(long, default_value_t = 360.0, allow_hyphen_values = true)]
    degrees: f64,
    #[arg(long, default_value_t = 0.0, allow_hyphen_values = true)]
    bearing: f64,
    #[arg(long, default_value = "wlan0")]
    iface: String,
    #[arg(long, default_value_t = 0.2)]
    hop_int: f64,
    #[arg(long, default_value = localizercore::gps::gpsd::DEFAULT_GPSD_ADDR)]
    gpsd: String,
    #[arg(long, default_value = localizercore::capture::DEFAULT_CAPTURE_TOOL)]
    capture_tool: String,
    #[arg(long, default_value_t = 21)]
    pulse_pin: u32,
    #[arg(long, default_value_t = 20)]
    dir_pin: u32,
    #[arg(long, default_value_t = 16)]
    enable_pin: u32,
    /// Seconds to wait for the interface to report monitor mode
    #[arg(long, default_value_t = 10)]
    monitor_deadline: u64,
    #[arg(long, default_value_t = localizercore::process::DEFAULT_PROCESS_WORKERS)]
    workers: usize,
}

impl Args {
    fn station(&self) -> StationConfig {
        StationConfig {
            gpsd: self.gpsd.clone(),
            capture_tool: self.capture_tool.clone(),
            pins: GpioPins {
                pulse: self.pulse_pin,
                direction: self.dir_pin,
                enable: self.enable_pin,
            },
            monitor_deadline: Duration::from_secs(self.monitor_deadline),
            workers: self.workers,
        }
    }

    fn session(&self) -> anyhow::Result<SessionConfig> {
        match &self.session {
            Some(path) => SessionConfig::load(path),
            None => Ok(SessionConfig::from_args(
                self.test.clone(),
                self.duration,
                self.degrees,
                self.bearing,
                self.iface.clone(),
                self.hop_int,
            )),
        }
    }
}

/// Cancels `token` on the first Ctrl-C.
fn watch_interrupt(token: CancelToken) -> anyhow::Result<()> {
    let runtime = TokioBuilder::new_current_thread()
        .enable_all()
        .build()
        .context("creating runtime for signal handling")?;
    thread::Builder::new()
        .name("ctrl-c".into())
        .spawn(move || {
            let received = runtime.block_on(signal::ctrl_c());
            match received {
                Ok(()) => {
                    log::warn!("Interrupt received, cancelling");
                    token.cancel();
                }
                Err(err) => log::error!("could not listen for Ctrl-C: {}", err),
            }
        })
        .context("spawning signal handler thread")?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    if !(args.capture || args.process || args.reset.is_some()) {
        log::warn!("Nothing to do: pass --capture, --process or --reset");
        return Ok(());
    }

    let runner = Runner::new(args.station(), args.root.clone());

    if let Some(degrees) = args.reset {
        let rotated = runner.reset(degrees)?;
        println!("Antenna reset by {} degrees", rotated);
    }

    if args.capture {
        let session = args.session()?.to_session()?;
        let cancel = CancelToken::new();
        watch_interrupt(cancel.clone())?;

        match runner.capture(session, &cancel) {
            Ok(SessionOutcome::Completed { dir, metadata }) => {
                println!("Capture written to {}", dir.display());
                println!(
                    "  {} -> {} ({}s, {} degrees from bearing {})",
                    metadata.start, metadata.end, metadata.duration, metadata.degrees, metadata.bearing
                );
                println!(
                    "  position {:.6}, {:.6} alt {:.1} (err {:.1}/{:.1}/{:.1})",
                    metadata.pos_lat,
                    metadata.pos_lon,
                    metadata.pos_alt,
                    metadata.pos_lat_err,
                    metadata.pos_lon_err,
                    metadata.pos_alt_err
                );
                println!("  files: {}, {}, {}", metadata.pcap, metadata.nmea, metadata.coords);
            }
            Ok(SessionOutcome::Cancelled) => {
                println!("Capture canceled.");
                std::process::exit(1);
            }
            Err(err) => {
                log::error!("{:#}", err);
                std::process::exit(1);
            }
        }
    }

    if args.process {
        let summary = runner.process()?;
        println!("Found {} unprocessed data sets", summary.datasets);
        println!("Processed {} beacons", summary.beacons);
    }

    Ok(())
}
