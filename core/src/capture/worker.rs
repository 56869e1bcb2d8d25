use crate::antenna::clock::unix_time;
use crate::capture::tool::{parse_capture_stats, CaptureTool};
use crate::prelude::{LocalizerError, LocalizerResult};
use crate::sync::{CancelToken, SessionBarrier};
use crate::telemetry::log::LogManager;
use crate::wifi::{ensure_monitor_mode, InterfaceManager};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::{Child, Stdio};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Diagnostic line the capture tool prints once its output file is open.
pub const READY_SENTINEL: &str = "File:";

const READY_WARNING_AFTER: Duration = Duration::from_secs(5);
const READY_POLL: Duration = Duration::from_millis(100);
const MONITOR_RETRY: Duration = Duration::from_millis(500);

/// Packet counts and wall-clock span of a finished capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CaptureReport {
    pub captured: u64,
    pub dropped: u64,
    pub start: f64,
    pub end: f64,
    /// Slow-start warnings logged while waiting for the tool to open its output.
    pub ready_warnings: usize,
}

/// Runs the external capture tool and opens the session's start gate once
/// the tool confirms it is writing.
pub struct PacketCaptureWorker {
    tool: CaptureTool,
    iface: String,
    duration: u64,
    output: PathBuf,
    cancel: CancelToken,
    monitor_deadline: Duration,
    ready_warning: Duration,
    logger: LogManager,
}

impl PacketCaptureWorker {
    pub fn new(
        tool: CaptureTool,
        iface: impl Into<String>,
        duration: u64,
        output: impl Into<PathBuf>,
        cancel: CancelToken,
    ) -> Self {
        Self {
            tool,
            iface: iface.into(),
            duration,
            output: output.into(),
            cancel,
            monitor_deadline: Duration::from_secs(10),
            ready_warning: READY_WARNING_AFTER,
            logger: LogManager::for_component("capture"),
        }
    }

    pub fn monitor_deadline(mut self, deadline: Duration) -> Self {
        self.monitor_deadline = deadline;
        self
    }

    /// How long to wait for the ready sentinel before warning the operator.
    pub fn ready_warning(mut self, after: Duration) -> Self {
        self.ready_warning = after;
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn run(
        &self,
        manager: &dyn InterfaceManager,
        barrier: &SessionBarrier,
    ) -> LocalizerResult<CaptureReport> {
        ensure_monitor_mode(manager, &self.iface, self.monitor_deadline, MONITOR_RETRY)?;

        barrier.wait_initialize()?;

        // One second of slack so the tool outlives the sweep.
        let tool_duration = self.duration + 1;
        let start = unix_time();
        let mut child = self
            .tool
            .command(&self.iface, tool_duration, &self.output)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| LocalizerError::io(self.tool.program(), err))?;

        let (lines, reader) = stream_diagnostics(&mut child)?;
        let mut diagnostics = Vec::new();

        let ready_warnings = match self.await_ready(&lines, barrier, &mut diagnostics) {
            Ok(warnings) => warnings,
            Err(err) => {
                terminate(&mut child);
                return Err(err);
            }
        };
        barrier.set_start();

        let status = child
            .wait()
            .map_err(|err| LocalizerError::io(self.tool.program(), err))?;
        let end = unix_time();
        if reader.join().is_err() {
            log::warn!("capture diagnostics reader panicked");
        }
        diagnostics.extend(lines.try_iter());

        self.logger.record(&format!(
            "Captured packets for {:.2}s (expected {}s)",
            end - start,
            self.duration
        ));

        let (captured, dropped) = parse_capture_stats(&diagnostics.join("\n")).ok_or_else(|| {
            LocalizerError::CaptureFailed(format!(
                "{} exited with {} without reporting statistics",
                self.tool.program().display(),
                status
            ))
        })?;

        Ok(CaptureReport {
            captured,
            dropped,
            start,
            end,
            ready_warnings,
        })
    }

    /// Consumes diagnostic lines until the ready sentinel shows up and
    /// returns how many slow-start warnings were logged meanwhile.
    fn await_ready(
        &self,
        lines: &Receiver<String>,
        barrier: &SessionBarrier,
        diagnostics: &mut Vec<String>,
    ) -> LocalizerResult<usize> {
        let waiting_since = Instant::now();
        let mut warnings = 0;

        loop {
            if self.cancel.is_cancelled() || barrier.is_aborted() {
                log::info!("Capture cancelled while waiting for the capture tool");
                return Err(LocalizerError::Cancelled);
            }

            match lines.recv_timeout(READY_POLL) {
                Ok(line) => {
                    let ready = line.starts_with(READY_SENTINEL);
                    diagnostics.push(line);
                    if ready {
                        return Ok(warnings);
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(LocalizerError::CaptureFailed(format!(
                        "{} exited before opening its output: {}",
                        self.tool.program().display(),
                        diagnostics.join(" | ")
                    )));
                }
            }

            if warnings == 0 && waiting_since.elapsed() > self.ready_warning {
                log::error!(
                    "Waiting over {:.1}s for {} to start... Press Ctrl-C to cancel",
                    self.ready_warning.as_secs_f64(),
                    self.tool.program().display()
                );
                warnings += 1;
            }
        }
    }
}

/// Forwards the child's stderr line by line so readiness polling can time out.
fn stream_diagnostics(child: &mut Child) -> LocalizerResult<(Receiver<String>, JoinHandle<()>)> {
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| LocalizerError::CaptureFailed("capture tool has no stderr".into()))?;
    let (tx, rx) = mpsc::channel();
    let reader = thread::spawn(move || {
        for line in BufReader::new(stderr).lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    Ok((rx, reader))
}

fn terminate(child: &mut Child) {
    if let Err(err) = child.kill() {
        log::debug!("capture tool already exited: {}", err);
    }
    if let Err(err) = child.wait() {
        log::warn!("could not reap capture tool: {}", err);
    }
}

#[cfg(all(test, unix))]
pub(crate) mod script {
    use crate::capture::tool::CaptureTool;
    use std::fs;
    use std::path::Path;

    /// Stand-in capture tool: reports readiness, writes the output file and
    /// prints dumpcap-style statistics a second later.
    pub const WELL_BEHAVED: &str = r#"
out=""
while [ $# -gt 0 ]; do
  if [ "$1" = "-w" ]; then out="$2"; fi
  shift
done
echo "Capturing on 'wlan0'" >&2
echo "File: $out" >&2
: > "$out"
sleep 1
echo "Packets captured: 42" >&2
echo "Packets received/dropped on interface 'wlan0': 42/3 (pcap:0/dumpcap:0/flushed:3/ps_ifdrop:0) (92.9%)" >&2
"#;

    pub fn tool(dir: &Path, body: &str) -> CaptureTool {
        let script = dir.join("fake-dumpcap.sh");
        fs::write(&script, body).unwrap();
        CaptureTool::wrapped("sh", [script])
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::script::{tool, WELL_BEHAVED};
    use super::*;
    use crate::wifi::fake::FakeInterface;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn worker(dir: &TempDir, body: &str, cancel: CancelToken) -> PacketCaptureWorker {
        PacketCaptureWorker::new(
            tool(dir.path(), body),
            "wlan0",
            1,
            dir.path().join("out.pcapng"),
            cancel,
        )
    }

    #[test]
    fn opens_start_gate_and_reports_statistics() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir, WELL_BEHAVED, CancelToken::new());
        let barrier = SessionBarrier::new();
        barrier.set_initialize();

        let report = worker.run(&FakeInterface::default(), &barrier).unwrap();
        assert!(barrier.wait_start().is_ok());
        assert_eq!(report.captured, 42);
        assert_eq!(report.dropped, 3);
        assert!(report.end >= report.start);
        assert!(worker.output().exists());
        assert_eq!(report.ready_warnings, 0);
    }

    #[test]
    fn slow_start_warns_once_and_keeps_waiting() {
        let dir = TempDir::new().unwrap();
        let slow_start = format!("sleep 0.6\n{}", WELL_BEHAVED);
        let worker = worker(&dir, &slow_start, CancelToken::new())
            .ready_warning(Duration::from_millis(50));
        let barrier = SessionBarrier::new();
        barrier.set_initialize();

        let report = worker.run(&FakeInterface::default(), &barrier).unwrap();
        assert_eq!(report.ready_warnings, 1);
        assert_eq!(report.captured, 42);
        assert!(barrier.wait_start().is_ok());
    }

    #[test]
    fn missing_statistics_fail_the_capture() {
        let dir = TempDir::new().unwrap();
        let body = "echo \"File: x\" >&2\n";
        let worker = worker(&dir, body, CancelToken::new());
        let result = worker.run(&FakeInterface::default(), &SessionBarrier::released());
        assert!(matches!(result, Err(LocalizerError::CaptureFailed(_))));
    }

    #[test]
    fn early_exit_before_readiness_fails() {
        let dir = TempDir::new().unwrap();
        let body = "echo \"dumpcap: permission denied\" >&2\nexit 2\n";
        let worker = worker(&dir, body, CancelToken::new());
        let barrier = SessionBarrier::released();
        let result = worker.run(&FakeInterface::default(), &barrier);
        assert!(matches!(result, Err(LocalizerError::CaptureFailed(_))));
    }

    #[test]
    fn operator_cancel_stops_readiness_wait() {
        let dir = TempDir::new().unwrap();
        let cancel = CancelToken::new();
        let worker = Arc::new(worker(&dir, "exec sleep 30\n", cancel.clone()));
        let barrier = Arc::new(SessionBarrier::new());
        barrier.set_initialize();

        let handle = {
            let worker = worker.clone();
            let barrier = barrier.clone();
            thread::spawn(move || worker.run(&FakeInterface::default(), &barrier))
        };
        thread::sleep(Duration::from_millis(300));
        cancel.cancel();

        let result = handle.join().unwrap();
        assert!(matches!(result, Err(LocalizerError::Cancelled)));
    }

    #[test]
    fn interface_that_never_enters_monitor_mode_is_fatal() {
        let dir = TempDir::new().unwrap();
        let worker = worker(&dir, WELL_BEHAVED, CancelToken::new())
            .monitor_deadline(Duration::from_millis(10));
        let iface = FakeInterface {
            refuse: true,
            ..Default::default()
        };
        let result = worker.run(&iface, &SessionBarrier::released());
        assert!(matches!(
            result,
            Err(LocalizerError::MonitorModeTimeout { .. })
        ));
    }
}
