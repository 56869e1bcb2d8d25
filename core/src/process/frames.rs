use crate::prelude::{LocalizerError, LocalizerResult};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Lines, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Display filter selecting 802.11 beacon frames.
pub const BEACON_FILTER: &str = "wlan[0] == 0x80";

/// Diagnostic lines kept from a failing tshark run.
const DIAGNOSTIC_TAIL: usize = 5;

const FIELDS: [&str; 4] = [
    "frame.time_epoch",
    "wlan.bssid",
    "radiotap.dbm_antsignal",
    "radiotap.channel.freq",
];

/// Fields of one beacon frame. A field the dissector did not produce is `None`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BeaconFrame {
    pub timestamp: Option<f64>,
    pub bssid: Option<String>,
    pub ssi: Option<i32>,
    pub channel: Option<u32>,
}

/// A beacon frame with every field present.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteFrame {
    pub timestamp: f64,
    pub bssid: String,
    pub ssi: i32,
    pub channel: u32,
}

impl BeaconFrame {
    pub fn complete(self) -> Option<CompleteFrame> {
        Some(CompleteFrame {
            timestamp: self.timestamp?,
            bssid: self.bssid?,
            ssi: self.ssi?,
            channel: self.channel?,
        })
    }
}

pub type Frames<'a> = Box<dyn Iterator<Item = LocalizerResult<BeaconFrame>> + 'a>;

/// Produces the beacon frames of a raw capture file in capture order.
///
/// An `Err` item is unrecoverable and ends the stream.
pub trait FrameSource: Send + Sync {
    fn beacon_frames(&self, pcap: &Path) -> LocalizerResult<Frames<'_>>;
}

/// Reads captures through `tshark`'s field export.
#[derive(Debug, Clone)]
pub struct TsharkFrameSource {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl TsharkFrameSource {
    pub fn new() -> Self {
        Self::with_program("tshark", Vec::<OsString>::new())
    }

    pub fn with_program<I, S>(program: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    fn command(&self, pcap: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .arg("-r")
            .arg(pcap)
            .args(["-Y", BEACON_FILTER, "-T", "fields"]);
        for field in FIELDS {
            command.args(["-e", field]);
        }
        command.args(["-E", "separator=,", "-E", "occurrence=f"]);
        command
    }
}

impl Default for TsharkFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for TsharkFrameSource {
    fn beacon_frames(&self, pcap: &Path) -> LocalizerResult<Frames<'_>> {
        let mut child = self
            .command(pcap)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| LocalizerError::io(&self.program, err))?;
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(LocalizerError::FrameSource("tshark output is not piped".into()));
        };

        Ok(Box::new(TsharkFrames {
            child,
            lines: BufReader::new(stdout).lines(),
            diagnostics: Some(collect_tail(stderr)),
            done: false,
        }))
    }
}

/// Drains `stream` on its own thread, keeping only its last lines.
fn collect_tail<R: Read + Send + 'static>(stream: R) -> JoinHandle<VecDeque<String>> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(DIAGNOSTIC_TAIL);
        for line in BufReader::new(stream).lines() {
            let Ok(line) = line else { break };
            if tail.len() == DIAGNOSTIC_TAIL {
                tail.pop_front();
            }
            tail.push_back(line);
        }
        tail
    })
}

struct TsharkFrames {
    child: Child,
    lines: Lines<BufReader<ChildStdout>>,
    diagnostics: Option<JoinHandle<VecDeque<String>>>,
    done: bool,
}

impl TsharkFrames {
    fn diagnostics(&mut self) -> String {
        self.diagnostics
            .take()
            .and_then(|reader| reader.join().ok())
            .map(|tail| Vec::from(tail).join(" | "))
            .unwrap_or_default()
    }

    fn failure(&mut self, what: String) -> LocalizerError {
        let diagnostics = self.diagnostics();
        if diagnostics.is_empty() {
            LocalizerError::FrameSource(what)
        } else {
            LocalizerError::FrameSource(format!("{}: {}", what, diagnostics))
        }
    }
}

impl Iterator for TsharkFrames {
    type Item = LocalizerResult<BeaconFrame>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.lines.next() {
            Some(Ok(line)) => Some(Ok(parse_frame_line(&line))),
            Some(Err(err)) => {
                self.done = true;
                terminate(&mut self.child);
                Some(Err(self.failure(format!("reading tshark output: {}", err))))
            }
            None => {
                self.done = true;
                match self.child.wait() {
                    Ok(status) if status.success() => {
                        self.diagnostics();
                        None
                    }
                    Ok(status) => Some(Err(self.failure(format!("tshark exited with {}", status)))),
                    Err(err) => Some(Err(self.failure(format!("waiting for tshark: {}", err)))),
                }
            }
        }
    }
}

impl Drop for TsharkFrames {
    fn drop(&mut self) {
        if !self.done {
            terminate(&mut self.child);
            self.diagnostics();
        }
    }
}

fn terminate(child: &mut Child) {
    let _ = child.kill();
    let _ = child.wait();
}

/// Parses one `time,bssid,signal,freq` line; unparsable fields become `None`.
pub fn parse_frame_line(line: &str) -> BeaconFrame {
    let mut fields = line.trim_end_matches(['\r', '\n']).splitn(4, ',');
    let mut next = || fields.next().map(str::trim).filter(|field| !field.is_empty());

    BeaconFrame {
        timestamp: next().and_then(|field| field.parse().ok()),
        bssid: next().map(str::to_string),
        ssi: next().and_then(|field| field.parse().ok()),
        channel: next().and_then(|field| field.parse().ok()),
    }
}
