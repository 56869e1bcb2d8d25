use crate::prelude::{LocalizerError, LocalizerResult};
use regex::Regex;
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::OnceLock;

pub const DEFAULT_CAPTURE_TOOL: &str = "dumpcap";

/// Ring buffer size handed to the capture tool, in MiB.
const BUFFER_MIB: &str = "12";

/// External packet-capture program and the command line it is run with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureTool {
    program: PathBuf,
    leading_args: Vec<OsString>,
}

impl CaptureTool {
    /// Resolves `name` on `PATH`, failing when the tool is not installed.
    pub fn locate(name: &str) -> LocalizerResult<Self> {
        find_executable(name)
            .map(Self::at)
            .ok_or_else(|| LocalizerError::MissingTool(name.to_string()))
    }

    pub fn at(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            leading_args: Vec::new(),
        }
    }

    /// Runs the tool through a wrapper such as `sudo` or an interpreter.
    pub fn wrapped<I, S>(wrapper: impl Into<PathBuf>, leading_args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: wrapper.into(),
            leading_args: leading_args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// `-i <iface> -B 12 -q -a duration:<secs> -w <output>`
    pub fn command(&self, iface: &str, duration_secs: u64, output: &Path) -> Command {
        let mut command = Command::new(&self.program);
        command
            .args(&self.leading_args)
            .args(["-i", iface, "-B", BUFFER_MIB, "-q"])
            .arg("-a")
            .arg(format!("duration:{}", duration_secs))
            .arg("-w")
            .arg(output);
        command
    }
}

pub fn find_executable(name: &str) -> Option<PathBuf> {
    let candidate = Path::new(name);
    if candidate.components().count() > 1 {
        return candidate.is_file().then(|| candidate.to_path_buf());
    }
    let paths = env::var_os("PATH")?;
    env::split_paths(&paths)
        .map(|dir| dir.join(name))
        .find(|path| path.is_file())
}

/// Pulls `(captured, dropped)` out of the capture tool's closing statistics,
/// e.g. `Packets received/dropped on interface 'wlan0': 5321/12 (...)`.
pub fn parse_capture_stats(diagnostics: &str) -> Option<(u64, u64)> {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    let pattern = PATTERN.get_or_init(|| {
        Regex::new(r"dropped on interface\s'[^']+':\s(\d+)/(\d+)")
            .expect("capture statistics pattern is valid")
    });

    let captures = pattern.captures(diagnostics)?;
    let captured = captures.get(1)?.as_str().parse().ok()?;
    let dropped = captures.get(2)?.as_str().parse().ok()?;
    Some((captured, dropped))
}
