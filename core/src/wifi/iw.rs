use crate::prelude::{LocalizerError, LocalizerResult};
use crate::wifi::{InterfaceManager, InterfaceMode};
use std::process::Command;

/// Interface manager shelling out to `iw` and `ip` (requires CAP_NET_ADMIN).
#[derive(Debug, Default, Clone)]
pub struct IwInterfaceManager;

impl IwInterfaceManager {
    pub fn new() -> Self {
        Self
    }

    fn run(cmd: &str, args: &[&str]) -> LocalizerResult<String> {
        let output = Command::new(cmd).args(args).output().map_err(|err| {
            LocalizerError::Interface(format!("failed to run `{} {}`: {}", cmd, args.join(" "), err))
        })?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(LocalizerError::Interface(format!(
                "`{} {}` exited with {}: {}",
                cmd,
                args.join(" "),
                output.status,
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl InterfaceManager for IwInterfaceManager {
    fn interface_mode(&self, iface: &str) -> LocalizerResult<InterfaceMode> {
        let info = Self::run("iw", &["dev", iface, "info"])?;
        parse_iw_info_mode(&info).ok_or_else(|| {
            LocalizerError::Interface(format!("`iw dev {} info` reported no type", iface))
        })
    }

    fn set_interface_mode(&self, iface: &str, mode: &InterfaceMode) -> LocalizerResult<()> {
        log::info!("Setting {} to {} mode", iface, mode);
        Self::run("ip", &["link", "set", iface, "down"])?;
        let changed = Self::run("iw", &["dev", iface, "set", "type", mode.as_str()]);
        // Bring the link back up even when the type change failed.
        Self::run("ip", &["link", "set", iface, "up"])?;
        changed.map(|_| ())
    }

    fn set_channel(&self, iface: &str, channel: u32) -> LocalizerResult<()> {
        let channel = channel.to_string();
        Self::run("iw", &["dev", iface, "set", "channel", &channel]).map(|_| ())
    }
}

/// Extracts the `type <mode>` line of `iw dev <iface> info` output.
pub fn parse_iw_info_mode(info: &str) -> Option<InterfaceMode> {
    info.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("type "))
        .map(InterfaceMode::parse)
}

#[cfg(test)]
mod tests {
    use super::*;

    const INFO: &str = "Interface wlan1\n\tifindex 4\n\twdev 0x100000001\n\taddr 00:c0:ca:98:3f:2b\n\ttype monitor\n\twiphy 1\n\tchannel 6 (2437 MHz), width: 20 MHz (no HT), center1: 2437 MHz\n";

    #[test]
    fn reads_mode_from_iw_info() {
        assert_eq!(parse_iw_info_mode(INFO), Some(InterfaceMode::Monitor));
        assert_eq!(
            parse_iw_info_mode("Interface wlan0\n\ttype managed\n"),
            Some(InterfaceMode::Managed)
        );
        assert_eq!(parse_iw_info_mode("Interface wlan0\n"), None);
    }
}
