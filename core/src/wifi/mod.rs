//! WiFi interface management: mode control and the channel-hopping worker.

pub mod hopper;
pub mod iw;

use crate::prelude::{LocalizerError, LocalizerResult};
use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

pub use hopper::ChannelHopper;
pub use iw::IwInterfaceManager;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterfaceMode {
    Managed,
    Monitor,
    Other(String),
}

impl InterfaceMode {
    pub fn parse(value: &str) -> Self {
        match value.trim() {
            "managed" => InterfaceMode::Managed,
            "monitor" => InterfaceMode::Monitor,
            other => InterfaceMode::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            InterfaceMode::Managed => "managed",
            InterfaceMode::Monitor => "monitor",
            InterfaceMode::Other(name) => name,
        }
    }
}

impl fmt::Display for InterfaceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub trait InterfaceManager: Send + Sync {
    fn interface_mode(&self, iface: &str) -> LocalizerResult<InterfaceMode>;
    fn set_interface_mode(&self, iface: &str, mode: &InterfaceMode) -> LocalizerResult<()>;
    fn set_channel(&self, iface: &str, channel: u32) -> LocalizerResult<()>;
}

/// Retries switching `iface` to monitor mode until it reports monitor mode
/// or `deadline` passes.
pub fn ensure_monitor_mode(
    manager: &dyn InterfaceManager,
    iface: &str,
    deadline: Duration,
    retry_interval: Duration,
) -> LocalizerResult<()> {
    let started = Instant::now();
    loop {
        match manager.interface_mode(iface) {
            Ok(InterfaceMode::Monitor) => return Ok(()),
            Ok(mode) => log::debug!("{} is in {} mode", iface, mode),
            Err(err) => log::warn!("could not read mode of {}: {}", iface, err),
        }

        if started.elapsed() >= deadline {
            return Err(LocalizerError::MonitorModeTimeout {
                iface: iface.to_string(),
                waited: started.elapsed(),
            });
        }

        if let Err(err) = manager.set_interface_mode(iface, &InterfaceMode::Monitor) {
            log::warn!("failed to set {} to monitor mode: {}", iface, err);
        }
        thread::sleep(retry_interval);
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::{InterfaceManager, InterfaceMode};
    use crate::prelude::{LocalizerError, LocalizerResult};
    use std::sync::Mutex;

    /// Interface that reaches monitor mode after `sets_needed` set calls.
    #[derive(Debug, Default)]
    pub struct FakeInterface {
        pub sets_needed: usize,
        pub refuse: bool,
        pub mode_sets: Mutex<usize>,
        pub channels: Mutex<Vec<u32>>,
    }

    impl InterfaceManager for FakeInterface {
        fn interface_mode(&self, _iface: &str) -> LocalizerResult<InterfaceMode> {
            let sets = *self.mode_sets.lock().unwrap();
            if !self.refuse && sets >= self.sets_needed {
                Ok(InterfaceMode::Monitor)
            } else {
                Ok(InterfaceMode::Managed)
            }
        }

        fn set_interface_mode(&self, _iface: &str, _mode: &InterfaceMode) -> LocalizerResult<()> {
            *self.mode_sets.lock().unwrap() += 1;
            if self.refuse {
                return Err(LocalizerError::Interface("device busy".into()));
            }
            Ok(())
        }

        fn set_channel(&self, _iface: &str, channel: u32) -> LocalizerResult<()> {
            self.channels.lock().unwrap().push(channel);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fake::FakeInterface;
    use super::*;

    #[test]
    fn monitor_mode_is_retried_until_reported() {
        let iface = FakeInterface {
            sets_needed: 2,
            ..Default::default()
        };
        ensure_monitor_mode(&iface, "wlan0", Duration::from_secs(5), Duration::ZERO).unwrap();
        assert_eq!(*iface.mode_sets.lock().unwrap(), 2);
    }

    #[test]
    fn monitor_mode_gives_up_after_deadline() {
        let iface = FakeInterface {
            refuse: true,
            ..Default::default()
        };
        let result = ensure_monitor_mode(
            &iface,
            "wlan0",
            Duration::from_millis(30),
            Duration::from_millis(5),
        );
        assert!(matches!(
            result,
            Err(LocalizerError::MonitorModeTimeout { .. })
        ));
    }

    #[test]
    fn modes_parse_from_iw_names() {
        assert_eq!(InterfaceMode::parse("monitor"), InterfaceMode::Monitor);
        assert_eq!(InterfaceMode::parse("managed\n"), InterfaceMode::Managed);
        assert_eq!(InterfaceMode::parse("AP").to_string(), "AP");
    }
}
