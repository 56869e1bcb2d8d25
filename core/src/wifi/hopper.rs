use crate::prelude::LocalizerResult;
use crate::sync::SessionBarrier;
use crate::wifi::InterfaceManager;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 2.4 GHz channels visited in order.
pub const CHANNELS_2GHZ: [u32; 11] = [1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11];

/// Cycles the capture interface through channels for the sweep duration.
pub struct ChannelHopper {
    manager: Arc<dyn InterfaceManager>,
    iface: String,
    duration: Duration,
    interval: Duration,
    channels: Vec<u32>,
}

impl ChannelHopper {
    pub fn new(
        manager: Arc<dyn InterfaceManager>,
        iface: impl Into<String>,
        duration: Duration,
        interval: Duration,
    ) -> Self {
        Self {
            manager,
            iface: iface.into(),
            duration,
            interval,
            channels: CHANNELS_2GHZ.to_vec(),
        }
    }

    pub fn channels(mut self, channels: Vec<u32>) -> Self {
        self.channels = channels;
        self
    }

    /// Hops from the moment the start gate opens; returns the number of hops.
    pub fn run(&self, barrier: &SessionBarrier) -> LocalizerResult<usize> {
        barrier.wait_start()?;
        if self.channels.is_empty() {
            log::warn!("No channels to hop on {}", self.iface);
            return Ok(0);
        }

        let started = Instant::now();
        let mut hops = 0;
        while started.elapsed() < self.duration {
            let channel = self.channels[hops % self.channels.len()];
            if let Err(err) = self.manager.set_channel(&self.iface, channel) {
                log::warn!("could not hop {} to channel {}: {}", self.iface, channel, err);
            }
            hops += 1;

            let remaining = self.duration.saturating_sub(started.elapsed());
            thread::sleep(self.interval.min(remaining));
        }

        log::info!(
            "Hopped {} {} times over {:.2}s",
            self.iface,
            hops,
            started.elapsed().as_secs_f64()
        );
        Ok(hops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::LocalizerError;
    use crate::wifi::fake::FakeInterface;

    #[test]
    fn hops_in_channel_order_until_duration() {
        let iface = Arc::new(FakeInterface::default());
        let hopper = ChannelHopper::new(
            iface.clone(),
            "wlan0",
            Duration::from_millis(60),
            Duration::from_millis(10),
        )
        .channels(vec![1, 6, 11]);

        let hops = hopper.run(&SessionBarrier::released()).unwrap();
        let channels = iface.channels.lock().unwrap().clone();
        assert_eq!(channels.len(), hops);
        assert!(hops >= 2);
        assert_eq!(&channels[..2], &[1, 6]);
    }

    #[test]
    fn aborted_session_never_hops() {
        let iface = Arc::new(FakeInterface::default());
        let hopper = ChannelHopper::new(
            iface.clone(),
            "wlan0",
            Duration::from_secs(1),
            Duration::from_millis(10),
        );
        let barrier = SessionBarrier::new();
        barrier.abort();
        assert!(matches!(hopper.run(&barrier), Err(LocalizerError::Cancelled)));
        assert!(iface.channels.lock().unwrap().is_empty());
    }
}
