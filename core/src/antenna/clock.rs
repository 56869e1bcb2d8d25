use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Monotonic time source driving the pulse loop.
pub trait PulseClock {
    /// Time elapsed since an arbitrary, fixed origin.
    fn now(&self) -> Duration;
    fn sleep(&mut self, interval: Duration);

    fn sleep_until(&mut self, target: Duration) {
        let now = self.now();
        if target > now {
            self.sleep(target - now);
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PulseClock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep(&mut self, interval: Duration) {
        thread::sleep(interval);
    }
}

/// Seconds since the UNIX epoch as recorded in capture metadata.
pub fn unix_time() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_secs_f64())
        .unwrap_or(0.0)
}


#[cfg(test)]
mod tests {
    use super::sim::SimClock;
    use super::*;

    #[test]
    fn sleep_until_skips_past_deadlines() {
        let mut clock = SimClock {
            now: Duration::from_millis(10),
            ..Default::default()
        };
        clock.sleep_until(Duration::from_millis(5));
        assert!(clock.sleeps.is_empty());
        clock.sleep_until(Duration::from_millis(15));
        assert_eq!(clock.sleeps, vec![Duration::from_millis(5)]);
    }

    #[test]
    fn unix_time_is_after_2020() {
        assert!(unix_time() > 1_577_836_800.0);
    }
}
