//! Source of time for the session and the channel engine.
//!
//! Every timestamp (token expiry, login backoff, preview start) and every
//! wait (reconnect delay) goes through a [`Clock`], so tests can drive time
//! with a [`ManualClock`] instead of sleeping.

use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub trait Clock: Send + Sync {
    fn now(&self) -> SystemTime;

    /// Blocks the caller for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by [`SystemTime::now`] and [`std::thread::sleep`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Clock that only moves when told to. `sleep` advances it instantly.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<SystemTime>,
    slept: Mutex<Duration>,
}

impl ManualClock {
    /// Creates a clock set to `unix_secs` seconds after the epoch.
    pub fn new(unix_secs: u64) -> Self {
        Self {
            now: Mutex::new(UNIX_EPOCH + Duration::from_secs(unix_secs)),
            slept: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set(&self, unix_secs: u64) {
        *self.now.lock().unwrap_or_else(|p| p.into_inner()) =
            UNIX_EPOCH + Duration::from_secs(unix_secs);
    }

    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|p| p.into_inner());
        *now += duration;
    }

    /// Total time spent in [`Clock::sleep`].
    pub fn total_slept(&self) -> Duration {
        *self.slept.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> SystemTime {
        *self.now.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        *self.slept.lock().unwrap_or_else(|p| p.into_inner()) += duration;
        self.advance(duration);
    }
}

/// Seconds since the unix epoch, 0 for times before it.
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_sleep_advances_time() {
        let clock = ManualClock::new(1000);
        clock.sleep(Duration::from_secs(5));
        assert_eq!(unix_seconds(clock.now()), 1005);
        assert_eq!(clock.total_slept(), Duration::from_secs(5));
    }

    #[test]
    fn test_manual_clock_set() {
        let clock = ManualClock::new(0);
        clock.set(42);
        assert_eq!(unix_seconds(clock.now()), 42);
    }

    #[test]
    fn test_unix_seconds_before_epoch() {
        let before = UNIX_EPOCH - Duration::from_secs(10);
        assert_eq!(unix_seconds(before), 0);
    }
}
