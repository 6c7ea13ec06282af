//! Channel policy defaults read from polyconfig.

use std::time::Duration;

use polyconfig::Config;

/// Values applied the first time health monitoring is switched on for a
/// channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthDefaults {
    pub check_interval: Duration,
    pub failure_threshold: u32,
    pub max_reconnect_attempts: u32,
    pub reconnect_delay: Duration,
}

impl Default for HealthDefaults {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_secs(polyconfig::DEFAULT_HEALTH_CHECK_INTERVAL_SECS),
            failure_threshold: polyconfig::DEFAULT_FAILURE_THRESHOLD as u32,
            max_reconnect_attempts: polyconfig::DEFAULT_MAX_RECONNECT_ATTEMPTS as u32,
            reconnect_delay: Duration::from_secs(polyconfig::DEFAULT_RECONNECT_DELAY_SECS),
        }
    }
}

fn clamp_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

pub trait ChannelConfigExt {
    fn get_health_defaults(&self) -> HealthDefaults;

    /// Preview length used when the caller does not pick one.
    fn get_preview_default_duration(&self) -> Duration;
}

impl ChannelConfigExt for Config {
    fn get_health_defaults(&self) -> HealthDefaults {
        HealthDefaults {
            check_interval: Duration::from_secs(self.get_health_check_interval_secs()),
            failure_threshold: clamp_u32(self.get_health_failure_threshold()),
            max_reconnect_attempts: clamp_u32(self.get_max_reconnect_attempts()),
            reconnect_delay: Duration::from_secs(self.get_reconnect_delay_secs()),
        }
    }

    fn get_preview_default_duration(&self) -> Duration {
        Duration::from_secs(self.get_preview_default_duration_secs())
    }
}
