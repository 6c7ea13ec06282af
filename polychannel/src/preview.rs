//! Preview mode: a timed trial run of a channel before it goes live.
//!
//! ```text
//! INACTIVE --start_preview--> PREVIEW --preview_to_live--> ACTIVE
//!                                |
//!                                +--cancel_preview / timeout--> INACTIVE
//! ```

use std::time::{Duration, SystemTime};

use polyrestreamer::{Session, unix_seconds};
use tracing::info;

use crate::channel::{Channel, ChannelStatus};
use crate::errors::{ChannelError, Result};

impl Channel {
    /// Starts the remote process in preview mode. A zero `duration` never
    /// times out.
    pub fn start_preview(&mut self, session: &mut Session, duration: Duration) -> Result<()> {
        if self.status != ChannelStatus::Inactive {
            return Err(ChannelError::invalid_state("start preview", self.status));
        }

        self.preview_mode_enabled = true;
        self.preview_duration_secs = duration.as_secs();
        self.preview_start_time = unix_seconds(session.now());

        if let Err(err) = self.start_remote(session) {
            self.clear_preview();
            return Err(err);
        }

        self.status = ChannelStatus::Preview;
        info!(channel = %self.name, duration_secs = self.preview_duration_secs, "Preview started");
        Ok(())
    }

    /// Reports whether the preview has run for its whole duration at `now`.
    /// Reaching the duration exactly counts as timed out.
    pub fn check_preview_timeout(&self, now: SystemTime) -> bool {
        if !self.preview_mode_enabled || self.preview_duration_secs == 0 {
            return false;
        }
        unix_seconds(now).saturating_sub(self.preview_start_time) >= self.preview_duration_secs
    }

    /// Keeps the running process and makes the channel live.
    pub fn preview_to_live(&mut self) -> Result<()> {
        if self.status != ChannelStatus::Preview {
            return Err(ChannelError::invalid_state("go live", self.status));
        }
        self.clear_preview();
        self.last_error = None;
        self.status = ChannelStatus::Active;
        info!(channel = %self.name, "Preview switched to live");
        Ok(())
    }

    /// Tears the preview down like a stop.
    ///
    /// When the teardown fails the channel goes to ERROR but stays in
    /// preview mode, since its process may still be streaming; cancelling
    /// again retries.
    pub fn cancel_preview(&mut self, session: &mut Session) -> Result<()> {
        let retrying = self.status == ChannelStatus::Error && self.preview_mode_enabled;
        if self.status != ChannelStatus::Preview && !retrying {
            return Err(ChannelError::invalid_state("cancel preview", self.status));
        }
        self.stop_remote(session)?;
        info!(channel = %self.name, "Preview cancelled");
        Ok(())
    }

    pub fn is_preview_mode(&self) -> bool {
        self.preview_mode_enabled
    }

    pub fn preview_duration(&self) -> Duration {
        Duration::from_secs(self.preview_duration_secs)
    }

    /// Unix time the preview started, 0 outside preview.
    pub fn preview_start_time(&self) -> u64 {
        self.preview_start_time
    }

    /// Time left before the preview times out, `None` when it never will.
    pub fn preview_remaining(&self, now: SystemTime) -> Option<Duration> {
        if !self.preview_mode_enabled || self.preview_duration_secs == 0 {
            return None;
        }
        let elapsed = unix_seconds(now).saturating_sub(self.preview_start_time);
        Some(Duration::from_secs(
            self.preview_duration_secs.saturating_sub(elapsed),
        ))
    }

    pub(crate) fn clear_preview(&mut self) {
        self.preview_mode_enabled = false;
        self.preview_duration_secs = 0;
        self.preview_start_time = 0;
    }
}

#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use super::*;

    fn at(secs: u64) -> SystemTime {
        UNIX_EPOCH + Duration::from_secs(secs)
    }

    fn previewing(start: u64, duration: u64) -> Channel {
        let mut channel = Channel::new("channel_p".to_string(), "P");
        channel.status = ChannelStatus::Preview;
        channel.preview_mode_enabled = true;
        channel.preview_start_time = start;
        channel.preview_duration_secs = duration;
        channel
    }

    #[test]
    fn test_timeout_boundary_is_inclusive() {
        let channel = previewing(1000, 300);
        assert!(!channel.check_preview_timeout(at(1200)));
        assert!(channel.check_preview_timeout(at(1300)));
        assert!(channel.check_preview_timeout(at(1400)));
    }

    #[test]
    fn test_zero_duration_never_times_out() {
        let channel = previewing(1000, 0);
        assert!(!channel.check_preview_timeout(at(1_000_000)));
        assert_eq!(channel.preview_remaining(at(2000)), None);
    }

    #[test]
    fn test_not_in_preview_never_times_out() {
        let channel = Channel::new("channel_p".to_string(), "P");
        assert!(!channel.check_preview_timeout(at(u32::MAX as u64)));
    }

    #[test]
    fn test_clock_behind_start_is_not_timed_out() {
        let channel = previewing(1000, 300);
        assert!(!channel.check_preview_timeout(at(900)));
        assert_eq!(channel.preview_remaining(at(900)), Some(Duration::from_secs(300)));
        assert_eq!(channel.preview_remaining(at(1250)), Some(Duration::from_secs(50)));
    }

    #[test]
    fn test_preview_to_live_clears_fields() {
        let mut channel = previewing(1000, 300);
        channel.last_error = Some("old".to_string());
        channel.preview_to_live().unwrap();
        assert_eq!(channel.status(), ChannelStatus::Active);
        assert!(!channel.is_preview_mode());
        assert_eq!(channel.preview_duration(), Duration::ZERO);
        assert_eq!(channel.preview_start_time(), 0);
        assert!(channel.last_error().is_none());
    }

    #[test]
    fn test_preview_to_live_requires_preview() {
        let mut channel = Channel::new("channel_p".to_string(), "P");
        let err = channel.preview_to_live().unwrap_err();
        assert!(matches!(err, ChannelError::InvalidState { .. }));
        assert_eq!(channel.status(), ChannelStatus::Inactive);
    }
}
