//! Reconnection of broken outputs and operator-driven failover between a
//! primary output and its backup.

use polyrestreamer::{Session, unix_seconds};
use tracing::{debug, info, warn};

use crate::channel::{CONFLICT, Channel, ChannelStatus};
use crate::errors::{ChannelError, Result};

impl Channel {
    /// Re-issues the output at `index` to the running process.
    ///
    /// Returns `Ok(true)` once the output is back, `Ok(false)` when the
    /// remote side refused or its process is not running; the failure
    /// counter is left to the next health pass. When the counter has reached
    /// `max_reconnect_attempts` the output is disabled and
    /// `ReconnectExhausted` is returned.
    pub fn reconnect_output(&mut self, session: &mut Session, index: usize) -> Result<bool> {
        self.check_index(index)?;
        if self.status != ChannelStatus::Active {
            return Err(ChannelError::invalid_state("reconnect", self.status));
        }

        let max_attempts = self.reconnect.max_reconnect_attempts;
        let failures = self.outputs[index].consecutive_failures;
        if max_attempts > 0 && failures >= max_attempts {
            self.outputs[index].enabled = false;
            self.outputs[index].connected = false;
            let err = ChannelError::ReconnectExhausted {
                index,
                attempts: failures,
            };
            warn!(channel = %self.name, index, failures, "Giving up on output, disabled");
            self.record_error(&err);
            return Err(err);
        }

        session.clock().sleep(self.reconnect.reconnect_delay);

        let process = match self.find_process(session) {
            Ok(process) => process,
            Err(err) => {
                self.record_error(&err);
                return Ok(false);
            }
        };
        if !process.is_running() {
            warn!(
                channel = %self.name,
                index,
                state = %process.state,
                "Remote process not running, output not reconnected"
            );
            self.record_error(&ChannelError::ProcessNotRunning(process.state));
            return Ok(false);
        }
        let process_id = process.id;
        let Some(output) = self.process_output(index) else {
            return Ok(false);
        };

        if let Err(err) = session.remove_process_output(&process_id, &output.id) {
            debug!(
                channel = %self.name,
                output = %output.id,
                error = %err,
                "Stale output not removed"
            );
        }

        match session.add_process_output(&process_id, &output) {
            Ok(()) => {
                self.outputs[index].mark_connected();
                info!(channel = %self.name, output = %output.id, "Output reconnected");
                Ok(true)
            }
            Err(err) => {
                warn!(
                    channel = %self.name,
                    output = %output.id,
                    error = %err,
                    "Output reconnect failed"
                );
                self.record_error(&ChannelError::from(err));
                Ok(false)
            }
        }
    }

    /// Moves traffic from the output at `primary_index` to its backup.
    ///
    /// On an active channel the primary is removed from the process and the
    /// backup added; otherwise only the local flags change.
    pub fn trigger_failover(&mut self, session: &mut Session, primary_index: usize) -> Result<()> {
        self.check_index(primary_index)?;
        let backup_index = self
            .backup_index(primary_index)
            .ok_or(ChannelError::NoBackup(primary_index))?;
        if self.outputs[primary_index].failover_active {
            return Ok(());
        }

        if self.status == ChannelStatus::Active {
            let result = self.swap_remote_outputs(session, primary_index, backup_index);
            if let Err(err) = result {
                self.record_error(&err);
                return Err(err);
            }
        }

        let started = unix_seconds(session.now());
        let primary = &mut self.outputs[primary_index];
        primary.enabled = false;
        primary.connected = false;
        primary.failover_active = true;
        primary.failover_start_time = Some(started);

        let backup = &mut self.outputs[backup_index];
        backup.enabled = true;
        backup.connected = self.status == ChannelStatus::Active;
        backup.consecutive_failures = 0;
        backup.failover_active = true;
        backup.failover_start_time = Some(started);

        info!(
            channel = %self.name,
            primary = %self.outputs[primary_index].service,
            backup = %self.outputs[backup_index].service,
            "Failover triggered"
        );
        Ok(())
    }

    /// Gives traffic back to the primary after a failover.
    pub fn restore_primary(&mut self, session: &mut Session, primary_index: usize) -> Result<()> {
        self.check_index(primary_index)?;
        let backup_index = self
            .backup_index(primary_index)
            .ok_or(ChannelError::NoBackup(primary_index))?;
        if !self.outputs[primary_index].failover_active {
            return Err(ChannelError::NoActiveFailover(primary_index));
        }

        if self.status == ChannelStatus::Active {
            let result = self.swap_remote_outputs(session, backup_index, primary_index);
            if let Err(err) = result {
                self.record_error(&err);
                return Err(err);
            }
        }

        let primary = &mut self.outputs[primary_index];
        primary.enabled = true;
        primary.connected = self.status == ChannelStatus::Active;
        primary.consecutive_failures = 0;
        primary.failover_active = false;
        primary.failover_start_time = None;

        let backup = &mut self.outputs[backup_index];
        backup.enabled = false;
        backup.connected = false;
        backup.failover_active = false;
        backup.failover_start_time = None;

        info!(
            channel = %self.name,
            primary = %self.outputs[primary_index].service,
            "Primary restored"
        );
        Ok(())
    }

    /// Triggers failover for every primary whose health counters crossed the
    /// threshold. Restoring stays with the operator. Returns how many
    /// failovers were triggered.
    pub fn check_failover(&mut self, session: &mut Session) -> usize {
        if self.status != ChannelStatus::Active {
            return 0;
        }
        let threshold = self.health.failure_threshold.max(1);
        let candidates: Vec<usize> = (0..self.outputs.len())
            .filter(|&i| {
                let o = &self.outputs[i];
                o.backup.is_some()
                    && !o.is_backup()
                    && !o.failover_active
                    && !o.connected
                    && o.consecutive_failures >= threshold
            })
            .collect();

        let mut triggered = 0;
        for index in candidates {
            match self.trigger_failover(session, index) {
                Ok(()) => triggered += 1,
                Err(err) => {
                    warn!(
                        channel = %self.name,
                        index,
                        error = %err,
                        "Automatic failover failed"
                    );
                }
            }
        }
        triggered
    }

    /// Adds `to` to the running process, then removes `from`.
    fn swap_remote_outputs(&mut self, session: &mut Session, from: usize, to: usize) -> Result<()> {
        let process_id = self.find_process_id(session)?;
        let incoming = self
            .process_output(to)
            .ok_or(ChannelError::InvalidOutputIndex { index: to, len: self.outputs.len() })?;
        let outgoing_id = self
            .remote_output_id(from)
            .ok_or(ChannelError::InvalidOutputIndex { index: from, len: self.outputs.len() })?;

        match session.add_process_output(&process_id, &incoming) {
            Ok(()) => {}
            Err(err) if err.status_code() == Some(CONFLICT) => {
                debug!(channel = %self.name, output = %incoming.id, "Output already present");
            }
            Err(err) => return Err(err.into()),
        }
        if let Err(err) = session.remove_process_output(&process_id, &outgoing_id) {
            warn!(
                channel = %self.name,
                output = %outgoing_id,
                error = %err,
                "Could not remove output"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use polyrestreamer::{ConnectionSettings, ManualClock, MemoryTransport};

    use super::*;
    use crate::service::{Orientation, StreamingService};

    fn session(transport: &MemoryTransport, clock: Arc<ManualClock>) -> Session {
        let settings =
            ConnectionSettings::new("localhost", 8080).with_credentials("admin", "secret");
        Session::new(settings, Box::new(transport.clone()), clock)
    }

    #[test]
    fn test_reconnect_requires_active_channel() {
        let transport = MemoryTransport::new("admin", "secret");
        let mut session = session(&transport, Arc::new(ManualClock::new(0)));
        let mut channel = Channel::new("channel_r".to_string(), "R");
        channel.add_output(StreamingService::Twitch, "k", Orientation::Auto, None);
        let err = channel.reconnect_output(&mut session, 0).unwrap_err();
        assert!(err.is_input_error());
        assert!(channel.reconnect_output(&mut session, 4).is_err());
    }

    #[test]
    fn test_reconnect_waits_delay() {
        let transport = MemoryTransport::new("admin", "secret");
        let clock = Arc::new(ManualClock::new(0));
        let mut session = session(&transport, clock.clone());
        let mut channel = Channel::new("channel_r".to_string(), "R");
        channel.add_output(StreamingService::Twitch, "k", Orientation::Auto, None);
        channel.reconnect.reconnect_delay = Duration::from_secs(5);
        channel.start(&mut session).unwrap();

        assert!(channel.reconnect_output(&mut session, 0).unwrap());
        assert_eq!(clock.total_slept(), Duration::from_secs(5));
        assert!(channel.output(0).unwrap().is_connected());
    }

    #[test]
    fn test_reconnect_refused_while_process_not_running() {
        let transport = MemoryTransport::new("admin", "secret");
        let mut session = session(&transport, Arc::new(ManualClock::new(0)));
        let mut channel = Channel::new("channel_r".to_string(), "R");
        channel.add_output(StreamingService::Twitch, "k", Orientation::Auto, None);
        channel.start(&mut session).unwrap();
        let process = transport.process_by_reference("channel_r").unwrap();
        transport.drop_output(&process.id, "Twitch_0");
        transport.set_process_state(&process.id, "failed");

        assert!(!channel.reconnect_output(&mut session, 0).unwrap());
        assert!(!channel.output(0).unwrap().is_connected());
        assert_eq!(transport.calls(polyrestreamer::Operation::AddOutput), 0);
        assert!(channel.last_error().unwrap().contains("failed"));
    }

    #[test]
    fn test_failover_on_inactive_channel_is_local() {
        let transport = MemoryTransport::new("admin", "secret");
        let mut session = session(&transport, Arc::new(ManualClock::new(500)));
        let mut channel = Channel::new("channel_r".to_string(), "R");
        channel.add_output(StreamingService::YouTube, "a", Orientation::Auto, None);
        channel.add_output(StreamingService::Twitch, "b", Orientation::Auto, None);

        assert!(matches!(
            channel.trigger_failover(&mut session, 0),
            Err(ChannelError::NoBackup(0))
        ));
        channel.set_output_backup(0, 1).unwrap();
        channel.trigger_failover(&mut session, 0).unwrap();

        assert!(!channel.output(0).unwrap().is_enabled());
        assert!(channel.output(1).unwrap().is_enabled());
        assert!(channel.output(0).unwrap().failover_active());
        assert_eq!(channel.output(1).unwrap().failover_start_time(), Some(500));
        assert_eq!(transport.calls(polyrestreamer::Operation::AddOutput), 0);

        channel.restore_primary(&mut session, 0).unwrap();
        assert!(channel.output(0).unwrap().is_enabled());
        assert!(!channel.output(1).unwrap().is_enabled());
        assert!(matches!(
            channel.restore_primary(&mut session, 0),
            Err(ChannelError::NoActiveFailover(0))
        ));
    }
}
