//! Health monitor: reconciles the outputs a channel expects with the outputs
//! present on its remote process.

use std::collections::HashSet;

use polyrestreamer::{Session, unix_seconds};
use tracing::{debug, info, warn};

use crate::channel::{Channel, ChannelStatus};
use crate::errors::ChannelError;

impl Channel {
    /// One health pass over the channel.
    ///
    /// Channels that are not active, or not monitored, are always healthy.
    /// Missing outputs have their failure counter bumped and, once the
    /// threshold is reached, are reconnected within the same pass. Disabled
    /// outputs are not inspected. A process that is not running is never
    /// healthy.
    pub fn check_health(&mut self, session: &mut Session) -> bool {
        if self.status != ChannelStatus::Active || !self.health.enabled {
            return true;
        }

        let now = session.now();
        self.last_health_check = Some(now);

        let Some(reference) = self.process_reference.clone() else {
            warn!(channel = %self.name, "Active channel has no process reference");
            self.record_error(&ChannelError::MissingProcessReference);
            return false;
        };

        let process = match session.find_process_by_reference(&reference) {
            Ok(Some(process)) => process,
            Ok(None) => {
                warn!(channel = %self.name, reference = %reference, "Remote process missing");
                self.record_error(&ChannelError::ProcessNotFound(reference));
                return false;
            }
            Err(err) => {
                warn!(channel = %self.name, error = %err, "Health check could not list processes");
                self.record_error(&ChannelError::from(err));
                return false;
            }
        };

        let remote: HashSet<String> = if process.is_running() {
            match session.get_process_outputs(&process.id) {
                Ok(ids) => ids.into_iter().collect(),
                Err(err) => {
                    warn!(
                        channel = %self.name,
                        error = %err,
                        "Health check could not list outputs"
                    );
                    self.record_error(&ChannelError::from(err));
                    return false;
                }
            }
        } else {
            debug!(channel = %self.name, state = %process.state, "Remote process not running");
            HashSet::new()
        };

        let checked_at = unix_seconds(now);
        let threshold = self.health.failure_threshold;

        for index in 0..self.outputs.len() {
            if !self.outputs[index].enabled {
                continue;
            }
            let remote_id = format!("{}_{}", self.outputs[index].service.name(), index);
            let output = &mut self.outputs[index];
            output.last_health_check = Some(checked_at);

            if remote.contains(&remote_id) {
                if !output.connected {
                    info!(channel = %self.name, output = %remote_id, "Output connected");
                }
                output.mark_connected();
                continue;
            }

            output.mark_missing();
            let failures = output.consecutive_failures;
            let auto_reconnect = output.auto_reconnect_enabled;
            warn!(
                channel = %self.name,
                output = %remote_id,
                failures,
                "Output missing from remote process"
            );

            if failures >= threshold && auto_reconnect {
                match self.reconnect_output(session, index) {
                    Ok(true) => {}
                    Ok(false) => {
                        debug!(
                            channel = %self.name,
                            output = %remote_id,
                            "Reconnect failed"
                        );
                    }
                    Err(err) => {
                        debug!(
                            channel = %self.name,
                            output = %remote_id,
                            error = %err,
                            "Reconnect not attempted"
                        );
                    }
                }
            }
        }

        process.is_running() && self.outputs.iter().filter(|o| o.enabled).all(|o| o.connected)
    }

    /// True when monitoring is on and a pass is due at `now`.
    pub fn health_check_due(&self, now: std::time::SystemTime) -> bool {
        if self.status != ChannelStatus::Active || !self.health.enabled {
            return false;
        }
        match self.last_health_check {
            None => true,
            Some(last) => now
                .duration_since(last)
                .map(|elapsed| elapsed >= self.health.check_interval)
                .unwrap_or(false),
        }
    }

    pub fn last_health_check(&self) -> Option<std::time::SystemTime> {
        self.last_health_check
    }
}
