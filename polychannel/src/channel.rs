//! Channel model: one input fanned out to several outputs, plus the remote
//! process lifecycle that backs it.
//!
//! Outputs are addressed by position in the public API. Backup/primary links
//! are stored as [`OutputId`]s so removing an output never leaves a link
//! pointing at the wrong destination.

use std::fmt;
use std::time::{Duration, SystemTime};

use polyrestreamer::{ProcessConfig, ProcessInfo, ProcessOutput, Session};
use tracing::{debug, error, info, warn};

use crate::errors::{ChannelError, Result};
use crate::output::{EncodingSettings, Output, OutputId};
use crate::service::{Orientation, StreamingService};

pub const DEFAULT_INPUT_URL: &str = "rtmp://localhost/live/obs_input";

/// Status code the service answers when an output id is already in use.
pub(crate) const CONFLICT: u16 = 409;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelStatus {
    Inactive,
    Starting,
    Active,
    Preview,
    Stopping,
    Error,
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelStatus::Inactive => "inactive",
            ChannelStatus::Starting => "starting",
            ChannelStatus::Active => "active",
            ChannelStatus::Preview => "preview",
            ChannelStatus::Stopping => "stopping",
            ChannelStatus::Error => "error",
        };
        f.write_str(name)
    }
}

/// How broken outputs are repaired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReconnectPolicy {
    /// Default `auto_reconnect_enabled` for outputs added to the channel.
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    /// 0 means unlimited.
    pub max_reconnect_attempts: u32,
}

/// How often and how strictly outputs are watched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HealthPolicy {
    pub enabled: bool,
    pub check_interval: Duration,
    pub failure_threshold: u32,
}

#[derive(Debug, Clone)]
pub struct Channel {
    pub(crate) id: String,
    pub(crate) name: String,
    pub(crate) status: ChannelStatus,
    pub(crate) input_url: String,
    pub(crate) source_orientation: Orientation,
    pub(crate) auto_detect_orientation: bool,
    pub(crate) source_width: u32,
    pub(crate) source_height: u32,
    pub(crate) process_reference: Option<String>,
    pub(crate) outputs: Vec<Output>,
    pub(crate) next_output_id: u32,
    pub auto_start: bool,
    pub reconnect: ReconnectPolicy,
    pub health: HealthPolicy,
    pub(crate) last_health_check: Option<SystemTime>,
    pub(crate) preview_mode_enabled: bool,
    pub(crate) preview_duration_secs: u64,
    pub(crate) preview_start_time: u64,
    pub(crate) last_error: Option<String>,
}

impl Channel {
    pub(crate) fn new(id: String, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            status: ChannelStatus::Inactive,
            input_url: DEFAULT_INPUT_URL.to_string(),
            source_orientation: Orientation::Auto,
            auto_detect_orientation: true,
            source_width: 0,
            source_height: 0,
            process_reference: None,
            outputs: Vec::new(),
            next_output_id: 0,
            auto_start: false,
            reconnect: ReconnectPolicy::default(),
            health: HealthPolicy::default(),
            last_health_check: None,
            preview_mode_enabled: false,
            preview_duration_secs: 0,
            preview_start_time: 0,
            last_error: None,
        }
    }

    /// Copy of this channel's configuration under a new identity, inactive
    /// and with fresh health counters.
    pub(crate) fn duplicate(&self, id: String, name: &str) -> Self {
        let mut copy = self.clone();
        copy.id = id;
        copy.name = name.to_string();
        copy.status = ChannelStatus::Inactive;
        copy.process_reference = None;
        copy.last_error = None;
        copy.last_health_check = None;
        copy.clear_preview();
        copy.outputs.iter_mut().for_each(Output::reset_runtime_state);
        copy
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn status(&self) -> ChannelStatus {
        self.status
    }

    pub fn is_active(&self) -> bool {
        self.status == ChannelStatus::Active
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn process_reference(&self) -> Option<&str> {
        self.process_reference.as_deref()
    }

    pub fn input_url(&self) -> &str {
        &self.input_url
    }

    pub fn set_input_url(&mut self, url: &str) {
        self.input_url = url.trim().to_string();
    }

    pub fn source_orientation(&self) -> Orientation {
        self.source_orientation
    }

    pub fn set_source_orientation(&mut self, orientation: Orientation) {
        self.source_orientation = orientation;
        self.auto_detect_orientation = orientation == Orientation::Auto;
    }

    pub fn source_dimensions(&self) -> (u32, u32) {
        (self.source_width, self.source_height)
    }

    /// Records the source frame size; with auto-detection on, the source
    /// orientation follows it.
    pub fn set_source_dimensions(&mut self, width: u32, height: u32) {
        self.source_width = width;
        self.source_height = height;
        if self.auto_detect_orientation {
            self.source_orientation = Orientation::detect(width, height);
        }
    }

    pub fn outputs(&self) -> &[Output] {
        &self.outputs
    }

    pub fn output(&self, index: usize) -> Option<&Output> {
        self.outputs.get(index)
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    pub fn enabled_output_count(&self) -> usize {
        self.outputs.iter().filter(|o| o.enabled).count()
    }

    pub(crate) fn check_index(&self, index: usize) -> Result<()> {
        if index < self.outputs.len() {
            Ok(())
        } else {
            Err(ChannelError::InvalidOutputIndex {
                index,
                len: self.outputs.len(),
            })
        }
    }

    pub(crate) fn position(&self, id: OutputId) -> Option<usize> {
        self.outputs.iter().position(|o| o.id == id)
    }

    pub(crate) fn record_error(&mut self, err: &ChannelError) {
        self.last_error = Some(err.to_string());
    }

    /// Remote ids are positional, so the output list of a channel with a
    /// live process must keep its shape.
    fn ensure_stopped(&self, operation: &'static str) -> Result<()> {
        match self.status {
            ChannelStatus::Inactive | ChannelStatus::Error => Ok(()),
            status => Err(ChannelError::invalid_state(operation, status)),
        }
    }

    // Output management

    /// Appends an output. `None` encoding means "same as the source".
    /// Returns the index of the new output.
    pub fn add_output(
        &mut self,
        service: StreamingService,
        stream_key: &str,
        orientation: Orientation,
        encoding: Option<EncodingSettings>,
    ) -> usize {
        let id = OutputId(self.next_output_id);
        self.next_output_id += 1;
        self.outputs.push(Output::new(
            id,
            service,
            stream_key,
            orientation,
            encoding.unwrap_or_default(),
            self.reconnect.auto_reconnect,
        ));
        debug!(
            channel = %self.name,
            service = %service,
            index = self.outputs.len() - 1,
            "Output added"
        );
        self.outputs.len() - 1
    }

    /// Removes the output at `index`. Later outputs shift down by one; links
    /// that involved the removed output are cleared, other links are kept.
    ///
    /// Refused while the channel is running: use [`Channel::bulk_stop_outputs`]
    /// to take an output off the air.
    pub fn remove_output(&mut self, index: usize) -> Result<()> {
        self.ensure_stopped("remove output")?;
        self.check_index(index)?;
        let removed = self.outputs.remove(index);
        for output in &mut self.outputs {
            if output.backup == Some(removed.id) {
                output.backup = None;
                output.failover_active = false;
            }
            if output.primary == Some(removed.id) {
                output.primary = None;
                output.failover_active = false;
            }
        }
        debug!(channel = %self.name, service = %removed.service, index, "Output removed");
        Ok(())
    }

    pub fn set_output_enabled(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.check_index(index)?;
        self.outputs[index].enabled = enabled;
        Ok(())
    }

    pub fn update_output_encoding(
        &mut self,
        index: usize,
        encoding: EncodingSettings,
    ) -> Result<()> {
        self.check_index(index)?;
        self.outputs[index].encoding = encoding;
        Ok(())
    }

    pub fn set_output_auto_reconnect(&mut self, index: usize, enabled: bool) -> Result<()> {
        self.check_index(index)?;
        self.outputs[index].auto_reconnect_enabled = enabled;
        Ok(())
    }

    pub fn set_output_stream_key(&mut self, index: usize, stream_key: &str) -> Result<()> {
        self.check_index(index)?;
        self.outputs[index].stream_key = zeroize::Zeroizing::new(stream_key.to_string());
        Ok(())
    }

    /// Overrides the platform ingest URL (custom servers). `None` restores it.
    pub fn set_output_url(&mut self, index: usize, url: Option<&str>) -> Result<()> {
        self.check_index(index)?;
        self.outputs[index].custom_url = url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty());
        Ok(())
    }

    // Backup links

    pub fn backup_index(&self, index: usize) -> Option<usize> {
        self.outputs.get(index)?.backup.and_then(|id| self.position(id))
    }

    pub fn primary_index(&self, index: usize) -> Option<usize> {
        self.outputs.get(index)?.primary.and_then(|id| self.position(id))
    }

    /// True if following backup links from `start` reaches `target`.
    fn chain_reaches(&self, start: OutputId, target: OutputId) -> bool {
        let mut current = Some(start);
        let mut steps = 0;
        while let Some(id) = current {
            if id == target {
                return true;
            }
            steps += 1;
            if steps > self.outputs.len() {
                // Already cyclic, treat as reaching everything
                return true;
            }
            current = self
                .position(id)
                .and_then(|pos| self.outputs[pos].backup);
        }
        false
    }

    /// Declares `backup_index` as the failover target of `primary_index`.
    ///
    /// Rejected when the chain starting at the backup leads back to the
    /// primary. A previous backup of the primary, or a previous primary of
    /// the backup, is detached.
    pub fn set_output_backup(&mut self, primary_index: usize, backup_index: usize) -> Result<()> {
        self.check_index(primary_index)?;
        self.check_index(backup_index)?;
        if primary_index == backup_index {
            return Err(ChannelError::SelfBackup(primary_index));
        }

        let primary_id = self.outputs[primary_index].id;
        let backup_id = self.outputs[backup_index].id;

        if self.outputs[primary_index].backup == Some(backup_id) {
            return Ok(());
        }
        if self.chain_reaches(backup_id, primary_id) {
            return Err(ChannelError::BackupCycle {
                primary: primary_index,
                backup: backup_index,
            });
        }

        if let Some(old_backup) = self.backup_index(primary_index) {
            self.outputs[old_backup].primary = None;
        }
        if let Some(old_primary) = self.primary_index(backup_index) {
            self.outputs[old_primary].backup = None;
        }

        self.outputs[primary_index].backup = Some(backup_id);
        self.outputs[backup_index].primary = Some(primary_id);

        info!(
            channel = %self.name,
            primary = %self.outputs[primary_index].service,
            backup = %self.outputs[backup_index].service,
            "Backup link set"
        );
        Ok(())
    }

    pub fn remove_output_backup(&mut self, primary_index: usize) -> Result<()> {
        self.check_index(primary_index)?;
        let Some(backup_index) = self.backup_index(primary_index) else {
            return Err(ChannelError::NoBackup(primary_index));
        };
        self.outputs[primary_index].backup = None;
        self.outputs[primary_index].failover_active = false;
        self.outputs[backup_index].primary = None;
        self.outputs[backup_index].failover_active = false;
        Ok(())
    }

    // Bulk operations

    fn bulk_result(&self, operation: &str, failed: usize, total: usize) -> Result<()> {
        info!(
            channel = %self.name,
            operation,
            succeeded = total - failed,
            failed,
            "Bulk operation complete"
        );
        if failed == 0 {
            Ok(())
        } else {
            Err(ChannelError::Bulk { failed, total })
        }
    }

    /// Enables or disables several outputs. Backup outputs are left alone
    /// when enabling: they only go live through failover.
    pub fn bulk_set_enabled(&mut self, indices: &[usize], enabled: bool) -> Result<()> {
        let mut failed = 0;
        for &index in indices {
            match self.outputs.get_mut(index) {
                Some(output) if enabled && output.is_backup() => {
                    debug!(index, "Skipping backup output");
                }
                Some(output) => output.enabled = enabled,
                None => failed += 1,
            }
        }
        self.bulk_result("set_enabled", failed, indices.len())
    }

    /// Removes several outputs, highest index first so the remaining
    /// indices stay valid.
    pub fn bulk_remove_outputs(&mut self, indices: &[usize]) -> Result<()> {
        self.ensure_stopped("remove outputs")?;
        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        let mut failed = indices.len() - sorted.len();
        for index in sorted {
            if self.remove_output(index).is_err() {
                failed += 1;
            }
        }
        self.bulk_result("remove", failed, indices.len())
    }

    pub fn bulk_update_encoding(
        &mut self,
        indices: &[usize],
        encoding: EncodingSettings,
    ) -> Result<()> {
        let mut failed = 0;
        for &index in indices {
            if self.update_output_encoding(index, encoding).is_err() {
                failed += 1;
            }
        }
        self.bulk_result("update_encoding", failed, indices.len())
    }

    // Live changes on a running process

    /// Changes the encoding profile of an output while the channel is live.
    ///
    /// The remote output is replaced under the same id. The stored profile
    /// only changes once the process accepted the new one; a disabled output
    /// just stores it.
    pub fn update_output_encoding_live(
        &mut self,
        session: &mut Session,
        index: usize,
        encoding: EncodingSettings,
    ) -> Result<()> {
        self.check_index(index)?;
        if self.status != ChannelStatus::Active {
            return Err(ChannelError::invalid_state("update encoding live", self.status));
        }
        if !self.outputs[index].enabled {
            self.outputs[index].encoding = encoding;
            return Ok(());
        }

        let previous = self.outputs[index].encoding;
        self.outputs[index].encoding = encoding;
        if let Err(err) = self.replace_remote_output(session, index) {
            self.outputs[index].encoding = previous;
            warn!(channel = %self.name, index, error = %err, "Live encoding update failed");
            self.record_error(&err);
            return Err(err);
        }
        self.outputs[index].mark_connected();
        info!(channel = %self.name, index, bitrate = encoding.bitrate, "Encoding updated live");
        Ok(())
    }

    /// Puts disabled outputs on the air of the running process.
    ///
    /// Outputs already enabled count as started; backup outputs are refused,
    /// they only go live through failover.
    pub fn bulk_start_outputs(&mut self, session: &mut Session, indices: &[usize]) -> Result<()> {
        if self.status != ChannelStatus::Active {
            return Err(ChannelError::invalid_state("start outputs", self.status));
        }
        let process_id = self.find_process_id(session).inspect_err(|err| self.record_error(err))?;

        let mut failed = 0;
        for &index in indices {
            match self.outputs.get(index) {
                None => {
                    warn!(channel = %self.name, index, "Invalid output index");
                    failed += 1;
                    continue;
                }
                Some(output) if output.enabled => continue,
                Some(output) if output.is_backup() => {
                    warn!(channel = %self.name, index, "Cannot start a backup output directly");
                    failed += 1;
                    continue;
                }
                Some(_) => {}
            }

            let Some(output) = self.process_output(index) else {
                failed += 1;
                continue;
            };
            match session.add_process_output(&process_id, &output) {
                Ok(()) => {}
                Err(err) if err.status_code() == Some(CONFLICT) => {
                    debug!(channel = %self.name, output = %output.id, "Output already present");
                }
                Err(err) => {
                    warn!(
                        channel = %self.name,
                        output = %output.id,
                        error = %err,
                        "Could not start output"
                    );
                    self.record_error(&ChannelError::from(err));
                    failed += 1;
                    continue;
                }
            }
            self.outputs[index].enabled = true;
            self.outputs[index].mark_connected();
        }
        self.bulk_result("start_outputs", failed, indices.len())
    }

    /// Takes outputs off the air of the running process and disables them.
    pub fn bulk_stop_outputs(&mut self, session: &mut Session, indices: &[usize]) -> Result<()> {
        if self.status != ChannelStatus::Active {
            return Err(ChannelError::invalid_state("stop outputs", self.status));
        }
        let process_id = self.find_process_id(session).inspect_err(|err| self.record_error(err))?;

        let mut failed = 0;
        for &index in indices {
            let Some(remote_id) = self.remote_output_id(index) else {
                warn!(channel = %self.name, index, "Invalid output index");
                failed += 1;
                continue;
            };
            if !self.outputs[index].enabled {
                continue;
            }
            match session.remove_process_output(&process_id, &remote_id) {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {
                    debug!(channel = %self.name, output = %remote_id, "Output already gone");
                }
                Err(err) => {
                    warn!(
                        channel = %self.name,
                        output = %remote_id,
                        error = %err,
                        "Could not stop output"
                    );
                    self.record_error(&ChannelError::from(err));
                    failed += 1;
                    continue;
                }
            }
            self.outputs[index].enabled = false;
            self.outputs[index].connected = false;
        }
        self.bulk_result("stop_outputs", failed, indices.len())
    }

    /// Removes then re-adds the output at `index` on the running process.
    fn replace_remote_output(&self, session: &mut Session, index: usize) -> Result<()> {
        let process_id = self.find_process_id(session)?;
        let output = self.process_output(index).ok_or(ChannelError::InvalidOutputIndex {
            index,
            len: self.outputs.len(),
        })?;
        match session.remove_process_output(&process_id, &output.id) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => {}
            Err(err) => return Err(err.into()),
        }
        session.add_process_output(&process_id, &output)?;
        Ok(())
    }

    pub fn set_health_monitoring(&mut self, enabled: bool, defaults: &crate::HealthDefaults) {
        if enabled && self.health.check_interval.is_zero() {
            self.health.check_interval = defaults.check_interval;
            self.health.failure_threshold = defaults.failure_threshold;
            self.reconnect.max_reconnect_attempts = defaults.max_reconnect_attempts;
            if self.reconnect.reconnect_delay.is_zero() {
                self.reconnect.reconnect_delay = defaults.reconnect_delay;
            }
        }
        self.health.enabled = enabled;
        self.reconnect.auto_reconnect = enabled;
        for output in &mut self.outputs {
            output.auto_reconnect_enabled = enabled;
        }
        info!(channel = %self.name, enabled, "Health monitoring updated");
    }

    // Remote mapping

    /// Remote identifier of the output at `index`: `{service name}_{index}`.
    pub fn remote_output_id(&self, index: usize) -> Option<String> {
        self.outputs
            .get(index)
            .map(|o| format!("{}_{}", o.service.name(), index))
    }

    pub(crate) fn effective_source_orientation(&self) -> Orientation {
        if self.auto_detect_orientation && self.source_width > 0 && self.source_height > 0 {
            Orientation::detect(self.source_width, self.source_height)
        } else {
            self.source_orientation
        }
    }

    pub(crate) fn process_output(&self, index: usize) -> Option<ProcessOutput> {
        let output = self.outputs.get(index)?;
        let source = self.effective_source_orientation();
        let video_filter =
            Orientation::video_filter(source, output.target_orientation).map(str::to_string);
        Some(ProcessOutput {
            id: format!("{}_{}", output.service.name(), index),
            url: output.push_url(),
            video_filter,
            options: output.encoding.encoder_options(),
        })
    }

    pub(crate) fn process_config(&self) -> ProcessConfig {
        let outputs = (0..self.outputs.len())
            .filter(|&i| self.outputs[i].enabled)
            .filter_map(|i| self.process_output(i))
            .collect();
        ProcessConfig {
            reference: self.id.clone(),
            input_url: self.input_url.clone(),
            outputs,
        }
    }

    /// Remote process running this channel.
    pub(crate) fn find_process(&self, session: &mut Session) -> Result<ProcessInfo> {
        let Some(reference) = self.process_reference.clone() else {
            return Err(ChannelError::MissingProcessReference);
        };
        session
            .find_process_by_reference(&reference)?
            .ok_or(ChannelError::ProcessNotFound(reference))
    }

    pub(crate) fn find_process_id(&self, session: &mut Session) -> Result<String> {
        self.find_process(session).map(|process| process.id)
    }

    // Lifecycle

    fn fail(&mut self, err: ChannelError) -> ChannelError {
        error!(channel = %self.name, error = %err, "Channel operation failed");
        self.status = ChannelStatus::Error;
        self.record_error(&err);
        err
    }

    /// Creates and starts the remote process. Succeeds immediately when
    /// already active.
    pub fn start(&mut self, session: &mut Session) -> Result<()> {
        match self.status {
            ChannelStatus::Active => {
                debug!(channel = %self.name, "Channel already active");
                return Ok(());
            }
            ChannelStatus::Inactive | ChannelStatus::Error => {}
            status => return Err(ChannelError::invalid_state("start", status)),
        }
        self.start_remote(session)?;
        self.status = ChannelStatus::Active;
        info!(channel = %self.name, outputs = self.enabled_output_count(), "Channel started");
        Ok(())
    }

    pub(crate) fn start_remote(&mut self, session: &mut Session) -> Result<()> {
        if self.enabled_output_count() == 0 {
            return Err(self.fail(ChannelError::NoEnabledOutputs));
        }
        if self.input_url.is_empty() {
            return Err(self.fail(ChannelError::MissingInputUrl));
        }

        // Left over from a failed stop
        if self.process_reference.is_some() {
            if let Err(err) = self.teardown(session) {
                return Err(self.fail(err));
            }
            self.process_reference = None;
        }

        self.status = ChannelStatus::Starting;
        let config = self.process_config();

        let process_id = match session.create_process(&config) {
            Ok(id) => id,
            Err(err) => return Err(self.fail(err.into())),
        };

        if let Err(err) = session.start_process(&process_id) {
            if let Err(cleanup) = session.delete_process(&process_id) {
                warn!(
                    channel = %self.name,
                    process = %process_id,
                    error = %cleanup,
                    "Failed to delete unstarted process"
                );
            }
            return Err(self.fail(err.into()));
        }

        self.process_reference = Some(config.reference);
        self.last_error = None;
        self.last_health_check = None;
        // Failover flags survive a restart
        for output in &mut self.outputs {
            output.connected = false;
            output.consecutive_failures = 0;
            output.last_health_check = None;
        }
        Ok(())
    }

    /// Stops and deletes the remote process. A missing remote process counts
    /// as stopped.
    pub fn stop(&mut self, session: &mut Session) -> Result<()> {
        match self.status {
            ChannelStatus::Inactive => return Ok(()),
            ChannelStatus::Active | ChannelStatus::Preview | ChannelStatus::Error => {}
            status => return Err(ChannelError::invalid_state("stop", status)),
        }
        self.stop_remote(session)?;
        info!(channel = %self.name, "Channel stopped");
        Ok(())
    }

    pub(crate) fn stop_remote(&mut self, session: &mut Session) -> Result<()> {
        self.status = ChannelStatus::Stopping;
        if let Err(err) = self.teardown(session) {
            return Err(self.fail(err));
        }
        self.process_reference = None;
        self.last_error = None;
        self.last_health_check = None;
        self.clear_preview();
        for output in &mut self.outputs {
            output.connected = false;
        }
        self.status = ChannelStatus::Inactive;
        Ok(())
    }

    fn teardown(&self, session: &mut Session) -> Result<()> {
        let Some(reference) = self.process_reference.clone() else {
            return Ok(());
        };
        let Some(process) = session.find_process_by_reference(&reference)? else {
            debug!(channel = %self.name, reference = %reference, "Remote process already gone");
            return Ok(());
        };
        match session.stop_process(&process.id) {
            Ok(()) => {}
            Err(err) if err.is_not_found() => return Ok(()),
            Err(err) => return Err(err.into()),
        }
        if let Err(err) = session.delete_process(&process.id) {
            warn!(
                channel = %self.name,
                process = %process.id,
                error = %err,
                "Failed to delete stopped process"
            );
        }
        Ok(())
    }

    pub fn restart(&mut self, session: &mut Session) -> Result<()> {
        self.stop(session)?;
        self.start(session)
    }
}
