//! Channel manager: owns the session and every channel, and offers the tick
//! entry point used by the external scheduler.

use std::time::Duration;

use polyrestreamer::Session;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{Channel, ChannelStatus};
use crate::errors::{ChannelError, Result};
use crate::output::EncodingSettings;
use crate::service::{Orientation, StreamingService};
use crate::templates::{ChannelTemplate, builtin_templates};

/// What one [`ChannelManager::tick`] did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Number of health passes run.
    pub checked: usize,
    /// Ids of channels whose health pass failed.
    pub unhealthy: Vec<String>,
    /// Ids of channels whose preview timed out and was cancelled.
    pub previews_expired: Vec<String>,
}

pub struct ChannelManager {
    session: Session,
    channels: Vec<Channel>,
    templates: Vec<ChannelTemplate>,
}

impl ChannelManager {
    pub fn new(session: Session) -> Self {
        let templates = builtin_templates();
        info!(templates = templates.len(), "Channel manager created");
        Self {
            session,
            channels: Vec::new(),
            templates,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    fn generate_id() -> String {
        format!("channel_{}", Uuid::new_v4().simple())
    }

    /// Creates an inactive channel with no outputs. Any name is accepted.
    pub fn create_channel(&mut self, name: &str) -> &mut Channel {
        let channel = Channel::new(Self::generate_id(), name);
        info!(channel = %channel.name(), id = %channel.id(), "Channel created");
        self.channels.push(channel);
        let last = self.channels.len() - 1;
        &mut self.channels[last]
    }

    /// Removes a channel, stopping it first when it is running.
    pub fn delete_channel(&mut self, id: &str) -> Result<()> {
        let position = self
            .channels
            .iter()
            .position(|c| c.id() == id)
            .ok_or_else(|| ChannelError::ChannelNotFound(id.to_string()))?;

        if self.channels[position].status() != ChannelStatus::Inactive {
            self.channels[position].stop(&mut self.session)?;
        }
        let channel = self.channels.remove(position);
        info!(channel = %channel.name(), "Channel deleted");
        Ok(())
    }

    pub fn get_channel(&self, id: &str) -> Option<&Channel> {
        self.channels.iter().find(|c| c.id() == id)
    }

    pub fn get_channel_mut(&mut self, id: &str) -> Option<&mut Channel> {
        self.channels.iter_mut().find(|c| c.id() == id)
    }

    pub fn channel_at(&self, index: usize) -> Option<&Channel> {
        self.channels.get(index)
    }

    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    pub fn len(&self) -> usize {
        self.channels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    pub fn active_count(&self) -> usize {
        self.channels.iter().filter(|c| c.is_active()).count()
    }

    /// Borrows a channel together with the session, for operations that
    /// talk to the remote service.
    pub fn channel_with_session(&mut self, id: &str) -> Result<(&mut Channel, &mut Session)> {
        let channel = self
            .channels
            .iter_mut()
            .find(|c| c.id == id)
            .ok_or_else(|| ChannelError::ChannelNotFound(id.to_string()))?;
        Ok((channel, &mut self.session))
    }

    pub fn start_channel(&mut self, id: &str) -> Result<()> {
        let (channel, session) = self.channel_with_session(id)?;
        channel.start(session)
    }

    pub fn stop_channel(&mut self, id: &str) -> Result<()> {
        let (channel, session) = self.channel_with_session(id)?;
        channel.stop(session)
    }

    pub fn restart_channel(&mut self, id: &str) -> Result<()> {
        let (channel, session) = self.channel_with_session(id)?;
        channel.restart(session)
    }

    /// Starts every channel flagged `auto_start`.
    pub fn start_all(&mut self) -> Result<()> {
        info!(channels = self.channels.len(), "Starting all channels");
        let mut total = 0;
        let mut failed = 0;
        for channel in self.channels.iter_mut().filter(|c| c.auto_start) {
            total += 1;
            if let Err(err) = channel.start(&mut self.session) {
                warn!(channel = %channel.name(), error = %err, "Channel failed to start");
                failed += 1;
            }
        }
        if failed == 0 {
            Ok(())
        } else {
            Err(ChannelError::Bulk { failed, total })
        }
    }

    pub fn stop_all(&mut self) -> Result<()> {
        info!("Stopping all channels");
        let total = self.channels.len();
        let mut failed = 0;
        for channel in &mut self.channels {
            if let Err(err) = channel.stop(&mut self.session) {
                warn!(channel = %channel.name(), error = %err, "Channel failed to stop");
                failed += 1;
            }
        }
        if failed == 0 {
            Ok(())
        } else {
            Err(ChannelError::Bulk { failed, total })
        }
    }

    /// Copies a channel's configuration and outputs under a new id.
    pub fn duplicate_channel(&mut self, id: &str, new_name: &str) -> Result<&mut Channel> {
        let source = self
            .get_channel(id)
            .ok_or_else(|| ChannelError::ChannelNotFound(id.to_string()))?;
        let copy = source.duplicate(Self::generate_id(), new_name);
        info!(source = %source.name(), channel = %new_name, "Channel duplicated");
        self.channels.push(copy);
        let last = self.channels.len() - 1;
        Ok(&mut self.channels[last])
    }

    pub fn start_preview(&mut self, id: &str, duration: Duration) -> Result<()> {
        let (channel, session) = self.channel_with_session(id)?;
        channel.start_preview(session, duration)
    }

    pub fn preview_to_live(&mut self, id: &str) -> Result<()> {
        let (channel, _) = self.channel_with_session(id)?;
        channel.preview_to_live()
    }

    pub fn cancel_preview(&mut self, id: &str) -> Result<()> {
        let (channel, session) = self.channel_with_session(id)?;
        channel.cancel_preview(session)
    }

    pub fn check_health(&mut self, id: &str) -> Result<bool> {
        let (channel, session) = self.channel_with_session(id)?;
        Ok(channel.check_health(session))
    }

    // Templates

    pub fn templates(&self) -> &[ChannelTemplate] {
        &self.templates
    }

    pub fn template(&self, id: &str) -> Option<&ChannelTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    pub fn template_at(&self, index: usize) -> Option<&ChannelTemplate> {
        self.templates.get(index)
    }

    pub fn create_template(
        &mut self,
        name: &str,
        service: StreamingService,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> &ChannelTemplate {
        let template = ChannelTemplate::custom(name, service, orientation, encoding);
        info!(template = %name, "Template created");
        self.templates.push(template);
        let last = self.templates.len() - 1;
        &self.templates[last]
    }

    /// Deletes a user template. Built-in templates are read-only.
    pub fn delete_template(&mut self, id: &str) -> Result<()> {
        let position = self
            .templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| ChannelError::TemplateNotFound(id.to_string()))?;
        if self.templates[position].builtin {
            return Err(ChannelError::BuiltinTemplate(id.to_string()));
        }
        self.templates.remove(position);
        Ok(())
    }

    /// Adds an output built from a template to a channel. Returns the new
    /// output's index.
    pub fn apply_template(
        &mut self,
        channel_id: &str,
        template_id: &str,
        stream_key: &str,
    ) -> Result<usize> {
        let template = self
            .template(template_id)
            .cloned()
            .ok_or_else(|| ChannelError::TemplateNotFound(template_id.to_string()))?;
        let channel = self
            .get_channel_mut(channel_id)
            .ok_or_else(|| ChannelError::ChannelNotFound(channel_id.to_string()))?;
        let index = channel.apply_template(&template, stream_key);
        info!(channel = %channel.name(), template = %template.name, "Template applied");
        Ok(index)
    }

    /// Runs whatever is due: health passes on active channels whose
    /// interval elapsed, and cancellation of timed-out previews. A preview
    /// whose cancellation failed is retried on the next tick.
    pub fn tick(&mut self) -> TickReport {
        let now = self.session.now();
        let mut report = TickReport::default();

        for channel in &mut self.channels {
            match channel.status() {
                ChannelStatus::Active if channel.health_check_due(now) => {
                    report.checked += 1;
                    if !channel.check_health(&mut self.session) {
                        report.unhealthy.push(channel.id().to_string());
                    }
                }
                // ERROR with preview mode still on: an earlier cancel failed
                ChannelStatus::Preview | ChannelStatus::Error
                    if channel.check_preview_timeout(now) =>
                {
                    debug!(channel = %channel.name(), "Preview timed out");
                    match channel.cancel_preview(&mut self.session) {
                        Ok(()) => report.previews_expired.push(channel.id().to_string()),
                        Err(err) => {
                            warn!(
                                channel = %channel.name(),
                                error = %err,
                                "Could not cancel timed-out preview"
                            );
                        }
                    }
                }
                _ => {}
            }
        }
        report
    }
}
