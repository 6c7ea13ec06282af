use polyrestreamer::RestreamerError;
use thiserror::Error;

use crate::channel::ChannelStatus;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),
    #[error("Output index {index} out of range ({len} outputs)")]
    InvalidOutputIndex { index: usize, len: usize },
    #[error("Output {0} cannot be its own backup")]
    SelfBackup(usize),
    #[error("Backup link {primary} -> {backup} would create a cycle")]
    BackupCycle { primary: usize, backup: usize },
    #[error("Output {0} has no backup")]
    NoBackup(usize),
    #[error("Output {0} is not failed over")]
    NoActiveFailover(usize),
    #[error("Cannot {operation} while channel is {status}")]
    InvalidState {
        operation: &'static str,
        status: ChannelStatus,
    },
    #[error("No enabled outputs configured")]
    NoEnabledOutputs,
    #[error("Channel has no input URL")]
    MissingInputUrl,
    #[error("Active channel has no process reference")]
    MissingProcessReference,
    #[error("Remote process not found for reference {0}")]
    ProcessNotFound(String),
    #[error("Remote process is not running (state: {0})")]
    ProcessNotRunning(String),
    #[error("Reconnect attempts exhausted for output {index} after {attempts} failures")]
    ReconnectExhausted { index: usize, attempts: u32 },
    #[error("Template not found: {0}")]
    TemplateNotFound(String),
    #[error("Built-in template {0} cannot be deleted")]
    BuiltinTemplate(String),
    #[error("{failed} of {total} outputs failed")]
    Bulk { failed: usize, total: usize },
    #[error("Restreamer error: {0}")]
    Restreamer(#[from] RestreamerError),
}

impl ChannelError {
    pub fn invalid_state(operation: &'static str, status: ChannelStatus) -> Self {
        ChannelError::InvalidState { operation, status }
    }

    /// Input errors leave the channel untouched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            ChannelError::ChannelNotFound(_)
                | ChannelError::InvalidOutputIndex { .. }
                | ChannelError::SelfBackup(_)
                | ChannelError::BackupCycle { .. }
                | ChannelError::NoBackup(_)
                | ChannelError::InvalidState { .. }
                | ChannelError::TemplateNotFound(_)
                | ChannelError::BuiltinTemplate(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;
