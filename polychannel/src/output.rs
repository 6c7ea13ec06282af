//! One streamed destination of a channel.

use std::fmt;

use polyrestreamer::SecretString;
use zeroize::Zeroizing;

use crate::service::{Orientation, StreamingService};

/// Encoding profile of an output. Zero fields mean "same as the source".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncodingSettings {
    pub width: u32,
    pub height: u32,
    /// Video bitrate in kbps
    pub bitrate: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    /// Audio bitrate in kbps
    pub audio_bitrate: u32,
    pub audio_track: u32,
    /// Bandwidth cap in kbps
    pub max_bandwidth: u32,
    pub low_latency: bool,
}

impl EncodingSettings {
    pub const fn preset(width: u32, height: u32, bitrate: u32, audio_bitrate: u32) -> Self {
        Self {
            width,
            height,
            bitrate,
            fps_num: 0,
            fps_den: 0,
            audio_bitrate,
            audio_track: 0,
            max_bandwidth: 0,
            low_latency: false,
        }
    }

    /// Encoder arguments for this profile. Empty for the default profile,
    /// which keeps the source parameters.
    pub fn encoder_options(&self) -> Vec<String> {
        let mut options = Vec::new();
        if self.width > 0 && self.height > 0 {
            options.push("-s".to_string());
            options.push(format!("{}x{}", self.width, self.height));
        }
        if self.bitrate > 0 {
            options.push("-b:v".to_string());
            options.push(format!("{}k", self.bitrate));
        }
        if self.fps_num > 0 {
            options.push("-r".to_string());
            options.push(match self.fps_den {
                0 | 1 => self.fps_num.to_string(),
                den => format!("{}/{}", self.fps_num, den),
            });
        }
        if self.audio_bitrate > 0 {
            options.push("-b:a".to_string());
            options.push(format!("{}k", self.audio_bitrate));
        }
        if self.audio_track > 0 {
            options.push("-map".to_string());
            options.push(format!("0:a:{}", self.audio_track));
        }
        if self.max_bandwidth > 0 {
            options.push("-maxrate".to_string());
            options.push(format!("{}k", self.max_bandwidth));
            options.push("-bufsize".to_string());
            options.push(format!("{}k", self.max_bandwidth.saturating_mul(2)));
        }
        if self.low_latency {
            options.push("-tune".to_string());
            options.push("zerolatency".to_string());
        }
        options
    }
}

/// Stable identity of an output inside its channel. Unlike the position,
/// it survives the removal of other outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputId(pub(crate) u32);

impl fmt::Display for OutputId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone)]
pub struct Output {
    pub(crate) id: OutputId,
    pub(crate) service: StreamingService,
    pub(crate) stream_key: SecretString,
    pub(crate) custom_url: Option<String>,
    pub(crate) target_orientation: Orientation,
    pub(crate) encoding: EncodingSettings,
    pub(crate) enabled: bool,
    pub(crate) connected: bool,
    pub(crate) consecutive_failures: u32,
    pub(crate) auto_reconnect_enabled: bool,
    pub(crate) last_health_check: Option<u64>,
    pub(crate) backup: Option<OutputId>,
    pub(crate) primary: Option<OutputId>,
    pub(crate) failover_active: bool,
    pub(crate) failover_start_time: Option<u64>,
}

impl Output {
    pub(crate) fn new(
        id: OutputId,
        service: StreamingService,
        stream_key: &str,
        target_orientation: Orientation,
        encoding: EncodingSettings,
        auto_reconnect_enabled: bool,
    ) -> Self {
        Self {
            id,
            service,
            stream_key: Zeroizing::new(stream_key.to_string()),
            custom_url: None,
            target_orientation,
            encoding,
            enabled: true,
            connected: false,
            consecutive_failures: 0,
            auto_reconnect_enabled,
            last_health_check: None,
            backup: None,
            primary: None,
            failover_active: false,
            failover_start_time: None,
        }
    }

    pub fn id(&self) -> OutputId {
        self.id
    }

    pub fn service(&self) -> StreamingService {
        self.service
    }

    pub fn service_name(&self) -> &'static str {
        self.service.name()
    }

    pub fn target_orientation(&self) -> Orientation {
        self.target_orientation
    }

    pub fn encoding(&self) -> &EncodingSettings {
        &self.encoding
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn auto_reconnect_enabled(&self) -> bool {
        self.auto_reconnect_enabled
    }

    /// Unix time of the last health pass that looked at this output.
    pub fn last_health_check(&self) -> Option<u64> {
        self.last_health_check
    }

    pub fn is_backup(&self) -> bool {
        self.primary.is_some()
    }

    pub fn failover_active(&self) -> bool {
        self.failover_active
    }

    pub fn failover_start_time(&self) -> Option<u64> {
        self.failover_start_time
    }

    pub fn custom_url(&self) -> Option<&str> {
        self.custom_url.as_deref()
    }

    /// Full RTMP URL the remote process pushes to. Contains the stream key.
    pub fn push_url(&self) -> SecretString {
        let base = match &self.custom_url {
            Some(url) => url.as_str(),
            None => self.service.ingest_url(self.target_orientation),
        };
        let base = base.trim_end_matches('/');
        if base.is_empty() {
            Zeroizing::new(self.stream_key.to_string())
        } else if self.stream_key.is_empty() {
            Zeroizing::new(base.to_string())
        } else {
            Zeroizing::new(format!("{}/{}", base, self.stream_key.as_str()))
        }
    }

    pub(crate) fn mark_connected(&mut self) {
        self.connected = true;
        self.consecutive_failures = 0;
    }

    pub(crate) fn mark_missing(&mut self) {
        self.connected = false;
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
    }

    pub(crate) fn reset_runtime_state(&mut self) {
        self.connected = false;
        self.consecutive_failures = 0;
        self.last_health_check = None;
        self.failover_active = false;
        self.failover_start_time = None;
    }
}

impl fmt::Debug for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Output")
            .field("id", &self.id)
            .field("service", &self.service)
            .field("stream_key", &"<redacted>")
            .field("target_orientation", &self.target_orientation)
            .field("enabled", &self.enabled)
            .field("connected", &self.connected)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("backup", &self.backup)
            .field("primary", &self.primary)
            .finish()
    }
}
