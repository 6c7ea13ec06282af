//! Output templates: named presets of service, orientation and encoding.

use uuid::Uuid;

use crate::channel::Channel;
use crate::output::EncodingSettings;
use crate::service::{Orientation, StreamingService};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTemplate {
    pub id: String,
    pub name: String,
    pub service: StreamingService,
    pub orientation: Orientation,
    pub encoding: EncodingSettings,
    pub builtin: bool,
}

impl ChannelTemplate {
    /// User-defined template with a generated id.
    pub fn custom(
        name: &str,
        service: StreamingService,
        orientation: Orientation,
        encoding: EncodingSettings,
    ) -> Self {
        Self {
            id: format!("template_{}", Uuid::new_v4().simple()),
            name: name.to_string(),
            service,
            orientation,
            encoding,
            builtin: false,
        }
    }
}

struct BuiltinTemplate {
    id: &'static str,
    name: &'static str,
    service: StreamingService,
    orientation: Orientation,
    encoding: EncodingSettings,
}

const BUILTIN_TEMPLATES: [BuiltinTemplate; 6] = [
    BuiltinTemplate {
        id: "builtin_youtube_1080p60",
        name: "YouTube 1080p60",
        service: StreamingService::YouTube,
        orientation: Orientation::Horizontal,
        encoding: EncodingSettings::preset(1920, 1080, 6000, 128),
    },
    BuiltinTemplate {
        id: "builtin_youtube_720p60",
        name: "YouTube 720p60",
        service: StreamingService::YouTube,
        orientation: Orientation::Horizontal,
        encoding: EncodingSettings::preset(1280, 720, 4500, 128),
    },
    BuiltinTemplate {
        id: "builtin_twitch_1080p60",
        name: "Twitch 1080p60",
        service: StreamingService::Twitch,
        orientation: Orientation::Horizontal,
        encoding: EncodingSettings::preset(1920, 1080, 6000, 128),
    },
    BuiltinTemplate {
        id: "builtin_twitch_720p60",
        name: "Twitch 720p60",
        service: StreamingService::Twitch,
        orientation: Orientation::Horizontal,
        encoding: EncodingSettings::preset(1280, 720, 4500, 128),
    },
    BuiltinTemplate {
        id: "builtin_facebook_1080p",
        name: "Facebook 1080p",
        service: StreamingService::Facebook,
        orientation: Orientation::Horizontal,
        encoding: EncodingSettings::preset(1920, 1080, 4000, 128),
    },
    BuiltinTemplate {
        id: "builtin_tiktok_vertical",
        name: "TikTok Vertical",
        service: StreamingService::TikTok,
        orientation: Orientation::Vertical,
        encoding: EncodingSettings::preset(1080, 1920, 3000, 128),
    },
];

pub fn builtin_templates() -> Vec<ChannelTemplate> {
    BUILTIN_TEMPLATES
        .iter()
        .map(|t| ChannelTemplate {
            id: t.id.to_string(),
            name: t.name.to_string(),
            service: t.service,
            orientation: t.orientation,
            encoding: t.encoding,
            builtin: true,
        })
        .collect()
}

impl Channel {
    /// Adds an output configured from `template`. Returns its index.
    pub fn apply_template(&mut self, template: &ChannelTemplate, stream_key: &str) -> usize {
        self.add_output(
            template.service,
            stream_key,
            template.orientation,
            Some(template.encoding),
        )
    }
}
