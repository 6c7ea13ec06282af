//! Streaming platforms and stream orientation.
//!
//! Platform specifics (display name, RTMP ingest) live in a static table
//! indexed by [`StreamingService`].

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamingService {
    Custom,
    Twitch,
    YouTube,
    Facebook,
    Kick,
    TikTok,
    Instagram,
    XTwitter,
}

struct ServiceInfo {
    name: &'static str,
    ingest: &'static str,
    /// Ingest used for vertical streams when it differs.
    vertical_ingest: Option<&'static str>,
}

const SERVICES: [ServiceInfo; 8] = [
    ServiceInfo {
        name: "Custom",
        ingest: "",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "Twitch",
        ingest: "rtmp://live.twitch.tv/app",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "YouTube",
        ingest: "rtmp://a.rtmp.youtube.com/live2",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "Facebook",
        ingest: "rtmps://live-api-s.facebook.com:443/rtmp",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "Kick",
        ingest: "rtmp://stream.kick.com/app",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "TikTok",
        ingest: "rtmp://live.tiktok.com/live/horizontal",
        vertical_ingest: Some("rtmp://live.tiktok.com/live"),
    },
    ServiceInfo {
        name: "Instagram",
        ingest: "rtmps://live-upload.instagram.com:443/rtmp",
        vertical_ingest: None,
    },
    ServiceInfo {
        name: "X (Twitter)",
        ingest: "rtmp://ingest.pscp.tv:80/x",
        vertical_ingest: None,
    },
];

impl StreamingService {
    pub const ALL: [StreamingService; 8] = [
        StreamingService::Custom,
        StreamingService::Twitch,
        StreamingService::YouTube,
        StreamingService::Facebook,
        StreamingService::Kick,
        StreamingService::TikTok,
        StreamingService::Instagram,
        StreamingService::XTwitter,
    ];

    fn info(self) -> &'static ServiceInfo {
        &SERVICES[self as usize]
    }

    pub fn name(self) -> &'static str {
        self.info().name
    }

    /// RTMP ingest for this platform. Empty for [`StreamingService::Custom`].
    /// `Auto` and `Square` use the horizontal ingest.
    pub fn ingest_url(self, orientation: Orientation) -> &'static str {
        let info = self.info();
        match (orientation, info.vertical_ingest) {
            (Orientation::Vertical, Some(vertical)) => vertical,
            _ => info.ingest,
        }
    }

    pub fn from_name(name: &str) -> Option<StreamingService> {
        Self::ALL
            .into_iter()
            .find(|s| s.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for StreamingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Orientation {
    #[default]
    Auto,
    Horizontal,
    Vertical,
    Square,
}

impl Orientation {
    /// Guesses the orientation from frame dimensions. Unknown (zero) sizes
    /// give `Auto`; aspect ratios within 5% of 1:1 count as square.
    pub fn detect(width: u32, height: u32) -> Orientation {
        if width == 0 || height == 0 {
            return Orientation::Auto;
        }
        let ratio = width as f64 / height as f64;
        if (ratio - 1.0).abs() < 0.05 {
            Orientation::Square
        } else if ratio < 1.0 {
            Orientation::Vertical
        } else {
            Orientation::Horizontal
        }
    }

    /// ffmpeg filter turning a `source` frame into a `target` one, `None`
    /// when no conversion is needed or possible.
    pub fn video_filter(source: Orientation, target: Orientation) -> Option<&'static str> {
        use Orientation::*;
        match (source, target) {
            (Auto, _) | (_, Auto) => None,
            (s, t) if s == t => None,
            (Horizontal, Vertical) => Some("crop=ih*9/16:ih,scale=1080:1920"),
            (Vertical, Horizontal) => Some("crop=iw:iw*9/16,scale=1920:1080"),
            (Square, Horizontal) => Some("scale=1920:1080,setsar=1"),
            (Square, Vertical) => Some("scale=1080:1920,setsar=1"),
            (_, Square) => Some("scale=1080:1080,setsar=1"),
            _ => None,
        }
    }
}

impl fmt::Display for Orientation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Orientation::Auto => "auto",
            Orientation::Horizontal => "horizontal",
            Orientation::Vertical => "vertical",
            Orientation::Square => "square",
        };
        f.write_str(name)
    }
}
