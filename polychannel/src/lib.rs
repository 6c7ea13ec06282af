//! Multi-destination channels on top of a Restreamer session.
//!
//! A [`Channel`] takes one input and pushes it to several [`Output`]s, each
//! bound to a [`StreamingService`]. The remote side is a single Restreamer
//! process per channel, driven through a [`polyrestreamer::Session`].
//!
//! Runtime behavior is tick driven and synchronous:
//!
//! - [`Channel::check_health`] compares expected outputs with the remote
//!   process and reconnects the ones that keep failing
//! - [`Channel::check_preview_timeout`] reports expired previews
//! - [`ChannelManager::tick`] runs both for every channel when due
//!
//! Nothing here spawns threads or sleeps on its own, except the reconnect
//! delay which goes through the session's [`polyrestreamer::Clock`].
//!
//! ```no_run
//! use polychannel::{ChannelManager, Orientation, StreamingService};
//! use polyrestreamer::{ConnectionSettings, Session};
//!
//! let settings = ConnectionSettings::new("localhost", 8080).with_credentials("admin", "secret");
//! let mut manager = ChannelManager::new(Session::connect(settings));
//!
//! let channel = manager.create_channel("Main show");
//! channel.add_output(StreamingService::Twitch, "live_xxx", Orientation::Horizontal, None);
//! let id = channel.id().to_string();
//!
//! manager.start_channel(&id)?;
//! loop {
//!     let report = manager.tick();
//!     if !report.unhealthy.is_empty() {
//!         eprintln!("unhealthy: {:?}", report.unhealthy);
//!     }
//!     std::thread::sleep(std::time::Duration::from_secs(1));
//! }
//! # Ok::<(), polychannel::ChannelError>(())
//! ```

pub mod channel;
pub mod config_ext;
pub mod errors;
pub mod health;
pub mod manager;
pub mod output;
pub mod preview;
pub mod reconnect;
pub mod service;
pub mod templates;

pub use channel::{Channel, ChannelStatus, DEFAULT_INPUT_URL, HealthPolicy, ReconnectPolicy};
pub use config_ext::{ChannelConfigExt, HealthDefaults};
pub use errors::{ChannelError, Result};
pub use manager::{ChannelManager, TickReport};
pub use output::{EncodingSettings, Output, OutputId};
pub use service::{Orientation, StreamingService};
pub use templates::{ChannelTemplate, builtin_templates};
