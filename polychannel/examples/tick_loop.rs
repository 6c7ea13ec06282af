//! Drives a channel manager through a few scheduler ticks against an
//! in-memory Restreamer, breaking an output halfway to show the health
//! monitor repairing it.
//!
//! Set `POLYEMESIS_LIVE=1` to talk to the Restreamer configured in
//! `~/.polyemesis/config.yaml` instead.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use polychannel::{ChannelConfigExt, ChannelManager, Orientation, StreamingService};
use polyconfig::get_config;
use polyrestreamer::{
    ConnectionSettings, ManualClock, MemoryTransport, RestreamerConfigExt, Session,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

fn init_tracing(level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

fn main() -> Result<()> {
    let config = get_config();
    init_tracing(&config.get_log_level());

    let live = env::var("POLYEMESIS_LIVE").is_ok();
    let transport = MemoryTransport::new("admin", "demo");
    let clock = Arc::new(ManualClock::new(1_700_000_000));

    let session = if live {
        Session::connect(config.get_connection_settings()?)
    } else {
        let settings = ConnectionSettings::new("localhost", 8080).with_credentials("admin", "demo");
        Session::new(settings, Box::new(transport.clone()), clock.clone())
    };

    let mut manager = ChannelManager::new(session);
    let defaults = config.get_health_defaults();

    let channel = manager.create_channel("Demo");
    channel.add_output(StreamingService::YouTube, "yt-demo", Orientation::Horizontal, None);
    channel.add_output(StreamingService::TikTok, "tt-demo", Orientation::Vertical, None);
    channel.set_source_dimensions(1920, 1080);
    channel.set_health_monitoring(true, &defaults);
    let id = channel.id().to_string();

    manager.start_channel(&id)?;

    for round in 0..6 {
        if round == 2 && !live {
            if let Some(process) = transport.process_by_reference(&id) {
                transport.drop_output(&process.id, "TikTok_1");
                info!("Simulated TikTok output drop");
            }
        }

        let report = manager.tick();
        info!(
            round,
            checked = report.checked,
            unhealthy = report.unhealthy.len(),
            "Tick"
        );

        if let Some(channel) = manager.get_channel(&id) {
            for output in channel.outputs() {
                info!(
                    service = %output.service(),
                    connected = output.is_connected(),
                    failures = output.consecutive_failures(),
                    "Output state"
                );
            }
        }

        if live {
            std::thread::sleep(defaults.check_interval);
        } else {
            clock.advance(defaults.check_interval.max(Duration::from_secs(1)));
        }
    }

    manager.stop_all()?;
    Ok(())
}
