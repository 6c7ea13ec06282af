use std::sync::Arc;
use std::time::Duration;

use polychannel::{
    ChannelError, ChannelManager, ChannelStatus, EncodingSettings, Orientation, StreamingService,
};
use polyrestreamer::{ConnectionSettings, ManualClock, MemoryTransport, Operation, Session};

type OutputSpec = (StreamingService, Option<EncodingSettings>);

/// Active, monitored channel with the given outputs.
fn active_channel(outputs: &[OutputSpec]) -> (ChannelManager, MemoryTransport, String) {
    let transport = MemoryTransport::new("admin", "secret");
    let settings = ConnectionSettings::new("localhost", 8080).with_credentials("admin", "secret");
    let session = Session::new(
        settings,
        Box::new(transport.clone()),
        Arc::new(ManualClock::new(1_000)),
    );
    let mut manager = ChannelManager::new(session);

    let channel = manager.create_channel("Live");
    channel.health.enabled = true;
    channel.health.check_interval = Duration::from_secs(30);
    channel.health.failure_threshold = 3;
    for (i, (service, encoding)) in outputs.iter().enumerate() {
        channel.add_output(*service, &format!("key{}", i), Orientation::Horizontal, *encoding);
    }
    let id = channel.id().to_string();
    manager.start_channel(&id).unwrap();
    (manager, transport, id)
}

fn remote_ids(transport: &MemoryTransport, id: &str) -> Vec<String> {
    let process = transport.process_by_reference(id).unwrap();
    transport.output_ids(&process.id)
}

#[test]
fn test_remove_output_refused_while_running() {
    use StreamingService::*;
    let (mut manager, transport, id) = active_channel(&[(YouTube, None), (Twitch, None)]);
    let channel = manager.get_channel_mut(&id).unwrap();

    assert!(matches!(
        channel.remove_output(0),
        Err(ChannelError::InvalidState { status: ChannelStatus::Active, .. })
    ));
    assert!(matches!(
        channel.bulk_remove_outputs(&[0, 1]),
        Err(ChannelError::InvalidState { .. })
    ));
    assert_eq!(channel.output_count(), 2);
    assert!(manager.check_health(&id).unwrap());
    assert_eq!(remote_ids(&transport, &id), vec!["YouTube_0", "Twitch_1"]);

    manager.stop_channel(&id).unwrap();
    let channel = manager.get_channel_mut(&id).unwrap();
    channel.remove_output(0).unwrap();
    manager.start_channel(&id).unwrap();
    assert_eq!(remote_ids(&transport, &id), vec!["Twitch_0"]);
}

#[test]
fn test_remove_output_refused_during_preview() {
    use StreamingService::*;
    let (mut manager, _, id) = active_channel(&[(YouTube, None)]);
    manager.stop_channel(&id).unwrap();
    manager.start_preview(&id, Duration::from_secs(60)).unwrap();

    let channel = manager.get_channel_mut(&id).unwrap();
    assert!(channel.remove_output(0).unwrap_err().is_input_error());
    assert_eq!(channel.output_count(), 1);
}

#[test]
fn test_bulk_stop_then_start_outputs() {
    use StreamingService::*;
    let (mut manager, transport, id) =
        active_channel(&[(YouTube, None), (Twitch, None), (Kick, None)]);

    let (channel, session) = manager.channel_with_session(&id).unwrap();
    let err = channel.bulk_stop_outputs(session, &[1, 9]).unwrap_err();
    assert!(matches!(err, ChannelError::Bulk { failed: 1, total: 2 }));
    assert!(!channel.output(1).unwrap().is_enabled());
    assert_eq!(remote_ids(&transport, &id), vec!["YouTube_0", "Kick_2"]);

    // Stopped outputs are not inspected by the monitor
    assert!(manager.check_health(&id).unwrap());

    let (channel, session) = manager.channel_with_session(&id).unwrap();
    // Output 0 is already on the air and counts as started
    channel.bulk_start_outputs(session, &[0, 1]).unwrap();
    let output = channel.output(1).unwrap();
    assert!(output.is_enabled());
    assert!(output.is_connected());
    assert_eq!(remote_ids(&transport, &id), vec!["YouTube_0", "Kick_2", "Twitch_1"]);
    assert_eq!(transport.calls(Operation::AddOutput), 1);
}

#[test]
fn test_backup_output_cannot_be_started_directly() {
    use StreamingService::*;
    let (mut manager, transport, id) = active_channel(&[(YouTube, None), (Twitch, None)]);
    let (channel, session) = manager.channel_with_session(&id).unwrap();
    channel.set_output_backup(0, 1).unwrap();
    channel.bulk_stop_outputs(session, &[1]).unwrap();

    let err = channel.bulk_start_outputs(session, &[1]).unwrap_err();
    assert!(matches!(err, ChannelError::Bulk { failed: 1, total: 1 }));
    assert!(!channel.output(1).unwrap().is_enabled());
    assert_eq!(remote_ids(&transport, &id), vec!["YouTube_0"]);
}

#[test]
fn test_bulk_live_operations_require_active_channel() {
    use StreamingService::*;
    let (mut manager, transport, id) = active_channel(&[(YouTube, None)]);
    manager.stop_channel(&id).unwrap();

    let (channel, session) = manager.channel_with_session(&id).unwrap();
    assert!(channel.bulk_stop_outputs(session, &[0]).unwrap_err().is_input_error());
    assert!(channel.bulk_start_outputs(session, &[0]).unwrap_err().is_input_error());
    assert!(channel
        .update_output_encoding_live(session, 0, EncodingSettings::default())
        .unwrap_err()
        .is_input_error());
    assert!(channel.output(0).unwrap().is_enabled());
    assert_eq!(transport.calls(Operation::RemoveOutput), 0);
}

#[test]
fn test_encoding_reaches_remote_process() {
    use StreamingService::*;
    let hd = EncodingSettings::preset(1920, 1080, 6000, 160);
    let (_manager, transport, id) = active_channel(&[(YouTube, Some(hd)), (Twitch, None)]);
    let pid = transport.process_by_reference(&id).unwrap().id;

    let youtube = transport.output(&pid, "YouTube_0").unwrap();
    assert_eq!(youtube.options, hd.encoder_options());
    assert!(youtube.options.contains(&"6000k".to_string()));
    assert!(transport.output(&pid, "Twitch_1").unwrap().options.is_empty());
}

#[test]
fn test_live_encoding_update() {
    use StreamingService::*;
    let (mut manager, transport, id) = active_channel(&[(YouTube, None), (Twitch, None)]);
    let pid = transport.process_by_reference(&id).unwrap().id;
    let sd = EncodingSettings::preset(1280, 720, 4500, 128);

    let (channel, session) = manager.channel_with_session(&id).unwrap();
    channel.update_output_encoding_live(session, 1, sd).unwrap();
    assert_eq!(channel.output(1).unwrap().encoding(), &sd);
    let pushed = transport.output(&pid, "Twitch_1").unwrap();
    assert!(pushed.options.contains(&"4500k".to_string()));
    assert_eq!(pushed.url.as_str(), "rtmp://live.twitch.tv/app/key1");

    // A refused update keeps the profile the process is running with
    transport.fail_next(Operation::AddOutput, 1);
    let low = EncodingSettings::preset(854, 480, 1500, 96);
    assert!(channel.update_output_encoding_live(session, 1, low).is_err());
    assert_eq!(channel.output(1).unwrap().encoding(), &sd);
    assert!(channel.last_error().is_some());
    assert_eq!(channel.status(), ChannelStatus::Active);

    // The monitor puts the output back with the kept profile
    channel.health.failure_threshold = 1;
    channel.set_output_auto_reconnect(1, true).unwrap();
    assert!(channel.check_health(session));
    let pushed = transport.output(&pid, "Twitch_1").unwrap();
    assert!(pushed.options.contains(&"4500k".to_string()));
}
