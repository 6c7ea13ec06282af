use std::sync::Arc;
use std::time::Duration;

use polychannel::{Channel, ChannelError, ChannelManager, Orientation, StreamingService};
use polyrestreamer::{ConnectionSettings, ManualClock, MemoryTransport, Operation, Session};

struct Fixture {
    manager: ChannelManager,
    transport: MemoryTransport,
    clock: Arc<ManualClock>,
    id: String,
}

impl Fixture {
    /// Active, monitored channel with the given outputs.
    fn new(services: &[StreamingService], threshold: u32, max_attempts: u32) -> Self {
        let transport = MemoryTransport::new("admin", "secret");
        let clock = Arc::new(ManualClock::new(1_000));
        let settings =
            ConnectionSettings::new("localhost", 8080).with_credentials("admin", "secret");
        let session = Session::new(settings, Box::new(transport.clone()), clock.clone());
        let mut manager = ChannelManager::new(session);

        let channel = manager.create_channel("Monitored");
        channel.health.enabled = true;
        channel.health.check_interval = Duration::from_secs(30);
        channel.health.failure_threshold = threshold;
        channel.reconnect.auto_reconnect = true;
        channel.reconnect.reconnect_delay = Duration::from_secs(2);
        channel.reconnect.max_reconnect_attempts = max_attempts;
        for service in services {
            channel.add_output(*service, "key", Orientation::Horizontal, None);
        }
        let id = channel.id().to_string();
        manager.start_channel(&id).unwrap();

        Self {
            manager,
            transport,
            clock,
            id,
        }
    }

    fn process_id(&self) -> String {
        self.transport.process_by_reference(&self.id).unwrap().id
    }

    fn check(&mut self) -> bool {
        self.manager.check_health(&self.id).unwrap()
    }

    fn channel(&self) -> &Channel {
        self.manager.get_channel(&self.id).unwrap()
    }

    fn channel_mut(&mut self) -> &mut Channel {
        self.manager.get_channel_mut(&self.id).unwrap()
    }
}

#[test]
fn test_healthy_pass_marks_outputs_connected() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Twitch], 3, 5);
    assert!(f.check());
    for output in f.channel().outputs() {
        assert!(output.is_connected());
        assert_eq!(output.consecutive_failures(), 0);
        assert_eq!(output.last_health_check(), Some(1_000));
    }
}

#[test]
fn test_monitoring_disabled_is_always_healthy() {
    let mut f = Fixture::new(&[StreamingService::YouTube], 1, 5);
    f.channel_mut().health.enabled = false;
    let pid = f.process_id();
    f.transport.forget_process(&pid);
    assert!(f.check());
    assert_eq!(f.transport.calls(Operation::GetProcessOutputs), 0);
}

#[test]
fn test_missing_output_counts_one_failure_per_pass() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Twitch], 3, 5);
    f.channel_mut().set_output_auto_reconnect(1, false).unwrap();
    let pid = f.process_id();
    assert!(f.transport.drop_output(&pid, "Twitch_1"));

    for expected in 1..=4 {
        assert!(!f.check());
        let output = f.channel().output(1).unwrap();
        assert!(!output.is_connected());
        assert_eq!(output.consecutive_failures(), expected);
    }
    // The present output is unaffected
    assert_eq!(f.channel().output(0).unwrap().consecutive_failures(), 0);
    assert_eq!(f.transport.calls(Operation::AddOutput), 0);

    // Manual reconnect brings it back and resets the counter
    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    assert!(channel.reconnect_output(session, 1).unwrap());
    assert_eq!(channel.output(1).unwrap().consecutive_failures(), 0);
    assert!(f.check());
}

#[test]
fn test_auto_reconnect_within_health_pass() {
    let mut f = Fixture::new(&[StreamingService::YouTube], 1, 5);
    let pid = f.process_id();
    assert!(f.transport.drop_output(&pid, "YouTube_0"));

    assert!(f.check());
    let output = f.channel().output(0).unwrap();
    assert!(output.is_connected());
    assert_eq!(output.consecutive_failures(), 0);
    assert_eq!(f.transport.output_ids(&pid), vec!["YouTube_0"]);
    assert_eq!(f.clock.total_slept(), Duration::from_secs(2));
}

#[test]
fn test_reconnect_waits_for_threshold() {
    let mut f = Fixture::new(&[StreamingService::Kick], 3, 5);
    let pid = f.process_id();
    f.transport.drop_output(&pid, "Kick_0");

    assert!(!f.check());
    assert!(!f.check());
    assert_eq!(f.transport.calls(Operation::AddOutput), 0);
    assert!(f.check());
    assert_eq!(f.transport.calls(Operation::AddOutput), 1);
}

#[test]
fn test_failed_reconnect_does_not_count_twice() {
    let mut f = Fixture::new(&[StreamingService::Kick], 1, 5);
    let pid = f.process_id();
    f.transport.drop_output(&pid, "Kick_0");
    f.transport.fail_next(Operation::AddOutput, 1);

    assert!(!f.check());
    let channel = f.channel();
    assert_eq!(channel.output(0).unwrap().consecutive_failures(), 1);
    assert!(channel.output(0).unwrap().is_enabled());
    assert!(channel.last_error().unwrap().contains("simulated failure"));

    // Next pass: 2 failures, reconnect succeeds
    assert!(f.check());
    assert_eq!(f.channel().output(0).unwrap().consecutive_failures(), 0);
}

#[test]
fn test_exhausted_output_is_disabled() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Kick], 1, 2);
    let pid = f.process_id();
    f.transport.drop_output(&pid, "Kick_1");
    f.transport.fail_next(Operation::AddOutput, 10);

    assert!(!f.check());
    assert!(f.channel().output(1).unwrap().is_enabled());

    assert!(f.check());
    let channel = f.channel();
    let output = channel.output(1).unwrap();
    assert!(!output.is_enabled());
    assert_eq!(output.consecutive_failures(), 2);
    assert!(channel.last_error().unwrap().contains("exhausted"));
    assert_eq!(channel.status(), polychannel::ChannelStatus::Active);

    // Never retried again automatically
    let adds = f.transport.calls(Operation::AddOutput);
    assert!(f.check());
    assert_eq!(f.transport.calls(Operation::AddOutput), adds);

    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    assert!(matches!(
        channel.reconnect_output(session, 1),
        Err(ChannelError::ReconnectExhausted { index: 1, attempts: 2 })
    ));
}

#[test]
fn test_stopped_remote_process_loses_every_output() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Twitch], 5, 5);
    let pid = f.process_id();
    f.transport.set_process_state(&pid, "failed");

    assert!(!f.check());
    assert!(f.channel().outputs().iter().all(|o| o.consecutive_failures() == 1));
    assert_eq!(f.transport.calls(Operation::GetProcessOutputs), 0);
}

#[test]
fn test_vanished_process_is_unhealthy_without_counting() {
    let mut f = Fixture::new(&[StreamingService::YouTube], 1, 5);
    let pid = f.process_id();
    f.transport.forget_process(&pid);

    assert!(!f.check());
    assert_eq!(f.channel().output(0).unwrap().consecutive_failures(), 0);
    assert!(f.channel().last_error().is_some());
}

#[test]
fn test_network_error_is_unhealthy_without_counting() {
    let mut f = Fixture::new(&[StreamingService::YouTube], 1, 5);
    f.transport.fail_next(Operation::ListProcesses, 1);

    assert!(!f.check());
    assert_eq!(f.channel().output(0).unwrap().consecutive_failures(), 0);
    assert!(f.manager.session().last_error().is_some());
    assert!(f.check());
}

#[test]
fn test_failover_swaps_remote_outputs() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Twitch], 3, 5);
    let pid = f.process_id();
    // Restart with the backup held back
    {
        let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
        channel.stop(session).unwrap();
        channel.set_output_backup(0, 1).unwrap();
        channel.set_output_enabled(1, false).unwrap();
        channel.start(session).unwrap();
    }
    let new_pid = f.process_id();
    assert_ne!(pid, new_pid);
    assert_eq!(f.transport.output_ids(&new_pid), vec!["YouTube_0"]);

    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    channel.trigger_failover(session, 0).unwrap();
    assert_eq!(f.transport.output_ids(&new_pid), vec!["Twitch_1"]);
    let channel = f.channel();
    assert!(!channel.output(0).unwrap().is_enabled());
    assert!(channel.output(1).unwrap().is_enabled());
    assert!(channel.output(1).unwrap().failover_active());

    // The disabled primary is not watched while failed over
    assert!(f.check());

    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    channel.restore_primary(session, 0).unwrap();
    assert_eq!(f.transport.output_ids(&new_pid), vec!["YouTube_0"]);
    assert!(!f.channel().output(1).unwrap().is_enabled());
    assert!(f.check());
}

#[test]
fn test_check_failover_after_threshold() {
    let mut f = Fixture::new(&[StreamingService::YouTube, StreamingService::Twitch], 2, 5);
    {
        let channel = f.channel_mut();
        channel.set_output_backup(0, 1).unwrap();
        channel.set_output_auto_reconnect(0, false).unwrap();
    }
    let pid = f.process_id();
    f.transport.drop_output(&pid, "YouTube_0");

    f.check();
    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    assert_eq!(channel.check_failover(session), 0);

    f.check();
    let (channel, session) = f.manager.channel_with_session(&f.id).unwrap();
    assert_eq!(channel.check_failover(session), 1);
    assert!(channel.output(0).unwrap().failover_active());
    // Already failed over
    assert_eq!(channel.check_failover(session), 0);
}

#[test]
fn test_stopped_process_is_never_healthy() {
    let mut f = Fixture::new(&[StreamingService::YouTube], 1, 3);
    let pid = f.process_id();
    assert!(f.transport.set_process_state(&pid, "failed"));

    for expected in 1..=2 {
        assert!(!f.check());
        let output = f.channel().output(0).unwrap();
        assert!(!output.is_connected());
        assert!(output.is_enabled());
        assert_eq!(output.consecutive_failures(), expected);
    }

    // Third pass exhausts the attempts: the output is given up on, and the
    // channel still reports the dead process
    assert!(!f.check());
    assert!(!f.channel().output(0).unwrap().is_enabled());
    assert!(!f.check());

    assert_eq!(f.transport.calls(Operation::AddOutput), 0);
    assert!(f.channel().last_error().is_some());
}
