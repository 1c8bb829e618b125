//! Tests for the process-wide channel registry and connectivity flags.

mod common;

use std::time::Duration;

use routerlink_core::{Channel, ChannelConfig, ChannelRegistry, MockRouter, TransportKind};

use common::{complete_login, test_config, wait_until, RecordingEvents};

fn pipe_config(data_dir: &std::path::Path) -> ChannelConfig {
    let mut config = test_config(data_dir);
    config.server_uri = "pipe:///run/routerlink-test.sock".into();
    config.local_id = 8;
    config
}

#[test]
fn test_flag_broadcast_matches_transport_kind() {
    let dir_tcp = tempfile::tempdir().unwrap();
    let dir_pipe = tempfile::tempdir().unwrap();

    let tcp_router = MockRouter::new();
    let tcp_channel = Channel::with_transport(
        test_config(dir_tcp.path()),
        RecordingEvents::new(),
        None,
        Box::new(tcp_router.transport()),
    )
    .unwrap();

    let pipe_router = MockRouter::new();
    let pipe_channel = Channel::with_transport(
        pipe_config(dir_pipe.path()),
        RecordingEvents::new(),
        None,
        Box::new(pipe_router.transport()),
    )
    .unwrap();
    assert_eq!(pipe_channel.transport_kind(), TransportKind::Pipe);

    let registry = ChannelRegistry::new();
    registry.register(&tcp_channel);
    registry.register(&pipe_channel);
    assert_eq!(registry.live_count(), 2);

    // Internet up: only the TCP channel starts connecting.
    registry.set_internet_access(true);
    assert!(tcp_router.accept(Duration::from_secs(2)).is_some());
    assert!(pipe_router.accept(Duration::from_millis(200)).is_none());

    // Internet down: TCP disabled, pipe untouched.
    registry.set_internet_access(false);
    assert!(!registry.internet_access());
    assert!(wait_until(Duration::from_secs(2), || {
        !tcp_channel.diagnostics().connectivity_enabled
    }));
    assert!(pipe_channel.diagnostics().connectivity_enabled);

    // Pipe up: only the pipe channel starts connecting.
    registry.set_pipe_access(true);
    assert!(pipe_router.accept(Duration::from_secs(2)).is_some());
    assert!(tcp_router.accept(Duration::from_millis(200)).is_none());

    registry.shutdown();
}

#[test]
fn test_live_count_prunes_dropped_channels() {
    let dir = tempfile::tempdir().unwrap();
    let registry = ChannelRegistry::new();

    {
        let router = MockRouter::new();
        let channel = Channel::with_transport(
            test_config(dir.path()),
            RecordingEvents::new(),
            None,
            Box::new(router.transport()),
        )
        .unwrap();
        registry.register(&channel);
        assert_eq!(registry.live_count(), 1);
        channel.shutdown();
    }

    assert_eq!(registry.live_count(), 0);
}

#[test]
fn test_registry_shutdown_disconnects_all() {
    let dir = tempfile::tempdir().unwrap();
    let router = MockRouter::new();
    let events = RecordingEvents::new();
    let channel = Channel::with_transport(
        test_config(dir.path()),
        events.clone(),
        None,
        Box::new(router.transport()),
    )
    .unwrap();

    let registry = ChannelRegistry::new();
    registry.register(&channel);

    channel.connect();
    let _remote = complete_login(&router);
    assert!(wait_until(Duration::from_secs(2), || channel.is_connected()));

    registry.shutdown();
    assert!(wait_until(Duration::from_secs(2), || !channel.is_connected()));
    assert_eq!(registry.live_count(), 0);

    // Shut down channels do not try to come back.
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(router.connection_count(), 1);
}
