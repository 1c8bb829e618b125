//! Shared test support: recording event sink, config and login helpers.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use routerlink_core::{
    ChannelConfig, ChannelError, ChannelEvents, Command, MockRemote, MockRouter,
};

/// One observed upward callback.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Message { routing_id: u64, payload: Vec<u8> },
    Confirmed(u32),
    RouterData(Vec<u8>),
    Connectivity(bool),
    Error(String),
}

/// Event sink that records every callback for later assertions.
pub struct RecordingEvents {
    events: Mutex<Vec<Event>>,
    cv: Condvar,
}

impl RecordingEvents {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingEvents {
            events: Mutex::new(Vec::new()),
            cv: Condvar::new(),
        })
    }

    pub fn snapshot(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    /// Blocks until the predicate holds over the recorded events, or the
    /// timeout elapses. Returns the predicate's final verdict.
    pub fn wait_for(&self, timeout: Duration, pred: impl Fn(&[Event]) -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut events = self.events.lock();
        while !pred(&events) {
            if self.cv.wait_until(&mut events, deadline).timed_out() {
                return pred(&events);
            }
        }
        true
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.lock().iter().filter(|e| pred(e)).count()
    }

    fn push(&self, event: Event) {
        self.events.lock().push(event);
        self.cv.notify_all();
    }
}

impl ChannelEvents for RecordingEvents {
    fn on_message_arrived(&self, routing_id: u64, payload: &[u8]) {
        self.push(Event::Message {
            routing_id,
            payload: payload.to_vec(),
        });
    }

    fn on_delivery_confirmed(&self, data_id: u32) {
        self.push(Event::Confirmed(data_id));
    }

    fn on_router_data(&self, payload: &[u8]) {
        self.push(Event::RouterData(payload.to_vec()));
    }

    fn on_connectivity_changed(&self, connected: bool) {
        self.push(Event::Connectivity(connected));
    }

    fn on_error(&self, error: &ChannelError) {
        self.push(Event::Error(error.to_string()));
    }
}

/// Config with test-friendly timings; the mock transport ignores the
/// host, but the URI still selects the TCP transport kind.
pub fn test_config(data_dir: &std::path::Path) -> ChannelConfig {
    ChannelConfig::builder()
        .server_uri("tcp://router.test:5222")
        .domain(1)
        .local_id(7)
        .data_dir(data_dir)
        .connect_timeout_ms(1_000)
        .send_timeout_base_ms(500)
        .login_grace_ms(500)
        .reconnect_delay_ms(100)
        .keep_alive_interval_ms(60_000)
        .build()
        .expect("valid test config")
}

/// Accepts the pending connection and plays the router's side of the
/// login handshake.
pub fn complete_login(router: &MockRouter) -> MockRemote {
    let mut remote = router
        .accept(Duration::from_secs(2))
        .expect("no connection attempt");
    let login = remote
        .read_frame(Duration::from_secs(2))
        .expect("no login frame");
    assert_eq!(login.command, Command::ConnectionEstablished);
    remote.confirm(&login.payload).expect("confirm login");
    remote
}

/// Polls a condition until it holds or the timeout elapses.
pub fn wait_until(timeout: Duration, pred: impl Fn() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if pred() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    pred()
}
