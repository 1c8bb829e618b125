// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Connection Lifecycle Engine
//!
//! Owns the transport and drives one connection through
//! `Disconnected -> Connecting -> AwaitingLogin -> LoggedIn` and back.
//! Runs the login handshake, the read loop, the write path with its
//! confirmation rendezvous, and the three timers (reconnect, idle
//! auto-disconnect, keep-alive). All connection state is mutated under
//! this instance's own critical section; inbound frames are handed to
//! the facade through a sequential dispatch queue.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::timer::{Scheduler, TaskId};
use crate::channel::{ChannelConfig, ChannelEvents, LicenseActivator};
use crate::error::ChannelError;
use crate::frame::{
    self, Command, Frame, FrameFlags, FrameHeader, LoginLicense, FRAME_HEADER_SIZE,
};
use crate::spool::Spooler;
use crate::transport::{ChannelStream, Transport};

/// Writes and payload reads proceed in bounded chunks of this size.
const IO_CHUNK: usize = 64 * 1024;

/// Base confirmation/read deadline plus the 0.01 Mbps floor rate
/// (0.8 ms per payload byte).
fn transfer_timeout(base_ms: u64, payload_len: usize) -> Duration {
    Duration::from_millis(base_ms + (payload_len as u64 * 4) / 5)
}

/// Connection lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    AwaitingLogin,
    LoggedIn,
}

/// Read-only view of the engine's connection state, for diagnostics.
#[derive(Debug, Clone)]
pub struct ConnectionStats {
    pub phase: ConnectionPhase,
    pub logged_in: bool,
    pub connectivity_enabled: bool,
    pub last_in: Option<Duration>,
    pub last_out: Option<Duration>,
    pub last_command_in: Option<Duration>,
    pub last_command_out: Option<Duration>,
    pub last_ping_sent: Option<Duration>,
    pub last_ping_received: Option<Duration>,
}

/// Receiver of decoded inbound frames (the channel facade).
pub trait FrameSink: Send + Sync {
    fn handle_frame(&self, frame: Frame);
}

struct ConnState {
    phase: ConnectionPhase,
    writer: Option<Box<dyn ChannelStream>>,
    logged_in: bool,
    connectivity_enabled: bool,
    login_data_id: Option<u32>,
    last_in: Option<Instant>,
    last_out: Option<Instant>,
    last_command_in: Option<Instant>,
    last_command_out: Option<Instant>,
    last_keep_alive_check: Option<Instant>,
    last_ping_sent: Option<Instant>,
    last_ping_received: Option<Instant>,
}

impl ConnState {
    fn new() -> Self {
        ConnState {
            phase: ConnectionPhase::Disconnected,
            writer: None,
            logged_in: false,
            connectivity_enabled: true,
            login_data_id: None,
            last_in: None,
            last_out: None,
            last_command_in: None,
            last_command_out: None,
            last_keep_alive_check: None,
            last_ping_sent: None,
            last_ping_received: None,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Waiting,
    Confirmed,
    Lost,
}

struct PendingConfirmation {
    data_id: u32,
    state: WaitState,
}

#[derive(Default)]
struct TimerSlots {
    reconnect: Option<TaskId>,
    idle: Option<TaskId>,
    keep_alive: Option<TaskId>,
}

#[derive(Default)]
struct EngineHooks {
    sink: Option<Weak<dyn FrameSink>>,
    spooler: Option<Weak<Spooler>>,
}

/// The per-channel connection engine.
pub struct ConnectionEngine {
    config: ChannelConfig,
    transport: Mutex<Box<dyn Transport>>,
    conn: Mutex<ConnState>,
    login_cv: Condvar,
    pending: Mutex<Option<PendingConfirmation>>,
    pending_cv: Condvar,
    write_gate: Mutex<()>,
    connecting: AtomicBool,
    generation: AtomicU64,
    scheduler: Scheduler,
    timers: Mutex<TimerSlots>,
    hooks: Mutex<EngineHooks>,
    dispatch_tx: Mutex<Option<mpsc::Sender<Frame>>>,
    events: Arc<dyn ChannelEvents>,
    activator: Option<Box<dyn LicenseActivator>>,
}

impl ConnectionEngine {
    pub fn new(
        transport: Box<dyn Transport>,
        config: ChannelConfig,
        events: Arc<dyn ChannelEvents>,
        activator: Option<Box<dyn LicenseActivator>>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<Frame>();

        let engine = Arc::new(ConnectionEngine {
            config,
            transport: Mutex::new(transport),
            conn: Mutex::new(ConnState::new()),
            login_cv: Condvar::new(),
            pending: Mutex::new(None),
            pending_cv: Condvar::new(),
            write_gate: Mutex::new(()),
            connecting: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            scheduler: Scheduler::new(),
            timers: Mutex::new(TimerSlots::default()),
            hooks: Mutex::new(EngineHooks::default()),
            dispatch_tx: Mutex::new(Some(tx)),
            events,
            activator,
        });

        // Sequential dispatcher: frames reach the facade in strict
        // arrival order, independent of the read loop's lifetime.
        let weak = Arc::downgrade(&engine);
        std::thread::Builder::new()
            .name("routerlink-dispatch".into())
            .spawn(move || {
                while let Ok(frame) = rx.recv() {
                    let Some(engine) = weak.upgrade() else { return };
                    let sink = engine
                        .hooks
                        .lock()
                        .sink
                        .as_ref()
                        .and_then(|s| s.upgrade());
                    if let Some(sink) = sink {
                        sink.handle_frame(frame);
                    }
                }
            })
            .expect("failed to spawn dispatch thread");

        engine
    }

    /// Wires the engine to its facade and spooler. Called once during
    /// channel construction.
    pub(crate) fn attach(&self, sink: Weak<dyn FrameSink>, spooler: Weak<Spooler>) {
        let mut hooks = self.hooks.lock();
        hooks.sink = Some(sink);
        hooks.spooler = Some(spooler);
    }

    // === Lifecycle ===

    /// Starts a connection attempt on a worker thread. Only one attempt
    /// runs at a time per instance; returns false (a no-op) when one is
    /// already running, the engine is not disconnected, or connectivity
    /// is disabled.
    pub fn connect(self: &Arc<Self>) -> bool {
        {
            let conn = self.conn.lock();
            if !conn.connectivity_enabled || conn.phase != ConnectionPhase::Disconnected {
                return false;
            }
        }
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return false;
        }

        let engine = self.clone();
        std::thread::Builder::new()
            .name("routerlink-connect".into())
            .spawn(move || engine.do_connect())
            .expect("failed to spawn connect thread");
        true
    }

    fn do_connect(self: Arc<Self>) {
        let gen = self.generation.load(Ordering::SeqCst);
        self.conn.lock().phase = ConnectionPhase::Connecting;

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let result = self.transport.lock().connect(connect_timeout);
        if let Err(e) = result {
            warn!(error = %e, "connection attempt failed");
            self.conn.lock().phase = ConnectionPhase::Disconnected;
            self.connecting.store(false, Ordering::SeqCst);
            self.events.on_error(&e);
            self.schedule_reconnect();
            return;
        }

        let (reader, writer) = {
            let transport = self.transport.lock();
            (transport.stream(), transport.stream())
        };
        let (Some(reader), Some(writer)) = (reader, writer) else {
            let e = ChannelError::ConnectionFailure("transport stream unavailable".into());
            self.conn.lock().phase = ConnectionPhase::Disconnected;
            self.transport.lock().disconnect();
            self.connecting.store(false, Ordering::SeqCst);
            self.events.on_error(&e);
            self.schedule_reconnect();
            return;
        };

        // A teardown may have raced the connect attempt; its generation
        // bump invalidates this socket.
        {
            let mut conn = self.conn.lock();
            if self.generation.load(Ordering::SeqCst) != gen || !conn.connectivity_enabled {
                conn.phase = ConnectionPhase::Disconnected;
                drop(conn);
                self.transport.lock().disconnect();
                self.connecting.store(false, Ordering::SeqCst);
                return;
            }
            let now = Instant::now();
            conn.writer = Some(writer);
            conn.phase = ConnectionPhase::AwaitingLogin;
            conn.logged_in = false;
            conn.last_in = Some(now);
            conn.last_out = Some(now);
            conn.last_ping_sent = None;
            conn.last_ping_received = None;
        }

        // Read loop first: the login confirmation arrives through it.
        let tx = self.dispatch_tx.lock().clone();
        let Some(tx) = tx else {
            // Shut down while connecting; drop the fresh socket again.
            self.connecting.store(false, Ordering::SeqCst);
            self.teardown(false);
            return;
        };
        let engine = self.clone();
        std::thread::Builder::new()
            .name("routerlink-read".into())
            .spawn(move || engine.read_loop(reader, gen, tx))
            .expect("failed to spawn read thread");

        // Login frame: domain + local id, plus the OEM license extension
        // when an activator is configured.
        let base = frame::login_payload(self.config.domain, self.config.local_id, None);
        let license = self.activator.as_ref().map(|activator| LoginLicense {
            mode: 1,
            oem_id: activator.oem_id(),
            signature: activator.sign(&base[1..13]),
        });
        let payload =
            frame::login_payload(self.config.domain, self.config.local_id, license.as_ref());
        self.conn.lock().login_data_id = Some(frame::payload_fingerprint(&payload));

        debug!(
            domain = self.config.domain,
            local_id = self.config.local_id,
            licensed = license.is_some(),
            "sending login frame"
        );
        let write_result = self.write_frame_bytes(&payload, FrameFlags::NONE);
        self.connecting.store(false, Ordering::SeqCst);
        if let Err(e) = write_result {
            // A deliberate teardown racing this attempt already cleaned
            // up; only a genuine write failure reschedules.
            if self.generation.load(Ordering::SeqCst) == gen {
                self.events.on_error(&e);
                self.teardown(true);
            }
            return;
        }

        // Wait for the login confirmation.
        let deadline = Instant::now()
            + Duration::from_millis(self.config.connect_timeout_ms + self.config.login_grace_ms);
        let logged_in = {
            let mut conn = self.conn.lock();
            while !conn.logged_in && conn.phase == ConnectionPhase::AwaitingLogin {
                if self.login_cv.wait_until(&mut conn, deadline).timed_out() {
                    break;
                }
            }
            conn.logged_in
        };
        if !logged_in && self.conn.lock().phase == ConnectionPhase::AwaitingLogin {
            self.events.on_error(&ChannelError::LoginTimeout);
            self.teardown(true);
        }
    }

    /// Tears the connection down. Idempotent and safe to call from any
    /// trigger (timer fire, read error, write error, user request)
    /// concurrently. With `reconnect`, schedules the next attempt after
    /// the fixed reconnect delay.
    pub(crate) fn teardown(self: &Arc<Self>, reconnect: bool) {
        let (writer, was_logged_in, was_down) = {
            let mut conn = self.conn.lock();
            let was_down =
                conn.phase == ConnectionPhase::Disconnected && conn.writer.is_none();
            let was_logged_in = conn.logged_in;
            if !was_down {
                self.generation.fetch_add(1, Ordering::SeqCst);
                conn.phase = ConnectionPhase::Disconnected;
                conn.logged_in = false;
                conn.login_data_id = None;
            }
            let writer = conn.writer.take();
            // Wake login waiters; they observe the phase change.
            self.login_cv.notify_all();
            (writer, was_logged_in, was_down)
        };

        if let Some(writer) = writer {
            writer.shutdown();
        }
        // Skip the transport lock while a connect attempt holds it; the
        // attempt observes the generation bump and cleans up itself.
        if !self.connecting.load(Ordering::SeqCst) {
            self.transport.lock().disconnect();
        }

        {
            let mut timers = self.timers.lock();
            if let Some(id) = timers.idle.take() {
                self.scheduler.cancel(id);
            }
            if let Some(id) = timers.keep_alive.take() {
                self.scheduler.cancel(id);
            }
        }

        // Fail the in-flight confirmation wait; the spool worker requeues
        // the payload at the queue front.
        {
            let mut pending = self.pending.lock();
            if let Some(wait) = pending.as_mut() {
                if wait.state == WaitState::Waiting {
                    wait.state = WaitState::Lost;
                    self.pending_cv.notify_all();
                }
            }
        }

        if !was_down {
            info!(reconnect, "connection torn down");
        }
        if was_logged_in {
            self.events.on_connectivity_changed(false);
        }
        if reconnect && self.conn.lock().connectivity_enabled {
            self.schedule_reconnect();
        }
    }

    /// User-initiated disconnect: tears down without scheduling a
    /// reconnect, leaving connectivity enabled for a later `connect()`.
    pub fn disconnect(self: &Arc<Self>) {
        if let Some(id) = self.timers.lock().reconnect.take() {
            self.scheduler.cancel(id);
        }
        self.teardown(false);
    }

    /// Enables or disables this instance's connectivity. Disabling tears
    /// down without scheduling a reconnect; enabling starts an attempt.
    pub fn set_connectivity(self: &Arc<Self>, enabled: bool) {
        self.conn.lock().connectivity_enabled = enabled;
        if enabled {
            self.connect();
        } else {
            if let Some(id) = self.timers.lock().reconnect.take() {
                self.scheduler.cancel(id);
            }
            self.teardown(false);
        }
    }

    /// True once logged in; spooled sends only proceed in this state.
    pub fn is_ready(&self) -> bool {
        let conn = self.conn.lock();
        conn.phase == ConnectionPhase::LoggedIn && conn.logged_in
    }

    pub fn phase(&self) -> ConnectionPhase {
        self.conn.lock().phase
    }

    /// Diagnostics snapshot; ages are relative to now.
    pub fn stats(&self) -> ConnectionStats {
        let conn = self.conn.lock();
        let now = Instant::now();
        let age = |t: Option<Instant>| t.map(|t| now.saturating_duration_since(t));
        ConnectionStats {
            phase: conn.phase,
            logged_in: conn.logged_in,
            connectivity_enabled: conn.connectivity_enabled,
            last_in: age(conn.last_in),
            last_out: age(conn.last_out),
            last_command_in: age(conn.last_command_in),
            last_command_out: age(conn.last_command_out),
            last_ping_sent: age(conn.last_ping_sent),
            last_ping_received: age(conn.last_ping_received),
        }
    }

    /// Stops timers, the dispatcher and the connection for good.
    pub fn shutdown(self: &Arc<Self>) {
        self.set_connectivity(false);
        self.scheduler.shutdown();
        *self.dispatch_tx.lock() = None;
    }

    // === Inbound signals (from the facade) ===

    /// Marks login complete: releases blocked sends, starts the
    /// keep-alive cycle and flushes one spooled item.
    pub(crate) fn login_confirmed(self: &Arc<Self>) {
        {
            let mut conn = self.conn.lock();
            if conn.phase != ConnectionPhase::AwaitingLogin || conn.logged_in {
                return;
            }
            let now = Instant::now();
            conn.logged_in = true;
            conn.phase = ConnectionPhase::LoggedIn;
            conn.last_keep_alive_check = Some(now);
            // The handshake round-trip counts as the first sign of life,
            // so a fresh connection survives its first keep-alive check.
            conn.last_ping_received = Some(now);
            self.login_cv.notify_all();
        }

        info!(local_id = self.config.local_id, "logged in to router");
        self.events.on_connectivity_changed(true);
        self.arm_keep_alive();
        self.arm_idle_timer();

        let spooler = self.hooks.lock().spooler.as_ref().and_then(|s| s.upgrade());
        if let Some(spooler) = spooler {
            spooler.send_next();
        }
    }

    /// Routes a received confirmation either to login completion or to
    /// the pending send rendezvous. Returns true when it completed the
    /// login handshake.
    pub(crate) fn confirmation_received(self: &Arc<Self>, data_id: u32) -> bool {
        let is_login = {
            let conn = self.conn.lock();
            !conn.logged_in && conn.login_data_id == Some(data_id)
        };
        if is_login {
            self.login_confirmed();
            return true;
        }

        let mut pending = self.pending.lock();
        if let Some(wait) = pending.as_mut() {
            if wait.data_id == data_id && wait.state == WaitState::Waiting {
                wait.state = WaitState::Confirmed;
                self.pending_cv.notify_all();
            }
        }
        false
    }

    /// Keep-alive bookkeeping for an inbound ping. Deliberately does not
    /// touch the idle auto-disconnect timer.
    pub(crate) fn ping_received(&self) {
        self.conn.lock().last_ping_received = Some(Instant::now());
    }

    // === Write path ===

    /// Frames and writes a payload, then — for spooled application data
    /// — blocks until the router's confirmation arrives or the
    /// size-proportional timeout elapses. A confirmation timeout is
    /// operationally indistinguishable from a lost connection and is
    /// treated as one: teardown plus reconnect, payload requeued by the
    /// spool worker.
    pub(crate) fn execute_send(
        self: &Arc<Self>,
        payload: &[u8],
        flags: FrameFlags,
    ) -> Result<(), ChannelError> {
        let command = if payload.is_empty() {
            Command::Ping
        } else {
            Command::from_wire(payload[0])?
        };
        let await_confirmation = !flags.no_spool
            && matches!(command, Command::Data | Command::RouterData);

        let timeout = transfer_timeout(self.config.send_timeout_base_ms, payload.len());

        if await_confirmation {
            // Spooled sends may arrive before the login handshake
            // completes; grant them the grace window.
            let deadline =
                Instant::now() + timeout + Duration::from_millis(self.config.login_grace_ms);
            let mut conn = self.conn.lock();
            while !conn.logged_in {
                if self.login_cv.wait_until(&mut conn, deadline).timed_out() {
                    return Err(ChannelError::SendDataError(
                        "not logged in within grace period".into(),
                    ));
                }
            }
        }

        let data_id = frame::payload_fingerprint(payload);
        if await_confirmation {
            let mut pending = self.pending.lock();
            if pending.is_some() {
                // One unconfirmed payload in flight per instance; the
                // spooler serializes sends, so this is a caller bug.
                return Err(ChannelError::SendDataError(
                    "confirmation already pending".into(),
                ));
            }
            *pending = Some(PendingConfirmation {
                data_id,
                state: WaitState::Waiting,
            });
        }

        let had_writer = self.conn.lock().writer.is_some();
        if let Err(e) = self.write_frame_bytes(payload, flags) {
            self.clear_pending();
            // A broken live connection tears down and reconnects; a send
            // attempted while disconnected just fails.
            if had_writer {
                self.events.on_error(&e);
                self.teardown(true);
            }
            return Err(e);
        }

        if !await_confirmation {
            return Ok(());
        }

        let deadline = Instant::now() + timeout;
        let mut pending = self.pending.lock();
        loop {
            match pending.as_ref().map(|w| w.state) {
                Some(WaitState::Confirmed) => {
                    *pending = None;
                    debug!(data_id = %format_args!("{:08x}", data_id), "delivery confirmed");
                    return Ok(());
                }
                Some(WaitState::Lost) => {
                    *pending = None;
                    return Err(ChannelError::LostConnection(
                        "connection lost awaiting confirmation".into(),
                    ));
                }
                Some(WaitState::Waiting) => {}
                None => {
                    return Err(ChannelError::LostConnection(
                        "confirmation wait cancelled".into(),
                    ));
                }
            }
            if Instant::now() >= deadline {
                *pending = None;
                drop(pending);
                let e = ChannelError::LostConnection("confirmation timeout".into());
                self.events.on_error(&e);
                self.teardown(true);
                return Err(e);
            }
            self.pending_cv.wait_until(&mut pending, deadline);
        }
    }

    /// Writes one frame in bounded chunks under the write gate. Empty
    /// payloads produce the all-zero heartbeat word and do not count as
    /// command activity (the idle timer ignores pings).
    fn write_frame_bytes(
        self: &Arc<Self>,
        payload: &[u8],
        flags: FrameFlags,
    ) -> Result<(), ChannelError> {
        let mut writer = {
            let conn = self.conn.lock();
            match conn.writer.as_ref() {
                Some(w) => w
                    .try_clone_stream()
                    .map_err(|e| ChannelError::LostConnection(e.to_string()))?,
                None => return Err(ChannelError::LostConnection("not connected".into())),
            }
        };

        let encoded = frame::encode_frame(payload, flags)?;
        let deadline =
            Instant::now() + transfer_timeout(self.config.send_timeout_base_ms, payload.len());

        {
            let _gate = self.write_gate.lock();
            for chunk in encoded.chunks(IO_CHUNK) {
                let remaining = deadline
                    .checked_duration_since(Instant::now())
                    .ok_or_else(|| {
                        ChannelError::LostConnection("write deadline exceeded".into())
                    })?;
                writer
                    .set_write_timeout(Some(remaining))
                    .map_err(|e| ChannelError::LostConnection(e.to_string()))?;
                writer
                    .write_all(chunk)
                    .map_err(|e| ChannelError::LostConnection(e.to_string()))?;
            }
            writer
                .flush()
                .map_err(|e| ChannelError::LostConnection(e.to_string()))?;
        }

        {
            let mut conn = self.conn.lock();
            let now = Instant::now();
            conn.last_out = Some(now);
            if !payload.is_empty() {
                conn.last_command_out = Some(now);
            }
        }
        if !payload.is_empty() {
            self.arm_idle_timer();
        }
        Ok(())
    }

    fn clear_pending(&self) {
        *self.pending.lock() = None;
    }

    // === Read path ===

    /// Persistent per-connection read loop: header word, length check,
    /// chunked payload read under a recomputed deadline, then hand-off
    /// to the sequential dispatcher. Any error tears the connection down
    /// rather than retrying the read in place.
    fn read_loop(
        self: Arc<Self>,
        mut reader: Box<dyn ChannelStream>,
        gen: u64,
        tx: mpsc::Sender<Frame>,
    ) {
        let _ = reader.set_read_timeout(None);
        loop {
            let mut header_bytes = [0u8; FRAME_HEADER_SIZE];
            if let Err(e) = reader.read_exact(&mut header_bytes) {
                self.read_failed(gen, ChannelError::LostConnection(e.to_string()));
                return;
            }

            let header = match FrameHeader::decode(header_bytes) {
                Ok(header) => header,
                Err(e) => {
                    self.read_failed(gen, e);
                    return;
                }
            };

            let mut payload = vec![0u8; header.length];
            if header.length > 0 {
                let deadline = Instant::now()
                    + transfer_timeout(self.config.send_timeout_base_ms, header.length);
                let mut filled = 0;
                while filled < header.length {
                    let Some(remaining) = deadline.checked_duration_since(Instant::now())
                    else {
                        self.read_failed(
                            gen,
                            ChannelError::LostConnection("payload read timed out".into()),
                        );
                        return;
                    };
                    if reader.set_read_timeout(Some(remaining)).is_err() {
                        self.read_failed(
                            gen,
                            ChannelError::LostConnection("stream unavailable".into()),
                        );
                        return;
                    }
                    let end = (filled + IO_CHUNK).min(header.length);
                    if let Err(e) = reader.read_exact(&mut payload[filled..end]) {
                        self.read_failed(gen, ChannelError::LostConnection(e.to_string()));
                        return;
                    }
                    filled = end;
                }
                let _ = reader.set_read_timeout(None);
            }

            {
                let mut conn = self.conn.lock();
                let now = Instant::now();
                conn.last_in = Some(now);
                if header.length > 0 {
                    conn.last_command_in = Some(now);
                }
            }

            let frame = match Frame::from_wire(header, payload) {
                Ok(frame) => frame,
                Err(e) => {
                    self.read_failed(gen, e);
                    return;
                }
            };

            if tx.send(frame).is_err() {
                return;
            }
        }
    }

    /// Classifies a read-loop failure: silent exit when the teardown was
    /// deliberate (generation advanced), error-and-teardown otherwise.
    fn read_failed(self: &Arc<Self>, gen: u64, error: ChannelError) {
        if self.generation.load(Ordering::SeqCst) != gen {
            return;
        }
        warn!(error = %error, "read loop failed");
        self.events.on_error(&error);
        self.teardown(true);
    }

    // === Timers ===

    fn schedule_reconnect(self: &Arc<Self>) {
        if !self.conn.lock().connectivity_enabled {
            return;
        }
        let mut timers = self.timers.lock();
        if timers.reconnect.is_some() {
            return;
        }
        let delay = Duration::from_millis(self.config.reconnect_delay_ms);
        let weak = Arc::downgrade(self);
        timers.reconnect = Some(self.scheduler.schedule(delay, move || {
            if let Some(engine) = weak.upgrade() {
                engine.timers.lock().reconnect = None;
                engine.connect();
            }
        }));
        debug!(delay_ms = self.config.reconnect_delay_ms, "reconnect scheduled");
    }

    /// Re-arms the idle auto-disconnect timer. Called on every non-ping
    /// outbound write; suspended entirely when no timeout is configured.
    fn arm_idle_timer(self: &Arc<Self>) {
        let Some(idle_ms) = self.config.idle_timeout_ms else {
            return;
        };
        let mut timers = self.timers.lock();
        if let Some(id) = timers.idle.take() {
            self.scheduler.cancel(id);
        }
        let weak = Arc::downgrade(self);
        timers.idle = Some(
            self.scheduler
                .schedule(Duration::from_millis(idle_ms), move || {
                    if let Some(engine) = weak.upgrade() {
                        engine.timers.lock().idle = None;
                        info!("idle timeout, closing connection");
                        engine.events.on_error(&ChannelError::ConnectionClosed);
                        // No reconnect: the caller reconnects on demand.
                        engine.teardown(false);
                    }
                }),
        );
    }

    fn arm_keep_alive(self: &Arc<Self>) {
        let mut timers = self.timers.lock();
        if let Some(id) = timers.keep_alive.take() {
            self.scheduler.cancel(id);
        }
        let interval = Duration::from_millis(self.config.keep_alive_interval_ms);
        let weak = Arc::downgrade(self);
        timers.keep_alive = Some(self.scheduler.schedule(interval, move || {
            if let Some(engine) = weak.upgrade() {
                engine.keep_alive_fire();
            }
        }));
    }

    /// Keep-alive probe. The dead-reckoning mirrors the router's own
    /// bookkeeping with incoming and outgoing swapped: dead means no
    /// ping arrived since the previous check, regardless of what the
    /// socket-level connected flag claims.
    fn keep_alive_fire(self: &Arc<Self>) {
        self.timers.lock().keep_alive = None;

        let (connected, dead) = {
            let mut conn = self.conn.lock();
            let connected = conn.phase == ConnectionPhase::LoggedIn && conn.writer.is_some();
            let dead = match (conn.last_ping_received, conn.last_keep_alive_check) {
                (Some(received), Some(checked)) => received < checked,
                _ => true,
            };
            conn.last_keep_alive_check = Some(Instant::now());
            (connected, dead)
        };

        if !connected || dead {
            warn!(connected, "keep-alive declared connection dead");
            let e = ChannelError::LostConnection("keep-alive: no ping since last check".into());
            self.events.on_error(&e);
            self.teardown(true);
            return;
        }

        // Heartbeat is the all-zero header word: a zero-length frame.
        match self.write_frame_bytes(&[], FrameFlags::NONE) {
            Ok(()) => {
                self.conn.lock().last_ping_sent = Some(Instant::now());
                self.arm_keep_alive();
            }
            Err(e) => {
                self.events.on_error(&e);
                self.teardown(true);
            }
        }
    }
}
