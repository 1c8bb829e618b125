// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Facade
//!
//! Public entry point for one reliable channel to the router. Routes
//! inbound frames to the right handler by command, applies the
//! anti-duplicate filter to application data, and exposes the send API
//! to the layer above.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::config::{ChannelConfig, ServerAddress};
use super::events::{ChannelEvents, LicenseActivator};
use crate::engine::{ConnectionEngine, ConnectionPhase, FrameSink};
use crate::error::ChannelError;
use crate::frame::{self, Command, Frame, FrameFlags};
use crate::spool::{DuplicateFilter, Spooler};
use crate::store::ChannelStore;
use crate::transport::{Transport, TransportKind};
#[cfg(unix)]
use crate::transport::PipeTransport;
use crate::transport::TcpTransport;

/// Snapshot of a channel's connection and spool state.
#[derive(Debug, Clone)]
pub struct ChannelDiagnostics {
    pub phase: ConnectionPhase,
    pub logged_in: bool,
    pub connectivity_enabled: bool,
    /// Payloads waiting in the spool queue.
    pub queued: usize,
    /// True while a payload awaits its delivery confirmation.
    pub in_flight: bool,
    pub last_in: Option<std::time::Duration>,
    pub last_out: Option<std::time::Duration>,
    pub last_command_in: Option<std::time::Duration>,
    pub last_command_out: Option<std::time::Duration>,
    pub last_ping_sent: Option<std::time::Duration>,
    pub last_ping_received: Option<std::time::Duration>,
}

pub(crate) struct ChannelInner {
    config: ChannelConfig,
    kind: TransportKind,
    engine: Arc<ConnectionEngine>,
    spooler: Arc<Spooler>,
    filter: DuplicateFilter,
    /// Serializes the duplicate check and the upward callback so they
    /// happen in a defined order even under concurrent arrivals.
    inbound_gate: Mutex<()>,
    events: Arc<dyn ChannelEvents>,
}

/// A reliable message channel to one router.
///
/// Payloads handed to [`Channel::send`] are persisted, delivered
/// at-least-once in enqueue order, and survive connection loss and
/// process restarts. Inbound data is deduplicated before it reaches the
/// [`ChannelEvents`] callbacks.
pub struct Channel {
    inner: Arc<ChannelInner>,
}

impl Channel {
    /// Creates a channel, selecting the transport from the server URI
    /// scheme (`pipe://` selects the local pipe, anything else TCP).
    pub fn new(
        config: ChannelConfig,
        events: Arc<dyn ChannelEvents>,
        activator: Option<Box<dyn LicenseActivator>>,
    ) -> Result<Arc<Channel>, ChannelError> {
        let transport = Self::transport_for(&config.server_address()?)?;
        Self::with_transport(config, events, activator, transport)
    }

    /// Creates a channel over an injected transport (tests, platform
    /// embeddings). The spool database still comes from
    /// `config.data_dir`.
    pub fn with_transport(
        config: ChannelConfig,
        events: Arc<dyn ChannelEvents>,
        activator: Option<Box<dyn LicenseActivator>>,
        transport: Box<dyn Transport>,
    ) -> Result<Arc<Channel>, ChannelError> {
        let kind = config.server_address()?.kind();
        let store = Arc::new(ChannelStore::open(
            &config.data_dir,
            config.domain,
            config.local_id,
        )?);

        let engine = ConnectionEngine::new(transport, config.clone(), events.clone(), activator);
        let spooler = Spooler::new(store.clone(), engine.clone(), events.clone())?;
        let filter = DuplicateFilter::new(store)?;

        let inner = Arc::new(ChannelInner {
            config,
            kind,
            engine: engine.clone(),
            spooler: spooler.clone(),
            filter,
            inbound_gate: Mutex::new(()),
            events,
        });
        let sink_arc: Arc<dyn FrameSink> = inner.clone();
        let sink: std::sync::Weak<dyn FrameSink> = Arc::downgrade(&sink_arc);
        engine.attach(sink, Arc::downgrade(&spooler));

        Ok(Arc::new(Channel { inner }))
    }

    fn transport_for(address: &ServerAddress) -> Result<Box<dyn Transport>, ChannelError> {
        match address {
            ServerAddress::Tcp { host, port } => Ok(Box::new(TcpTransport::new(host, *port))),
            #[cfg(unix)]
            ServerAddress::Pipe { path } => Ok(Box::new(PipeTransport::new(path))),
            #[cfg(not(unix))]
            ServerAddress::Pipe { .. } => Err(ChannelError::ConnectionFailure(
                "pipe transport unavailable on this platform".into(),
            )),
        }
    }

    // === Send API ===

    /// Spools a payload for reliable delivery to `routing_id`. Returns
    /// the data id later echoed by
    /// [`ChannelEvents::on_delivery_confirmed`].
    pub fn send(&self, routing_id: u64, payload: &[u8]) -> Result<u32, ChannelError> {
        self.inner
            .spooler
            .enqueue(frame::data_payload(routing_id, payload))
    }

    /// Sends a payload directly, bypassing the spooler's queuing and
    /// confirmation discipline (the `no-spool` flag). The payload is not
    /// persisted and is lost on connection failure.
    pub fn send_direct(&self, routing_id: u64, payload: &[u8]) -> Result<(), ChannelError> {
        self.inner.engine.execute_send(
            &frame::data_payload(routing_id, payload),
            FrameFlags::NO_SPOOL,
        )
    }

    /// Sends a payload addressed to the router itself.
    pub fn send_router_data(&self, payload: &[u8]) -> Result<(), ChannelError> {
        self.inner
            .engine
            .execute_send(&frame::router_payload(payload), FrameFlags::ROUTER_DATA)
    }

    /// Withdraws a spooled payload that has not been confirmed yet.
    pub fn withdraw(&self, data_id: u32) -> bool {
        self.inner.spooler.withdraw(data_id)
    }

    // === Lifecycle ===

    /// Starts a connection attempt. Returns false when one is already
    /// running or the channel is not currently disconnected.
    pub fn connect(&self) -> bool {
        self.inner.engine.connect()
    }

    /// Disconnects without scheduling a reconnect. The channel stays
    /// usable; a later [`Channel::connect`] re-establishes the link.
    pub fn disconnect(&self) {
        self.inner.engine.disconnect();
    }

    /// Host connectivity notification: enabling starts a connection
    /// attempt, disabling tears down without reconnect.
    pub fn set_connectivity(&self, enabled: bool) {
        self.inner.engine.set_connectivity(enabled);
    }

    /// True once the login handshake completed.
    pub fn is_connected(&self) -> bool {
        self.inner.engine.is_ready()
    }

    /// Which transport family this channel's server URI selected.
    pub fn transport_kind(&self) -> TransportKind {
        self.inner.kind
    }

    pub fn local_id(&self) -> u64 {
        self.inner.config.local_id
    }

    pub fn domain(&self) -> i32 {
        self.inner.config.domain
    }

    pub fn server_uri(&self) -> &str {
        &self.inner.config.server_uri
    }

    /// Connection and spool state snapshot.
    pub fn diagnostics(&self) -> ChannelDiagnostics {
        let stats = self.inner.engine.stats();
        ChannelDiagnostics {
            phase: stats.phase,
            logged_in: stats.logged_in,
            connectivity_enabled: stats.connectivity_enabled,
            queued: self.inner.spooler.len(),
            in_flight: self.inner.spooler.in_flight(),
            last_in: stats.last_in,
            last_out: stats.last_out,
            last_command_in: stats.last_command_in,
            last_command_out: stats.last_command_out,
            last_ping_sent: stats.last_ping_sent,
            last_ping_received: stats.last_ping_received,
        }
    }

    /// Stops the channel for good: disconnects, cancels all timers and
    /// ends the background threads.
    pub fn shutdown(&self) {
        self.inner.engine.shutdown();
    }
}

impl Drop for ChannelInner {
    fn drop(&mut self) {
        self.engine.shutdown();
    }
}

impl ChannelInner {
    fn handle_confirmation(&self, frame: &Frame) {
        match frame::parse_confirmation(&frame.payload) {
            Ok(data_id) => {
                self.spooler.acknowledge(data_id);
                self.engine.confirmation_received(data_id);
                self.events.on_delivery_confirmed(data_id);
                self.spooler.send_next();
            }
            Err(e) => {
                self.events.on_error(&e);
                self.engine.teardown(true);
            }
        }
    }

    fn handle_data(&self, frame: &Frame) {
        // Confirm receipt right away unless the sender opted out; losing
        // the race against our own crash only causes a retransmission,
        // which the filter below absorbs.
        if !frame.flags.no_spool {
            let confirmation =
                frame::confirmation_payload(frame::payload_fingerprint(&frame.payload));
            if let Err(e) = self.engine.execute_send(&confirmation, FrameFlags::NONE) {
                warn!(error = %e, "failed to send delivery confirmation");
            }
        }

        match frame::parse_data(&frame.payload) {
            Ok((routing_id, body)) => {
                let _gate = self.inbound_gate.lock();
                match self.filter.already_seen(&frame.payload) {
                    Ok(true) => {
                        debug!(routing_id, "suppressed duplicate data frame");
                    }
                    Ok(false) => self.events.on_message_arrived(routing_id, body),
                    Err(e) => {
                        // Filter persistence failure must not drop data.
                        self.events.on_error(&ChannelError::Store(e));
                        self.events.on_message_arrived(routing_id, body);
                    }
                }
            }
            Err(e) => {
                self.events.on_error(&e);
                self.engine.teardown(true);
            }
        }
    }
}

impl FrameSink for ChannelInner {
    fn handle_frame(&self, frame: Frame) {
        match frame.command {
            Command::ConnectionEstablished => self.engine.login_confirmed(),
            Command::DataReceivedConfirmation => self.handle_confirmation(&frame),
            Command::Ping => self.engine.ping_received(),
            Command::Data => self.handle_data(&frame),
            Command::RouterData => self.events.on_router_data(&frame.payload[1..]),
        }
    }
}
