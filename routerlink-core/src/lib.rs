// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Routerlink Core Library
//!
//! Reliable point-to-point channel carrying opaque binary messages
//! between a client and a relay router, over TCP or a local pipe. Built
//! for unstable links: outbound payloads are spooled to disk and
//! delivered at-least-once across connection loss and process restarts,
//! inbound retransmissions are suppressed by a bounded fingerprint
//! filter, and keep-alive/reconnect timers keep the link honest.
//!
//! The channel does not interpret message content; encryption, key
//! management and message semantics live in the layers above, behind
//! [`ChannelEvents`].

pub mod channel;
pub mod engine;
pub mod error;
pub mod frame;
pub mod spool;
pub mod store;
pub mod transport;

pub use channel::{
    Channel, ChannelConfig, ChannelConfigBuilder, ChannelDiagnostics, ChannelEvents,
    ChannelRegistry, LicenseActivator, NullEvents, ServerAddress, DEFAULT_PORT,
};
pub use engine::{ConnectionEngine, ConnectionPhase, ConnectionStats};
pub use error::ChannelError;
pub use frame::{Command, Frame, FrameFlags, FrameHeader, MAX_PAYLOAD};
pub use spool::{DuplicateFilter, Spooler, DEDUP_CAPACITY};
pub use store::{ChannelStore, StoreError};
pub use transport::{ChannelStream, MockRemote, MockRouter, MockTransport, Transport, TransportKind};
#[cfg(unix)]
pub use transport::PipeTransport;
pub use transport::TcpTransport;
