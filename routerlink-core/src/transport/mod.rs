//! Transport Layer
//!
//! Platform abstractions for the bidirectional byte stream under the
//! channel: a TCP stream socket, a local full-duplex pipe, and an
//! in-memory mock for tests. All variants are interchangeable behind the
//! same interface; the channel facade selects one from the server URI
//! scheme.

#[cfg(feature = "testing")]
pub mod mock;
#[cfg(not(feature = "testing"))]
mod mock;

#[cfg(all(unix, feature = "testing"))]
pub mod pipe;
#[cfg(all(unix, not(feature = "testing")))]
mod pipe;

#[cfg(feature = "testing")]
pub mod tcp;
#[cfg(not(feature = "testing"))]
mod tcp;

pub use mock::{MockRemote, MockRouter, MockTransport};
#[cfg(unix)]
pub use pipe::PipeTransport;
pub use tcp::TcpTransport;

use std::io::{Read, Write};
use std::time::Duration;

use crate::error::ChannelError;

/// Which kind of link a transport (or server URI) describes. Used by the
/// registry to match connectivity broadcasts to instances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Tcp,
    Pipe,
}

/// A connected bidirectional byte stream.
///
/// Handles obtained from [`Transport::stream`] are independently usable
/// clones of the same underlying stream (the read loop holds one, the
/// write path another). Timeouts apply to the underlying stream, so they
/// are shared between clones, matching socket semantics.
pub trait ChannelStream: Read + Write + Send {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;
    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()>;

    /// Shuts down both directions. Unblocks any reader or writer stuck on
    /// this stream; safe to call more than once.
    fn shutdown(&self);

    fn try_clone_stream(&self) -> std::io::Result<Box<dyn ChannelStream>>;
}

/// Transport trait for the channel's underlying link.
///
/// Synchronous interface, like the rest of the core library: platform
/// implementations may use whatever they want internally but expose
/// blocking calls here.
pub trait Transport: Send {
    /// Establishes the link. Returns an error if the peer is unreachable
    /// within `timeout`.
    fn connect(&mut self, timeout: Duration) -> Result<(), ChannelError>;

    /// Tears the link down. Safe to call when not connected.
    fn disconnect(&mut self);

    /// True while a link is established.
    fn is_connected(&self) -> bool;

    /// Returns a fresh handle onto the connected stream, or `None` when
    /// disconnected.
    fn stream(&self) -> Option<Box<dyn ChannelStream>>;
}
