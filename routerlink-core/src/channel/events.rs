//! Upward Callbacks
//!
//! The seam between the channel and the layer above it. The channel only
//! moves opaque bytes; everything that interprets them lives behind
//! these traits.

use crate::error::ChannelError;

/// Callbacks consumed by the layer above the channel.
///
/// Invoked from the channel's background threads; implementations must
/// be quick or hand off, since the inbound dispatch queue is sequential.
/// All methods default to no-ops so consumers implement only what they
/// observe.
pub trait ChannelEvents: Send + Sync {
    /// A payload arrived and passed the duplicate filter.
    fn on_message_arrived(&self, _routing_id: u64, _payload: &[u8]) {}

    /// The router confirmed delivery of an outbound payload.
    fn on_delivery_confirmed(&self, _data_id: u32) {}

    /// A router-addressed payload arrived (bypasses duplicate filtering
    /// and routing).
    fn on_router_data(&self, _payload: &[u8]) {}

    /// The channel went online (logged in) or offline.
    fn on_connectivity_changed(&self, _connected: bool) {}

    /// A transport, protocol or persistence error was observed. Fatal
    /// errors are reported once per connection teardown.
    fn on_error(&self, _error: &ChannelError) {}
}

/// Event sink that ignores everything.
#[derive(Debug, Default)]
pub struct NullEvents;

impl ChannelEvents for NullEvents {}

/// Optional OEM license signer injected into the login handshake.
pub trait LicenseActivator: Send + Sync {
    /// The OEM id embedded in the extended login payload.
    fn oem_id(&self) -> u64;

    /// Signs the 12-byte `[domain][local_id]` login body.
    fn sign(&self, data: &[u8]) -> Vec<u8>;
}
