//! Channel Layer
//!
//! Public entry point for the reliable router channel: the facade, its
//! configuration, the upward event callbacks, and the process-wide
//! instance registry.

#[cfg(feature = "testing")]
pub mod config;
#[cfg(not(feature = "testing"))]
mod config;

#[cfg(feature = "testing")]
pub mod events;
#[cfg(not(feature = "testing"))]
mod events;

#[cfg(feature = "testing")]
pub mod facade;
#[cfg(not(feature = "testing"))]
mod facade;

#[cfg(feature = "testing")]
pub mod registry;
#[cfg(not(feature = "testing"))]
mod registry;

pub use config::{ChannelConfig, ChannelConfigBuilder, ServerAddress, DEFAULT_PORT};
pub use events::{ChannelEvents, LicenseActivator, NullEvents};
pub use facade::{Channel, ChannelDiagnostics};
pub use registry::ChannelRegistry;
