//! Connection Lifecycle Engine
//!
//! The state machine driving one connection: handshake, read loop,
//! confirmation-waiting write path, and the reconnect, idle and
//! keep-alive timers, all on a per-instance scheduler.

#[cfg(feature = "testing")]
pub mod connection;
#[cfg(not(feature = "testing"))]
mod connection;

#[cfg(feature = "testing")]
pub mod timer;
#[cfg(not(feature = "testing"))]
mod timer;

pub use connection::{ConnectionEngine, ConnectionPhase, ConnectionStats, FrameSink};
pub use timer::{Scheduler, TaskId};
