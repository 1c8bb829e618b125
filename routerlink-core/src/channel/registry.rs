// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Registry
//!
//! Explicit process-wide registry of live channel instances and the two
//! connectivity flags. Flipping a flag broadcasts connect/disconnect to
//! every live instance whose transport kind matches. Created at startup,
//! injected where needed, shut down explicitly; there is no ambient
//! global state.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::info;

use super::facade::Channel;
use crate::transport::TransportKind;

struct RegistryState {
    channels: Vec<Weak<Channel>>,
    internet_access: bool,
    pipe_access: bool,
}

/// Registry of all live [`Channel`] instances in this process.
pub struct ChannelRegistry {
    state: Mutex<RegistryState>,
}

impl ChannelRegistry {
    /// Creates the registry with both connectivity flags enabled.
    pub fn new() -> Arc<Self> {
        Arc::new(ChannelRegistry {
            state: Mutex::new(RegistryState {
                channels: Vec::new(),
                internet_access: true,
                pipe_access: true,
            }),
        })
    }

    /// Adds a channel to the registry. Dead entries are pruned on every
    /// broadcast; registration never blocks a channel's lifecycle.
    pub fn register(&self, channel: &Arc<Channel>) {
        self.state.lock().channels.push(Arc::downgrade(channel));
    }

    /// Flips the internet connectivity flag and broadcasts the change to
    /// all live TCP channels.
    pub fn set_internet_access(&self, available: bool) {
        self.broadcast(TransportKind::Tcp, available);
    }

    /// Flips the pipe connectivity flag and broadcasts the change to all
    /// live pipe channels.
    pub fn set_pipe_access(&self, available: bool) {
        self.broadcast(TransportKind::Pipe, available);
    }

    pub fn internet_access(&self) -> bool {
        self.state.lock().internet_access
    }

    pub fn pipe_access(&self) -> bool {
        self.state.lock().pipe_access
    }

    /// Number of live registered channels.
    pub fn live_count(&self) -> usize {
        let mut state = self.state.lock();
        state.channels.retain(|c| c.strong_count() > 0);
        state.channels.len()
    }

    /// Disconnects every live channel and clears the registry.
    pub fn shutdown(&self) {
        let mut state = self.state.lock();
        for channel in state.channels.drain(..).filter_map(|c| c.upgrade()) {
            channel.shutdown();
        }
        info!("channel registry shut down");
    }

    fn broadcast(&self, kind: TransportKind, available: bool) {
        let mut state = self.state.lock();
        match kind {
            TransportKind::Tcp => state.internet_access = available,
            TransportKind::Pipe => state.pipe_access = available,
        }
        state.channels.retain(|c| c.strong_count() > 0);
        info!(?kind, available, "broadcasting connectivity change");
        for channel in state.channels.iter().filter_map(|c| c.upgrade()) {
            if channel.transport_kind() == kind {
                channel.set_connectivity(available);
            }
        }
    }
}
