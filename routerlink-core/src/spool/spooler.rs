// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Outbound Spooler
//!
//! Disk-persisted FIFO of not-yet-confirmed outbound payloads. Every
//! enqueued payload is either confirmed-and-removed or still
//! discoverable in its persisted slot, across arbitrarily many process
//! restarts. Strictly one payload is in flight at a time: the next send
//! only starts once the previous one's outcome is known.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::channel::ChannelEvents;
use crate::engine::ConnectionEngine;
use crate::error::ChannelError;
use crate::frame::{payload_fingerprint, FrameFlags};
use crate::store::ChannelStore;

/// One queued outbound payload.
#[derive(Debug, Clone)]
struct SpoolEntry {
    /// Monotonically increasing, wrapping send counter.
    sequence_id: u32,
    /// Fingerprint matching the router's confirmation.
    data_id: u32,
    /// Full frame payload, command byte included.
    payload: Vec<u8>,
    /// Persisted row backing this entry.
    slot: i64,
}

#[derive(Default)]
struct SpoolState {
    queue: VecDeque<SpoolEntry>,
    in_flight: Option<SpoolEntry>,
    /// The in-flight entry was confirmed while its worker was still
    /// resolving; the worker clears the slot, not the confirmation.
    in_flight_acked: bool,
    next_sequence: u32,
}

/// Persistent outbound retry queue for one channel instance.
pub struct Spooler {
    engine: Arc<ConnectionEngine>,
    store: Arc<ChannelStore>,
    state: Mutex<SpoolState>,
    events: Arc<dyn ChannelEvents>,
}

impl Spooler {
    /// Creates the spooler, replaying any payloads persisted by an
    /// earlier process: the log is drained into memory (slot order) and
    /// each payload re-persisted through the normal enqueue path.
    pub fn new(
        store: Arc<ChannelStore>,
        engine: Arc<ConnectionEngine>,
        events: Arc<dyn ChannelEvents>,
    ) -> Result<Arc<Self>, ChannelError> {
        let recovered = store.drain_spool()?;
        let spooler = Arc::new(Spooler {
            engine,
            store,
            state: Mutex::new(SpoolState::default()),
            events,
        });

        if !recovered.is_empty() {
            debug!(count = recovered.len(), "replaying persisted spool");
        }
        for payload in recovered {
            spooler.persist_and_queue(payload)?;
        }
        Ok(spooler)
    }

    /// Appends a payload to the queue and triggers a send attempt when
    /// the spooler was previously idle. Returns the payload's data id.
    pub fn enqueue(self: &Arc<Self>, payload: Vec<u8>) -> Result<u32, ChannelError> {
        debug!(
            len = payload.len(),
            prefix = %hex::encode(&payload[..payload.len().min(8)]),
            "spooling payload"
        );
        let (data_id, was_idle) = self.persist_and_queue(payload)?;
        if was_idle {
            self.send_next();
        }
        Ok(data_id)
    }

    fn persist_and_queue(&self, payload: Vec<u8>) -> Result<(u32, bool), ChannelError> {
        let data_id = payload_fingerprint(&payload);
        let slot = self.store.insert_spool_entry(&payload)?;

        let mut state = self.state.lock();
        let was_idle = state.queue.is_empty() && state.in_flight.is_none();
        let sequence_id = state.next_sequence;
        state.next_sequence = state.next_sequence.wrapping_add(1);
        state.queue.push_back(SpoolEntry {
            sequence_id,
            data_id,
            payload,
            slot,
        });
        Ok((data_id, was_idle))
    }

    /// Removes the entry matching a router confirmation. Returns false
    /// when nothing matched (stale or duplicate confirmation).
    pub fn acknowledge(&self, data_id: u32) -> bool {
        self.remove_entry(data_id)
    }

    /// Explicitly withdraws a queued payload before it is confirmed.
    pub fn withdraw(&self, data_id: u32) -> bool {
        self.remove_entry(data_id)
    }

    fn remove_entry(&self, data_id: u32) -> bool {
        let slot = {
            let mut state = self.state.lock();
            if state
                .in_flight
                .as_ref()
                .is_some_and(|entry| entry.data_id == data_id)
            {
                // Leave the slot occupied so no second send starts before
                // the worker resolves; it sees the ack and moves on.
                state.in_flight_acked = true;
                state.in_flight.as_ref().map(|entry| entry.slot)
            } else if let Some(pos) = state.queue.iter().position(|e| e.data_id == data_id) {
                state.queue.remove(pos).map(|entry| entry.slot)
            } else {
                None
            }
        };

        match slot {
            Some(slot) => {
                if let Err(e) = self.store.delete_spool_entry(slot) {
                    // Non-fatal: the entry is gone from memory; a stale
                    // row only costs a redundant resend after a restart.
                    self.events.on_error(&ChannelError::Store(e));
                }
                true
            }
            None => false,
        }
    }

    /// Sends the next queued payload, if any. A no-op unless the engine
    /// is connected and logged in and nothing is currently in flight.
    /// The send itself runs on a short-lived worker thread.
    pub fn send_next(self: &Arc<Self>) {
        if !self.engine.is_ready() {
            return;
        }
        let entry = {
            let mut state = self.state.lock();
            if state.in_flight.is_some() {
                return;
            }
            let Some(entry) = state.queue.pop_front() else {
                return;
            };
            state.in_flight = Some(entry.clone());
            entry
        };

        debug!(sequence_id = entry.sequence_id, "sending spooled payload");
        let spooler = self.clone();
        std::thread::Builder::new()
            .name("routerlink-send".into())
            .spawn(move || {
                let result = spooler.engine.execute_send(&entry.payload, FrameFlags::NONE);
                spooler.on_send_outcome(result);
            })
            .expect("failed to spawn send worker");
    }

    /// Resolves the in-flight send. On failure the payload goes back to
    /// the front of the queue, preserving the original order (the engine
    /// has already scheduled a reconnect for fatal outcomes); on success
    /// the next queued payload is dispatched.
    fn on_send_outcome(self: &Arc<Self>, result: Result<(), ChannelError>) {
        match result {
            Ok(()) => {
                {
                    let mut state = self.state.lock();
                    state.in_flight.take();
                    state.in_flight_acked = false;
                }
                self.send_next();
            }
            Err(e) => {
                let mut state = self.state.lock();
                let acked = std::mem::take(&mut state.in_flight_acked);
                if let Some(entry) = state.in_flight.take() {
                    if acked {
                        // Confirmed and withdrawn out from under a failing
                        // worker; nothing left to retry.
                        return;
                    }
                    warn!(
                        sequence_id = entry.sequence_id,
                        error = %e,
                        "send failed, requeueing at front"
                    );
                    state.queue.push_front(entry);
                }
            }
        }
    }

    /// Number of queued (not in-flight) payloads.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        let state = self.state.lock();
        state.queue.is_empty() && state.in_flight.is_none()
    }

    /// True while a payload awaits its confirmation.
    pub fn in_flight(&self) -> bool {
        self.state.lock().in_flight.is_some()
    }

    /// Data ids of all queued payloads, front first.
    pub fn queued_data_ids(&self) -> Vec<u32> {
        self.state.lock().queue.iter().map(|e| e.data_id).collect()
    }
}
