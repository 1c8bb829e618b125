//! Mock Transport
//!
//! In-memory transport for testing. A [`MockRouter`] plays the part of
//! the relay server: every `connect()` on a [`MockTransport`] registers a
//! fresh in-memory duplex link the test can accept and script, byte for
//! byte, with the real frame codec.
//!
//! # Example
//!
//! ```ignore
//! let router = MockRouter::new();
//! let transport = router.transport();
//! // hand `transport` to a channel, then:
//! let mut remote = router.accept(Duration::from_secs(1)).unwrap();
//! let login = remote.read_frame(Duration::from_secs(1)).unwrap();
//! remote.confirm(&login.payload).unwrap();
//! ```

use std::collections::VecDeque;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use super::{ChannelStream, Transport};
use crate::error::ChannelError;
use crate::frame::{self, Frame, FrameFlags, FrameHeader, FRAME_HEADER_SIZE};

/// One direction of an in-memory duplex link.
struct SharedBuf {
    state: Mutex<BufState>,
    cv: Condvar,
}

#[derive(Default)]
struct BufState {
    data: VecDeque<u8>,
    closed: bool,
}

impl SharedBuf {
    fn new() -> Arc<Self> {
        Arc::new(SharedBuf {
            state: Mutex::new(BufState::default()),
            cv: Condvar::new(),
        })
    }

    fn close(&self) {
        self.state.lock().closed = true;
        self.cv.notify_all();
    }
}

/// One endpoint of an in-memory duplex link.
pub struct MockStream {
    incoming: Arc<SharedBuf>,
    outgoing: Arc<SharedBuf>,
    read_timeout: Arc<Mutex<Option<Duration>>>,
}

impl MockStream {
    fn pair() -> (MockStream, MockStream) {
        let a_to_b = SharedBuf::new();
        let b_to_a = SharedBuf::new();
        let a = MockStream {
            incoming: b_to_a.clone(),
            outgoing: a_to_b.clone(),
            read_timeout: Arc::new(Mutex::new(None)),
        };
        let b = MockStream {
            incoming: a_to_b,
            outgoing: b_to_a,
            read_timeout: Arc::new(Mutex::new(None)),
        };
        (a, b)
    }
}

impl Read for MockStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let timeout = *self.read_timeout.lock();
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut state = self.incoming.state.lock();
        while state.data.is_empty() {
            if state.closed {
                return Ok(0);
            }
            match deadline {
                Some(deadline) => {
                    if self.incoming.cv.wait_until(&mut state, deadline).timed_out() {
                        return Err(std::io::Error::new(
                            std::io::ErrorKind::TimedOut,
                            "mock read timed out",
                        ));
                    }
                }
                None => self.incoming.cv.wait(&mut state),
            }
        }
        let n = buf.len().min(state.data.len());
        for slot in buf.iter_mut().take(n) {
            *slot = state.data.pop_front().expect("length checked");
        }
        Ok(n)
    }
}

impl Write for MockStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self.outgoing.state.lock();
        if state.closed {
            return Err(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "mock stream closed",
            ));
        }
        state.data.extend(buf.iter().copied());
        self.outgoing.cv.notify_all();
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl ChannelStream for MockStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        *self.read_timeout.lock() = timeout;
        Ok(())
    }

    fn set_write_timeout(&self, _timeout: Option<Duration>) -> std::io::Result<()> {
        // In-memory writes never block.
        Ok(())
    }

    fn shutdown(&self) {
        self.incoming.close();
        self.outgoing.close();
    }

    fn try_clone_stream(&self) -> std::io::Result<Box<dyn ChannelStream>> {
        Ok(Box::new(MockStream {
            incoming: self.incoming.clone(),
            outgoing: self.outgoing.clone(),
            read_timeout: self.read_timeout.clone(),
        }))
    }
}

/// The scripted far side of one accepted mock connection.
pub struct MockRemote {
    stream: MockStream,
}

impl MockRemote {
    /// Reads one complete frame from the channel under test.
    pub fn read_frame(&mut self, timeout: Duration) -> std::io::Result<Frame> {
        self.stream.set_read_timeout(Some(timeout))?;
        let mut header = [0u8; FRAME_HEADER_SIZE];
        self.stream.read_exact(&mut header)?;
        let header = FrameHeader::decode(header)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        let mut payload = vec![0u8; header.length];
        self.stream.read_exact(&mut payload)?;
        Frame::from_wire(header, payload)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))
    }

    /// Writes one complete frame to the channel under test.
    pub fn write_frame(&mut self, payload: &[u8], flags: FrameFlags) -> std::io::Result<()> {
        let frame = frame::encode_frame(payload, flags)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        self.stream.write_all(&frame)
    }

    /// Writes raw bytes, bypassing the codec (for malformed-input tests).
    pub fn write_raw(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stream.write_all(bytes)
    }

    /// Confirms receipt of a frame payload, the way the router does.
    pub fn confirm(&mut self, payload: &[u8]) -> std::io::Result<()> {
        let confirmation = frame::confirmation_payload(frame::payload_fingerprint(payload));
        self.write_frame(&confirmation, FrameFlags::NONE)
    }

    /// Drops the link from the router side.
    pub fn shutdown(&self) {
        self.stream.shutdown();
    }
}

struct RouterState {
    pending: VecDeque<MockRemote>,
    connections: usize,
    refuse: bool,
}

/// In-memory stand-in for the relay server.
pub struct MockRouter {
    state: Mutex<RouterState>,
    cv: Condvar,
}

impl MockRouter {
    pub fn new() -> Arc<Self> {
        Arc::new(MockRouter {
            state: Mutex::new(RouterState {
                pending: VecDeque::new(),
                connections: 0,
                refuse: false,
            }),
            cv: Condvar::new(),
        })
    }

    /// Creates a transport whose `connect()` lands on this router.
    pub fn transport(self: &Arc<Self>) -> MockTransport {
        MockTransport {
            router: self.clone(),
            stream: None,
        }
    }

    /// Waits for the next connection attempt and returns its far side.
    pub fn accept(&self, timeout: Duration) -> Option<MockRemote> {
        let deadline = Instant::now() + timeout;
        let mut state = self.state.lock();
        loop {
            if let Some(remote) = state.pending.pop_front() {
                return Some(remote);
            }
            if self.cv.wait_until(&mut state, deadline).timed_out() {
                return None;
            }
        }
    }

    /// Makes subsequent `connect()` calls fail.
    pub fn set_refuse(&self, refuse: bool) {
        self.state.lock().refuse = refuse;
    }

    /// Total connection attempts that succeeded.
    pub fn connection_count(&self) -> usize {
        self.state.lock().connections
    }
}

/// Mock transport endpoint handed to a channel under test.
pub struct MockTransport {
    router: Arc<MockRouter>,
    stream: Option<MockStream>,
}

impl Transport for MockTransport {
    fn connect(&mut self, _timeout: Duration) -> Result<(), ChannelError> {
        if self.stream.is_some() {
            return Ok(());
        }
        let mut state = self.router.state.lock();
        if state.refuse {
            return Err(ChannelError::ConnectionFailure(
                "mock router refused connection".into(),
            ));
        }
        let (local, remote) = MockStream::pair();
        state.pending.push_back(MockRemote { stream: remote });
        state.connections += 1;
        self.router.cv.notify_all();
        drop(state);
        self.stream = Some(local);
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            stream.shutdown();
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&self) -> Option<Box<dyn ChannelStream>> {
        self.stream
            .as_ref()
            .and_then(|s| s.try_clone_stream().ok())
    }
}
