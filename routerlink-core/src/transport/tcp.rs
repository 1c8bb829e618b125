// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! TCP Transport
//!
//! Stream-socket transport variant. Closes with zero linger so a torn
//! down socket releases its port immediately instead of lingering in a
//! half-open state the reconnect path would trip over.

use std::net::{Shutdown, TcpStream, ToSocketAddrs};
use std::time::Duration;

use socket2::SockRef;

use super::{ChannelStream, Transport};
use crate::error::ChannelError;

/// TCP transport for router communication.
pub struct TcpTransport {
    host: String,
    port: u16,
    stream: Option<TcpStream>,
}

impl TcpTransport {
    /// Creates a transport targeting `host:port`. No connection is made
    /// until [`Transport::connect`].
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        TcpTransport {
            host: host.into(),
            port,
            stream: None,
        }
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, timeout: Duration) -> Result<(), ChannelError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| ChannelError::ConnectionFailure(e.to_string()))?;

        let mut last_error = None;
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, timeout) {
                Ok(stream) => {
                    stream
                        .set_nodelay(true)
                        .map_err(|e| ChannelError::ConnectionFailure(e.to_string()))?;
                    // Close-immediately semantics on teardown.
                    SockRef::from(&stream)
                        .set_linger(Some(Duration::ZERO))
                        .map_err(|e| ChannelError::ConnectionFailure(e.to_string()))?;
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(ChannelError::ConnectionFailure(match last_error {
            Some(e) => e.to_string(),
            None => format!("no addresses resolved for {}", self.host),
        }))
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn stream(&self) -> Option<Box<dyn ChannelStream>> {
        let stream = self.stream.as_ref()?;
        stream
            .try_clone()
            .ok()
            .map(|s| Box::new(s) as Box<dyn ChannelStream>)
    }
}

impl ChannelStream for TcpStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        TcpStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) {
        let _ = TcpStream::shutdown(self, Shutdown::Both);
    }

    fn try_clone_stream(&self) -> std::io::Result<Box<dyn ChannelStream>> {
        Ok(Box::new(self.try_clone()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;

    #[test]
    fn test_connect_refused() {
        // Bind then drop a listener so the port is known-dead.
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut transport = TcpTransport::new("127.0.0.1", port);
        let result = transport.connect(Duration::from_millis(500));
        assert!(matches!(result, Err(ChannelError::ConnectionFailure(_))));
        assert!(!transport.is_connected());
    }

    #[test]
    fn test_connect_and_echo() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().unwrap();
            let mut buf = [0u8; 5];
            socket.read_exact(&mut buf).unwrap();
            socket.write_all(&buf).unwrap();
        });

        let mut transport = TcpTransport::new("127.0.0.1", port);
        transport.connect(Duration::from_secs(2)).unwrap();
        assert!(transport.is_connected());

        let mut writer = transport.stream().unwrap();
        let mut reader = transport.stream().unwrap();
        writer.write_all(b"hello").unwrap();
        let mut echoed = [0u8; 5];
        reader.read_exact(&mut echoed).unwrap();
        assert_eq!(&echoed, b"hello");

        transport.disconnect();
        assert!(!transport.is_connected());
        server.join().unwrap();
    }

    #[test]
    fn test_disconnect_when_not_connected_is_noop() {
        let mut transport = TcpTransport::new("127.0.0.1", 1);
        transport.disconnect();
        assert!(transport.stream().is_none());
    }
}
