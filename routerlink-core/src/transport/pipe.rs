// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Pipe Transport
//!
//! Local full-duplex pipe variant, backed by a unix-domain socket — the
//! platform's single duplex pipe. The `pipe://` URI remainder is used
//! verbatim as the filesystem path.

use std::net::Shutdown;
use std::os::unix::net::UnixStream;
use std::path::PathBuf;
use std::time::Duration;

use super::{ChannelStream, Transport};
use crate::error::ChannelError;

/// Unix-domain socket transport for same-host router communication.
pub struct PipeTransport {
    path: PathBuf,
    stream: Option<UnixStream>,
}

impl PipeTransport {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        PipeTransport {
            path: path.into(),
            stream: None,
        }
    }
}

impl Transport for PipeTransport {
    fn connect(&mut self, _timeout: Duration) -> Result<(), ChannelError> {
        if self.stream.is_some() {
            return Ok(());
        }
        // Local pipe connects either immediately or not at all; the
        // timeout parameter only matters for the network variant.
        let stream = UnixStream::connect(&self.path)
            .map_err(|e| ChannelError::ConnectionFailure(e.to_string()))?;
        self.stream = Some(stream);
        Ok(())
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

impl ChannelStream for UnixStream {
    fn set_read_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }

    fn set_write_timeout(&self, timeout: Option<Duration>) -> std::io::Result<()> {
        UnixStream::set_write_timeout(self, timeout)
    }

    fn shutdown(&self) {
        let _ = UnixStream::shutdown(self, Shutdown::Both);
    }

    fn try_clone_stream(&self) -> std::io::Result<Box<dyn ChannelStream>> {
        Ok(Box::new(self.try_clone()?))
    }
}
