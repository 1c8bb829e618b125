// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Channel Configuration
//!
//! Connection identity, server addressing and timer settings for one
//! channel instance.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::ChannelError;
use crate::transport::TransportKind;

/// Default router port when the URI gives none.
pub const DEFAULT_PORT: u16 = 5222;

/// Configuration for a channel instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Router endpoint: `pipe://<path>` for a local pipe, otherwise
    /// `[scheme://]host[:port]` for TCP.
    pub server_uri: String,
    /// Traffic partition id on the router.
    pub domain: i32,
    /// This client's identity on the router (derived elsewhere, not
    /// reversible).
    pub local_id: u64,
    /// Directory holding the per-instance spool database.
    pub data_dir: PathBuf,
    /// Transport connect timeout in milliseconds.
    pub connect_timeout_ms: u64,
    /// Base of the size-proportional send/confirmation timeout.
    pub send_timeout_base_ms: u64,
    /// Extra wait granted to spooled sends for login to complete.
    pub login_grace_ms: u64,
    /// Fixed delay between reconnect attempts.
    pub reconnect_delay_ms: u64,
    /// Keep-alive probe interval.
    pub keep_alive_interval_ms: u64,
    /// Idle auto-disconnect timeout; `None` means never (typical for a
    /// stably-connected server role).
    pub idle_timeout_ms: Option<u64>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        ChannelConfig {
            server_uri: String::new(),
            domain: 0,
            local_id: 0,
            data_dir: PathBuf::new(),
            connect_timeout_ms: 10_000,
            send_timeout_base_ms: 15_000,
            login_grace_ms: 5_000,
            reconnect_delay_ms: 20_000,
            keep_alive_interval_ms: 300_000,
            idle_timeout_ms: None,
        }
    }
}

impl ChannelConfig {
    /// Creates a new builder.
    pub fn builder() -> ChannelConfigBuilder {
        ChannelConfigBuilder::new()
    }

    /// Parses the configured server URI.
    pub fn server_address(&self) -> Result<ServerAddress, ChannelError> {
        ServerAddress::parse(&self.server_uri)
    }
}

/// Builder for [`ChannelConfig`].
#[derive(Debug, Default)]
pub struct ChannelConfigBuilder {
    config: ChannelConfig,
}

impl ChannelConfigBuilder {
    pub fn new() -> Self {
        ChannelConfigBuilder {
            config: ChannelConfig::default(),
        }
    }

    pub fn server_uri(mut self, uri: impl Into<String>) -> Self {
        self.config.server_uri = uri.into();
        self
    }

    pub fn domain(mut self, domain: i32) -> Self {
        self.config.domain = domain;
        self
    }

    pub fn local_id(mut self, local_id: u64) -> Self {
        self.config.local_id = local_id;
        self
    }

    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn connect_timeout_ms(mut self, ms: u64) -> Self {
        self.config.connect_timeout_ms = ms;
        self
    }

    pub fn send_timeout_base_ms(mut self, ms: u64) -> Self {
        self.config.send_timeout_base_ms = ms;
        self
    }

    pub fn login_grace_ms(mut self, ms: u64) -> Self {
        self.config.login_grace_ms = ms;
        self
    }

    pub fn reconnect_delay_ms(mut self, ms: u64) -> Self {
        self.config.reconnect_delay_ms = ms;
        self
    }

    pub fn keep_alive_interval_ms(mut self, ms: u64) -> Self {
        self.config.keep_alive_interval_ms = ms;
        self
    }

    pub fn idle_timeout_ms(mut self, ms: Option<u64>) -> Self {
        self.config.idle_timeout_ms = ms;
        self
    }

    /// Validates the server URI and returns the finished config.
    pub fn build(self) -> Result<ChannelConfig, ChannelError> {
        self.config.server_address()?;
        Ok(self.config)
    }
}

/// A parsed server endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerAddress {
    Tcp { host: String, port: u16 },
    Pipe { path: String },
}

impl ServerAddress {
    /// Parses a server URI.
    ///
    /// `pipe://<path>` selects the local pipe transport, the remainder
    /// used verbatim as the filesystem path. Anything else is TCP:
    /// an explicit port wins, `http://` implies port 80, otherwise the
    /// router default 5222.
    pub fn parse(uri: &str) -> Result<Self, ChannelError> {
        if let Some(path) = uri.strip_prefix("pipe://") {
            if path.is_empty() {
                return Err(ChannelError::ConnectionFailure(
                    "empty pipe path in server URI".into(),
                ));
            }
            return Ok(ServerAddress::Pipe { path: path.into() });
        }

        let (rest, default_port) = if let Some(rest) = uri.strip_prefix("http://") {
            (rest, 80)
        } else if let Some(rest) = uri.strip_prefix("tcp://") {
            (rest, DEFAULT_PORT)
        } else {
            (uri, DEFAULT_PORT)
        };

        // Split host:port/path
        let host_port = rest.split('/').next().unwrap_or(rest);
        if host_port.is_empty() {
            return Err(ChannelError::ConnectionFailure(
                "empty host in server URI".into(),
            ));
        }

        let (host, port) = if let Some(colon_pos) = host_port.rfind(':') {
            let host = &host_port[..colon_pos];
            let port_str = &host_port[colon_pos + 1..];
            let port: u16 = port_str.parse().map_err(|_| {
                ChannelError::ConnectionFailure(format!("Invalid port: {}", port_str))
            })?;
            (host.to_string(), port)
        } else {
            (host_port.to_string(), default_port)
        };

        Ok(ServerAddress::Tcp { host, port })
    }

    /// Which transport family this endpoint selects.
    pub fn kind(&self) -> TransportKind {
        match self {
            ServerAddress::Tcp { .. } => TransportKind::Tcp,
            ServerAddress::Pipe { .. } => TransportKind::Pipe,
        }
    }
}

// INLINE_TEST_REQUIRED: Tests private URI parsing branches.
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bare_host_gets_default_port() {
        let addr = ServerAddress::parse("router.example.com").unwrap();
        assert_eq!(
            addr,
            ServerAddress::Tcp {
                host: "router.example.com".into(),
                port: DEFAULT_PORT
            }
        );
        assert_eq!(addr.kind(), TransportKind::Tcp);
    }

    #[test]
    fn test_parse_explicit_port_wins() {
        let addr = ServerAddress::parse("tcp://router.example.com:7000").unwrap();
        assert_eq!(
            addr,
            ServerAddress::Tcp {
                host: "router.example.com".into(),
                port: 7000
            }
        );
    }

    #[test]
    fn test_parse_http_scheme_implies_port_80() {
        let addr = ServerAddress::parse("http://router.example.com").unwrap();
        assert_eq!(
            addr,
            ServerAddress::Tcp {
                host: "router.example.com".into(),
                port: 80
            }
        );
    }

    #[test]
    fn test_parse_pipe_uri() {
        let addr = ServerAddress::parse("pipe:///run/routerlink.sock").unwrap();
        assert_eq!(
            addr,
            ServerAddress::Pipe {
                path: "/run/routerlink.sock".into()
            }
        );
        assert_eq!(addr.kind(), TransportKind::Pipe);
    }

    #[test]
    fn test_parse_invalid_port() {
        let result = ServerAddress::parse("router.example.com:notaport");
        assert!(matches!(result, Err(ChannelError::ConnectionFailure(_))));
    }

    #[test]
    fn test_parse_empty_uri_rejected() {
        assert!(ServerAddress::parse("").is_err());
        assert!(ServerAddress::parse("pipe://").is_err());
    }

    #[test]
    fn test_builder_validates_uri() {
        let result = ChannelConfig::builder()
            .server_uri("router.example.com:5223")
            .domain(2)
            .local_id(99)
            .build();
        let config = result.unwrap();
        assert_eq!(config.domain, 2);
        assert_eq!(config.local_id, 99);

        assert!(ChannelConfig::builder().build().is_err());
    }
}
