// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Frame Codec
//!
//! Wire framing for router communication. Every frame is a 4-byte
//! little-endian header word followed by `length` payload bytes:
//!
//! ```text
//! bits 0-29   payload length
//! bit  30     router-data flag
//! bit  31     no-spool flag
//! ```
//!
//! Payload byte 0 is the command. A zero-length frame carries no command
//! byte at all and is the ping heartbeat. No compression, no checksum;
//! integrity relies on the underlying stream transport.

use crate::error::ChannelError;

/// Frame header size (4 bytes length-and-flags word).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Maximum payload length. Frames declaring more are fatal to the
/// connection.
pub const MAX_PAYLOAD: usize = 16_000_000;

const ROUTER_DATA_BIT: u32 = 1 << 30;
const NO_SPOOL_BIT: u32 = 1 << 31;
const LENGTH_MASK: u32 = (1 << 30) - 1;

/// Commands carried in payload byte 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    ConnectionEstablished = 0,
    DataReceivedConfirmation = 1,
    Ping = 2,
    Data = 3,
    RouterData = 4,
}

impl Command {
    /// Parses a command byte. Unknown values are a protocol error.
    pub fn from_wire(byte: u8) -> Result<Self, ChannelError> {
        match byte {
            0 => Ok(Command::ConnectionEstablished),
            1 => Ok(Command::DataReceivedConfirmation),
            2 => Ok(Command::Ping),
            3 => Ok(Command::Data),
            4 => Ok(Command::RouterData),
            other => Err(ChannelError::CommandNotSupported(other)),
        }
    }
}

/// The two flag bits of the header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameFlags {
    /// Bypass the spooler's queuing and confirmation discipline.
    pub no_spool: bool,
    /// Payload is addressed to the router itself.
    pub router_data: bool,
}

impl FrameFlags {
    pub const NONE: FrameFlags = FrameFlags {
        no_spool: false,
        router_data: false,
    };

    pub const NO_SPOOL: FrameFlags = FrameFlags {
        no_spool: true,
        router_data: false,
    };

    pub const ROUTER_DATA: FrameFlags = FrameFlags {
        no_spool: true,
        router_data: true,
    };
}

/// Decoded header word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub length: usize,
    pub flags: FrameFlags,
}

impl FrameHeader {
    /// Decodes the 4-byte header word, rejecting lengths over
    /// [`MAX_PAYLOAD`] before any payload byte is read.
    pub fn decode(bytes: [u8; FRAME_HEADER_SIZE]) -> Result<Self, ChannelError> {
        let word = u32::from_le_bytes(bytes);
        let length = (word & LENGTH_MASK) as usize;
        if length > MAX_PAYLOAD {
            return Err(ChannelError::WrongDataLength { length });
        }
        Ok(FrameHeader {
            length,
            flags: FrameFlags {
                no_spool: word & NO_SPOOL_BIT != 0,
                router_data: word & ROUTER_DATA_BIT != 0,
            },
        })
    }

    fn encode(length: usize, flags: FrameFlags) -> [u8; FRAME_HEADER_SIZE] {
        let mut word = length as u32;
        if flags.no_spool {
            word |= NO_SPOOL_BIT;
        }
        if flags.router_data {
            word |= ROUTER_DATA_BIT;
        }
        word.to_le_bytes()
    }
}

/// One decoded inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub flags: FrameFlags,
    /// Full frame payload, command byte included. Empty for ping frames.
    pub payload: Vec<u8>,
}

impl Frame {
    /// Builds a frame from a header and its payload bytes. A zero-length
    /// payload is the ping heartbeat.
    pub fn from_wire(header: FrameHeader, payload: Vec<u8>) -> Result<Self, ChannelError> {
        if payload.is_empty() {
            return Ok(Frame {
                command: Command::Ping,
                flags: header.flags,
                payload,
            });
        }
        Ok(Frame {
            command: Command::from_wire(payload[0])?,
            flags: header.flags,
            payload,
        })
    }
}

/// Encodes a complete outbound frame in a single allocation. `payload`
/// must already start with the command byte.
pub fn encode_frame(payload: &[u8], flags: FrameFlags) -> Result<Vec<u8>, ChannelError> {
    if payload.len() > MAX_PAYLOAD {
        return Err(ChannelError::WrongDataLength {
            length: payload.len(),
        });
    }
    let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
    frame.extend_from_slice(&FrameHeader::encode(payload.len(), flags));
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// The keep-alive heartbeat: an all-zero header word, nothing else.
pub fn heartbeat_frame() -> [u8; FRAME_HEADER_SIZE] {
    [0u8; FRAME_HEADER_SIZE]
}

/// Truncated fingerprint of a frame payload, used both as the
/// confirmation data id and as the anti-duplicate entry. First 4 bytes of
/// SHA-256; exact-match only, not collision-free.
pub fn payload_fingerprint(payload: &[u8]) -> u32 {
    let digest = ring::digest::digest(&ring::digest::SHA256, payload);
    let bytes: [u8; 4] = digest.as_ref()[..4].try_into().expect("digest too short");
    u32::from_le_bytes(bytes)
}

// === Payload layouts ===

/// Login payload: `[command][domain: i32][local_id: u64]`, optionally
/// extended with `[login_mode: u8][oem_id: u64][signature]` when a
/// license activator is configured.
pub fn login_payload(domain: i32, local_id: u64, license: Option<&LoginLicense>) -> Vec<u8> {
    let mut payload = Vec::with_capacity(13);
    payload.push(Command::ConnectionEstablished as u8);
    payload.extend_from_slice(&domain.to_le_bytes());
    payload.extend_from_slice(&local_id.to_le_bytes());
    if let Some(license) = license {
        payload.push(license.mode);
        payload.extend_from_slice(&license.oem_id.to_le_bytes());
        payload.extend_from_slice(&license.signature);
    }
    payload
}

/// License extension of the login payload.
#[derive(Debug, Clone)]
pub struct LoginLicense {
    pub mode: u8,
    pub oem_id: u64,
    pub signature: Vec<u8>,
}

/// Data payload: `[command][routing_id: u64][application bytes]`.
pub fn data_payload(routing_id: u64, body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(9 + body.len());
    payload.push(Command::Data as u8);
    payload.extend_from_slice(&routing_id.to_le_bytes());
    payload.extend_from_slice(body);
    payload
}

/// Splits a data payload into routing id and application bytes.
pub fn parse_data(payload: &[u8]) -> Result<(u64, &[u8]), ChannelError> {
    if payload.len() < 9 {
        return Err(ChannelError::WrongDataLength {
            length: payload.len(),
        });
    }
    let routing_id = u64::from_le_bytes(payload[1..9].try_into().expect("sliced to 8 bytes"));
    Ok((routing_id, &payload[9..]))
}

/// Confirmation payload: `[command][data_id: u32]`.
pub fn confirmation_payload(data_id: u32) -> Vec<u8> {
    let mut payload = Vec::with_capacity(5);
    payload.push(Command::DataReceivedConfirmation as u8);
    payload.extend_from_slice(&data_id.to_le_bytes());
    payload
}

/// Extracts the data id embedded in a confirmation payload.
pub fn parse_confirmation(payload: &[u8]) -> Result<u32, ChannelError> {
    if payload.len() < 5 {
        return Err(ChannelError::WrongDataLength {
            length: payload.len(),
        });
    }
    Ok(u32::from_le_bytes(
        payload[1..5].try_into().expect("sliced to 4 bytes"),
    ))
}

/// Router-data payload: `[command][router bytes]`.
pub fn router_payload(body: &[u8]) -> Vec<u8> {
    let mut payload = Vec::with_capacity(1 + body.len());
    payload.push(Command::RouterData as u8);
    payload.extend_from_slice(body);
    payload
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_roundtrip_with_flags() {
        let header = FrameHeader::encode(
            4096,
            FrameFlags {
                no_spool: true,
                router_data: false,
            },
        );
        let decoded = FrameHeader::decode(header).unwrap();
        assert_eq!(decoded.length, 4096);
        assert!(decoded.flags.no_spool);
        assert!(!decoded.flags.router_data);
    }

    #[test]
    fn test_header_rejects_oversized_length() {
        let word = (MAX_PAYLOAD as u32 + 1).to_le_bytes();
        let result = FrameHeader::decode(word);
        assert!(matches!(
            result,
            Err(ChannelError::WrongDataLength { length }) if length == MAX_PAYLOAD + 1
        ));
    }

    #[test]
    fn test_flag_bits_do_not_leak_into_length() {
        let header = FrameHeader::encode(
            7,
            FrameFlags {
                no_spool: true,
                router_data: true,
            },
        );
        let decoded = FrameHeader::decode(header).unwrap();
        assert_eq!(decoded.length, 7);
        assert!(decoded.flags.no_spool);
        assert!(decoded.flags.router_data);
    }

    #[test]
    fn test_zero_length_frame_is_ping() {
        let header = FrameHeader::decode(heartbeat_frame()).unwrap();
        assert_eq!(header.length, 0);
        let frame = Frame::from_wire(header, Vec::new()).unwrap();
        assert_eq!(frame.command, Command::Ping);
    }

    #[test]
    fn test_unknown_command_rejected() {
        let header = FrameHeader::decode(1u32.to_le_bytes()).unwrap();
        let result = Frame::from_wire(header, vec![9]);
        assert!(matches!(result, Err(ChannelError::CommandNotSupported(9))));
    }

    #[test]
    fn test_data_payload_roundtrip() {
        let payload = data_payload(42, b"hello");
        assert_eq!(payload[0], Command::Data as u8);
        let (routing_id, body) = parse_data(&payload).unwrap();
        assert_eq!(routing_id, 42);
        assert_eq!(body, b"hello");
    }

    #[test]
    fn test_confirmation_roundtrip() {
        let data_id = payload_fingerprint(b"\x03payload");
        let payload = confirmation_payload(data_id);
        assert_eq!(parse_confirmation(&payload).unwrap(), data_id);
    }

    #[test]
    fn test_short_confirmation_rejected() {
        assert!(parse_confirmation(&[1, 0, 0]).is_err());
    }

    #[test]
    fn test_login_payload_layout() {
        let payload = login_payload(-3, 0x1122334455667788, None);
        assert_eq!(payload.len(), 13);
        assert_eq!(payload[0], Command::ConnectionEstablished as u8);
        assert_eq!(i32::from_le_bytes(payload[1..5].try_into().unwrap()), -3);
        assert_eq!(
            u64::from_le_bytes(payload[5..13].try_into().unwrap()),
            0x1122334455667788
        );
    }

    #[test]
    fn test_login_payload_with_license() {
        let license = LoginLicense {
            mode: 1,
            oem_id: 77,
            signature: vec![0xAA; 64],
        };
        let payload = login_payload(5, 9, Some(&license));
        assert_eq!(payload.len(), 13 + 1 + 8 + 64);
        assert_eq!(payload[13], 1);
        assert_eq!(u64::from_le_bytes(payload[14..22].try_into().unwrap()), 77);
    }

    #[test]
    fn test_fingerprint_is_stable_and_discriminating() {
        let a = payload_fingerprint(b"same bytes");
        let b = payload_fingerprint(b"same bytes");
        let c = payload_fingerprint(b"other bytes");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_encode_frame_prefixes_header_word() {
        let payload = confirmation_payload(0xDEADBEEF);
        let frame = encode_frame(&payload, FrameFlags::NO_SPOOL).unwrap();
        let header = FrameHeader::decode(frame[..4].try_into().unwrap()).unwrap();
        assert_eq!(header.length, payload.len());
        assert!(header.flags.no_spool);
        assert_eq!(&frame[4..], &payload[..]);
    }
}
