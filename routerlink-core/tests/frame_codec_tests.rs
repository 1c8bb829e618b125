//! Tests for the wire frame codec.

use proptest::prelude::*;

use routerlink_core::frame::{
    confirmation_payload, data_payload, encode_frame, heartbeat_frame, login_payload,
    parse_confirmation, parse_data, payload_fingerprint, Frame, FrameHeader,
};
use routerlink_core::{ChannelError, Command, FrameFlags, MAX_PAYLOAD};

#[test]
fn test_data_round_trip() {
    // Encode command Data with routing id 42 and payload "hello"; decode
    // must recover both exactly.
    let payload = data_payload(42, b"hello");
    let encoded = encode_frame(&payload, FrameFlags::NONE).unwrap();

    let header = FrameHeader::decode(encoded[..4].try_into().unwrap()).unwrap();
    assert_eq!(header.length, encoded.len() - 4);
    let frame = Frame::from_wire(header, encoded[4..].to_vec()).unwrap();
    assert_eq!(frame.command, Command::Data);

    let (routing_id, body) = parse_data(&frame.payload).unwrap();
    assert_eq!(routing_id, 42);
    assert_eq!(body, b"hello");
}

#[test]
fn test_declared_length_over_limit_rejected_before_payload() {
    let word = ((MAX_PAYLOAD + 1) as u32).to_le_bytes();
    let result = FrameHeader::decode(word);
    assert!(matches!(
        result,
        Err(ChannelError::WrongDataLength { length }) if length == MAX_PAYLOAD + 1
    ));
}

#[test]
fn test_max_payload_length_is_accepted() {
    let word = (MAX_PAYLOAD as u32).to_le_bytes();
    let header = FrameHeader::decode(word).unwrap();
    assert_eq!(header.length, MAX_PAYLOAD);
}

#[test]
fn test_heartbeat_is_all_zero_word_decoding_as_ping() {
    let word = heartbeat_frame();
    assert_eq!(word, [0, 0, 0, 0]);
    let header = FrameHeader::decode(word).unwrap();
    let frame = Frame::from_wire(header, Vec::new()).unwrap();
    assert_eq!(frame.command, Command::Ping);
    assert!(frame.payload.is_empty());
}

#[test]
fn test_login_layout_matches_wire_contract() {
    let payload = login_payload(-7, 0xCAFEBABE, None);
    assert_eq!(payload[0], 0); // ConnectionEstablished
    assert_eq!(i32::from_le_bytes(payload[1..5].try_into().unwrap()), -7);
    assert_eq!(
        u64::from_le_bytes(payload[5..13].try_into().unwrap()),
        0xCAFEBABE
    );
}

#[test]
fn test_confirmation_embeds_fingerprint() {
    let data = data_payload(9, b"payload bytes");
    let confirmation = confirmation_payload(payload_fingerprint(&data));
    assert_eq!(confirmation[0], 1); // DataReceivedConfirmation
    assert_eq!(
        parse_confirmation(&confirmation).unwrap(),
        payload_fingerprint(&data)
    );
}

#[test]
fn test_unknown_command_is_protocol_error() {
    let header = FrameHeader::decode(3u32.to_le_bytes()).unwrap();
    let result = Frame::from_wire(header, vec![200, 0, 0]);
    assert!(matches!(
        result,
        Err(ChannelError::CommandNotSupported(200))
    ));
}

proptest! {
    #[test]
    fn prop_header_roundtrip(length in 0usize..=MAX_PAYLOAD, no_spool: bool, router_data: bool) {
        let flags = FrameFlags { no_spool, router_data };
        // Encode through a frame of declared size; only the header word
        // matters here, so fabricate it via encode_frame on a small
        // payload and patch the length bits through decode symmetry.
        let word = (length as u32
            | if router_data { 1 << 30 } else { 0 }
            | if no_spool { 1 << 31 } else { 0 })
            .to_le_bytes();
        let header = FrameHeader::decode(word).unwrap();
        prop_assert_eq!(header.length, length);
        prop_assert_eq!(header.flags, flags);
    }

    #[test]
    fn prop_data_payload_roundtrip(routing_id: u64, body in proptest::collection::vec(any::<u8>(), 0..256)) {
        let payload = data_payload(routing_id, &body);
        let (decoded_id, decoded_body) = parse_data(&payload).unwrap();
        prop_assert_eq!(decoded_id, routing_id);
        prop_assert_eq!(decoded_body, &body[..]);
    }
}
