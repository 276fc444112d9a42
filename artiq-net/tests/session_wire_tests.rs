//! Protocol-layer integration tests: simulate the byte traffic a session
//! would see for a couple of the end-to-end scenarios, without a real
//! socket underneath.

use artiq_net::proto::{ErrorKind, Frame, FrameDecoder, MsgType, MAGIC_CONTROL};
use artiq_net::rpc_proto::{self, RpcValue};

/// S2: `IDENT` returns a non-empty ASCII string containing the build marker.
#[test]
fn ident_reply_contains_the_build_marker() {
    let build_string = b"ARTIQ runtime built 2026-08-01".to_vec();
    let reply = Frame::reply(MAGIC_CONTROL, build_string.clone());
    let bytes = reply.encode();

    let mut decoder = FrameDecoder::new();
    decoder.feed(&bytes);
    let decoded = decoder.poll().unwrap().unwrap();
    assert_eq!(decoded.msg_type, MsgType::Reply);
    let text = core::str::from_utf8(&decoded.payload).unwrap();
    assert!(text.contains("ARTIQ runtime built"));
}

/// S3: a malformed `LOAD_KERNEL` request gets a `BAD_IMAGE`-kind error reply.
#[test]
fn bad_image_request_round_trips_as_an_error_reply() {
    let request = Frame {
        magic: MAGIC_CONTROL,
        msg_type: MsgType::LoadKernel,
        payload: vec![0u8; 12],
    };
    let mut decoder = FrameDecoder::new();
    decoder.feed(&request.encode());
    let decoded = decoder.poll().unwrap().unwrap();
    assert_eq!(decoded.msg_type, MsgType::LoadKernel);
    assert_eq!(decoded.payload.len(), 12);

    let error = Frame::error(MAGIC_CONTROL, ErrorKind::BadImage, b"truncated kernel image");
    let mut reply_decoder = FrameDecoder::new();
    reply_decoder.feed(&error.encode());
    let decoded_error = reply_decoder.poll().unwrap().unwrap();
    assert_eq!(decoded_error.msg_type, MsgType::Error);
    assert_eq!(decoded_error.payload[0], ErrorKind::BadImage as u8);
}

/// S4: an `RPC_CALL(service=1, args=[42])` is answered with `84` and both
/// sides agree on the encoded value.
#[test]
fn rpc_argument_and_reply_round_trip_through_the_tag_format() {
    let args = RpcValue::List(vec![RpcValue::Int32(42)]);
    let encoded_args = rpc_proto::encode(&args);
    assert_eq!(rpc_proto::decode(&encoded_args).unwrap(), args);

    let reply = RpcValue::Int32(84);
    let encoded_reply = rpc_proto::encode(&reply);
    let frame = Frame {
        magic: MAGIC_CONTROL,
        msg_type: MsgType::RpcReply,
        payload: encoded_reply,
    };
    let bytes = frame.encode();
    let mut decoder = FrameDecoder::new();
    decoder.feed(&bytes);
    let decoded = decoder.poll().unwrap().unwrap();
    assert_eq!(rpc_proto::decode(&decoded.payload).unwrap(), RpcValue::Int32(84));
}
