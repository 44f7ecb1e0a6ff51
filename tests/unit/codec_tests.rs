//! Unit tests for the newline frame codec.

use bytes::BytesMut;
use tokio_util::codec::{Decoder, Encoder};

use agent_switchboard::acp::codec::{FrameCodec, MAX_FRAME_BYTES};
use agent_switchboard::AppError;

#[test]
fn single_line_decodes_without_the_newline() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("{\"method\":\"session/update\"}\n");
    let decoded = codec.decode(&mut buf).expect("decode succeeds");
    assert_eq!(decoded, Some("{\"method\":\"session/update\"}".to_owned()));
}

#[test]
fn batched_lines_decode_one_at_a_time() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("{\"a\":1}\n{\"b\":2}\n");

    assert_eq!(
        codec.decode(&mut buf).expect("first"),
        Some("{\"a\":1}".to_owned())
    );
    assert_eq!(
        codec.decode(&mut buf).expect("second"),
        Some("{\"b\":2}".to_owned())
    );
    assert_eq!(codec.decode(&mut buf).expect("empty"), None);
}

#[test]
fn partial_line_is_buffered_until_the_newline_arrives() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::from("{\"method\":");
    assert_eq!(codec.decode(&mut buf).expect("partial"), None);

    buf.extend_from_slice(b"\"x\"}\n");
    assert_eq!(
        codec.decode(&mut buf).expect("complete"),
        Some("{\"method\":\"x\"}".to_owned())
    );
}

#[test]
fn oversized_line_is_rejected() {
    let mut codec = FrameCodec::new();
    let big = "z".repeat(MAX_FRAME_BYTES + 1) + "\n";
    let mut buf = BytesMut::from(big.as_str());

    match codec.decode(&mut buf) {
        Err(AppError::Protocol(msg)) => {
            assert!(msg.contains("line too long"), "got: {msg}");
        }
        other => panic!("expected protocol error, got {other:?}"),
    }
}

#[test]
fn encode_appends_the_newline_delimiter() {
    let mut codec = FrameCodec::new();
    let mut buf = BytesMut::new();
    codec
        .encode("{\"id\":1}".to_owned(), &mut buf)
        .expect("encode succeeds");
    assert_eq!(&buf[..], b"{\"id\":1}\n");
}
