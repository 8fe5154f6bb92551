//! Default codec behaviour the engine relies on: CONTINUATION reassembly,
//! frame-size enforcement, and padding.

mod support;

use bytes::{BufMut, BytesMut};

use h2_conn::codec::{FrameRead, FramedRead};
use h2_conn::frame::{Frame, Reason};
use h2_conn::Http2Error;

use support::*;

#[test]
fn headers_split_across_continuations_are_reassembled() {
    init_log();

    // Hand-build a HEADERS frame without END_HEADERS, followed by a
    // CONTINUATION carrying the rest of the block. Block: two literal
    // never-indexed fields split at an arbitrary byte boundary.
    let mut whole = encode_headers(1, false);

    // Re-split the encoded HEADERS frame: first 9 bytes are the head
    let head = whole.split_to(9);
    let block = whole;
    assert!(block.len() > 2, "need a splittable block");

    let split_at = block.len() / 2;

    let mut bytes = BytesMut::new();
    // HEADERS head with END_HEADERS cleared and the truncated length
    bytes.put_uint(split_at as u64, 3);
    bytes.put_u8(1); // HEADERS
    bytes.put_u8(head[4] & !0x4);
    bytes.put_slice(&head[5..9]);
    bytes.put_slice(&block[..split_at]);
    // CONTINUATION with END_HEADERS
    bytes.put_uint((block.len() - split_at) as u64, 3);
    bytes.put_u8(9); // CONTINUATION
    bytes.put_u8(0x4);
    bytes.put_slice(&head[5..9]);
    bytes.put_slice(&block[split_at..]);

    let mut reader = FramedRead::new();
    let frame = reader
        .read_frame(&mut bytes)
        .expect("reassembly")
        .expect("one frame");

    match frame {
        Frame::Headers(ref headers) => {
            assert_eq!(headers.stream_id(), 1u32);
            assert_eq!(headers.fields().len(), request_fields().len());
        }
        ref other => panic!("expected HEADERS, got {:?}", other),
    }
}

#[test]
fn interleaved_frame_during_header_block_is_protocol_error() {
    init_log();

    let mut whole = encode_headers(1, false);
    let head = whole.split_to(9);
    let block = whole;

    let mut bytes = BytesMut::new();
    bytes.put_uint(block.len() as u64, 3);
    bytes.put_u8(1);
    bytes.put_u8(head[4] & !0x4); // no END_HEADERS
    bytes.put_slice(&head[5..9]);
    bytes.put_slice(&block);
    // A PING barges in before the CONTINUATION
    bytes.extend_from_slice(&encode_ping([0; 8]));

    let mut reader = FramedRead::new();
    let err = reader.read_frame(&mut bytes).unwrap_err();

    assert!(matches!(err, Http2Error::Connection { reason, .. } if reason == Reason::PROTOCOL_ERROR));
}

#[test]
fn continuation_on_wrong_stream_is_protocol_error() {
    init_log();

    let mut whole = encode_headers(1, false);
    let head = whole.split_to(9);
    let block = whole;

    let mut bytes = BytesMut::new();
    bytes.put_uint(block.len() as u64, 3);
    bytes.put_u8(1);
    bytes.put_u8(head[4] & !0x4);
    bytes.put_slice(&head[5..9]);
    bytes.put_slice(&block);
    // CONTINUATION for stream 3 instead of 1
    bytes.put_uint(0, 3);
    bytes.put_u8(9);
    bytes.put_u8(0x4);
    bytes.put_u32(3);

    let mut reader = FramedRead::new();
    let err = reader.read_frame(&mut bytes).unwrap_err();

    assert!(err.is_connection_error());
}

#[test]
fn oversized_frame_is_frame_size_error() {
    init_log();

    let mut bytes = BytesMut::new();
    // Advertised length one past the default SETTINGS_MAX_FRAME_SIZE
    bytes.put_uint(16_385, 3);
    bytes.put_u8(0);
    bytes.put_u8(0);
    bytes.put_u32(1);

    let mut reader = FramedRead::new();
    let err = reader.read_frame(&mut bytes).unwrap_err();

    assert!(matches!(err, Http2Error::Connection { reason, .. } if reason == Reason::FRAME_SIZE_ERROR));
}

#[test]
fn padded_data_is_stripped_and_flow_accounted() {
    init_log();

    // DATA, stream 1, PADDED flag, pad length 3: payload "hi" + 3 zero octets
    let mut bytes = BytesMut::new();
    bytes.put_uint(6, 3); // 1 + 2 + 3
    bytes.put_u8(0);
    bytes.put_u8(0x8);
    bytes.put_u32(1);
    bytes.put_u8(3);
    bytes.put_slice(b"hi");
    bytes.put_slice(&[0, 0, 0]);

    let mut reader = FramedRead::new();
    let frame = reader
        .read_frame(&mut bytes)
        .expect("decode")
        .expect("one frame");

    match frame {
        Frame::Data(ref data) => {
            assert_eq!(&data.payload()[..], b"hi");
            assert_eq!(data.pad_len(), 3);
            assert_eq!(data.flow_len(), 6);
        }
        ref other => panic!("expected DATA, got {:?}", other),
    }
}

#[test]
fn excess_padding_is_rejected() {
    init_log();

    let mut bytes = BytesMut::new();
    bytes.put_uint(3, 3);
    bytes.put_u8(0);
    bytes.put_u8(0x8);
    bytes.put_u32(1);
    bytes.put_u8(9); // longer than the remaining payload
    bytes.put_slice(b"hi");

    let mut reader = FramedRead::new();
    assert!(reader.read_frame(&mut bytes).is_err());
}

#[test]
fn frames_arrive_across_arbitrary_chunk_boundaries() {
    init_log();

    let whole = encode_ping([42; 8]);
    let mut reader = FramedRead::new();

    for (i, &byte) in whole.iter().enumerate() {
        let mut chunk = BytesMut::from(&[byte][..]);
        let result = reader.read_frame(&mut chunk).expect("decode");

        if i + 1 < whole.len() {
            assert!(result.is_none());
        } else {
            match result.expect("final byte completes the frame") {
                Frame::Ping(ref ping) => assert_eq!(*ping.payload(), [42; 8]),
                ref other => panic!("expected PING, got {:?}", other),
            }
        }
    }
}
