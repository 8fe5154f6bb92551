//! Per-stream state machine: creation, the end-of-stream cascades, state
//! gates, and stream-error containment.

mod support;

use bytes::{Bytes, BytesMut};

use h2_conn::frame::Frame;
use h2_conn::{Reason, StreamState};

use support::*;

fn state_of(handler: &Handler, id: u32) -> Option<StreamState> {
    handler.connection().stream(id.into()).map(|s| s.state())
}

#[test]
fn headers_open_a_remote_stream() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 1), Some(StreamState::Open));
    assert_eq!(handler.connection().remote().last_stream_created(), 1u32);
    assert!(events
        .all()
        .contains(&Event::Headers { stream_id: 1, end_stream: false }));
}

#[test]
fn end_of_stream_cascade_remote_then_local() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(3, false);
    handler.decode(&mut bytes);
    assert_eq!(state_of(&handler, 3), Some(StreamState::Open));

    // Peer half-closes with DATA + END_STREAM
    let mut bytes = encode_data(3, b"hello", true);
    handler.decode(&mut bytes);
    assert_eq!(state_of(&handler, 3), Some(StreamState::HalfClosedRemote));

    // We answer and half-close our side: the stream is done
    let completion = handler.write_headers(3.into(), request_fields(), 0, true);
    assert!(completion.is_succeeded());
    assert_eq!(state_of(&handler, 3), Some(StreamState::Closed));
    assert_eq!(handler.connection().num_active_streams(), 0);
}

#[test]
fn data_end_stream_closes_remote_side_after_listener() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    bytes.extend_from_slice(&encode_data(1, b"body", true));
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 1), Some(StreamState::HalfClosedRemote));
    assert!(events.all().contains(&Event::Data {
        stream_id: 1,
        data: b"body".to_vec(),
        end_of_stream: true,
    }));
}

#[test]
fn stream_error_is_contained_to_its_stream() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    // Streams 3 and 5 open; stream 5 goes half-closed (remote)
    let mut bytes = encode_headers(3, false);
    bytes.extend_from_slice(&encode_headers(5, false));
    bytes.extend_from_slice(&encode_data(5, b"done", true));
    handler.decode(&mut bytes);
    transport.take_written();
    events.clear();

    // HEADERS on stream 5 in HalfClosedRemote is a stream error
    let mut bytes = encode_headers(5, false);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(|f| matches!(
        f,
        Frame::Reset(ref r)
            if r.stream_id() == 5u32 && r.reason() == Reason::PROTOCOL_ERROR
    )));

    assert_eq!(state_of(&handler, 5), Some(StreamState::Closed));
    assert!(!transport.is_closed());

    // Stream 3 still works
    let mut bytes = encode_data(3, b"still here", false);
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 3), Some(StreamState::Open));
    assert!(events.all().contains(&Event::Data {
        stream_id: 3,
        data: b"still here".to_vec(),
        end_of_stream: false,
    }));
}

#[test]
fn data_for_unknown_stream_is_connection_error() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_data(7, b"?", false);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(
        |f| matches!(f, Frame::GoAway(ref g) if g.reason() == Reason::PROTOCOL_ERROR)
    ));
    assert!(transport.is_closed());
}

#[test]
fn data_on_half_closed_remote_is_stream_closed_error() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    bytes.extend_from_slice(&encode_data(1, b"fin", true));
    handler.decode(&mut bytes);
    transport.take_written();

    let mut bytes = encode_data(1, b"late", false);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(|f| matches!(
        f,
        Frame::Reset(ref r)
            if r.stream_id() == 1u32 && r.reason() == Reason::STREAM_CLOSED
    )));
    assert!(!transport.is_closed());
}

#[test]
fn rst_stream_closes_the_stream() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    bytes.extend_from_slice(&encode_rst_stream(1, Reason::CANCEL));
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 1), Some(StreamState::Closed));
    assert!(handler
        .connection()
        .stream(1u32.into())
        .unwrap()
        .is_terminate_received());
    assert!(events.all().contains(&Event::RstStream {
        stream_id: 1,
        error_code: Reason::CANCEL,
    }));
    assert!(!transport.is_closed());
}

#[test]
fn rst_stream_for_closed_stream_is_noop() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    bytes.extend_from_slice(&encode_rst_stream(1, Reason::CANCEL));
    handler.decode(&mut bytes);
    transport.take_written();
    events.clear();

    // A second RST for the (lingering) closed stream is ignored outright
    let mut bytes = encode_rst_stream(1, Reason::CANCEL);
    handler.decode(&mut bytes);

    assert!(events.is_empty());
    assert_eq!(transport.written_len(), 0);
    assert!(!transport.is_closed());
}

#[test]
fn frames_after_our_rst_are_ignored() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    events.clear();

    handler.write_rst_stream(1.into(), Reason::CANCEL);
    transport.take_written();

    // DATA that crossed our RST on the wire: dropped silently.
    // The stream is closed, so the state gate fires first with STREAM_CLOSED;
    // no listener callback happens either way.
    let mut bytes = encode_data(1, b"crossed", false);
    handler.decode(&mut bytes);

    assert!(events.all().iter().all(|e| !matches!(e, Event::Data { .. })));
    assert!(!transport.is_closed());
}

#[test]
fn priority_is_recorded_and_ignored_on_closed_streams() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);

    // A PRIORITY frame for the open stream is surfaced and stored
    let mut transport_scratch = MockTransport::new();
    let mut writer = h2_conn::codec::FramedWrite::new();
    use h2_conn::codec::FrameWrite;
    use h2_conn::frame::{Priority, StreamDependency};
    writer.write_priority(
        &mut transport_scratch,
        Priority::new(1.into(), StreamDependency::new(3.into(), 42, false)),
    );
    let mut bytes = transport_scratch.take_written();
    handler.decode(&mut bytes);

    assert!(events
        .all()
        .contains(&Event::Priority { stream_id: 1, dependency: 3 }));
    assert_eq!(
        handler
            .connection()
            .stream(1u32.into())
            .unwrap()
            .priority()
            .weight(),
        42
    );

    // Close the stream; further PRIORITY frames are silently dropped
    let mut bytes = encode_rst_stream(1, Reason::CANCEL);
    handler.decode(&mut bytes);
    events.clear();

    writer.write_priority(
        &mut transport_scratch,
        Priority::new(1.into(), StreamDependency::new(5.into(), 10, false)),
    );
    let mut bytes = transport_scratch.take_written();
    handler.decode(&mut bytes);

    assert!(events.is_empty());
    assert!(!transport.is_closed());
}

#[test]
fn window_update_credits_outbound_flow() {
    let (mut handler, transport, events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    bytes.extend_from_slice(&encode_window_update(1, 1_000));
    handler.decode(&mut bytes);

    assert_eq!(
        handler.outbound_flow().window(1u32.into()),
        65_535 + 1_000
    );
    assert!(events.all().contains(&Event::WindowUpdate {
        stream_id: 1,
        size_increment: 1_000,
    }));
}

#[test]
fn inbound_data_is_replenished_with_window_updates() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    transport.take_written();

    let mut bytes = encode_data(1, b"0123456789", false);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    let mut connection_credit = false;
    let mut stream_credit = false;

    for frame in &frames {
        if let Frame::WindowUpdate(ref w) = frame {
            if w.stream_id() == 0u32 && w.size_increment() == 10 {
                connection_credit = true;
            }
            if w.stream_id() == 1u32 && w.size_increment() == 10 {
                stream_credit = true;
            }
        }
    }

    assert!(connection_credit, "connection window was not replenished");
    assert!(stream_credit, "stream window was not replenished");
}

#[test]
fn stream_ids_are_never_reused() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(5, false);
    handler.decode(&mut bytes);
    transport.take_written();

    // A lower-numbered stream after 5 violates monotonicity
    let mut bytes = encode_headers(3, false);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(
        |f| matches!(f, Frame::GoAway(ref g) if g.reason() == Reason::PROTOCOL_ERROR)
    ));
}

#[test]
fn write_data_end_stream_closes_local_side_on_completion() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    transport.take_written();

    let completion = handler.write_data(1.into(), Bytes::from_static(b"reply"), 0, true);
    assert!(completion.is_succeeded());

    assert_eq!(state_of(&handler, 1), Some(StreamState::HalfClosedLocal));

    let frames = written_frames(&transport);
    assert!(frames
        .iter()
        .any(|f| matches!(f, Frame::Data(ref d) if d.is_end_stream())));
}

#[test]
fn deferred_data_completion_drives_cascade_on_drive() {
    init_log();
    let transport = MockTransport::manual();
    let events = Events::default();
    let mut handler = h2_conn::ConnectionHandler::server(
        transport.clone(),
        RecordingListener::new(events.clone()),
    );

    handler.on_transport_active();
    let mut bytes = BytesMut::from(h2_conn::frame::PREFACE);
    bytes.extend_from_slice(&encode_settings(&h2_conn::frame::Settings::default()));
    handler.decode(&mut bytes);
    transport.complete_pending();

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    transport.complete_pending();

    let completion = handler.write_data(1.into(), Bytes::from_static(b"x"), 0, true);
    assert!(completion.is_pending());

    // Local side stays open until the write completes
    assert_eq!(state_of(&handler, 1), Some(StreamState::Open));

    transport.complete_pending();
    handler.drive();

    assert_eq!(state_of(&handler, 1), Some(StreamState::HalfClosedLocal));
}
