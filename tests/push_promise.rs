//! PUSH_PROMISE reservation, promised-stream lifecycle, and push
//! allowance enforcement.

mod support;

use bytes::BytesMut;

use h2_conn::frame::Frame;
use h2_conn::{Reason, StreamState};

use support::*;

fn state_of(handler: &Handler, id: u32) -> Option<StreamState> {
    handler.connection().stream(id.into()).map(|s| s.state())
}

/// Brings a client engine to the state where it has one open request
/// stream (id 1) the server can push against.
fn client_with_request() -> (Handler, MockTransport, Events) {
    let (mut handler, transport, events) = client();
    client_handshake(&mut handler, &transport);

    let completion = handler.write_headers(1.into(), request_fields(), 0, false);
    assert!(completion.is_succeeded());
    transport.take_written();
    events.clear();

    (handler, transport, events)
}

#[test]
fn push_promise_reserves_the_promised_stream() {
    let (mut handler, transport, events) = client_with_request();

    let mut bytes = encode_push_promise(1, 2);
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 2), Some(StreamState::ReservedRemote));
    assert_eq!(
        handler
            .connection()
            .stream(2u32.into())
            .unwrap()
            .priority()
            .dependency_id(),
        1u32
    );
    assert!(events.all().contains(&Event::PushPromise {
        stream_id: 1,
        promised_stream_id: 2,
    }));
    assert!(!transport.is_closed());
}

#[test]
fn headers_open_a_reserved_stream_toward_us() {
    let (mut handler, transport, _events) = client_with_request();

    let mut bytes = encode_push_promise(1, 2);
    bytes.extend_from_slice(&encode_headers(2, false));
    handler.decode(&mut bytes);

    assert_eq!(state_of(&handler, 2), Some(StreamState::HalfClosedLocal));
    assert!(!transport.is_closed());
}

#[test]
fn push_disabled_client_rejects_push_promise() {
    let (mut handler, transport, events) = client();
    handler.connection_mut().local_mut().set_allow_push_to(false);
    client_handshake(&mut handler, &transport);

    let completion = handler.write_headers(1.into(), request_fields(), 0, false);
    assert!(completion.is_succeeded());
    transport.take_written();
    events.clear();

    let mut bytes = encode_push_promise(1, 2);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(
        |f| matches!(f, Frame::GoAway(ref g) if g.reason() == Reason::PROTOCOL_ERROR)
    ));
    assert!(state_of(&handler, 2).is_none());
    assert!(events.is_empty());
}

#[test]
fn server_receiving_push_promise_is_protocol_error() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    transport.take_written();

    // Only servers push; a promise arriving at a server is rejected
    let mut bytes = encode_push_promise(1, 2);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(
        |f| matches!(f, Frame::GoAway(ref g) if g.reason() == Reason::PROTOCOL_ERROR)
    ));
}

#[test]
fn push_promise_for_unknown_parent_is_connection_error() {
    let (mut handler, transport, _events) = client();
    client_handshake(&mut handler, &transport);

    let mut bytes = encode_push_promise(9, 2);
    handler.decode(&mut bytes);

    let frames = written_frames(&transport);
    assert!(frames.iter().any(
        |f| matches!(f, Frame::GoAway(ref g) if g.reason() == Reason::PROTOCOL_ERROR)
    ));
}

#[test]
fn server_push_reserves_local_stream() {
    let (mut handler, transport, _events) = server();
    server_handshake(&mut handler, &transport);

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);
    transport.take_written();

    let completion = handler.write_push_promise(1.into(), 2.into(), request_fields(), 0);
    assert!(completion.is_succeeded());

    assert_eq!(state_of(&handler, 2), Some(StreamState::ReservedLocal));

    let frames = written_frames(&transport);
    assert!(frames.iter().any(|f| matches!(
        f,
        Frame::PushPromise(ref p)
            if p.stream_id() == 1u32 && p.promised_id() == 2u32
    )));

    // Sending HEADERS on the reserved stream opens it for push
    let completion = handler.write_headers(2.into(), request_fields(), 0, false);
    assert!(completion.is_succeeded());
    assert_eq!(state_of(&handler, 2), Some(StreamState::HalfClosedRemote));
}

#[test]
fn client_cannot_push() {
    let (mut handler, transport, _events) = client_with_request();

    let completion = handler.write_push_promise(1.into(), 2.into(), request_fields(), 0);
    assert!(completion.is_failed());
    assert!(!transport.is_closed());
}

#[test]
fn push_refused_when_peer_disabled_it() {
    let (mut handler, transport, _events) = server();

    // The client's handshake SETTINGS disable push
    handler.on_transport_active();
    let mut settings = h2_conn::frame::Settings::default();
    settings.set_enable_push(Some(false));
    let mut bytes = BytesMut::from(h2_conn::frame::PREFACE);
    bytes.extend_from_slice(&encode_settings(&settings));
    handler.decode(&mut bytes);
    transport.take_written();

    let mut bytes = encode_headers(1, false);
    handler.decode(&mut bytes);

    let completion = handler.write_push_promise(1.into(), 2.into(), request_fields(), 0);
    assert!(completion.is_failed());
    assert_eq!(completion.error().unwrap().reason(), Reason::PROTOCOL_ERROR);
}
