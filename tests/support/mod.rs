//! Shared test scaffolding: a mock transport that records emitted bytes, a
//! listener that records callbacks, and codec-backed helpers to build the
//! peer's side of the conversation.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use bytes::{Bytes, BytesMut};

use h2_conn::codec::{FrameRead, FrameWrite, FramedRead, FramedWrite};
use h2_conn::frame::{
    self, Data, Frame, GoAway, HeaderList, Headers, Ping, PushPromise, Reset, Settings,
    WindowUpdate,
};
use h2_conn::listener::FrameListener;
use h2_conn::{Completion, ConnectionHandler, Http2Error, Reason, StreamId, Transport};

pub fn init_log() {
    let _ = env_logger::try_init();
}

// ===== mock transport =====

/// Records written bytes and close requests; shared handles observe them.
/// Writes complete immediately unless built with `manual()`.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Rc<RefCell<Io>>,
}

#[derive(Debug)]
struct Io {
    written: BytesMut,
    active: bool,
    closed: bool,
    auto_complete: bool,
    pending: Vec<Completion>,
}

impl MockTransport {
    pub fn new() -> MockTransport {
        MockTransport::build(true)
    }

    /// Writes stay pending until `complete_pending` / `fail_pending`.
    pub fn manual() -> MockTransport {
        MockTransport::build(false)
    }

    fn build(auto_complete: bool) -> MockTransport {
        MockTransport {
            inner: Rc::new(RefCell::new(Io {
                written: BytesMut::new(),
                active: true,
                closed: false,
                auto_complete,
                pending: Vec::new(),
            })),
        }
    }

    pub fn set_active(&self, active: bool) {
        self.inner.borrow_mut().active = active;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// Drains and returns everything written so far.
    pub fn take_written(&self) -> BytesMut {
        let mut io = self.inner.borrow_mut();
        let len = io.written.len();
        io.written.split_to(len)
    }

    pub fn written_len(&self) -> usize {
        self.inner.borrow().written.len()
    }

    pub fn complete_pending(&self) {
        for completion in self.inner.borrow_mut().pending.drain(..) {
            completion.succeed();
        }
    }

    pub fn fail_pending(&self, err: Http2Error) {
        for completion in self.inner.borrow_mut().pending.drain(..) {
            completion.fail(err.clone());
        }
    }
}

impl Transport for MockTransport {
    fn is_active(&self) -> bool {
        let io = self.inner.borrow();
        io.active && !io.closed
    }

    fn write(&mut self, data: Bytes) -> Completion {
        let mut io = self.inner.borrow_mut();
        io.written.extend_from_slice(&data);

        if io.auto_complete {
            Completion::succeeded()
        } else {
            let completion = Completion::pending();
            io.pending.push(completion.clone());
            completion
        }
    }

    fn close(&mut self) {
        self.inner.borrow_mut().closed = true;
    }
}

// ===== recording listener =====

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Data {
        stream_id: u32,
        data: Vec<u8>,
        end_of_stream: bool,
    },
    Headers {
        stream_id: u32,
        end_stream: bool,
    },
    Priority {
        stream_id: u32,
        dependency: u32,
    },
    RstStream {
        stream_id: u32,
        error_code: Reason,
    },
    Settings,
    SettingsAck,
    Ping([u8; 8]),
    PingAck([u8; 8]),
    PushPromise {
        stream_id: u32,
        promised_stream_id: u32,
    },
    GoAway {
        last_stream_id: u32,
        error_code: Reason,
    },
    WindowUpdate {
        stream_id: u32,
        size_increment: u32,
    },
    Unknown {
        kind: u8,
    },
}

#[derive(Debug, Clone, Default)]
pub struct Events {
    inner: Rc<RefCell<Vec<Event>>>,
}

impl Events {
    pub fn all(&self) -> Vec<Event> {
        self.inner.borrow().clone()
    }

    pub fn clear(&self) {
        self.inner.borrow_mut().clear();
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().is_empty()
    }

    fn push(&self, event: Event) {
        self.inner.borrow_mut().push(event);
    }
}

#[derive(Debug)]
pub struct RecordingListener {
    events: Events,
}

impl RecordingListener {
    pub fn new(events: Events) -> RecordingListener {
        RecordingListener { events }
    }
}

impl FrameListener for RecordingListener {
    fn on_data_read(&mut self, stream_id: StreamId, data: &Bytes, _padding: u8, end_of_stream: bool) {
        self.events.push(Event::Data {
            stream_id: stream_id.into(),
            data: data.to_vec(),
            end_of_stream,
        });
    }

    fn on_headers_read(
        &mut self,
        stream_id: StreamId,
        _headers: &HeaderList,
        _padding: u8,
        end_stream: bool,
    ) {
        self.events.push(Event::Headers {
            stream_id: stream_id.into(),
            end_stream,
        });
    }

    fn on_priority_read(&mut self, stream_id: StreamId, priority: &frame::StreamDependency) {
        self.events.push(Event::Priority {
            stream_id: stream_id.into(),
            dependency: priority.dependency_id().into(),
        });
    }

    fn on_rst_stream_read(&mut self, stream_id: StreamId, error_code: Reason) {
        self.events.push(Event::RstStream {
            stream_id: stream_id.into(),
            error_code,
        });
    }

    fn on_settings_read(&mut self, _settings: &Settings) {
        self.events.push(Event::Settings);
    }

    fn on_settings_ack_read(&mut self) {
        self.events.push(Event::SettingsAck);
    }

    fn on_ping_read(&mut self, payload: [u8; 8]) {
        self.events.push(Event::Ping(payload));
    }

    fn on_ping_ack_read(&mut self, payload: [u8; 8]) {
        self.events.push(Event::PingAck(payload));
    }

    fn on_push_promise_read(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        _headers: &HeaderList,
        _padding: u8,
    ) {
        self.events.push(Event::PushPromise {
            stream_id: stream_id.into(),
            promised_stream_id: promised_stream_id.into(),
        });
    }

    fn on_go_away_read(&mut self, last_stream_id: StreamId, error_code: Reason, _debug: &Bytes) {
        self.events.push(Event::GoAway {
            last_stream_id: last_stream_id.into(),
            error_code,
        });
    }

    fn on_window_update_read(&mut self, stream_id: StreamId, size_increment: u32) {
        self.events.push(Event::WindowUpdate {
            stream_id: stream_id.into(),
            size_increment,
        });
    }

    fn on_unknown_frame(&mut self, kind: u8, _stream_id: StreamId, _flag: u8, _payload: &Bytes) {
        self.events.push(Event::Unknown { kind });
    }
}

// ===== engine construction =====

pub type Handler = ConnectionHandler<MockTransport, RecordingListener>;

pub fn client() -> (Handler, MockTransport, Events) {
    init_log();
    let transport = MockTransport::new();
    let events = Events::default();
    let handler = ConnectionHandler::client(transport.clone(), RecordingListener::new(events.clone()));
    (handler, transport, events)
}

pub fn server() -> (Handler, MockTransport, Events) {
    init_log();
    let transport = MockTransport::new();
    let events = Events::default();
    let handler = ConnectionHandler::server(transport.clone(), RecordingListener::new(events.clone()));
    (handler, transport, events)
}

pub fn client_with_transport(transport: MockTransport) -> (Handler, Events) {
    init_log();
    let events = Events::default();
    let handler = ConnectionHandler::client(transport, RecordingListener::new(events.clone()));
    (handler, events)
}

/// Activates a server engine and feeds it the client preface, the peer's
/// initial SETTINGS, and the peer's ACK of ours, then discards the
/// handshake output.
pub fn server_handshake(handler: &mut Handler, transport: &MockTransport) {
    handler.on_transport_active();

    let mut bytes = BytesMut::from(frame::PREFACE);
    bytes.extend_from_slice(&encode_settings(&Settings::default()));
    bytes.extend_from_slice(&encode_settings_ack());
    handler.decode(&mut bytes);

    transport.take_written();
}

/// Activates a client engine and feeds it the peer's initial SETTINGS and
/// the peer's ACK of ours, then discards the handshake output.
pub fn client_handshake(handler: &mut Handler, transport: &MockTransport) {
    handler.on_transport_active();

    let mut bytes = encode_settings(&Settings::default());
    bytes.extend_from_slice(&encode_settings_ack());
    handler.decode(&mut bytes);

    transport.take_written();
}

// ===== frame byte builders (the peer's half of the conversation) =====

fn encode_with<F>(write: F) -> BytesMut
where
    F: FnOnce(&mut FramedWrite, &mut MockTransport),
{
    let mut transport = MockTransport::new();
    let mut writer = FramedWrite::new();
    write(&mut writer, &mut transport);
    transport.take_written()
}

pub fn encode_settings(settings: &Settings) -> BytesMut {
    encode_with(|w, io| {
        w.write_settings(io, settings);
    })
}

pub fn encode_settings_ack() -> BytesMut {
    encode_with(|w, io| {
        w.write_settings_ack(io);
    })
}

pub fn request_fields() -> HeaderList {
    let mut fields = HeaderList::new();
    fields.push(&b":method"[..], &b"GET"[..]);
    fields.push(&b":path"[..], &b"/"[..]);
    fields.push(&b":scheme"[..], &b"http"[..]);
    fields
}

pub fn encode_headers(stream_id: u32, end_stream: bool) -> BytesMut {
    encode_with(|w, io| {
        w.write_headers(io, Headers::new(stream_id.into(), request_fields(), end_stream));
    })
}

pub fn encode_data(stream_id: u32, payload: &[u8], end_stream: bool) -> BytesMut {
    encode_with(|w, io| {
        w.write_data(
            io,
            Data::new(
                stream_id.into(),
                Bytes::copy_from_slice(payload),
                0,
                end_stream,
            ),
        );
    })
}

pub fn encode_ping(payload: [u8; 8]) -> BytesMut {
    encode_with(|w, io| {
        w.write_ping(io, Ping::ping(payload));
    })
}

pub fn encode_ping_ack(payload: [u8; 8]) -> BytesMut {
    encode_with(|w, io| {
        w.write_ping(io, Ping::pong(payload));
    })
}

pub fn encode_rst_stream(stream_id: u32, reason: Reason) -> BytesMut {
    encode_with(|w, io| {
        w.write_rst_stream(io, Reset::new(stream_id.into(), reason));
    })
}

pub fn encode_go_away(last_stream_id: u32, reason: Reason) -> BytesMut {
    encode_with(|w, io| {
        w.write_go_away(io, GoAway::new(last_stream_id.into(), reason));
    })
}

pub fn encode_window_update(stream_id: u32, size_increment: u32) -> BytesMut {
    encode_with(|w, io| {
        w.write_window_update(io, WindowUpdate::new(stream_id.into(), size_increment));
    })
}

pub fn encode_push_promise(stream_id: u32, promised_id: u32) -> BytesMut {
    encode_with(|w, io| {
        w.write_push_promise(
            io,
            PushPromise::new(stream_id.into(), promised_id.into(), request_fields()),
        );
    })
}

// ===== emitted-byte inspection =====

/// Decodes all frames out of a byte run emitted by the engine under test.
pub fn decode_frames(mut bytes: BytesMut) -> Vec<Frame> {
    let mut reader = FramedRead::new();
    let mut frames = Vec::new();

    while let Some(frame) = reader.read_frame(&mut bytes).expect("emitted bytes decode") {
        frames.push(frame);
    }

    frames
}

/// Drains the transport and decodes whatever the engine emitted.
pub fn written_frames(transport: &MockTransport) -> Vec<Frame> {
    decode_frames(transport.take_written())
}

/// Asserts the byte run starts with the 24-octet client preface and
/// returns the rest.
pub fn strip_preface(mut bytes: BytesMut) -> BytesMut {
    assert!(bytes.len() >= frame::PREFACE.len(), "no preface in output");
    let preface = bytes.split_to(frame::PREFACE.len());
    assert_eq!(&preface[..], frame::PREFACE);
    bytes
}
