use bytes::BytesMut;

use crate::codec::{check_max_frame_size, FrameRead};
use crate::error::Http2Error;
use crate::frame::{
    self, Frame, Head, Kind, Reason, StreamId, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_SETTINGS_HEADER_TABLE_SIZE, HEADER_LEN,
};

const END_HEADERS: u8 = 0x4;

/// The default sans-IO frame reader.
///
/// Bytes are accumulated internally until a whole frame is available, so the
/// caller may feed chunks of any size. Header blocks split across
/// CONTINUATION frames are reassembled before the HEADERS or PUSH_PROMISE
/// frame is surfaced.
pub struct FramedRead {
    buffer: BytesMut,

    // hpack decoder state
    hpack: hpack::Decoder<'static>,

    partial: Option<Partial>,

    max_frame_size: u32,
    max_header_table_size: u32,
    max_header_list_size: Option<u32>,

    closed: bool,
}

/// Partially loaded headers frame
struct Partial {
    /// Frame with an empty field list, awaiting its block
    frame: Continuable,

    /// Accumulated header block fragments
    buf: BytesMut,
}

enum Continuable {
    Headers(frame::Headers),
    PushPromise(frame::PushPromise),
}

impl FramedRead {
    pub fn new() -> FramedRead {
        FramedRead {
            buffer: BytesMut::new(),
            hpack: hpack::Decoder::new(),
            partial: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_table_size: DEFAULT_SETTINGS_HEADER_TABLE_SIZE,
            max_header_list_size: None,
            closed: false,
        }
    }

    fn decode_frame(&mut self, head: Head, payload: BytesMut) -> Result<Option<Frame>, Http2Error> {
        trace!("decoding frame; kind={:?} len={}", head.kind(), payload.len());

        if self.partial.is_some() && head.kind() != Kind::Continuation {
            return Err(Http2Error::protocol(
                "expected CONTINUATION to finish header block",
            ));
        }

        let frame = match head.kind() {
            Kind::Settings => frame::Settings::load(head, &payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::Ping => frame::Ping::load(head, &payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::WindowUpdate => frame::WindowUpdate::load(head, &payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::Data => frame::Data::load(head, payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::Reset => frame::Reset::load(head, &payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::GoAway => frame::GoAway::load(head, payload)
                .map_err(Http2Error::from)?
                .into(),
            Kind::Priority => match frame::Priority::load(head, &payload) {
                Ok(frame) => frame.into(),
                Err(e) => return Err(stream_or_connection(head.stream_id(), e)),
            },
            Kind::Headers => {
                let (mut headers, block) =
                    frame::Headers::load(head, payload).map_err(|e| stream_or_connection(head.stream_id(), e))?;

                if headers.is_end_headers() {
                    headers
                        .load_hpack(&block, self.max_header_list_size, &mut self.hpack)
                        .map_err(|e| stream_or_connection(head.stream_id(), e))?;

                    headers.into()
                } else {
                    // Defer surfacing the frame until END_HEADERS
                    self.partial = Some(Partial {
                        frame: Continuable::Headers(headers),
                        buf: block,
                    });

                    return Ok(None);
                }
            }
            Kind::PushPromise => {
                let (mut push, block) = frame::PushPromise::load(head, payload)
                    .map_err(|e| stream_or_connection(head.stream_id(), e))?;

                if push.is_end_headers() {
                    push.load_hpack(&block, self.max_header_list_size, &mut self.hpack)
                        .map_err(|e| stream_or_connection(head.stream_id(), e))?;

                    push.into()
                } else {
                    self.partial = Some(Partial {
                        frame: Continuable::PushPromise(push),
                        buf: block,
                    });

                    return Ok(None);
                }
            }
            Kind::Continuation => {
                let mut partial = match self.partial.take() {
                    Some(partial) => partial,
                    None => {
                        return Err(Http2Error::protocol("CONTINUATION without open header block"))
                    }
                };

                // The stream identifiers must match
                if partial.frame.stream_id() != head.stream_id() {
                    return Err(Http2Error::protocol(
                        "CONTINUATION on a different stream than its header block",
                    ));
                }

                partial.buf.extend_from_slice(&payload);

                if head.flag() & END_HEADERS != END_HEADERS {
                    self.partial = Some(partial);
                    return Ok(None);
                }

                let max = self.max_header_list_size;
                partial
                    .frame
                    .load_hpack(&partial.buf, max, &mut self.hpack)
                    .map_err(|e| stream_or_connection(head.stream_id(), e))?;

                partial.frame.into()
            }
            Kind::Unknown(_) => frame::UnknownFrame::load(head, payload.freeze()).into(),
        };

        Ok(Some(frame))
    }
}

impl FrameRead for FramedRead {
    fn read_frame(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Http2Error> {
        if self.closed {
            return Ok(None);
        }

        if !src.is_empty() {
            let chunk = src.split_to(src.len());
            self.buffer.extend_from_slice(&chunk);
        }

        loop {
            if self.buffer.len() < HEADER_LEN {
                return Ok(None);
            }

            let payload_len = (usize::from(self.buffer[0]) << 16)
                | (usize::from(self.buffer[1]) << 8)
                | usize::from(self.buffer[2]);

            if payload_len > self.max_frame_size as usize {
                return Err(Http2Error::connection(
                    Reason::FRAME_SIZE_ERROR,
                    format!(
                        "frame length {} exceeds SETTINGS_MAX_FRAME_SIZE",
                        payload_len
                    ),
                ));
            }

            if self.buffer.len() < HEADER_LEN + payload_len {
                return Ok(None);
            }

            let head = Head::parse(&self.buffer[..HEADER_LEN]);
            let _ = self.buffer.split_to(HEADER_LEN);
            let payload = self.buffer.split_to(payload_len);

            if let Some(frame) = self.decode_frame(head, payload)? {
                debug!("received; frame={:?}", frame);
                return Ok(Some(frame));
            }
        }
    }

    fn max_header_table_size(&self) -> u32 {
        self.max_header_table_size
    }

    fn set_max_header_table_size(&mut self, size: u32) {
        self.max_header_table_size = size;
        self.hpack.set_max_table_size(size as usize);
    }

    fn max_frame_size(&self) -> u32 {
        self.max_frame_size
    }

    fn set_max_frame_size(&mut self, size: u32) -> Result<(), Http2Error> {
        check_max_frame_size(size)?;
        self.max_frame_size = size;
        Ok(())
    }

    fn max_header_list_size(&self) -> Option<u32> {
        self.max_header_list_size
    }

    fn set_max_header_list_size(&mut self, size: u32) {
        self.max_header_list_size = Some(size);
    }

    fn close(&mut self) {
        self.closed = true;
        self.buffer = BytesMut::new();
        self.partial = None;
    }
}

impl Default for FramedRead {
    fn default() -> FramedRead {
        FramedRead::new()
    }
}

impl std::fmt::Debug for FramedRead {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("FramedRead")
            .field("buffered", &self.buffer.len())
            .field("max_frame_size", &self.max_frame_size)
            .field("closed", &self.closed)
            .finish()
    }
}

/// Maps frame-parse failures that RFC 7540 scopes to the stream onto stream
/// errors; the rest are connection errors.
fn stream_or_connection(id: StreamId, err: frame::Error) -> Http2Error {
    match err {
        frame::Error::InvalidDependencyId => Http2Error::stream(
            id,
            Reason::PROTOCOL_ERROR,
            "stream cannot depend on itself",
        ),
        frame::Error::MalformedMessage => {
            Http2Error::stream(id, Reason::PROTOCOL_ERROR, "malformed header block")
        }
        other => other.into(),
    }
}

impl Continuable {
    fn stream_id(&self) -> StreamId {
        match *self {
            Continuable::Headers(ref h) => h.stream_id(),
            Continuable::PushPromise(ref p) => p.stream_id(),
        }
    }

    fn load_hpack(
        &mut self,
        block: &[u8],
        max_header_list_size: Option<u32>,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), frame::Error> {
        match *self {
            Continuable::Headers(ref mut h) => h.load_hpack(block, max_header_list_size, decoder),
            Continuable::PushPromise(ref mut p) => {
                p.load_hpack(block, max_header_list_size, decoder)
            }
        }
    }
}

impl From<Continuable> for Frame {
    fn from(cont: Continuable) -> Self {
        match cont {
            Continuable::Headers(headers) => headers.into(),
            Continuable::PushPromise(push) => push.into(),
        }
    }
}
