use bytes::{Bytes, BytesMut};

use crate::frame::{strip_padding, Error, Frame, Head, Kind, StreamDependency, StreamId};

/// An ordered list of header fields, opaque to the engine.
///
/// HTTP/2 header blocks are ordered name/value multimaps that may carry
/// pseudo-headers; mapping them onto HTTP semantics is the application's
/// concern.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderList {
    fields: Vec<(Bytes, Bytes)>,
}

/// The HEADERS frame, with its header block already decoded.
#[derive(Debug)]
pub struct Headers {
    stream_id: StreamId,
    fields: HeaderList,
    dependency: Option<StreamDependency>,
    flags: HeadersFlags,
    pad_len: Option<u8>,
}

/// The PUSH_PROMISE frame, reserving `promised_id` on the stream it names.
#[derive(Debug)]
pub struct PushPromise {
    stream_id: StreamId,
    promised_id: StreamId,
    fields: HeaderList,
    flags: PushPromiseFlags,
    pad_len: Option<u8>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct HeadersFlags(u8);

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct PushPromiseFlags(u8);

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;
const PRIORITY: u8 = 0x20;

const HEADERS_ALL: u8 = END_STREAM | END_HEADERS | PADDED | PRIORITY;
const PUSH_PROMISE_ALL: u8 = END_HEADERS | PADDED;

// Each header field consumes 32 octets of overhead when counted against
// SETTINGS_MAX_HEADER_LIST_SIZE (RFC 7540 §6.5.2).
const HEADER_OVERHEAD: usize = 32;

// ===== impl HeaderList =====

impl HeaderList {
    pub fn new() -> HeaderList {
        HeaderList::default()
    }

    pub fn push<N, V>(&mut self, name: N, value: V)
    where
        N: Into<Bytes>,
        V: Into<Bytes>,
    {
        self.fields.push((name.into(), value.into()));
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Bytes, Bytes)> {
        self.fields.iter()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The list's size as counted against SETTINGS_MAX_HEADER_LIST_SIZE.
    pub fn decoded_size(&self) -> usize {
        self.fields
            .iter()
            .map(|(n, v)| n.len() + v.len() + HEADER_OVERHEAD)
            .sum()
    }
}

impl<N, V> std::iter::FromIterator<(N, V)> for HeaderList
where
    N: Into<Bytes>,
    V: Into<Bytes>,
{
    fn from_iter<T: IntoIterator<Item = (N, V)>>(iter: T) -> HeaderList {
        let mut list = HeaderList::new();
        for (n, v) in iter {
            list.push(n, v);
        }
        list
    }
}

// ===== impl Headers =====

impl Headers {
    pub fn new(stream_id: StreamId, fields: HeaderList, end_stream: bool) -> Headers {
        let mut flags = HeadersFlags::default();
        flags.set_end_headers();

        if end_stream {
            flags.set_end_stream();
        }

        Headers {
            stream_id,
            fields,
            dependency: None,
            flags,
            pad_len: None,
        }
    }

    /// Parses the frame payload up to, but not including, the header block.
    /// The returned buffer holds the block fragment, to be fed to
    /// `load_hpack` once END_HEADERS is reached.
    pub fn load(head: Head, payload: BytesMut) -> Result<(Headers, BytesMut), Error> {
        debug_assert_eq!(head.kind(), Kind::Headers);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = HeadersFlags::load(head.flag());
        let mut payload = payload;

        let pad_len = if flags.is_padded() {
            Some(strip_padding(&mut payload)?)
        } else {
            None
        };

        let dependency = if flags.is_priority() {
            if payload.len() < 5 {
                return Err(Error::InvalidPayloadLength);
            }

            let dependency = StreamDependency::load(&payload[..5])?;

            if dependency.dependency_id() == head.stream_id() {
                return Err(Error::InvalidDependencyId);
            }

            let _ = payload.split_to(5);
            Some(dependency)
        } else {
            None
        };

        let headers = Headers {
            stream_id: head.stream_id(),
            fields: HeaderList::new(),
            dependency,
            flags,
            pad_len,
        };

        Ok((headers, payload))
    }

    /// Decodes the accumulated header block into the field list.
    pub fn load_hpack(
        &mut self,
        block: &[u8],
        max_header_list_size: Option<u32>,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        self.fields = decode_block(block, max_header_list_size, decoder)?;
        Ok(())
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn fields(&self) -> &HeaderList {
        &self.fields
    }

    pub fn into_fields(self) -> HeaderList {
        self.fields
    }

    pub fn priority(&self) -> Option<&StreamDependency> {
        self.dependency.as_ref()
    }

    pub fn set_priority(&mut self, dependency: StreamDependency) {
        self.dependency = Some(dependency);
        self.flags.set_priority();
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn set_padding(&mut self, padding: u8) {
        if padding > 0 {
            self.flags.set_padded();
            self.pad_len = Some(padding);
        }
    }

    pub fn pad_len(&self) -> u8 {
        self.pad_len.unwrap_or(0)
    }

    pub(crate) fn flags(&self) -> u8 {
        self.flags.into()
    }
}

impl From<Headers> for Frame {
    fn from(src: Headers) -> Self {
        Frame::Headers(src)
    }
}

// ===== impl PushPromise =====

impl PushPromise {
    pub fn new(stream_id: StreamId, promised_id: StreamId, fields: HeaderList) -> PushPromise {
        let mut flags = PushPromiseFlags::default();
        flags.set_end_headers();

        PushPromise {
            stream_id,
            promised_id,
            fields,
            flags,
            pad_len: None,
        }
    }

    /// Parses the frame payload up to the header block, as `Headers::load`.
    pub fn load(head: Head, payload: BytesMut) -> Result<(PushPromise, BytesMut), Error> {
        debug_assert_eq!(head.kind(), Kind::PushPromise);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = PushPromiseFlags::load(head.flag());
        let mut payload = payload;

        let pad_len = if flags.is_padded() {
            Some(strip_padding(&mut payload)?)
        } else {
            None
        };

        if payload.len() < 4 {
            return Err(Error::InvalidPayloadLength);
        }

        let (promised_id, _) = StreamId::parse(&payload[..4]);

        if promised_id.is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let _ = payload.split_to(4);

        let push = PushPromise {
            stream_id: head.stream_id(),
            promised_id,
            fields: HeaderList::new(),
            flags,
            pad_len,
        };

        Ok((push, payload))
    }

    pub fn load_hpack(
        &mut self,
        block: &[u8],
        max_header_list_size: Option<u32>,
        decoder: &mut hpack::Decoder,
    ) -> Result<(), Error> {
        self.fields = decode_block(block, max_header_list_size, decoder)?;
        Ok(())
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn promised_id(&self) -> StreamId {
        self.promised_id
    }

    pub fn fields(&self) -> &HeaderList {
        &self.fields
    }

    pub fn is_end_headers(&self) -> bool {
        self.flags.is_end_headers()
    }

    pub fn set_padding(&mut self, padding: u8) {
        if padding > 0 {
            self.flags.set_padded();
            self.pad_len = Some(padding);
        }
    }

    pub fn pad_len(&self) -> u8 {
        self.pad_len.unwrap_or(0)
    }

    pub(crate) fn flags(&self) -> u8 {
        self.flags.into()
    }
}

impl From<PushPromise> for Frame {
    fn from(src: PushPromise) -> Self {
        Frame::PushPromise(src)
    }
}

fn decode_block(
    block: &[u8],
    max_header_list_size: Option<u32>,
    decoder: &mut hpack::Decoder,
) -> Result<HeaderList, Error> {
    let decoded = decoder.decode(block).map_err(|_| Error::Hpack)?;

    let fields = HeaderList {
        fields: decoded
            .into_iter()
            .map(|(n, v)| (Bytes::from(n), Bytes::from(v)))
            .collect(),
    };

    if let Some(max) = max_header_list_size {
        if fields.decoded_size() > max as usize {
            debug!(
                "header list size over limit; size={} max={}",
                fields.decoded_size(),
                max
            );
            return Err(Error::MalformedMessage);
        }
    }

    Ok(fields)
}

// ===== impl HeadersFlags =====

impl HeadersFlags {
    pub fn load(bits: u8) -> HeadersFlags {
        HeadersFlags(bits & HEADERS_ALL)
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM;
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn set_padded(&mut self) {
        self.0 |= PADDED;
    }

    pub fn is_priority(&self) -> bool {
        self.0 & PRIORITY == PRIORITY
    }

    pub fn set_priority(&mut self) {
        self.0 |= PRIORITY;
    }
}

impl From<HeadersFlags> for u8 {
    fn from(src: HeadersFlags) -> u8 {
        src.0
    }
}

// ===== impl PushPromiseFlags =====

impl PushPromiseFlags {
    pub fn load(bits: u8) -> PushPromiseFlags {
        PushPromiseFlags(bits & PUSH_PROMISE_ALL)
    }

    pub fn is_end_headers(&self) -> bool {
        self.0 & END_HEADERS == END_HEADERS
    }

    pub fn set_end_headers(&mut self) {
        self.0 |= END_HEADERS;
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn set_padded(&mut self) {
        self.0 |= PADDED;
    }
}

impl From<PushPromiseFlags> for u8 {
    fn from(src: PushPromiseFlags) -> u8 {
        src.0
    }
}
