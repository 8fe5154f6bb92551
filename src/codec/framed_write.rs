use bytes::{BufMut, BytesMut};

use crate::codec::{check_max_frame_size, FrameWrite};
use crate::completion::Completion;
use crate::error::Http2Error;
use crate::frame::{
    Data, GoAway, Head, Headers, Kind, Ping, Priority, PushPromise, Reset, Settings, StreamId,
    WindowUpdate, DEFAULT_MAX_FRAME_SIZE, DEFAULT_SETTINGS_HEADER_TABLE_SIZE,
};
use crate::transport::Transport;

const END_STREAM: u8 = 0x1;
const END_HEADERS: u8 = 0x4;
const PADDED: u8 = 0x8;

/// The default sans-IO frame writer.
///
/// Frames are serialised into a scratch buffer and handed to the transport
/// in one write per frame (or frame run, for split header blocks). DATA
/// payloads and header blocks larger than the peer's `max_frame_size` are
/// split into legal frame sequences.
pub struct FramedWrite {
    buf: BytesMut,

    max_frame_size: u32,
    max_header_table_size: u32,
    max_header_list_size: Option<u32>,

    closed: bool,
}

impl FramedWrite {
    pub fn new() -> FramedWrite {
        FramedWrite {
            buf: BytesMut::new(),
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_table_size: DEFAULT_SETTINGS_HEADER_TABLE_SIZE,
            max_header_list_size: None,
            closed: false,
        }
    }

    fn flush<T: Transport>(&mut self, io: &mut T) -> Completion {
        io.write(self.buf.split().freeze())
    }

    fn rejected(&self) -> Option<Completion> {
        if self.closed {
            Some(Completion::failed(Http2Error::internal(
                "frame writer is closed",
            )))
        } else {
            None
        }
    }

    fn encode_block(&mut self, fields: &crate::frame::HeaderList) -> Result<Vec<u8>, Http2Error> {
        let mut encoder = hpack::Encoder::new();
        let tuples: Vec<(&[u8], &[u8])> = fields.iter().map(|(n, v)| (&n[..], &v[..])).collect();

        let mut block = Vec::new();
        encoder
            .encode_into(tuples, &mut block)
            .map_err(|_| Http2Error::internal("HPACK encoding failed"))?;
        Ok(block)
    }

    /// Emits a HEADERS or PUSH_PROMISE frame run: the leading frame carries
    /// `lead` (priority section or promised stream id) and any padding, then
    /// as much of the block as fits; the remainder goes out as CONTINUATION
    /// frames with END_HEADERS on the last.
    fn encode_header_run(
        &mut self,
        kind: Kind,
        stream_id: StreamId,
        mut flag: u8,
        lead: &[u8],
        pad: u8,
        block: &[u8],
    ) {
        let max = self.max_frame_size as usize;

        let pad_overhead = if pad > 0 { 1 + pad as usize } else { 0 };

        if pad_overhead + lead.len() + block.len() <= max {
            let head = Head::new(kind, flag | END_HEADERS, stream_id);
            head.encode(pad_overhead + lead.len() + block.len(), &mut self.buf);
            if pad > 0 {
                self.buf.put_u8(pad);
            }
            self.buf.put_slice(lead);
            self.buf.put_slice(block);
            self.buf.put_bytes(0, pad as usize);
            return;
        }

        // The block must be split; padding is not carried across a split
        flag &= !(END_HEADERS | PADDED);

        let first_len = (max - lead.len()).min(block.len());
        let head = Head::new(kind, flag, stream_id);
        head.encode(lead.len() + first_len, &mut self.buf);
        self.buf.put_slice(lead);
        self.buf.put_slice(&block[..first_len]);

        let mut rest = &block[first_len..];
        loop {
            let take = rest.len().min(max);
            let (chunk, tail) = rest.split_at(take);
            rest = tail;

            let flag = if rest.is_empty() { END_HEADERS } else { 0 };
            Head::new(Kind::Continuation, flag, stream_id).encode(chunk.len(), &mut self.buf);
            self.buf.put_slice(chunk);

            if rest.is_empty() {
                break;
            }
        }
    }
}

impl<T: Transport> FrameWrite<T> for FramedWrite {
    fn write_data(&mut self, io: &mut T, frame: Data) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        let max = self.max_frame_size as usize;
        let stream_id = frame.stream_id();
        let end_stream = frame.is_end_stream();
        let pad = frame.pad_len();
        let head = frame.head();
        let data = frame.into_payload();

        trace!(
            "encoding DATA; stream={:?} len={} eos={}",
            stream_id,
            data.len(),
            end_stream
        );

        if pad > 0 && 1 + data.len() + pad as usize <= max {
            head.encode(1 + data.len() + pad as usize, &mut self.buf);
            self.buf.put_u8(pad);
            self.buf.put_slice(&data);
            self.buf.put_bytes(0, pad as usize);
        } else {
            // Split oversized payloads into full unpadded frames; flags only
            // land on the last one.
            let mut rest = data;
            loop {
                let chunk = rest.split_to(rest.len().min(max));
                let last = rest.is_empty();

                let flag = if last && end_stream { END_STREAM } else { 0 };
                Head::new(Kind::Data, flag, stream_id).encode(chunk.len(), &mut self.buf);
                self.buf.put_slice(&chunk);

                if last {
                    break;
                }
            }
        }

        self.flush(io)
    }

    fn write_headers(&mut self, io: &mut T, frame: Headers) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        trace!(
            "encoding HEADERS; stream={:?} eos={}",
            frame.stream_id(),
            frame.is_end_stream()
        );

        let block = match self.encode_block(frame.fields()) {
            Ok(block) => block,
            Err(e) => return Completion::failed(e),
        };

        let mut lead = Vec::new();
        if let Some(priority) = frame.priority() {
            let mut tmp = BytesMut::with_capacity(5);
            priority.encode(&mut tmp);
            lead.extend_from_slice(&tmp);
        }

        self.encode_header_run(
            Kind::Headers,
            frame.stream_id(),
            frame.flags(),
            &lead,
            frame.pad_len(),
            &block,
        );

        self.flush(io)
    }

    fn write_priority(&mut self, io: &mut T, frame: Priority) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        frame.encode(&mut self.buf);
        self.flush(io)
    }

    fn write_rst_stream(&mut self, io: &mut T, frame: Reset) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        frame.encode(&mut self.buf);
        self.flush(io)
    }

    fn write_settings(&mut self, io: &mut T, settings: &Settings) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        settings.encode(&mut self.buf);
        self.flush(io)
    }

    fn write_settings_ack(&mut self, io: &mut T) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        Settings::ack().encode(&mut self.buf);
        self.flush(io)
    }

    fn write_ping(&mut self, io: &mut T, frame: Ping) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        frame.encode(&mut self.buf);
        self.flush(io)
    }

    fn write_push_promise(&mut self, io: &mut T, frame: PushPromise) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        trace!(
            "encoding PUSH_PROMISE; stream={:?} promised={:?}",
            frame.stream_id(),
            frame.promised_id()
        );

        let block = match self.encode_block(frame.fields()) {
            Ok(block) => block,
            Err(e) => return Completion::failed(e),
        };

        let promised: u32 = frame.promised_id().into();
        let lead = promised.to_be_bytes();

        self.encode_header_run(
            Kind::PushPromise,
            frame.stream_id(),
            frame.flags(),
            &lead,
            frame.pad_len(),
            &block,
        );

        self.flush(io)
    }

    fn write_go_away(&mut self, io: &mut T, frame: GoAway) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        frame.encode(&mut self.buf);
        self.flush(io)
    }

    fn write_window_update(&mut self, io: &mut T, frame: WindowUpdate) -> Completion {
        if let Some(failed) = self.rejected() {
            return failed;
        }

        frame.encode(&mut self.buf);
        self.flush(io)
    }

    fn max_header_table_size(&self) -> u32 {
        self.max_header_table_size
    }

    fn set_max_header_table_size(&mut self, size: u32) {
        self.max_header_table_size = size;
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
        self.buf = BytesMut::new();
    }
}

impl Default for FramedWrite {
    fn default() -> FramedWrite {
        FramedWrite::new()
    }
}

impl std::fmt::Debug for FramedWrite {
    fn fmt(&self, fmt: &mut std::fmt::Formatter) -> std::fmt::Result {
        fmt.debug_struct("FramedWrite")
            .field("max_frame_size", &self.max_frame_size)
            .field("closed", &self.closed)
            .finish()
    }
}
