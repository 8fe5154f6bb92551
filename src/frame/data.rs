use bytes::{Bytes, BytesMut};

use crate::frame::{strip_padding, Error, Frame, Head, Kind, StreamId};

/// The DATA frame. The payload is borrowed from the connection's receive
/// buffer on the inbound path and handed to the flow controller on the
/// outbound path.
#[derive(Debug)]
pub struct Data {
    stream_id: StreamId,
    data: Bytes,
    flags: DataFlags,
    pad_len: Option<u8>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, Default)]
pub struct DataFlags(u8);

const END_STREAM: u8 = 0x1;
const PADDED: u8 = 0x8;
const ALL: u8 = END_STREAM | PADDED;

// ===== impl Data =====

impl Data {
    pub fn new(stream_id: StreamId, data: Bytes, padding: u8, end_stream: bool) -> Data {
        let mut flags = DataFlags::default();

        if end_stream {
            flags.set_end_stream();
        }

        let pad_len = if padding > 0 {
            flags.set_padded();
            Some(padding)
        } else {
            None
        };

        Data {
            stream_id,
            data,
            flags,
            pad_len,
        }
    }

    pub fn load(head: Head, payload: BytesMut) -> Result<Data, Error> {
        debug_assert_eq!(head.kind(), Kind::Data);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        let flags = DataFlags::load(head.flag());
        let mut payload = payload;

        let pad_len = if flags.is_padded() {
            Some(strip_padding(&mut payload)?)
        } else {
            None
        };

        Ok(Data {
            stream_id: head.stream_id(),
            data: payload.freeze(),
            flags,
            pad_len,
        })
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags.is_end_stream()
    }

    pub fn head(&self) -> Head {
        Head::new(Kind::Data, self.flags.into(), self.stream_id)
    }

    pub fn payload(&self) -> &Bytes {
        &self.data
    }

    pub fn into_payload(self) -> Bytes {
        self.data
    }

    pub fn pad_len(&self) -> u8 {
        self.pad_len.unwrap_or(0)
    }

    /// The number of octets the frame consumes from the flow-control window:
    /// the data itself plus any padding and its length octet.
    pub fn flow_len(&self) -> usize {
        match self.pad_len {
            Some(pad) => self.data.len() + pad as usize + 1,
            None => self.data.len(),
        }
    }
}

impl From<Data> for Frame {
    fn from(src: Data) -> Self {
        Frame::Data(src)
    }
}

// ===== impl DataFlags =====

impl DataFlags {
    pub fn load(bits: u8) -> DataFlags {
        DataFlags(bits & ALL)
    }

    pub fn is_end_stream(&self) -> bool {
        self.0 & END_STREAM == END_STREAM
    }

    pub fn set_end_stream(&mut self) {
        self.0 |= END_STREAM
    }

    pub fn is_padded(&self) -> bool {
        self.0 & PADDED == PADDED
    }

    pub fn set_padded(&mut self) {
        self.0 |= PADDED
    }
}

impl From<DataFlags> for u8 {
    fn from(src: DataFlags) -> u8 {
        src.0
    }
}
