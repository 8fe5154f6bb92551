use bytes::Bytes;

use crate::frame::{Frame, Head, Kind, StreamId};

/// A frame of a type this implementation does not recognise. Extension
/// frames are surfaced to the listener untouched.
#[derive(Debug, Clone)]
pub struct UnknownFrame {
    kind: u8,
    flag: u8,
    stream_id: StreamId,
    payload: Bytes,
}

impl UnknownFrame {
    pub fn load(head: Head, payload: Bytes) -> UnknownFrame {
        let kind = match head.kind() {
            Kind::Unknown(byte) => byte,
            kind => kind.as_u8(),
        };

        UnknownFrame {
            kind,
            flag: head.flag(),
            stream_id: head.stream_id(),
            payload,
        }
    }

    pub fn kind(&self) -> u8 {
        self.kind
    }

    pub fn flag(&self) -> u8 {
        self.flag
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn payload(&self) -> &Bytes {
        &self.payload
    }
}

impl From<UnknownFrame> for Frame {
    fn from(src: UnknownFrame) -> Self {
        Frame::Unknown(src)
    }
}
