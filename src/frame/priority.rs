use bytes::{BufMut, BytesMut};

use crate::frame::{Error, Frame, Head, Kind, StreamId};

/// The weight assigned to streams that never had one set (RFC 7540 §5.3.5).
pub const DEFAULT_PRIORITY_WEIGHT: u16 = 16;

const EXCLUSIVE_MASK: u32 = 1 << 31;

/// A stream's dependency record: parent stream, weight 1–256, exclusivity.
///
/// Stored, not enforced; the engine records priorities but scheduling by
/// weight is the flow controller's concern.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StreamDependency {
    dependency_id: StreamId,
    weight: u16,
    is_exclusive: bool,
}

/// The PRIORITY frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Priority {
    stream_id: StreamId,
    dependency: StreamDependency,
}

// ===== impl StreamDependency =====

impl StreamDependency {
    pub fn new(dependency_id: StreamId, weight: u16, is_exclusive: bool) -> StreamDependency {
        debug_assert!(weight >= 1 && weight <= 256, "weight out of range");

        StreamDependency {
            dependency_id,
            weight,
            is_exclusive,
        }
    }

    /// Parses the 5-octet dependency record: the exclusive bit plus a 31-bit
    /// parent id, then the weight octet (wire weight is value − 1).
    pub fn load(src: &[u8]) -> Result<StreamDependency, Error> {
        if src.len() < 5 {
            return Err(Error::InvalidPayloadLength);
        }

        let (dependency_id, is_exclusive) = StreamId::parse(&src[..4]);
        let weight = u16::from(src[4]) + 1;

        Ok(StreamDependency {
            dependency_id,
            weight,
            is_exclusive,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        let mut raw: u32 = self.dependency_id.into();

        if self.is_exclusive {
            raw |= EXCLUSIVE_MASK;
        }

        dst.put_u32(raw);
        dst.put_u8((self.weight - 1) as u8);
    }

    pub fn dependency_id(&self) -> StreamId {
        self.dependency_id
    }

    pub fn weight(&self) -> u16 {
        self.weight
    }

    pub fn is_exclusive(&self) -> bool {
        self.is_exclusive
    }
}

impl Default for StreamDependency {
    fn default() -> StreamDependency {
        StreamDependency {
            dependency_id: StreamId::ZERO,
            weight: DEFAULT_PRIORITY_WEIGHT,
            is_exclusive: false,
        }
    }
}

// ===== impl Priority =====

impl Priority {
    pub fn new(stream_id: StreamId, dependency: StreamDependency) -> Priority {
        Priority {
            stream_id,
            dependency,
        }
    }

    pub fn load(head: Head, payload: &[u8]) -> Result<Priority, Error> {
        debug_assert_eq!(head.kind(), Kind::Priority);

        if head.stream_id().is_zero() {
            return Err(Error::InvalidStreamId);
        }

        if payload.len() != 5 {
            return Err(Error::InvalidPayloadLength);
        }

        let dependency = StreamDependency::load(payload)?;

        // A stream cannot depend on itself. An endpoint MUST treat this as a
        // stream error (RFC 7540 §5.3.1).
        if dependency.dependency_id() == head.stream_id() {
            return Err(Error::InvalidDependencyId);
        }

        Ok(Priority {
            stream_id: head.stream_id(),
            dependency,
        })
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        trace!("encoding PRIORITY; stream={:?}", self.stream_id);
        let head = Head::new(Kind::Priority, 0, self.stream_id);
        head.encode(5, dst);
        self.dependency.encode(dst);
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn dependency(&self) -> &StreamDependency {
        &self.dependency
    }
}

impl From<Priority> for Frame {
    fn from(src: Priority) -> Self {
        Frame::Priority(src)
    }
}
