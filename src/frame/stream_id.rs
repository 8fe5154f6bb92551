use byteorder::{BigEndian, ByteOrder};

/// A stream identifier: a 31-bit unsigned integer.
///
/// Odd identifiers belong to client-initiated streams, even identifiers to
/// server-initiated streams. Zero denotes the connection itself.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct StreamId(u32);

const STREAM_ID_MASK: u32 = 1 << 31;

impl StreamId {
    /// The connection-scoped stream identifier.
    pub const ZERO: StreamId = StreamId(0);

    /// The largest representable stream identifier.
    pub const MAX: StreamId = StreamId(u32::max_value() >> 1);

    /// The stream reserved by the cleartext HTTP upgrade (RFC 7540 §3.2).
    pub const HTTP_UPGRADE: StreamId = StreamId(1);

    /// Parse a stream identifier from 4 network-order octets, returning the
    /// identifier and whether the reserved most-significant bit was set.
    #[inline]
    pub fn parse(buf: &[u8]) -> (StreamId, bool) {
        let unpacked = BigEndian::read_u32(buf);
        // The most significant bit is reserved and MUST be ignored when
        // received.
        (
            StreamId(unpacked & !STREAM_ID_MASK),
            unpacked & STREAM_ID_MASK == STREAM_ID_MASK,
        )
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn is_client_initiated(&self) -> bool {
        let id = self.0;
        id != 0 && id % 2 == 1
    }

    pub fn is_server_initiated(&self) -> bool {
        let id = self.0;
        id != 0 && id % 2 == 0
    }

    /// Returns the identifier two past this one: the next stream id usable
    /// by the same endpoint.
    pub fn next_id(&self) -> StreamId {
        StreamId(self.0 + 2)
    }
}

impl From<u32> for StreamId {
    fn from(src: u32) -> Self {
        assert_eq!(src & STREAM_ID_MASK, 0, "invalid stream ID -- MSB is set");
        StreamId(src)
    }
}

impl From<StreamId> for u32 {
    fn from(src: StreamId) -> Self {
        src.0
    }
}

impl PartialEq<u32> for StreamId {
    fn eq(&self, other: &u32) -> bool {
        self.0 == *other
    }
}
