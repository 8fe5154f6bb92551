use bytes::Bytes;

use crate::completion::Completion;

/// The byte-egress seam.
///
/// The engine is push-driven on the inbound side (`decode` is handed byte
/// chunks) and emits outbound bytes and close requests through this trait.
/// Implementations resolve the returned completion once the bytes have been
/// handed off; they are expected to flush queued writes before honouring
/// `close`.
pub trait Transport {
    /// Whether the underlying connection is established and writable.
    fn is_active(&self) -> bool;

    /// Queues bytes for transmission, returning a handle resolved when the
    /// write completes.
    fn write(&mut self, data: Bytes) -> Completion;

    /// Requests the underlying connection be closed.
    fn close(&mut self);
}
