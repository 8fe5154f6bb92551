use bytes::Bytes;

use crate::frame::{HeaderList, Reason, Settings, StreamDependency, StreamId};

/// The application-facing capability set: one callback per inbound frame
/// kind, invoked after the engine has validated the frame and applied its
/// protocol effects. Every method has a no-op default; applications override
/// selectively.
///
/// Payload buffers are borrowed for the duration of the call; retain what
/// you need.
pub trait FrameListener {
    fn on_data_read(&mut self, stream_id: StreamId, data: &Bytes, padding: u8, end_of_stream: bool) {
        let _ = (stream_id, data, padding, end_of_stream);
    }

    fn on_headers_read(
        &mut self,
        stream_id: StreamId,
        headers: &HeaderList,
        padding: u8,
        end_stream: bool,
    ) {
        let _ = (stream_id, headers, padding, end_stream);
    }

    /// The priority-carrying arity. The default forwards to
    /// `on_headers_read`; override this one to observe priorities.
    fn on_headers_read_with_priority(
        &mut self,
        stream_id: StreamId,
        headers: &HeaderList,
        priority: &StreamDependency,
        padding: u8,
        end_stream: bool,
    ) {
        let _ = priority;
        self.on_headers_read(stream_id, headers, padding, end_stream);
    }

    fn on_priority_read(&mut self, stream_id: StreamId, priority: &StreamDependency) {
        let _ = (stream_id, priority);
    }

    fn on_rst_stream_read(&mut self, stream_id: StreamId, error_code: Reason) {
        let _ = (stream_id, error_code);
    }

    fn on_settings_read(&mut self, settings: &Settings) {
        let _ = settings;
    }

    fn on_settings_ack_read(&mut self) {}

    fn on_ping_read(&mut self, payload: [u8; 8]) {
        let _ = payload;
    }

    fn on_ping_ack_read(&mut self, payload: [u8; 8]) {
        let _ = payload;
    }

    fn on_push_promise_read(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: &HeaderList,
        padding: u8,
    ) {
        let _ = (stream_id, promised_stream_id, headers, padding);
    }

    fn on_go_away_read(&mut self, last_stream_id: StreamId, error_code: Reason, debug_data: &Bytes) {
        let _ = (last_stream_id, error_code, debug_data);
    }

    fn on_window_update_read(&mut self, stream_id: StreamId, size_increment: u32) {
        let _ = (stream_id, size_increment);
    }

    fn on_unknown_frame(&mut self, kind: u8, stream_id: StreamId, flag: u8, payload: &Bytes) {
        let _ = (kind, stream_id, flag, payload);
    }
}

/// The all-defaults listener, for connections driven purely through the
/// write surface.
#[derive(Debug, Default)]
pub struct NoopListener;

impl FrameListener for NoopListener {}
