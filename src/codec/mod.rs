//! The frame-codec seam: the reader and writer interfaces the engine
//! consumes, plus sans-IO default implementations.

mod framed_read;
mod framed_write;

pub use self::framed_read::FramedRead;
pub use self::framed_write::FramedWrite;

use bytes::BytesMut;

use crate::completion::Completion;
use crate::error::Http2Error;
use crate::frame::{
    Data, Frame, GoAway, Headers, Ping, Priority, PushPromise, Reset, Settings, WindowUpdate,
};
use crate::transport::Transport;

/// Parses the inbound byte stream into frame values.
///
/// The three limits mirror the reader-facing SETTINGS values; the engine
/// applies our own SETTINGS to them once the peer acknowledges.
pub trait FrameRead {
    /// Consumes bytes from `src` and returns the next complete frame, or
    /// `None` when more bytes are needed. Unconsumed bytes are buffered
    /// internally, so feeding one octet at a time is fine.
    fn read_frame(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Http2Error>;

    fn max_header_table_size(&self) -> u32;

    fn set_max_header_table_size(&mut self, size: u32);

    fn max_frame_size(&self) -> u32;

    /// Must reject values outside [2^14, 2^24 − 1] with a FRAME_SIZE_ERROR
    /// connection error.
    fn set_max_frame_size(&mut self, size: u32) -> Result<(), Http2Error>;

    fn max_header_list_size(&self) -> Option<u32>;

    fn set_max_header_list_size(&mut self, size: u32);

    fn close(&mut self);
}

/// Serialises frames and hands the bytes to the transport, returning a
/// completion handle per write.
///
/// The limits mirror the writer-facing SETTINGS values; the engine applies
/// the peer's SETTINGS to them on receipt.
pub trait FrameWrite<T: Transport> {
    fn write_data(&mut self, io: &mut T, frame: Data) -> Completion;

    fn write_headers(&mut self, io: &mut T, frame: Headers) -> Completion;

    fn write_priority(&mut self, io: &mut T, frame: Priority) -> Completion;

    fn write_rst_stream(&mut self, io: &mut T, frame: Reset) -> Completion;

    fn write_settings(&mut self, io: &mut T, settings: &Settings) -> Completion;

    fn write_settings_ack(&mut self, io: &mut T) -> Completion;

    fn write_ping(&mut self, io: &mut T, frame: Ping) -> Completion;

    fn write_push_promise(&mut self, io: &mut T, frame: PushPromise) -> Completion;

    fn write_go_away(&mut self, io: &mut T, frame: GoAway) -> Completion;

    fn write_window_update(&mut self, io: &mut T, frame: WindowUpdate) -> Completion;

    fn max_header_table_size(&self) -> u32;

    fn set_max_header_table_size(&mut self, size: u32);

    fn max_frame_size(&self) -> u32;

    /// Must reject values outside [2^14, 2^24 − 1] with a FRAME_SIZE_ERROR
    /// connection error.
    fn set_max_frame_size(&mut self, size: u32) -> Result<(), Http2Error>;

    fn max_header_list_size(&self) -> Option<u32>;

    fn set_max_header_list_size(&mut self, size: u32);

    fn close(&mut self);
}

pub(crate) fn check_max_frame_size(size: u32) -> Result<(), Http2Error> {
    use crate::frame::{DEFAULT_MAX_FRAME_SIZE, MAX_MAX_FRAME_SIZE};

    if size < DEFAULT_MAX_FRAME_SIZE || size > MAX_MAX_FRAME_SIZE {
        return Err(Http2Error::frame_size(format!(
            "invalid SETTINGS_MAX_FRAME_SIZE value: {}",
            size
        )));
    }

    Ok(())
}
