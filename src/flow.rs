//! The flow-controller seams and window-honest defaults.
//!
//! Pacing and prioritisation algorithms are external concerns; the default
//! controllers only keep the window arithmetic correct. The inbound side
//! replenishes what it consumes immediately, the outbound side refuses
//! writes that exceed the stream window.

use std::hash::BuildHasherDefault;

use fnv::FnvHasher;
use indexmap::IndexMap;

use crate::codec::FrameWrite;
use crate::completion::Completion;
use crate::error::Http2Error;
use crate::frame::{
    Data, Reason, StreamId, WindowUpdate, DEFAULT_INITIAL_WINDOW_SIZE, MAX_INITIAL_WINDOW_SIZE,
};
use crate::transport::Transport;

pub type WindowSize = u32;

type WindowMap = IndexMap<StreamId, i32, BuildHasherDefault<FnvHasher>>;

/// Credits the inbound flow-control window as DATA is consumed.
pub trait InboundFlow<T: Transport, W: FrameWrite<T>> {
    fn initial_window_size(&self) -> WindowSize;

    /// Applied when our SETTINGS_INITIAL_WINDOW_SIZE is acknowledged.
    fn set_initial_window_size(&mut self, size: WindowSize) -> Result<(), Http2Error>;

    /// Accounts for `len` octets of received DATA (payload plus padding) on
    /// the given stream, emitting WINDOW_UPDATE credit as it sees fit.
    fn on_data_read(
        &mut self,
        io: &mut T,
        writer: &mut W,
        stream_id: StreamId,
        len: usize,
        end_of_stream: bool,
    ) -> Result<(), Http2Error>;
}

/// Paces DATA frames against the peer's advertised windows.
pub trait OutboundFlow<T: Transport, W: FrameWrite<T>> {
    fn initial_window_size(&self) -> WindowSize;

    /// Applied when the peer's SETTINGS_INITIAL_WINDOW_SIZE arrives.
    fn set_initial_window_size(&mut self, size: WindowSize) -> Result<(), Http2Error>;

    /// Credits a stream window from a received WINDOW_UPDATE.
    fn update_window(&mut self, stream_id: StreamId, delta: u32) -> Result<(), Http2Error>;

    /// Takes ownership of the frame and either transmits it or fails the
    /// returned completion.
    fn write_data(&mut self, io: &mut T, writer: &mut W, frame: Data) -> Completion;
}

/// Inbound controller that immediately replenishes consumed window, both at
/// connection and stream scope.
#[derive(Debug)]
pub struct DefaultInboundFlow {
    initial: WindowSize,
    connection: i32,
    streams: WindowMap,
}

impl DefaultInboundFlow {
    pub fn new() -> DefaultInboundFlow {
        DefaultInboundFlow {
            initial: DEFAULT_INITIAL_WINDOW_SIZE,
            connection: DEFAULT_INITIAL_WINDOW_SIZE as i32,
            streams: WindowMap::default(),
        }
    }

    /// The initial window advertised for new streams.
    pub fn initial_window_size(&self) -> WindowSize {
        self.initial
    }
}

impl Default for DefaultInboundFlow {
    fn default() -> DefaultInboundFlow {
        DefaultInboundFlow::new()
    }
}

impl<T: Transport, W: FrameWrite<T>> InboundFlow<T, W> for DefaultInboundFlow {
    fn initial_window_size(&self) -> WindowSize {
        self.initial
    }

    fn set_initial_window_size(&mut self, size: WindowSize) -> Result<(), Http2Error> {
        check_window_size(size)?;

        // Adjust every open stream window by the delta (RFC 7540 §6.9.2);
        // the connection window is unaffected.
        let delta = size as i32 - self.initial as i32;
        for (_, window) in self.streams.iter_mut() {
            *window += delta;
        }

        self.initial = size;
        Ok(())
    }

    fn on_data_read(
        &mut self,
        io: &mut T,
        writer: &mut W,
        stream_id: StreamId,
        len: usize,
        end_of_stream: bool,
    ) -> Result<(), Http2Error> {
        let len = len as i32;

        if len > self.connection {
            return Err(Http2Error::connection(
                Reason::FLOW_CONTROL_ERROR,
                "connection flow-control window exceeded",
            ));
        }

        let window = self
            .streams
            .entry(stream_id)
            .or_insert(self.initial as i32);

        if len > *window {
            return Err(Http2Error::stream(
                stream_id,
                Reason::FLOW_CONTROL_ERROR,
                "stream flow-control window exceeded",
            ));
        }

        *window -= len;
        self.connection -= len;

        trace!(
            "inbound data; stream={:?} len={} window={}",
            stream_id,
            len,
            *window
        );

        // Replenish immediately: this controller never applies back-pressure.
        if len > 0 {
            self.connection += len;
            writer.write_window_update(io, WindowUpdate::new(StreamId::ZERO, len as u32));

            if !end_of_stream {
                *window += len;
                writer.write_window_update(io, WindowUpdate::new(stream_id, len as u32));
            }
        }

        if end_of_stream {
            self.streams.swap_remove(&stream_id);
        }

        Ok(())
    }
}

/// Outbound controller that writes through when the stream window allows and
/// fails the completion otherwise. Connection-scope pacing belongs to a real
/// flow-control implementation.
#[derive(Debug)]
pub struct DefaultOutboundFlow {
    initial: WindowSize,
    streams: WindowMap,
}

impl DefaultOutboundFlow {
    pub fn new() -> DefaultOutboundFlow {
        DefaultOutboundFlow {
            initial: DEFAULT_INITIAL_WINDOW_SIZE,
            streams: WindowMap::default(),
        }
    }

    /// The initial window applied to new streams.
    pub fn initial_window_size(&self) -> WindowSize {
        self.initial
    }

    /// The remaining window for a stream, as currently tracked.
    pub fn window(&self, stream_id: StreamId) -> i32 {
        self.streams
            .get(&stream_id)
            .copied()
            .unwrap_or(self.initial as i32)
    }
}

impl Default for DefaultOutboundFlow {
    fn default() -> DefaultOutboundFlow {
        DefaultOutboundFlow::new()
    }
}

impl<T: Transport, W: FrameWrite<T>> OutboundFlow<T, W> for DefaultOutboundFlow {
    fn initial_window_size(&self) -> WindowSize {
        self.initial
    }

    fn set_initial_window_size(&mut self, size: WindowSize) -> Result<(), Http2Error> {
        check_window_size(size)?;

        let delta = size as i32 - self.initial as i32;
        for (_, window) in self.streams.iter_mut() {
            *window += delta;
        }

        self.initial = size;
        Ok(())
    }

    fn update_window(&mut self, stream_id: StreamId, delta: u32) -> Result<(), Http2Error> {
        let window = self
            .streams
            .entry(stream_id)
            .or_insert(self.initial as i32);

        let updated = i64::from(*window) + i64::from(delta);

        // A sender MUST NOT allow a flow-control window to exceed 2^31 - 1
        // (RFC 7540 §6.9.1).
        if updated > i64::from(MAX_INITIAL_WINDOW_SIZE) {
            return Err(Http2Error::stream(
                stream_id,
                Reason::FLOW_CONTROL_ERROR,
                "flow-control window overflow",
            ));
        }

        *window = updated as i32;
        trace!("window update; stream={:?} window={}", stream_id, *window);
        Ok(())
    }

    fn write_data(&mut self, io: &mut T, writer: &mut W, frame: Data) -> Completion {
        let len = frame.flow_len() as i32;
        let end_of_stream = frame.is_end_stream();
        let stream_id = frame.stream_id();

        let window = self
            .streams
            .entry(stream_id)
            .or_insert(self.initial as i32);

        if len > *window {
            return Completion::failed(Http2Error::stream(
                stream_id,
                Reason::FLOW_CONTROL_ERROR,
                "write exceeds the stream flow-control window",
            ));
        }

        *window -= len;

        if end_of_stream {
            self.streams.swap_remove(&stream_id);
        }

        writer.write_data(io, frame)
    }
}

fn check_window_size(size: WindowSize) -> Result<(), Http2Error> {
    if size > MAX_INITIAL_WINDOW_SIZE {
        return Err(Http2Error::connection(
            Reason::FLOW_CONTROL_ERROR,
            format!("invalid SETTINGS_INITIAL_WINDOW_SIZE value: {}", size),
        ));
    }

    Ok(())
}
