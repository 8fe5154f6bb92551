//! The settings coordinator: the FIFO of locally-sent SETTINGS awaiting
//! acknowledgement, and the two asymmetric apply paths.
//!
//! The peer's SETTINGS take effect immediately on receipt, before the ACK is
//! written, and reconfigure the *writer* side of the engine. Our own
//! SETTINGS take effect only when the peer's ACK comes back, and reconfigure
//! the *reader* side: applying on ACK rather than on send ensures we never
//! rely on parameters the peer has not processed yet.

use std::cmp;
use std::collections::VecDeque;

use crate::codec::{FrameRead, FrameWrite};
use crate::error::Http2Error;
use crate::flow::{InboundFlow, OutboundFlow};
use crate::frame::{
    Settings, DEFAULT_INITIAL_WINDOW_SIZE, DEFAULT_MAX_FRAME_SIZE,
    DEFAULT_SETTINGS_HEADER_TABLE_SIZE,
};
use crate::listener::FrameListener;
use crate::proto::handler::ConnectionHandler;
use crate::transport::Transport;

/// A peer that never acknowledges can otherwise grow the queue without
/// bound; past this many outstanding frames, further sends are refused.
pub const MAX_PENDING_SETTINGS: usize = 16;

/// The ordered set of locally-sent `Settings` not yet acknowledged. The next
/// SETTINGS-ACK from the peer consumes the head.
#[derive(Debug, Default)]
pub struct PendingSettings {
    queue: VecDeque<Settings>,
}

impl PendingSettings {
    pub fn new() -> PendingSettings {
        PendingSettings {
            queue: VecDeque::with_capacity(4),
        }
    }

    pub fn push(&mut self, settings: Settings) -> Result<(), Http2Error> {
        if self.queue.len() >= MAX_PENDING_SETTINGS {
            return Err(Http2Error::protocol(
                "too many outstanding SETTINGS frames awaiting acknowledgement",
            ));
        }

        self.queue.push_back(settings);
        Ok(())
    }

    pub fn poll(&mut self) -> Option<Settings> {
        self.queue.pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

impl<T, L, R, W, FI, FO> ConnectionHandler<T, L, R, W, FI, FO>
where
    T: Transport,
    L: FrameListener,
    R: FrameRead,
    W: FrameWrite<T>,
    FI: InboundFlow<T, W>,
    FO: OutboundFlow<T, W>,
{
    /// Assembles the local settings view advertised during the handshake.
    /// Only values differing from the RFC 7540 defaults are included, so an
    /// unconfigured engine advertises an empty SETTINGS payload.
    pub fn local_settings(&self) -> Settings {
        let mut settings = Settings::default();

        let window = self.inbound_flow.initial_window_size();
        if window != DEFAULT_INITIAL_WINDOW_SIZE {
            settings.set_initial_window_size(Some(window));
        }

        if let Some(max) = self.connection.remote().max_streams() {
            settings.set_max_concurrent_streams(Some(max));
        }

        let table = self.reader.max_header_table_size();
        if table != DEFAULT_SETTINGS_HEADER_TABLE_SIZE {
            settings.set_header_table_size(Some(table));
        }

        let frame_size = self.reader.max_frame_size();
        if frame_size != DEFAULT_MAX_FRAME_SIZE {
            settings.set_max_frame_size(Some(frame_size));
        }

        if let Some(list) = self.reader.max_header_list_size() {
            settings.set_max_header_list_size(Some(list));
        }

        // Only clients advertise ENABLE_PUSH, and only to turn it off
        if !self.connection.is_server() && !self.connection.local().allow_push_to() {
            settings.set_enable_push(Some(false));
        }

        settings
    }

    /// Applies settings received from the remote endpoint, targeting the
    /// writer, the outbound flow controller, and the local endpoint's
    /// stream cap.
    pub(super) fn apply_remote_settings(&mut self, settings: &Settings) -> Result<(), Http2Error> {
        if let Some(raw) = settings.enable_push() {
            if raw > 1 {
                return Err(Http2Error::protocol(format!(
                    "invalid ENABLE_PUSH value: {}",
                    raw
                )));
            }

            if !self.connection.is_server() {
                return Err(Http2Error::protocol(
                    "client received SETTINGS frame with ENABLE_PUSH specified",
                ));
            }

            self.connection.remote_mut().set_allow_push_to(raw != 0);
        }

        if let Some(max) = settings.max_concurrent_streams() {
            let value = cmp::min(max, i32::max_value() as u32);
            self.connection.local_mut().set_max_streams(Some(value));
        }

        if let Some(size) = settings.header_table_size() {
            self.writer.set_max_header_table_size(size);
        }

        if let Some(size) = settings.max_header_list_size() {
            self.writer.set_max_header_list_size(size);
        }

        if let Some(size) = settings.max_frame_size() {
            self.writer.set_max_frame_size(size)?;
        }

        if let Some(size) = settings.initial_window_size() {
            self.outbound_flow.set_initial_window_size(size)?;
        }

        Ok(())
    }

    /// Applies settings the local endpoint sent, once acknowledged,
    /// targeting the reader, the inbound flow controller, and the remote
    /// endpoint's stream cap.
    pub(super) fn apply_local_settings(&mut self, settings: &Settings) -> Result<(), Http2Error> {
        if let Some(raw) = settings.enable_push() {
            if self.connection.is_server() {
                return Err(Http2Error::protocol(
                    "server sending SETTINGS frame with ENABLE_PUSH specified",
                ));
            }

            self.connection.local_mut().set_allow_push_to(raw != 0);
        }

        if let Some(max) = settings.max_concurrent_streams() {
            let value = cmp::min(max, i32::max_value() as u32);
            self.connection.remote_mut().set_max_streams(Some(value));
        }

        if let Some(size) = settings.header_table_size() {
            self.reader.set_max_header_table_size(size);
        }

        if let Some(size) = settings.max_header_list_size() {
            self.reader.set_max_header_list_size(size);
        }

        if let Some(size) = settings.max_frame_size() {
            self.reader.set_max_frame_size(size)?;
        }

        if let Some(size) = settings.initial_window_size() {
            self.inbound_flow.set_initial_window_size(size)?;
        }

        Ok(())
    }
}
