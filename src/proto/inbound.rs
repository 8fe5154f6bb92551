//! Inbound frame dispatch: every handler validates the preface, looks up
//! the stream and enforces its state gate, applies the GOAWAY/RST_STREAM
//! predicates, performs the frame's protocol effect, fans out to the
//! application listener, and finally cascades stream closure on
//! end-of-stream markers.

use crate::codec::{FrameRead, FrameWrite};
use crate::error::Http2Error;
use crate::flow::{InboundFlow, OutboundFlow};
use crate::frame::{
    self, Frame, Ping, Reason, StreamId,
};
use crate::listener::FrameListener;
use crate::proto::handler::ConnectionHandler;
use crate::proto::stream::StreamState;
use crate::transport::Transport;

impl<T, L, R, W, FI, FO> ConnectionHandler<T, L, R, W, FI, FO>
where
    T: Transport,
    L: FrameListener,
    R: FrameRead,
    W: FrameWrite<T>,
    FI: InboundFlow<T, W>,
    FO: OutboundFlow<T, W>,
{
    pub(super) fn dispatch(&mut self, frame: Frame) -> Result<(), Http2Error> {
        match frame {
            Frame::Data(frame) => self.on_data(frame),
            Frame::Headers(frame) => self.on_headers(frame),
            Frame::Priority(frame) => self.on_priority(frame),
            Frame::Reset(frame) => self.on_rst_stream(frame),
            Frame::Settings(frame) => {
                if frame.is_ack() {
                    self.on_settings_ack()
                } else {
                    self.on_settings(frame)
                }
            }
            Frame::PushPromise(frame) => self.on_push_promise(frame),
            Frame::Ping(frame) => {
                if frame.is_ack() {
                    self.on_ping_ack(frame)
                } else {
                    self.on_ping(frame)
                }
            }
            Frame::GoAway(frame) => self.on_go_away(frame),
            Frame::WindowUpdate(frame) => self.on_window_update(frame),
            Frame::Unknown(frame) => {
                self.listener
                    .on_unknown_frame(frame.kind(), frame.stream_id(), frame.flag(), frame.payload());
                Ok(())
            }
        }
    }

    fn on_data(&mut self, frame: frame::Data) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();
        let end_of_stream = frame.is_end_stream();

        // Check that the stream may receive data at all
        {
            let stream = self.connection.require_stream(stream_id)?;
            stream.verify_state(
                Reason::STREAM_CLOSED,
                &[StreamState::Open, StreamState::HalfClosedLocal],
            )?;
        }

        // Apply flow control before anything can drop the frame
        self.inbound_flow.on_data_read(
            &mut self.transport,
            &mut self.writer,
            stream_id,
            frame.flow_len(),
            end_of_stream,
        )?;

        self.verify_go_away_not_received()?;
        self.verify_rst_stream_not_received(stream_id)?;

        if self.should_ignore_frame(stream_id) {
            return Ok(());
        }

        self.listener
            .on_data_read(stream_id, frame.payload(), frame.pad_len(), end_of_stream);

        if end_of_stream {
            self.close_remote_side(stream_id);
        }

        Ok(())
    }

    fn on_headers(&mut self, frame: frame::Headers) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();
        let end_stream = frame.is_end_stream();
        let exists = self.connection.stream(stream_id).is_some();

        self.verify_go_away_not_received()?;
        self.verify_rst_stream_not_received(stream_id)?;

        if self.connection.remote().is_go_away_received()
            || (exists && self.should_ignore_frame(stream_id))
        {
            return Ok(());
        }

        if !exists {
            self.connection.create_remote_stream(stream_id, end_stream)?;
        } else {
            let state = self.connection.require_stream(stream_id)?.state();

            if state == StreamState::ReservedRemote {
                // Headers for a reserved push stream: open it toward the
                // local endpoint
                self.connection
                    .require_stream_mut(stream_id)?
                    .open_for_push()?;
            } else {
                self.connection.require_stream(stream_id)?.verify_state(
                    Reason::PROTOCOL_ERROR,
                    &[StreamState::Open, StreamState::HalfClosedLocal],
                )?;
            }
        }

        let priority = frame.priority().copied().unwrap_or_default();

        self.listener.on_headers_read_with_priority(
            stream_id,
            frame.fields(),
            &priority,
            frame.pad_len(),
            end_stream,
        );

        if let Some(stream) = self.connection.stream_mut(stream_id) {
            stream.set_priority(priority)?;
        }

        // If the headers complete the stream, close it
        if end_stream {
            self.close_remote_side(stream_id);
        }

        Ok(())
    }

    fn on_priority(&mut self, frame: frame::Priority) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();
        let state = self.connection.require_stream(stream_id)?.state();

        self.verify_go_away_not_received()?;
        self.verify_rst_stream_not_received(stream_id)?;

        if state == StreamState::Closed || self.should_ignore_frame(stream_id) {
            return Ok(());
        }

        self.listener.on_priority_read(stream_id, frame.dependency());

        self.connection
            .require_stream_mut(stream_id)?
            .set_priority(*frame.dependency())?;

        Ok(())
    }

    fn on_rst_stream(&mut self, frame: frame::Reset) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();

        {
            let stream = self.connection.require_stream(stream_id)?;

            // RST_STREAM frames must be ignored for closed streams
            if stream.state() == StreamState::Closed {
                return Ok(());
            }
        }

        self.verify_rst_stream_not_received(stream_id)?;

        if let Some(stream) = self.connection.stream_mut(stream_id) {
            stream.terminate_received();
        }

        self.listener.on_rst_stream_read(stream_id, frame.reason());

        if self.connection.retire_stream(stream_id) {
            self.stream_closed();
        }

        Ok(())
    }

    fn on_settings(&mut self, frame: frame::Settings) -> Result<(), Http2Error> {
        self.apply_remote_settings(&frame)?;

        // Acknowledge receipt of the settings
        self.writer.write_settings_ack(&mut self.transport);

        // We've received at least one non-ack settings frame from the remote
        // endpoint: the frame half of the preface is satisfied
        self.preface_received = true;

        self.listener.on_settings_read(&frame);

        Ok(())
    }

    fn on_settings_ack(&mut self) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        // Apply the oldest outstanding local settings. This is the
        // synchronization point between the endpoints: both sides now agree
        // the values are in force. A surplus ACK consumes nothing.
        if let Some(settings) = self.pending_settings.poll() {
            self.apply_local_settings(&settings)?;
        }

        self.listener.on_settings_ack_read();

        Ok(())
    }

    fn on_ping(&mut self, frame: Ping) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        // Echo an ack back to the remote endpoint with the same payload
        self.writer
            .write_ping(&mut self.transport, Ping::pong(*frame.payload()));

        self.listener.on_ping_read(frame.into_payload());

        Ok(())
    }

    fn on_ping_ack(&mut self, frame: Ping) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        self.listener.on_ping_ack_read(frame.into_payload());

        Ok(())
    }

    fn on_push_promise(&mut self, frame: frame::PushPromise) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();

        self.connection.require_stream(stream_id)?;
        self.verify_go_away_not_received()?;
        self.verify_rst_stream_not_received(stream_id)?;

        if self.should_ignore_frame(stream_id) {
            return Ok(());
        }

        // Reserve the promised stream, parented at the referenced stream
        self.connection
            .reserve_remote_push(frame.promised_id(), stream_id)?;

        self.listener.on_push_promise_read(
            stream_id,
            frame.promised_id(),
            frame.fields(),
            frame.pad_len(),
        );

        Ok(())
    }

    fn on_go_away(&mut self, frame: frame::GoAway) -> Result<(), Http2Error> {
        // No further locally-initiated streams are permitted
        self.connection
            .local_mut()
            .go_away_received(frame.last_stream_id());

        self.listener.on_go_away_read(
            frame.last_stream_id(),
            frame.reason(),
            frame.debug_data(),
        );

        Ok(())
    }

    fn on_window_update(&mut self, frame: frame::WindowUpdate) -> Result<(), Http2Error> {
        self.verify_preface_received()?;

        let stream_id = frame.stream_id();
        let state = self.connection.require_stream(stream_id)?.state();

        self.verify_go_away_not_received()?;
        self.verify_rst_stream_not_received(stream_id)?;

        if state == StreamState::Closed || self.should_ignore_frame(stream_id) {
            return Ok(());
        }

        // Credit the outbound flow controller
        self.outbound_flow
            .update_window(stream_id, frame.size_increment())?;

        self.listener
            .on_window_update_read(stream_id, frame.size_increment());

        Ok(())
    }

    // ===== predicates =====

    /// The HTTP/2 connection preface must be completed by the peer's first
    /// (non-ACK) SETTINGS frame before anything else is processed.
    fn verify_preface_received(&self) -> Result<(), Http2Error> {
        if !self.preface_received {
            return Err(Http2Error::protocol("received non-SETTINGS as first frame"));
        }

        Ok(())
    }

    /// After the peer told us to go away, further stream traffic from it is
    /// a protocol violation.
    fn verify_go_away_not_received(&self) -> Result<(), Http2Error> {
        if self.connection.local().is_go_away_received() {
            return Err(Http2Error::protocol("received frames after receiving GO_AWAY"));
        }

        Ok(())
    }

    fn verify_rst_stream_not_received(&self, stream_id: StreamId) -> Result<(), Http2Error> {
        if let Some(stream) = self.connection.stream(stream_id) {
            if stream.is_terminate_received() {
                return Err(Http2Error::stream(
                    stream_id,
                    Reason::STREAM_CLOSED,
                    format!(
                        "frame received after receiving RST_STREAM for stream {}",
                        u32::from(stream_id)
                    ),
                ));
            }
        }

        Ok(())
    }

    /// Inbound frames are dropped silently for streams the peer created
    /// after our GOAWAY's last-known stream, and for streams we already
    /// reset ourselves.
    fn should_ignore_frame(&self, stream_id: StreamId) -> bool {
        let remote = self.connection.remote();

        if remote.is_go_away_received() && stream_id > remote.last_known_stream() {
            // Frames for the connection stream id (0) are always allowed
            return true;
        }

        self.connection
            .stream(stream_id)
            .map(|s| s.is_terminate_sent())
            .unwrap_or(false)
    }
}
