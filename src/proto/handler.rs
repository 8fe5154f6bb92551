use bytes::{Bytes, BytesMut};

use crate::codec::{FrameRead, FrameWrite, FramedRead, FramedWrite};
use crate::completion::Completion;
use crate::error::Http2Error;
use crate::flow::{DefaultInboundFlow, DefaultOutboundFlow, InboundFlow, OutboundFlow};
use crate::frame::{
    self, Data, GoAway, HeaderList, Headers, Ping, Priority, PushPromise, Reason, Reset, Settings,
    StreamDependency, StreamId,
};
use crate::listener::FrameListener;
use crate::proto::connection::Connection;
use crate::proto::settings::PendingSettings;
use crate::proto::stream::StreamState;
use crate::transport::Transport;

/// The connection-level HTTP/2 protocol engine.
///
/// Sits between a byte-oriented transport and a frame-oriented application
/// listener: drives the connection preface handshake, dispatches inbound
/// frames through the per-stream state machine, admits application writes,
/// sequences SETTINGS acknowledgements, classifies errors into stream- and
/// connection-level responses, and performs graceful GOAWAY shutdown.
///
/// All methods must be called from a single thread; the engine performs no
/// blocking I/O. Inbound bytes are pushed through [`decode`], outbound writes
/// return [`Completion`] handles resolved by the transport. Handles resolved
/// outside an engine call take effect on the next call or on [`drive`].
///
/// [`decode`]: ConnectionHandler::decode
/// [`drive`]: ConnectionHandler::drive
#[derive(Debug)]
pub struct ConnectionHandler<
    T,
    L,
    R = FramedRead,
    W = FramedWrite,
    FI = DefaultInboundFlow,
    FO = DefaultOutboundFlow,
> {
    pub(super) connection: Connection,
    pub(super) reader: R,
    pub(super) writer: W,
    pub(super) inbound_flow: FI,
    pub(super) outbound_flow: FO,
    pub(super) transport: T,
    pub(super) listener: L,

    pub(super) pending_settings: PendingSettings,

    pub(super) preface_sent: bool,
    pub(super) preface_received: bool,

    /// Servers only: the portion of the client preface not yet matched.
    pub(super) client_preface: Option<BytesMut>,

    pub(super) shutdown: Shutdown,

    /// Outstanding DATA write completions being watched for the local-side
    /// end-of-stream cascade and error routing.
    pub(super) data_writes: Vec<DataWrite>,

    pub(super) resources_freed: bool,
}

/// The shutdown state machine replacing a stored close listener: the engine
/// is draining once a GOAWAY went out (or a close was requested), and the
/// transport closes when the drain condition resolves.
#[derive(Debug)]
pub(super) enum Shutdown {
    Open,
    /// GOAWAY sent. When `close_on` is set, the transport closes as soon as
    /// that completion resolves; otherwise the last active stream's closure
    /// supplies it.
    Draining { close_on: Option<Completion> },
    Closed,
}

#[derive(Debug)]
pub(super) struct DataWrite {
    pub(super) stream_id: StreamId,
    pub(super) end_stream: bool,
    pub(super) completion: Completion,
}

impl<T, L> ConnectionHandler<T, L>
where
    T: Transport,
    L: FrameListener,
{
    /// Creates an engine with the default codec and flow controllers.
    pub fn new(server: bool, transport: T, listener: L) -> ConnectionHandler<T, L> {
        ConnectionHandler::with_parts(
            Connection::new(server),
            FramedRead::new(),
            FramedWrite::new(),
            DefaultInboundFlow::new(),
            DefaultOutboundFlow::new(),
            transport,
            listener,
        )
    }

    pub fn client(transport: T, listener: L) -> ConnectionHandler<T, L> {
        ConnectionHandler::new(false, transport, listener)
    }

    pub fn server(transport: T, listener: L) -> ConnectionHandler<T, L> {
        ConnectionHandler::new(true, transport, listener)
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
    /// Creates an engine from explicit collaborators.
    pub fn with_parts(
        connection: Connection,
        reader: R,
        writer: W,
        inbound_flow: FI,
        outbound_flow: FO,
        transport: T,
        listener: L,
    ) -> ConnectionHandler<T, L, R, W, FI, FO> {
        // Only servers expect to read the client preface string
        let client_preface = if connection.is_server() {
            Some(BytesMut::from(frame::PREFACE))
        } else {
            None
        };

        ConnectionHandler {
            connection,
            reader,
            writer,
            inbound_flow,
            outbound_flow,
            transport,
            listener,
            pending_settings: PendingSettings::new(),
            preface_sent: false,
            preface_received: false,
            client_preface,
            shutdown: Shutdown::Open,
            data_writes: Vec::new(),
            resources_freed: false,
        }
    }

    pub fn connection(&self) -> &Connection {
        &self.connection
    }

    pub fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    pub fn inbound_flow(&self) -> &FI {
        &self.inbound_flow
    }

    pub fn outbound_flow(&self) -> &FO {
        &self.outbound_flow
    }

    /// The next stream id the local endpoint may initiate.
    pub fn next_stream_id(&self) -> StreamId {
        self.connection.local().next_stream_id()
    }

    // ===== transport lifecycle =====

    /// The transport just became active: send the connection preface.
    pub fn on_transport_active(&mut self) {
        self.send_preface();
        self.sweep();
    }

    /// The engine was attached to an already-active transport: send the
    /// connection preface if it has not gone out yet.
    pub fn on_attached(&mut self) {
        self.send_preface();
        self.sweep();
    }

    /// The transport went away: every active stream closes against a
    /// succeeded future, so a pending shutdown fires on the last one.
    pub fn on_inactive(&mut self) {
        trace!("transport inactive; closing {} active streams", self.connection.num_active_streams());

        self.data_writes.clear();

        for id in self.connection.active_stream_ids() {
            self.connection.retire_stream(id);
        }

        self.stream_closed();
        self.sweep();
    }

    /// The engine is being removed; release held resources.
    pub fn on_removed(&mut self) {
        self.free_resources();
    }

    /// Initiates graceful shutdown: GOAWAY, drain in-flight streams, then
    /// close the transport.
    pub fn close(&mut self) {
        if !self.transport.is_active() {
            self.transport.close();
            return;
        }

        self.send_goaway(None);
        self.sweep();
    }

    /// Routes an error raised outside the engine (a pipeline peer, a failed
    /// write observed elsewhere) through classification.
    pub fn exception(&mut self, cause: Http2Error) {
        self.on_error(cause);
        self.sweep();
    }

    /// Re-inspects outstanding completions. Call after resolving a
    /// completion outside an engine entry point.
    pub fn drive(&mut self) {
        self.sweep();
    }

    // ===== ingress =====

    /// Consumes a chunk of transport bytes: matches the client preface on
    /// servers, then decodes and dispatches frames. Errors are classified
    /// and answered internally.
    pub fn decode(&mut self, input: &mut BytesMut) {
        if self.read_client_preface(input) {
            loop {
                match self.reader.read_frame(input) {
                    Ok(Some(frame)) => {
                        if let Err(e) = self.dispatch(frame) {
                            let fatal = e.is_connection_error();
                            self.on_error(e);
                            if fatal {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        self.on_error(e);
                        break;
                    }
                }
            }
        }

        self.sweep();
    }

    /// Matches inbound bytes against the expected client preface. Returns
    /// true once frame decoding may proceed; clients skip straight through.
    fn read_client_preface(&mut self, input: &mut BytesMut) -> bool {
        let done = match self.client_preface {
            None => return true,
            Some(ref mut expected) => {
                if input.is_empty() {
                    return false;
                }

                let n = input.len().min(expected.len());
                let chunk = input.split_to(n);
                let against = expected.split_to(n);

                if chunk != against {
                    debug!("bad connection preface; closing transport");
                    self.transport.close();
                    return false;
                }

                expected.is_empty()
            }
        };

        if done {
            trace!("client connection preface received");
            self.client_preface = None;
        }

        done
    }

    // ===== preface =====

    /// Sends the connection preface if the transport is active and it has
    /// not been sent yet. Idempotent.
    fn send_preface(&mut self) {
        if self.preface_sent || !self.transport.is_active() {
            return;
        }

        self.preface_sent = true;

        if !self.connection.is_server() {
            // Clients must send the preface string as the first bytes on the
            // connection
            let completion = self.transport.write(Bytes::from_static(frame::PREFACE));
            if completion.is_failed() {
                self.transport.close();
                return;
            }
        }

        // Both client and server must send their initial settings
        let settings = self.local_settings();
        trace!("sending initial settings; settings={:?}", settings);

        let _ = self.pending_settings.push(settings.clone());
        let completion = self.writer.write_settings(&mut self.transport, &settings);
        if completion.is_failed() {
            self.transport.close();
        }
    }

    // ===== cleartext upgrade =====

    /// Handles the client side of the cleartext HTTP upgrade: reserves
    /// stream 1 for the response, half-closed locally.
    pub fn on_client_upgrade(&mut self) -> Result<(), Http2Error> {
        if self.connection.is_server() {
            return Err(Http2Error::protocol(
                "client-side HTTP upgrade requested for a server",
            ));
        }

        self.verify_upgrade_allowed()?;

        self.connection
            .create_local_stream(StreamId::HTTP_UPGRADE, true)?;
        Ok(())
    }

    /// Handles the server side of the cleartext HTTP upgrade: applies the
    /// settings carried by the upgrade request without acknowledging them
    /// (the ACK folds into the normal handshake), and creates stream 1
    /// half-closed remotely.
    pub fn on_server_upgrade(&mut self, settings: &Settings) -> Result<(), Http2Error> {
        if !self.connection.is_server() {
            return Err(Http2Error::protocol(
                "server-side HTTP upgrade requested for a client",
            ));
        }

        self.verify_upgrade_allowed()?;

        self.apply_remote_settings(settings)?;

        self.connection
            .create_remote_stream(StreamId::HTTP_UPGRADE, true)?;
        Ok(())
    }

    fn verify_upgrade_allowed(&self) -> Result<(), Http2Error> {
        if self.preface_sent || self.preface_received {
            return Err(Http2Error::protocol(
                "HTTP upgrade must occur before HTTP/2 preface is sent or received",
            ));
        }

        if self.connection.stream(StreamId::HTTP_UPGRADE).is_some() {
            return Err(Http2Error::protocol("upgrade stream is already allocated"));
        }

        Ok(())
    }

    // ===== outbound gate =====

    /// Writes DATA on a stream. The payload is handed to the flow
    /// controller; on completion success with `end_stream` set, the local
    /// side of the stream closes.
    pub fn write_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_stream: bool,
    ) -> Completion {
        let completion = match self.try_write_data(stream_id, data, padding, end_stream) {
            Ok(completion) => completion,
            Err(e) => Completion::failed(e),
        };

        self.sweep();
        completion
    }

    fn try_write_data(
        &mut self,
        stream_id: StreamId,
        data: Bytes,
        padding: u8,
        end_stream: bool,
    ) -> Result<Completion, Http2Error> {
        self.verify_send_allowed("data")?;

        {
            let stream = self.connection.require_stream(stream_id)?;
            stream.verify_state(
                Reason::PROTOCOL_ERROR,
                &[StreamState::Open, StreamState::HalfClosedRemote],
            )?;
        }

        // Hand control of the frame to the flow controller
        let frame = Data::new(stream_id, data, padding, end_stream);
        let completion =
            self.outbound_flow
                .write_data(&mut self.transport, &mut self.writer, frame);

        self.data_writes.push(DataWrite {
            stream_id,
            end_stream,
            completion: completion.clone(),
        });

        Ok(completion)
    }

    /// Writes HEADERS, creating the stream locally when it does not exist
    /// and opening reserved-local streams for push.
    pub fn write_headers(
        &mut self,
        stream_id: StreamId,
        headers: HeaderList,
        padding: u8,
        end_stream: bool,
    ) -> Completion {
        self.write_headers_with_priority(stream_id, headers, None, padding, end_stream)
    }

    pub fn write_headers_with_priority(
        &mut self,
        stream_id: StreamId,
        headers: HeaderList,
        priority: Option<StreamDependency>,
        padding: u8,
        end_stream: bool,
    ) -> Completion {
        let completion =
            match self.try_write_headers(stream_id, headers, priority, padding, end_stream) {
                Ok(completion) => completion,
                Err(e) => Completion::failed(e),
            };

        self.sweep();
        completion
    }

    fn try_write_headers(
        &mut self,
        stream_id: StreamId,
        headers: HeaderList,
        priority: Option<StreamDependency>,
        padding: u8,
        end_stream: bool,
    ) -> Result<Completion, Http2Error> {
        self.verify_send_allowed("headers")?;

        match self.connection.stream(stream_id).map(|s| s.state()) {
            None => {
                // Create a new locally-initiated stream
                self.connection.create_local_stream(stream_id, end_stream)?;
            }
            Some(StreamState::ReservedLocal) => {
                // Sending headers on a reserved push stream: open it for
                // push to the remote endpoint
                self.connection.require_stream_mut(stream_id)?.open_for_push()?;
            }
            Some(_) => {
                let stream = self.connection.require_stream_mut(stream_id)?;
                stream.verify_state(
                    Reason::PROTOCOL_ERROR,
                    &[StreamState::Open, StreamState::HalfClosedRemote],
                )?;

                // Update the priority only if more frames will follow
                if !end_stream {
                    if let Some(priority) = priority {
                        stream.set_priority(priority)?;
                    }
                }
            }
        }

        let mut frame = Headers::new(stream_id, headers, end_stream);
        if let Some(priority) = priority {
            frame.set_priority(priority);
        }
        frame.set_padding(padding);

        let completion = self.writer.write_headers(&mut self.transport, frame);

        // If the headers end the stream, close the local side now
        if end_stream {
            self.close_local_side(stream_id);
        }

        Ok(completion)
    }

    /// Records and emits a PRIORITY update for a stream.
    pub fn write_priority(&mut self, stream_id: StreamId, priority: StreamDependency) -> Completion {
        let completion = match self.try_write_priority(stream_id, priority) {
            Ok(completion) => completion,
            Err(e) => Completion::failed(e),
        };

        self.sweep();
        completion
    }

    fn try_write_priority(
        &mut self,
        stream_id: StreamId,
        priority: StreamDependency,
    ) -> Result<Completion, Http2Error> {
        self.verify_send_allowed("priority")?;

        self.connection
            .require_stream_mut(stream_id)?
            .set_priority(priority)?;

        Ok(self
            .writer
            .write_priority(&mut self.transport, Priority::new(stream_id, priority)))
    }

    /// Emits RST_STREAM and closes the stream. A stream that no longer
    /// exists is a silent success.
    pub fn write_rst_stream(&mut self, stream_id: StreamId, error: Reason) -> Completion {
        let completion = if self.connection.stream(stream_id).is_none() {
            // The stream may already have been closed ... ignore
            Completion::succeeded()
        } else {
            let completion = self
                .writer
                .write_rst_stream(&mut self.transport, Reset::new(stream_id, error));

            if let Some(stream) = self.connection.stream_mut(stream_id) {
                stream.terminate_sent();
            }

            if self.connection.retire_stream(stream_id) {
                self.stream_closed();
            }

            completion
        };

        self.sweep();
        completion
    }

    /// Queues the settings for acknowledgement tracking and emits the
    /// frame. The queue is appended before any validation so the ACK path
    /// consumes entries in send order.
    pub fn write_settings(&mut self, settings: Settings) -> Completion {
        let completion = match self.try_write_settings(settings) {
            Ok(completion) => completion,
            Err(e) => Completion::failed(e),
        };

        self.sweep();
        completion
    }

    fn try_write_settings(&mut self, settings: Settings) -> Result<Completion, Http2Error> {
        self.pending_settings.push(settings.clone())?;

        self.verify_send_allowed("settings")?;

        if settings.enable_push().is_some() && self.connection.is_server() {
            return Err(Http2Error::protocol(
                "server sending SETTINGS frame with ENABLE_PUSH specified",
            ));
        }

        Ok(self.writer.write_settings(&mut self.transport, &settings))
    }

    pub fn write_ping(&mut self, payload: [u8; 8]) -> Completion {
        let completion = match self.try_write_ping(payload) {
            Ok(completion) => completion,
            Err(e) => Completion::failed(e),
        };

        self.sweep();
        completion
    }

    fn try_write_ping(&mut self, payload: [u8; 8]) -> Result<Completion, Http2Error> {
        self.verify_send_allowed("ping")?;
        Ok(self
            .writer
            .write_ping(&mut self.transport, Ping::ping(payload)))
    }

    /// Reserves the promised stream and emits PUSH_PROMISE.
    pub fn write_push_promise(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: HeaderList,
        padding: u8,
    ) -> Completion {
        let completion =
            match self.try_write_push_promise(stream_id, promised_stream_id, headers, padding) {
                Ok(completion) => completion,
                Err(e) => Completion::failed(e),
            };

        self.sweep();
        completion
    }

    fn try_write_push_promise(
        &mut self,
        stream_id: StreamId,
        promised_stream_id: StreamId,
        headers: HeaderList,
        padding: u8,
    ) -> Result<Completion, Http2Error> {
        self.verify_send_allowed("push promise")?;

        // Reserve the promised stream
        self.connection
            .reserve_local_push(promised_stream_id, stream_id)?;

        let mut frame = PushPromise::new(stream_id, promised_stream_id, headers);
        frame.set_padding(padding);

        Ok(self.writer.write_push_promise(&mut self.transport, frame))
    }

    pub(super) fn verify_send_allowed(&self, what: &str) -> Result<(), Http2Error> {
        if self.connection.is_go_away() {
            return Err(Http2Error::protocol(format!(
                "sending {} after connection going away",
                what
            )));
        }

        Ok(())
    }

    // ===== error engine and shutdown =====

    /// Classifies and responds to an error: RST_STREAM for stream errors,
    /// GOAWAY and close-after-drain for connection errors.
    pub(super) fn on_error(&mut self, err: Http2Error) {
        debug!("processing error; err={}", err);

        match err {
            Http2Error::Stream { id, reason, .. } => self.on_stream_error(id, reason),
            connection_error => self.on_connection_error(connection_error),
        }
    }

    fn on_stream_error(&mut self, stream_id: StreamId, reason: Reason) {
        self.writer
            .write_rst_stream(&mut self.transport, Reset::new(stream_id, reason));

        // Mark the stream as terminated and close it
        if let Some(stream) = self.connection.stream_mut(stream_id) {
            stream.terminate_sent();
        }

        if self.connection.retire_stream(stream_id) {
            self.stream_closed();
        }
    }

    fn on_connection_error(&mut self, err: Http2Error) {
        self.send_goaway(Some(err));
    }

    /// Emits GOAWAY (once) and arranges for the transport to close: right
    /// after the GOAWAY write for error-driven shutdown or when no streams
    /// are active, otherwise once the last active stream closes.
    pub(super) fn send_goaway(&mut self, cause: Option<Http2Error>) {
        let mut goaway_write = None;

        if !self.connection.is_go_away() {
            let reason = cause
                .as_ref()
                .map(|e| e.reason())
                .unwrap_or(Reason::NO_ERROR);
            let debug_data = cause
                .as_ref()
                .map(|e| Bytes::copy_from_slice(e.message().as_bytes()))
                .unwrap_or_else(Bytes::new);

            let last_known_stream = self.connection.remote().last_stream_created();

            debug!(
                "sending GOAWAY; last_stream={:?} code={:?}",
                last_known_stream, reason
            );

            let frame = GoAway::with_debug_data(last_known_stream, reason, debug_data);
            let completion = self.writer.write_go_away(&mut self.transport, frame);

            self.connection
                .remote_mut()
                .go_away_received(last_known_stream);

            goaway_write = Some(completion);
        }

        let force = cause.is_some() || self.connection.num_active_streams() == 0;

        match self.shutdown {
            Shutdown::Open => {
                let close_on = if force {
                    Some(goaway_write.unwrap_or_else(Completion::succeeded))
                } else {
                    None
                };
                self.shutdown = Shutdown::Draining { close_on };
            }
            Shutdown::Draining { ref mut close_on } => {
                // Repeat invocations refresh the pending close
                if force && close_on.is_none() {
                    *close_on = Some(goaway_write.unwrap_or_else(Completion::succeeded));
                }
            }
            Shutdown::Closed => {}
        }
    }

    /// Closes the local half of a stream, retiring it if that closes the
    /// stream entirely.
    pub(super) fn close_local_side(&mut self, stream_id: StreamId) {
        let closed = match self.connection.stream_mut(stream_id) {
            Some(stream) if !stream.is_closed() => {
                stream.close_local_side();
                stream.is_closed()
            }
            _ => return,
        };

        if closed {
            self.connection.lingering(stream_id);
            self.stream_closed();
        }
    }

    /// Closes the remote half of a stream, retiring it if that closes the
    /// stream entirely.
    pub(super) fn close_remote_side(&mut self, stream_id: StreamId) {
        let closed = match self.connection.stream_mut(stream_id) {
            Some(stream) if !stream.is_closed() => {
                stream.close_remote_side();
                stream.is_closed()
            }
            _ => return,
        };

        if closed {
            self.connection.lingering(stream_id);
            self.stream_closed();
        }
    }

    /// The close cascade: once shutdown is pending and the active stream
    /// count reaches zero, the transport close is released.
    pub(super) fn stream_closed(&mut self) {
        if let Shutdown::Draining { ref mut close_on } = self.shutdown {
            if close_on.is_none() && self.connection.num_active_streams() == 0 {
                *close_on = Some(Completion::succeeded());
            }
        }
    }

    /// Processes resolved completions and pending shutdown until nothing
    /// further fires.
    fn sweep(&mut self) {
        loop {
            let mut acted = false;

            let watches = std::mem::replace(&mut self.data_writes, Vec::new());
            let mut resolved = Vec::new();

            for watch in watches {
                if watch.completion.is_pending() {
                    self.data_writes.push(watch);
                } else {
                    resolved.push(watch);
                }
            }

            for watch in resolved {
                acted = true;

                if let Some(err) = watch.completion.error() {
                    // The write failed; handle the error
                    self.on_error(err);
                } else if watch.end_stream {
                    // Close the local side of the stream now the last frame
                    // went out
                    self.close_local_side(watch.stream_id);
                }
            }

            let close_now = match self.shutdown {
                Shutdown::Draining { ref close_on } => {
                    close_on.as_ref().map(|c| !c.is_pending()).unwrap_or(false)
                }
                _ => false,
            };

            if close_now {
                self.do_close();
                acted = true;
            }

            if !acted {
                break;
            }
        }
    }

    fn do_close(&mut self) {
        if let Shutdown::Closed = self.shutdown {
            return;
        }

        debug!("closing transport");
        self.shutdown = Shutdown::Closed;
        self.transport.close();
        self.free_resources();
    }

    /// Releases held resources exactly once.
    fn free_resources(&mut self) {
        if self.resources_freed {
            return;
        }

        self.resources_freed = true;
        self.reader.close();
        self.writer.close();
        self.client_preface = None;
    }
}
