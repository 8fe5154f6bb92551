use crate::error::Http2Error;
use crate::frame::{Reason, StreamDependency, StreamId};

/// The state of an HTTP/2 stream (RFC 7540 §5.1).
///
/// ```not_rust
///                              +--------+
///                      send PP |        | recv PP
///                     ,--------|  idle  |--------.
///                    /         |        |         \
///                   v          +--------+          v
///            +----------+          |           +----------+
///            |          |          | send H /  |          |
///     ,------| reserved |          | recv H    | reserved |------.
///     |      | (local)  |          |           | (remote) |      |
///     |      +----------+          v           +----------+      |
///     |          |             +--------+             |          |
///     |          |     recv ES |        | send ES     |          |
///     |   send H |     ,-------|  open  |-------.     | recv H   |
///     |          |    /        |        |        \    |          |
///     |          v   v         +--------+         v   v          |
///     |      +----------+          |           +----------+      |
///     |      |   half   |          |           |   half   |      |
///     |      |  closed  |          | send R /  |  closed  |      |
///     |      | (remote) |          | recv R    | (local)  |      |
///     |      +----------+          |           +----------+      |
///     |           |                |                 |           |
///     |           | send ES /      |       recv ES / |           |
///     |           | send R /       v        send R / |           |
///     |           | recv R     +--------+   recv R   |           |
///     | send R /  `----------->|        |<-----------'  send R / |
///     | recv R                 | closed |               recv R   |
///     `----------------------->|        |<----------------------'
///                              +--------+
///
///        send:   endpoint sends this frame
///        recv:   endpoint receives this frame
///
///        H:  HEADERS frame (with implied CONTINUATIONs)
///        PP: PUSH_PROMISE frame (with implied CONTINUATIONs)
///        ES: END_STREAM flag
///        R:  RST_STREAM frame
/// ```
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StreamState {
    Idle,
    ReservedLocal,
    ReservedRemote,
    Open,
    HalfClosedLocal,
    HalfClosedRemote,
    Closed,
}

/// A single stream's registry entry.
#[derive(Debug)]
pub struct Stream {
    id: StreamId,
    state: StreamState,
    priority: StreamDependency,
    terminate_sent: bool,
    terminate_received: bool,
}

impl Stream {
    pub(crate) fn new(id: StreamId, state: StreamState) -> Stream {
        Stream {
            id,
            state,
            priority: StreamDependency::default(),
            terminate_sent: false,
            terminate_received: false,
        }
    }

    pub fn id(&self) -> StreamId {
        self.id
    }

    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Ensures the stream is in one of the given states, raising a stream
    /// error with the given reason otherwise.
    pub fn verify_state(&self, reason: Reason, allowed: &[StreamState]) -> Result<(), Http2Error> {
        if allowed.contains(&self.state) {
            return Ok(());
        }

        Err(Http2Error::stream(
            self.id,
            reason,
            format!("stream in unexpected state: {:?}", self.state),
        ))
    }

    pub fn priority(&self) -> &StreamDependency {
        &self.priority
    }

    pub fn set_priority(&mut self, priority: StreamDependency) -> Result<(), Http2Error> {
        if priority.dependency_id() == self.id {
            return Err(Http2Error::stream(
                self.id,
                Reason::PROTOCOL_ERROR,
                "stream cannot depend on itself",
            ));
        }

        self.priority = priority;
        Ok(())
    }

    /// Transitions a reserved stream into its half-closed form when its
    /// HEADERS are sent (reserved local) or received (reserved remote).
    pub(crate) fn open_for_push(&mut self) -> Result<(), Http2Error> {
        match self.state {
            StreamState::ReservedLocal => {
                trace!("open_for_push: ReservedLocal => HalfClosedRemote");
                self.state = StreamState::HalfClosedRemote;
                Ok(())
            }
            StreamState::ReservedRemote => {
                trace!("open_for_push: ReservedRemote => HalfClosedLocal");
                self.state = StreamState::HalfClosedLocal;
                Ok(())
            }
            _ => Err(Http2Error::stream(
                self.id,
                Reason::PROTOCOL_ERROR,
                format!("cannot open stream for push in state: {:?}", self.state),
            )),
        }
    }

    /// The local endpoint will not send further frames on this stream.
    pub(crate) fn close_local_side(&mut self) {
        match self.state {
            StreamState::Open => {
                trace!("close_local_side: Open => HalfClosedLocal");
                self.state = StreamState::HalfClosedLocal;
            }
            _ => {
                trace!("close_local_side: {:?} => Closed", self.state);
                self.state = StreamState::Closed;
            }
        }
    }

    /// The remote endpoint will not send further frames on this stream.
    pub(crate) fn close_remote_side(&mut self) {
        match self.state {
            StreamState::Open => {
                trace!("close_remote_side: Open => HalfClosedRemote");
                self.state = StreamState::HalfClosedRemote;
            }
            _ => {
                trace!("close_remote_side: {:?} => Closed", self.state);
                self.state = StreamState::Closed;
            }
        }
    }

    pub(crate) fn close(&mut self) {
        trace!("close: {:?} => Closed", self.state);
        self.state = StreamState::Closed;
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }

    /// Whether the stream counts against the active-stream total: open or
    /// half-closed, not reserved and not closed.
    pub fn is_active(&self) -> bool {
        match self.state {
            StreamState::Open | StreamState::HalfClosedLocal | StreamState::HalfClosedRemote => {
                true
            }
            _ => false,
        }
    }

    pub fn is_terminate_sent(&self) -> bool {
        self.terminate_sent
    }

    pub(crate) fn terminate_sent(&mut self) {
        self.terminate_sent = true;
    }

    pub fn is_terminate_received(&self) -> bool {
        self.terminate_received
    }

    pub(crate) fn terminate_received(&mut self) {
        self.terminate_received = true;
    }
}
