use std::{error, fmt};

use crate::frame::{self, StreamId};

pub use crate::frame::Reason;

/// The error type for HTTP/2 protocol failures.
///
/// The two variants carry the classification the engine acts on: connection
/// errors are answered with GOAWAY followed by transport close once in-flight
/// streams drain, stream errors with RST_STREAM on the offending stream while
/// the connection survives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Http2Error {
    /// A condition that affects the whole connection.
    Connection { reason: Reason, message: String },

    /// A condition local to a single stream.
    Stream {
        id: StreamId,
        reason: Reason,
        message: String,
    },
}

impl Http2Error {
    pub fn connection<T: Into<String>>(reason: Reason, message: T) -> Http2Error {
        Http2Error::Connection {
            reason,
            message: message.into(),
        }
    }

    /// A connection-level PROTOCOL_ERROR.
    pub fn protocol<T: Into<String>>(message: T) -> Http2Error {
        Http2Error::connection(Reason::PROTOCOL_ERROR, message)
    }

    /// A connection-level FRAME_SIZE_ERROR.
    pub fn frame_size<T: Into<String>>(message: T) -> Http2Error {
        Http2Error::connection(Reason::FRAME_SIZE_ERROR, message)
    }

    /// Wraps a non-protocol fault as a connection-level INTERNAL_ERROR.
    pub fn internal<T: Into<String>>(message: T) -> Http2Error {
        Http2Error::connection(Reason::INTERNAL_ERROR, message)
    }

    pub fn stream<T: Into<String>>(id: StreamId, reason: Reason, message: T) -> Http2Error {
        Http2Error::Stream {
            id,
            reason,
            message: message.into(),
        }
    }

    pub fn reason(&self) -> Reason {
        match *self {
            Http2Error::Connection { reason, .. } => reason,
            Http2Error::Stream { reason, .. } => reason,
        }
    }

    /// The stream the error is scoped to, `None` for connection errors.
    pub fn stream_id(&self) -> Option<StreamId> {
        match *self {
            Http2Error::Connection { .. } => None,
            Http2Error::Stream { id, .. } => Some(id),
        }
    }

    pub fn is_connection_error(&self) -> bool {
        match *self {
            Http2Error::Connection { .. } => true,
            Http2Error::Stream { .. } => false,
        }
    }

    pub fn message(&self) -> &str {
        match *self {
            Http2Error::Connection { ref message, .. } => message,
            Http2Error::Stream { ref message, .. } => message,
        }
    }
}

impl From<frame::Error> for Http2Error {
    fn from(src: frame::Error) -> Http2Error {
        let reason = match src {
            frame::Error::BadFrameSize => Reason::FRAME_SIZE_ERROR,
            frame::Error::InvalidPayloadLength => Reason::FRAME_SIZE_ERROR,
            frame::Error::Hpack => Reason::COMPRESSION_ERROR,
            _ => Reason::PROTOCOL_ERROR,
        };

        Http2Error::connection(reason, src.to_string())
    }
}

impl fmt::Display for Http2Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Http2Error::Connection {
                reason,
                ref message,
            } => write!(fmt, "connection error ({}): {}", reason, message),
            Http2Error::Stream {
                id,
                reason,
                ref message,
            } => write!(
                fmt,
                "stream error on {:?} ({}): {}",
                id, reason, message
            ),
        }
    }
}

impl error::Error for Http2Error {}
