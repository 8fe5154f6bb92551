//! A sans-IO, connection-level HTTP/2 protocol engine.
//!
//! This library implements the connection half of the [HTTP/2]
//! specification: the preface handshake, the per-stream state machine,
//! SETTINGS synchronisation, error classification, and graceful GOAWAY
//! shutdown. It is decoupled from TCP and TLS details: bytes are pushed in
//! through [`ConnectionHandler::decode`], bytes out flow through the
//! [`Transport`] trait, and decoded frames fan out to a [`FrameListener`].
//!
//! The HTTP semantic layer (request/response mapping), connection pooling,
//! and priority-aware scheduling are out of scope; header blocks cross the
//! engine as opaque ordered field lists.
//!
//! # Handshake
//!
//! The connection must already be in a state ready to start the HTTP/2
//! handshake: an HTTP/1.1 [upgrade] (see
//! [`ConnectionHandler::on_client_upgrade`] and
//! [`ConnectionHandler::on_server_upgrade`]), ALPN, or prior knowledge.
//! Signalling [`ConnectionHandler::on_transport_active`] then starts the
//! handshake proper:
//!
//! * the client sends the connection preface (a predefined sequence of 24
//!   octets),
//! * both the client and the server send a SETTINGS frame.
//!
//! No frame other than SETTINGS is processed in either direction before the
//! handshake completes.
//!
//! # Flow control
//!
//! The engine coordinates, but does not implement, flow control: DATA
//! writes are delegated to an [`flow::OutboundFlow`] and received DATA is
//! accounted through an [`flow::InboundFlow`]. The bundled defaults keep
//! the window arithmetic honest without applying back-pressure; real pacing
//! policies plug in through the same traits.
//!
//! [HTTP/2]: https://httpwg.org/specs/rfc7540.html
//! [upgrade]: https://httpwg.org/specs/rfc7540.html#discover-http

#![deny(missing_debug_implementations)]

#[macro_use]
extern crate log;

pub mod codec;
pub mod error;
pub mod flow;
pub mod frame;
pub mod listener;
pub mod proto;

mod completion;
mod transport;

pub use crate::completion::Completion;
pub use crate::error::{Http2Error, Reason};
pub use crate::frame::StreamId;
pub use crate::listener::{FrameListener, NoopListener};
pub use crate::proto::{Connection, ConnectionHandler, StreamState};
pub use crate::transport::Transport;
