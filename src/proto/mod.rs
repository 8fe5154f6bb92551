//! The protocol engine: the connection registry, the per-stream state
//! machine, the settings coordinator, and the connection handler that ties
//! them to the codec, flow-controller, and transport seams.

mod connection;
mod handler;
mod inbound;
mod settings;
mod stream;

pub use self::connection::{Connection, Endpoint};
pub use self::handler::ConnectionHandler;
pub use self::settings::{PendingSettings, MAX_PENDING_SETTINGS};
pub use self::stream::{Stream, StreamState};
