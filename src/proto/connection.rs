use std::collections::VecDeque;
use std::hash::BuildHasherDefault;

use fnv::FnvHasher;
use indexmap::IndexMap;

use crate::error::Http2Error;
use crate::frame::{Reason, StreamDependency, StreamId, DEFAULT_PRIORITY_WEIGHT};
use crate::proto::stream::{Stream, StreamState};

type StreamMap = IndexMap<StreamId, Stream, BuildHasherDefault<FnvHasher>>;

/// Closed streams linger in the registry so that late frames for them (a
/// crossing RST_STREAM, a stale PRIORITY) resolve instead of reading as
/// unknown streams. The oldest are pruned past this bound.
const MAX_LINGERING_CLOSED: usize = 32;

/// One endpoint's view of the connection: stream-id allocation, concurrency
/// cap, push allowance, and the GOAWAY latch.
#[derive(Debug)]
pub struct Endpoint {
    server: bool,
    next_stream_id: StreamId,
    last_stream_created: StreamId,
    max_streams: Option<u32>,
    push_allowed: bool,
    go_away_received: bool,
    last_known_stream: StreamId,
}

impl Endpoint {
    fn new(server: bool) -> Endpoint {
        Endpoint {
            server,
            next_stream_id: if server { 2.into() } else { 1.into() },
            last_stream_created: StreamId::ZERO,
            max_streams: None,
            // Pushing to a server is never legal (RFC 7540 §8.2)
            push_allowed: !server,
            go_away_received: false,
            last_known_stream: StreamId::ZERO,
        }
    }

    /// The next stream id this endpoint may initiate.
    pub fn next_stream_id(&self) -> StreamId {
        self.next_stream_id
    }

    pub fn last_stream_created(&self) -> StreamId {
        self.last_stream_created
    }

    /// The cap on concurrent streams this endpoint may have active, `None`
    /// when the peer never advertised one.
    pub fn max_streams(&self) -> Option<u32> {
        self.max_streams
    }

    pub fn set_max_streams(&mut self, max: Option<u32>) {
        self.max_streams = max;
    }

    /// Whether pushing streams to this endpoint is allowed.
    pub fn allow_push_to(&self) -> bool {
        self.push_allowed
    }

    pub fn set_allow_push_to(&mut self, allowed: bool) {
        self.push_allowed = allowed && !self.server;
    }

    pub fn is_go_away_received(&self) -> bool {
        self.go_away_received
    }

    /// Latches the GOAWAY flag with the last stream the sender will honour.
    pub fn go_away_received(&mut self, last_known_stream: StreamId) {
        self.go_away_received = true;
        self.last_known_stream = last_known_stream;
    }

    pub fn last_known_stream(&self) -> StreamId {
        self.last_known_stream
    }

    fn valid_stream_id(&self, id: StreamId) -> bool {
        if self.server {
            id.is_server_initiated()
        } else {
            id.is_client_initiated()
        }
    }

    fn created(&mut self, id: StreamId) {
        self.last_stream_created = id;
        self.next_stream_id = id.next_id();
    }
}

/// The connection registry: role, the two endpoint views, and the streams
/// themselves.
#[derive(Debug)]
pub struct Connection {
    server: bool,
    streams: StreamMap,
    local: Endpoint,
    remote: Endpoint,
    closed_streams: VecDeque<StreamId>,
}

impl Connection {
    pub fn new(server: bool) -> Connection {
        Connection {
            server,
            streams: StreamMap::default(),
            local: Endpoint::new(server),
            remote: Endpoint::new(!server),
            closed_streams: VecDeque::new(),
        }
    }

    pub fn is_server(&self) -> bool {
        self.server
    }

    pub fn local(&self) -> &Endpoint {
        &self.local
    }

    pub fn local_mut(&mut self) -> &mut Endpoint {
        &mut self.local
    }

    pub fn remote(&self) -> &Endpoint {
        &self.remote
    }

    pub fn remote_mut(&mut self) -> &mut Endpoint {
        &mut self.remote
    }

    /// The connection is going away if either endpoint saw a GOAWAY.
    pub fn is_go_away(&self) -> bool {
        self.local.go_away_received || self.remote.go_away_received
    }

    pub fn stream(&self, id: StreamId) -> Option<&Stream> {
        self.streams.get(&id)
    }

    pub fn stream_mut(&mut self, id: StreamId) -> Option<&mut Stream> {
        self.streams.get_mut(&id)
    }

    pub fn require_stream(&self, id: StreamId) -> Result<&Stream, Http2Error> {
        self.streams.get(&id).ok_or_else(|| stream_missing(id))
    }

    pub fn require_stream_mut(&mut self, id: StreamId) -> Result<&mut Stream, Http2Error> {
        self.streams.get_mut(&id).ok_or_else(|| stream_missing(id))
    }

    /// The number of open or half-closed streams.
    pub fn num_active_streams(&self) -> usize {
        self.streams.values().filter(|s| s.is_active()).count()
    }

    pub fn active_stream_ids(&self) -> Vec<StreamId> {
        self.streams
            .values()
            .filter(|s| s.is_active())
            .map(|s| s.id())
            .collect()
    }

    /// Creates a stream initiated by the local endpoint.
    pub fn create_local_stream(
        &mut self,
        id: StreamId,
        half_closed: bool,
    ) -> Result<&mut Stream, Http2Error> {
        let state = if half_closed {
            StreamState::HalfClosedLocal
        } else {
            StreamState::Open
        };

        self.create_stream(true, id, state)
    }

    /// Creates a stream initiated by the remote endpoint.
    pub fn create_remote_stream(
        &mut self,
        id: StreamId,
        half_closed: bool,
    ) -> Result<&mut Stream, Http2Error> {
        let state = if half_closed {
            StreamState::HalfClosedRemote
        } else {
            StreamState::Open
        };

        self.create_stream(false, id, state)
    }

    /// Reserves `promised_id` for a push initiated by the local endpoint.
    pub fn reserve_local_push(
        &mut self,
        promised_id: StreamId,
        parent_id: StreamId,
    ) -> Result<&mut Stream, Http2Error> {
        if !self.server {
            return Err(Http2Error::protocol("a client cannot push streams"));
        }

        if !self.remote.allow_push_to() {
            return Err(Http2Error::protocol(
                "server push is disabled for the remote endpoint",
            ));
        }

        self.reserve_push(true, promised_id, parent_id, StreamState::ReservedLocal)
    }

    /// Reserves `promised_id` for a push announced by the remote endpoint.
    pub fn reserve_remote_push(
        &mut self,
        promised_id: StreamId,
        parent_id: StreamId,
    ) -> Result<&mut Stream, Http2Error> {
        if self.server {
            return Err(Http2Error::protocol("a server cannot receive pushed streams"));
        }

        if !self.local.allow_push_to() {
            return Err(Http2Error::protocol("server push is disabled"));
        }

        self.reserve_push(false, promised_id, parent_id, StreamState::ReservedRemote)
    }

    fn reserve_push(
        &mut self,
        local: bool,
        promised_id: StreamId,
        parent_id: StreamId,
        state: StreamState,
    ) -> Result<&mut Stream, Http2Error> {
        let parent_priority = {
            let parent = self.require_stream(parent_id)?;

            if !parent.is_active() {
                return Err(Http2Error::protocol(format!(
                    "parent stream {} is not active",
                    u32::from(parent_id)
                )));
            }

            // The promised stream hangs off its parent in the priority tree
            StreamDependency::new(parent_id, DEFAULT_PRIORITY_WEIGHT, false)
        };

        let stream = self.create_stream(local, promised_id, state)?;
        stream.set_priority(parent_priority)?;
        Ok(stream)
    }

    fn create_stream(
        &mut self,
        local: bool,
        id: StreamId,
        state: StreamState,
    ) -> Result<&mut Stream, Http2Error> {
        {
            let endpoint = if local { &self.local } else { &self.remote };

            if id.is_zero() {
                return Err(Http2Error::protocol("cannot create stream 0"));
            }

            if !endpoint.valid_stream_id(id) {
                return Err(Http2Error::protocol(format!(
                    "invalid parity for stream id {}",
                    u32::from(id)
                )));
            }

            // Stream ids are never reused (RFC 7540 §5.1.1)
            if id <= endpoint.last_stream_created {
                return Err(Http2Error::protocol(format!(
                    "stream id {} is not monotonically increasing",
                    u32::from(id)
                )));
            }

            if endpoint.is_go_away_received() {
                return Err(Http2Error::protocol(
                    "cannot create stream since the connection is going away",
                ));
            }

            if let Some(max) = endpoint.max_streams {
                let active = self
                    .streams
                    .values()
                    .filter(|s| !s.is_closed() && endpoint.valid_stream_id(s.id()))
                    .count();

                if active as u32 >= max {
                    return Err(Http2Error::protocol(
                        "maximum streams exceeded for this endpoint",
                    ));
                }
            }
        }

        trace!("creating stream; id={:?} state={:?}", id, state);

        let endpoint = if local {
            &mut self.local
        } else {
            &mut self.remote
        };
        endpoint.created(id);

        Ok(self
            .streams
            .entry(id)
            .or_insert_with(|| Stream::new(id, state)))
    }

    /// Marks a stream closed, keeping it in the registry until pruned.
    /// Returns false if the stream was absent or already closed.
    pub fn retire_stream(&mut self, id: StreamId) -> bool {
        let newly_closed = match self.streams.get_mut(&id) {
            Some(stream) if !stream.is_closed() => {
                stream.close();
                true
            }
            _ => false,
        };

        if newly_closed {
            self.lingering(id);
        }

        newly_closed
    }

    /// Records a stream that reached the Closed state, pruning the oldest
    /// lingering entries past the bound.
    pub fn lingering(&mut self, id: StreamId) {
        self.closed_streams.push_back(id);

        while self.closed_streams.len() > MAX_LINGERING_CLOSED {
            if let Some(old) = self.closed_streams.pop_front() {
                self.streams.swap_remove(&old);
            }
        }
    }
}

fn stream_missing(id: StreamId) -> Http2Error {
    Http2Error::connection(
        Reason::PROTOCOL_ERROR,
        format!("stream {} does not exist", u32::from(id)),
    )
}
