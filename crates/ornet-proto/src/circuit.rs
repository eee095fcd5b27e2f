//! Circuit state: the per-circuit objects managed by the relay core.
//!
//! A circuit at its origin carries an ordered list of hops, each with
//! its own crypto layers and flow-control windows.  A circuit at a
//! relay in the middle has exactly two endpoints: the (channel,
//! circuit-ID) pair it came from, and the pair it continues on, if it
//! has been extended.
//!
//! The objects here are passive: every transition is driven by the
//! dispatcher in [`crate::relay`], which owns the channels the cells
//! must be sent on.

pub(crate) mod halfcirc;
pub(crate) mod sendme;

use crate::crypto::cell::{
    InboundClientCrypt, InboundRelayLayer, OutboundClientCrypt, OutboundRelayLayer,
};
use crate::crypto::handshake::fast::CreateFastClientState;
use crate::crypto::handshake::tap::TapClientState;
use crate::{ChannelId, Error, Result};
use ornet_cell::chancell::msg::DestroyReason;
use ornet_cell::chancell::CircId;
use ornet_cell::relaycell::StreamId;
use ornet_llcrypto::pk::rsa::RsaIdentity;
use sendme::{RecvWindow, SendWindow};
use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::SystemTime;

/// The states of a circuit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum CircState {
    /// (Origin) We have sent a CREATE or CREATE_FAST and are waiting
    /// for the answer.
    CreateSent,
    /// (Responder) We have handed the onion-skin to the crypto worker
    /// and are waiting for its reply.
    OnionskinPending,
    /// The circuit is open and carrying cells.
    Open,
    /// The part of the circuit past us is gone, but the near part is
    /// still usable.
    Truncated,
    /// The circuit is closed.  Terminal.
    Closed,
}

/// Why a circuit was closed, and which side started it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum ClosedReason {
    /// We tore the circuit down ourselves.
    Local(DestroyReason),
    /// The teardown came from the network.
    Remote(DestroyReason),
}

/// The state of one stream within a circuit.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum StreamState {
    /// A BEGIN has been sent; no CONNECTED or END has come back.
    Connecting,
    /// The stream is open in both directions.
    Open,
    /// We have sent an END and are waiting for the other side's END.
    CloseWait,
    /// The stream is closed.
    Closed,
}

/// Per-stream accounting at a circuit edge.
#[derive(Debug)]
pub(crate) struct StreamEnt {
    /// Where the stream is in its lifecycle.
    pub(crate) state: StreamState,
    /// How much we may send on this stream before a SENDME.
    pub(crate) sendwindow: SendWindow,
    /// How much the peer may send us on this stream.
    pub(crate) recvwindow: RecvWindow,
}

impl StreamEnt {
    /// Make the accounting for a fresh stream.
    fn new() -> Self {
        StreamEnt {
            state: StreamState::Connecting,
            sendwindow: SendWindow::new_stream(),
            recvwindow: RecvWindow::new_stream(),
        }
    }
}

/// The streams multiplexed on one origin circuit.
#[derive(Debug, Default)]
pub(crate) struct StreamMap {
    /// Map from stream ID to stream state.
    m: HashMap<StreamId, StreamEnt>,
    /// Next ID to try when allocating.
    next_id: u16,
}

impl StreamMap {
    /// Make a new empty StreamMap.
    pub(crate) fn new() -> Self {
        StreamMap {
            m: HashMap::new(),
            next_id: 1,
        }
    }

    /// Allocate an ID for a new stream, and add it to the map.
    pub(crate) fn add_new(&mut self) -> Result<StreamId> {
        // The ID space is 16 bits; give up after one lap.
        for _ in 0..=u16::MAX {
            let id = self.next_id;
            self.next_id = self.next_id.wrapping_add(1);
            if let Some(id) = StreamId::new(id) {
                if !self.m.contains_key(&id) {
                    self.m.insert(id, StreamEnt::new());
                    return Ok(id);
                }
            }
        }
        Err(Error::IdRangeFull)
    }

    /// Record a stream whose ID the other end of the circuit chose.
    ///
    /// Fails if the ID is already in use: reusing a live stream ID is
    /// a protocol violation.
    pub(crate) fn add_remote(&mut self, id: StreamId) -> Result<()> {
        match self.m.entry(id) {
            std::collections::hash_map::Entry::Vacant(v) => {
                v.insert(StreamEnt::new());
                Ok(())
            }
            std::collections::hash_map::Entry::Occupied(_) => {
                Err(Error::CircProto("stream ID already in use".into()))
            }
        }
    }

    /// Return the stream with a given ID, mutably.
    pub(crate) fn get_mut(&mut self, id: StreamId) -> Option<&mut StreamEnt> {
        self.m.get_mut(&id)
    }

    /// Remove a stream from the map.
    pub(crate) fn remove(&mut self, id: StreamId) -> Option<StreamEnt> {
        self.m.remove(&id)
    }
}

/// One hop of an origin circuit.
#[derive(Debug)]
pub(crate) struct CircHop {
    /// The identity of the relay at this hop.
    pub(crate) peer: RsaIdentity,
    /// How many data cells we may send to this hop.
    pub(crate) sendwindow: SendWindow,
    /// How many data cells this hop may send us.
    pub(crate) recvwindow: RecvWindow,
}

impl CircHop {
    /// Make the accounting for a freshly-opened hop.
    pub(crate) fn new(peer: RsaIdentity) -> Self {
        CircHop {
            peer,
            sendwindow: SendWindow::new_circ(),
            recvwindow: RecvWindow::new_circ(),
        }
    }
}

/// A handshake in progress at an origin, waiting for its reply.
pub(crate) enum PendingHop {
    /// A CREATE_FAST is outstanding for the first hop.
    Fast(CreateFastClientState, RsaIdentity),
    /// A CREATE (or EXTEND) is outstanding.
    Tap(TapClientState, RsaIdentity),
}

impl std::fmt::Debug for PendingHop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingHop::Fast(_, id) => write!(f, "PendingHop::Fast(…, {})", id),
            PendingHop::Tap(_, id) => write!(f, "PendingHop::Tap(…, {})", id),
        }
    }
}

/// The origin's view of a circuit it built.
pub(crate) struct OriginState {
    /// The channel carrying the first hop.
    pub(crate) chan: ChannelId,
    /// Our circuit ID on that channel.
    pub(crate) circ_id: CircId,
    /// The open hops, in order.
    pub(crate) hops: Vec<CircHop>,
    /// The layered crypto for cells we send.
    pub(crate) crypt_out: OutboundClientCrypt,
    /// The layered crypto for cells we receive.
    pub(crate) crypt_in: InboundClientCrypt,
    /// A handshake whose reply we are waiting for, if any.
    pub(crate) pending: Option<PendingHop>,
    /// The streams on this circuit.
    pub(crate) streams: StreamMap,
    /// How many more RELAY_EARLY cells we may send.
    pub(crate) relay_early_remaining: u8,
}

/// A transit circuit's record of an EXTEND it is carrying out.
#[derive(Debug)]
pub(crate) struct PendingExtend {
    /// The onion-skin to deliver in a CREATE cell.
    pub(crate) onion_skin: Vec<u8>,
    /// The target's address.
    pub(crate) addr: Ipv4Addr,
    /// The target's OR port.
    pub(crate) port: u16,
    /// The identity the next relay must have.
    pub(crate) rsa_id: RsaIdentity,
}

/// A middle (or exit) relay's view of somebody else's circuit.
pub(crate) struct TransitState {
    /// The endpoint the circuit was created from.
    pub(crate) prev: (ChannelId, CircId),
    /// The endpoint the circuit continues on, once extended.
    pub(crate) next: Option<(ChannelId, CircId)>,
    /// Crypto for cells moving away from the origin.
    pub(crate) fwd: Option<OutboundRelayLayer>,
    /// Crypto for cells moving towards the origin.
    pub(crate) back: Option<InboundRelayLayer>,
    /// How many data cells we may originate towards the origin.
    pub(crate) sendwindow: SendWindow,
    /// How many data cells the origin may send for us to deliver.
    pub(crate) recvwindow: RecvWindow,
    /// How many more RELAY_EARLY cells we accept on this circuit.
    pub(crate) relay_early_remaining: u8,
    /// An extend operation waiting for its channel, if any.
    pub(crate) pending_extend: Option<PendingExtend>,
    /// The streams exiting at this hop, if we are the circuit's edge.
    pub(crate) streams: StreamMap,
}

/// What role this node plays on a circuit.
pub(crate) enum CircuitRole {
    /// We built this circuit.
    Origin(OriginState),
    /// Somebody else's circuit passes through us.
    Transit(TransitState),
}

/// A single circuit, as tracked by the relay core.
pub struct Circuit {
    /// Where the circuit is in its lifecycle.
    pub(crate) state: CircState,
    /// Our role, and the role-specific state.
    pub(crate) role: CircuitRole,
    /// When the circuit entered its current waiting state, if it is
    /// waiting on a handshake; cleared once it opens.
    pub(crate) pending_since: Option<SystemTime>,
}

impl Circuit {
    /// Make a new origin circuit that has just sent its first
    /// handshake on `chan`.
    pub(crate) fn new_origin(
        chan: ChannelId,
        circ_id: CircId,
        pending: PendingHop,
        relay_early_budget: u8,
        now: SystemTime,
    ) -> Self {
        Circuit {
            pending_since: Some(now),
            state: CircState::CreateSent,
            role: CircuitRole::Origin(OriginState {
                chan,
                circ_id,
                hops: Vec::new(),
                crypt_out: OutboundClientCrypt::new(),
                crypt_in: InboundClientCrypt::new(),
                pending: Some(pending),
                streams: StreamMap::new(),
                relay_early_remaining: relay_early_budget,
            }),
        }
    }

    /// Make a new transit circuit whose onion-skin is being processed.
    pub(crate) fn new_transit(
        prev: (ChannelId, CircId),
        relay_early_budget: u8,
        now: SystemTime,
    ) -> Self {
        Circuit {
            pending_since: Some(now),
            state: CircState::OnionskinPending,
            role: CircuitRole::Transit(TransitState {
                prev,
                next: None,
                fwd: None,
                back: None,
                sendwindow: SendWindow::new_circ(),
                recvwindow: RecvWindow::new_circ(),
                relay_early_remaining: relay_early_budget,
                pending_extend: None,
                streams: StreamMap::new(),
            }),
        }
    }

    /// Return this circuit's state.
    pub fn state(&self) -> CircState {
        self.state
    }

    /// Return the number of open hops, if this is an origin circuit.
    pub fn n_hops(&self) -> Option<usize> {
        match &self.role {
            CircuitRole::Origin(st) => Some(st.hops.len()),
            CircuitRole::Transit(_) => None,
        }
    }

    /// Return true if we originated this circuit.
    pub fn is_origin(&self) -> bool {
        matches!(self.role, CircuitRole::Origin(_))
    }

    /// Return the hop identities of an origin circuit, nearest first.
    pub fn hop_identities(&self) -> Vec<RsaIdentity> {
        match &self.role {
            CircuitRole::Origin(st) => st.hops.iter().map(|h| h.peer).collect(),
            CircuitRole::Transit(_) => Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn stream_ids_unique() {
        let mut map = StreamMap::new();
        let a = map.add_new().unwrap();
        let b = map.add_new().unwrap();
        assert_ne!(a, b);
        assert!(map.get_mut(a).is_some());
        map.remove(a).unwrap();
        assert!(map.get_mut(a).is_none());
        // Freed IDs can eventually be reused, but never while open.
        for _ in 0..100 {
            let c = map.add_new().unwrap();
            assert_ne!(b, c);
        }
    }
}
