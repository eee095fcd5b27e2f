//! Code for channels: the authenticated links between adjacent relays.
//!
//! A channel carries many circuits.  This module implements the
//! channel's own state machine -- version negotiation and the NETINFO
//! exchange -- plus the per-channel circuit-ID map and the cell codec
//! plumbing.  Deciding what each cell *means* is the dispatcher's job
//! (see [`crate::relay`]); a [`Channel`] knows only its own handshake
//! and bookkeeping.

pub(crate) mod circmap;
pub mod unique_id;

pub use crate::util::skew::ClockSkew;

use crate::{Error, Result};
use bytes::BytesMut;
use circmap::{CircIdRange, CircMap};
use ornet_cell::chancell::codec::ChannelCodec;
use ornet_cell::chancell::msg::{self, AnyChanMsg};
use ornet_cell::chancell::{AnyChanCell, ChanMsg, CircId};
use ornet_llcrypto::pk::rsa::RsaIdentity;
use std::net::IpAddr;
use std::time::{Duration, SystemTime};
use tracing::{debug, trace, warn};
use unique_id::UniqId;

/// A list of the link protocol versions that we support.
pub(crate) static LINK_PROTOCOLS: &[u16] = &[1, 2];

/// The states a channel passes through.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) enum LinkState {
    /// We have sent our VERSIONS cell and are waiting for the peer's.
    AwaitingVersions,
    /// Versions are negotiated; we are waiting for the peer's NETINFO.
    AwaitingNetinfo,
    /// The handshake is complete; circuits may be created.
    Open,
    /// The channel is closed; nothing more may be sent.
    Closed,
}

impl LinkState {
    /// Return true while the handshake is still in progress.
    pub(crate) fn is_handshaking(&self) -> bool {
        matches!(self, LinkState::AwaitingVersions | LinkState::AwaitingNetinfo)
    }
}

/// One authenticated link to another relay.
pub struct Channel {
    /// Process-unique identifier for logging.
    unique_id: UniqId,
    /// Where the handshake has got to.
    pub(crate) state: LinkState,
    /// The negotiated link protocol, once there is one.
    link_protocol: u16,
    /// The peer's identity digest, as authenticated by the TLS layer.
    peer_identity: RsaIdentity,
    /// Our own declared addresses, for the NETINFO cell.
    local_addrs: Vec<IpAddr>,
    /// The address we see the peer at, if we know it.
    peer_addr: Option<IpAddr>,
    /// Clock skew measured from the peer's NETINFO, once seen.
    clock_skew: ClockSkew,
    /// True if the peer's NETINFO listed an address we claim as ours.
    is_canonical: bool,
    /// The circuits multiplexed on this channel.
    pub(crate) circs: CircMap,
    /// The cell codec for this channel.
    codec: ChannelCodec,
    /// Bytes received from the transport and not yet decoded.
    inbuf: BytesMut,
    /// Encoded cells not yet handed to the transport.
    outbuf: BytesMut,
    /// When we flushed our VERSIONS cell, for skew computation.
    versions_sent_at: Option<SystemTime>,
    /// When this channel was created, for handshake timeouts.
    created_at: SystemTime,
}

impl Channel {
    /// Construct a new channel to a peer whose identity the TLS layer
    /// has authenticated, and queue our VERSIONS cell.
    pub(crate) fn new(
        local_identity: RsaIdentity,
        peer_identity: RsaIdentity,
        local_addrs: Vec<IpAddr>,
        peer_addr: Option<IpAddr>,
        now: SystemTime,
    ) -> Result<Self> {
        // The side with the greater identity digest owns the circuit
        // IDs with the high bit set.
        let range = if local_identity.outranks(&peer_identity) {
            CircIdRange::High
        } else {
            CircIdRange::Low
        };
        let mut channel = Channel {
            unique_id: UniqId::new(),
            state: LinkState::AwaitingVersions,
            link_protocol: 0,
            peer_identity,
            local_addrs,
            peer_addr,
            clock_skew: ClockSkew::None,
            is_canonical: false,
            circs: CircMap::new(range),
            codec: ChannelCodec::new(0),
            inbuf: BytesMut::new(),
            outbuf: BytesMut::new(),
            versions_sent_at: None,
            created_at: now,
        };
        let versions = msg::Versions::new(LINK_PROTOCOLS)?;
        let versions_cell = versions
            .encode_for_handshake()
            .map_err(ornet_cell::Error::from)?;
        channel.outbuf.extend_from_slice(&versions_cell);
        channel.versions_sent_at = Some(now);
        trace!("{}: sending versions", channel.unique_id);
        Ok(channel)
    }

    /// Return the logging identifier for this channel.
    pub fn unique_id(&self) -> UniqId {
        self.unique_id
    }
    /// Return the peer's identity digest.
    pub fn peer_identity(&self) -> &RsaIdentity {
        &self.peer_identity
    }
    /// Return the negotiated link protocol version, or 0 before
    /// negotiation finishes.
    pub fn link_protocol(&self) -> u16 {
        self.link_protocol
    }
    /// Return true once the handshake has completed.
    pub fn is_open(&self) -> bool {
        self.state == LinkState::Open
    }
    /// Return the measured clock skew, once NETINFO has been seen.
    pub fn clock_skew(&self) -> ClockSkew {
        self.clock_skew
    }
    /// Return true if the peer confirmed one of our addresses.
    pub fn is_canonical(&self) -> bool {
        self.is_canonical
    }

    /// Feed bytes received from the transport into this channel.
    pub(crate) fn receive_bytes(&mut self, data: &[u8]) {
        self.inbuf.extend_from_slice(data);
    }

    /// Decode the next complete cell from the input buffer, if there is
    /// one.
    pub(crate) fn next_cell(&mut self) -> Result<Option<AnyChanCell>> {
        Ok(self.codec.decode_cell(&mut self.inbuf)?)
    }

    /// Encode a cell onto the output buffer.
    pub(crate) fn send_cell<M: Into<AnyChanMsg>>(
        &mut self,
        circid: Option<CircId>,
        msg: M,
    ) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(Error::Closed);
        }
        let msg = msg.into();
        trace!("{}: sending {} cell", self.unique_id, msg.cmd());
        self.codec
            .write_cell(AnyChanCell::new(circid, msg), &mut self.outbuf)?;
        Ok(())
    }

    /// Take all queued outbound bytes, to be written to the transport.
    pub(crate) fn take_outbound(&mut self) -> bytes::Bytes {
        self.outbuf.split().freeze()
    }

    /// Return true if outbound bytes are waiting.
    pub(crate) fn has_outbound(&self) -> bool {
        !self.outbuf.is_empty()
    }

    /// Handle the peer's VERSIONS cell: pick the highest shared
    /// version and queue our NETINFO.
    pub(crate) fn handle_versions(&mut self, v: &msg::Versions, now: SystemTime) -> Result<()> {
        if self.state != LinkState::AwaitingVersions {
            return Err(Error::ChanProto("VERSIONS cell after handshake".into()));
        }
        let proto = v
            .best_shared_link_protocol(LINK_PROTOCOLS)
            .ok_or_else(|| Error::HandshakeProto("no shared link protocols".into()))?;
        debug!("{}: negotiated link protocol {}", self.unique_id, proto);
        self.link_protocol = proto;
        self.codec = ChannelCodec::new(proto);
        self.state = LinkState::AwaitingNetinfo;

        let timestamp = now
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_secs() as u32;
        let netinfo = msg::Netinfo::from_relay(timestamp, self.peer_addr, self.local_addrs.clone());
        self.send_cell(None, netinfo)
    }

    /// Handle the peer's NETINFO cell, completing the handshake.
    pub(crate) fn handle_netinfo(&mut self, ni: &msg::Netinfo, now: SystemTime) -> Result<()> {
        match self.state {
            LinkState::AwaitingNetinfo => (),
            LinkState::AwaitingVersions => {
                return Err(Error::ChanProto("NETINFO before VERSIONS".into()));
            }
            _ => {
                return Err(Error::ChanProto("NETINFO cell after handshake".into()));
            }
        }
        if let (Some(sent_at), Some(their_time)) = (self.versions_sent_at, ni.timestamp()) {
            let delay = now.duration_since(sent_at).unwrap_or(Duration::ZERO);
            self.clock_skew = ClockSkew::from_handshake_timestamps(sent_at, their_time, delay);
            if self.clock_skew.is_severe() {
                // Persistent skew makes directory and consensus
                // timing unreliable, but it is not a handshake
                // failure.
                warn!(
                    "{}: clock appears skewed by {:?} relative to {}",
                    self.unique_id,
                    self.clock_skew.magnitude(),
                    self.peer_identity
                );
            }
        }
        // The connection is canonical if the peer saw us at an address
        // we also claim as our own.
        self.is_canonical = ni
            .their_addr()
            .map(|a| self.local_addrs.contains(&a))
            .unwrap_or(false);
        self.state = LinkState::Open;
        debug!("{}: handshake complete", self.unique_id);
        Ok(())
    }

    /// Return when this channel was created.
    pub(crate) fn created_at(&self) -> SystemTime {
        self.created_at
    }

    /// Mark this channel as closed.
    pub(crate) fn mark_closed(&mut self) {
        self.state = LinkState::Closed;
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    fn ids() -> (RsaIdentity, RsaIdentity) {
        ([1_u8; 20].into(), [2_u8; 20].into())
    }

    fn now() -> SystemTime {
        SystemTime::UNIX_EPOCH + Duration::from_secs(1_780_000_000)
    }

    fn new_pair() -> (Channel, Channel) {
        let (id_a, id_b) = ids();
        let a = Channel::new(
            id_a,
            id_b,
            vec!["192.0.2.1".parse().unwrap()],
            Some("192.0.2.2".parse().unwrap()),
            now(),
        )
        .unwrap();
        let b = Channel::new(
            id_b,
            id_a,
            vec!["192.0.2.2".parse().unwrap()],
            Some("192.0.2.1".parse().unwrap()),
            now(),
        )
        .unwrap();
        (a, b)
    }

    /// Drive bytes from `from` to `to`, returning the decoded cells.
    fn pump(from: &mut Channel, to: &mut Channel) -> Vec<AnyChanCell> {
        let bytes = from.take_outbound();
        to.receive_bytes(&bytes);
        let mut cells = Vec::new();
        while let Some(cell) = to.next_cell().unwrap() {
            cells.push(cell);
        }
        cells
    }

    #[test]
    fn full_handshake() {
        let (mut a, mut b) = new_pair();
        // Each side begins with a VERSIONS cell.
        for cell in pump(&mut a, &mut b) {
            match cell.msg() {
                AnyChanMsg::Versions(v) => b.handle_versions(v, now()).unwrap(),
                AnyChanMsg::Netinfo(n) => b.handle_netinfo(n, now()).unwrap(),
                other => panic!("unexpected {:?}", other),
            }
        }
        for cell in pump(&mut b, &mut a) {
            match cell.msg() {
                AnyChanMsg::Versions(v) => a.handle_versions(v, now()).unwrap(),
                AnyChanMsg::Netinfo(n) => a.handle_netinfo(n, now()).unwrap(),
                other => panic!("unexpected {:?}", other),
            }
        }
        // A has b's netinfo only after another pump.
        for cell in pump(&mut a, &mut b) {
            match cell.msg() {
                AnyChanMsg::Netinfo(n) => b.handle_netinfo(n, now()).unwrap(),
                other => panic!("unexpected {:?}", other),
            }
        }
        assert!(a.is_open());
        assert!(b.is_open());
        assert_eq!(a.link_protocol(), 2);
        assert_eq!(b.link_protocol(), 2);
        // Both sides listed each other's true addresses, so both links
        // are canonical.
        assert!(a.is_canonical());
        assert!(b.is_canonical());
        assert_eq!(a.clock_skew(), ClockSkew::None);

        // The ID ranges are complementary: b has the greater identity.
        assert!(!a.circs.owns(CircId::new(0x8001).unwrap()));
        assert!(a.circs.owns(CircId::new(0x0001).unwrap()));
        assert!(b.circs.owns(CircId::new(0x8001).unwrap()));
    }

    #[test]
    fn no_shared_version() {
        let (mut a, _) = new_pair();
        let v = msg::Versions::new(vec![9, 10]).unwrap();
        assert!(matches!(
            a.handle_versions(&v, now()),
            Err(Error::HandshakeProto(_))
        ));
    }

    #[test]
    fn netinfo_before_versions_is_a_violation() {
        let (mut a, _) = new_pair();
        let ni = msg::Netinfo::from_client(None);
        assert!(matches!(
            a.handle_netinfo(&ni, now()),
            Err(Error::ChanProto(_))
        ));
    }
}
