//! The relay core: the dispatcher that connects channels and circuits.
//!
//! [`RelayCore`] is the explicit context object that owns every
//! channel and circuit in the process (production has exactly one;
//! tests build many).  Its job is the cell dispatch loop:
//!
//! * bytes from a TLS link are fed to [`RelayCore::receive_bytes`];
//! * each decoded cell is routed to circuit creation, to an existing
//!   circuit, or to the channel's own handshake;
//! * whatever must happen in the world outside -- bytes to write,
//!   onion-skins to process, streams to open -- is surfaced as
//!   [`Event`]s and per-channel outbound buffers.
//!
//! Everything runs on the caller's thread.  Ordering is preserved per
//! (channel, circuit): cells are handled in arrival order, and relay
//! cells keep their order per direction.

use crate::channel::Channel;
use crate::circuit::halfcirc::HalfCirc;
use crate::circuit::{
    CircHop, CircState, Circuit, CircuitRole, ClosedReason, PendingExtend, PendingHop,
};
use crate::crypto::cell::{HopNum, RelayCellBody};
use crate::crypto::handshake::fast::{CreateFastClient, CreateFastServer};
use crate::crypto::handshake::tap::{TapClient, ONION_SKIN_LEN};
use crate::crypto::handshake::{CircuitKeys, ClientHandshake, ServerHandshake};
use crate::onionskin::{OnionskinReply, OnionskinRequest};
use crate::{ChannelId, CircuitId, Error, Result};

use ornet_cell::chancell::msg::{self as chanmsg, AnyChanMsg, DestroyReason};
use ornet_cell::chancell::{ChanMsg, CircId};
use ornet_cell::relaycell::msg::{self as relaymsg, AnyRelayMsg, EndReason};
use ornet_cell::relaycell::{AnyRelayMsgOuter, RelayCmd, StreamId};
use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};

use rand::{CryptoRng, Rng};
use std::collections::{HashMap, VecDeque};
use std::net::{IpAddr, Ipv4Addr};
use std::time::SystemTime;
use tracing::{debug, trace, warn};

/// Configuration for a relay core.
#[derive(Clone, Debug)]
pub struct RelayConfig {
    /// Refuse new circuits: we are shutting down gently.
    pub hibernating: bool,
    /// How many RELAY_EARLY cells each circuit may carry.
    pub relay_early_budget: u8,
    /// Close a channel whose handshake has not finished by this long
    /// after creation.
    pub handshake_timeout: std::time::Duration,
    /// Tear down a circuit that has been waiting on a handshake (its
    /// own, or the crypto workers') for this long.
    pub circuit_build_timeout: std::time::Duration,
}

impl Default for RelayConfig {
    fn default() -> Self {
        RelayConfig {
            hibernating: false,
            relay_early_budget: 8,
            handshake_timeout: std::time::Duration::from_secs(60),
            circuit_build_timeout: std::time::Duration::from_secs(60),
        }
    }
}

/// Something that happened inside the core that the host must act on
/// or may want to know about.
#[derive(Debug)]
#[non_exhaustive]
pub enum Event {
    /// A channel finished its handshake.
    ChannelOpen(ChannelId),
    /// A channel is closed; its buffers can be dropped.
    ChannelClosed(ChannelId),
    /// An origin circuit gained a hop (its newest handshake finished).
    CircuitOpen(CircuitId),
    /// A circuit is gone.
    CircuitClosed(CircuitId, ClosedReason),
    /// The far part of an origin circuit is gone; the rest is usable,
    /// and the origin may extend a replacement hop.
    CircuitTruncated(CircuitId, DestroyReason),
    /// An onion-skin needs the crypto workers.
    OnionskinRequest(OnionskinRequest),
    /// A circuit wants to extend to a relay we have no channel to;
    /// the host should connect and then call
    /// [`RelayCore::continue_extend`].
    ChannelNeeded {
        /// The circuit that is waiting.
        circ: CircuitId,
        /// The target's address.
        addr: Ipv4Addr,
        /// The target's OR port.
        port: u16,
        /// The identity the target must present.
        rsa_id: RsaIdentity,
    },
    /// (Exit side) The origin asked to open a stream.
    StreamBegin {
        /// The circuit the stream belongs to.
        circ: CircuitId,
        /// The stream ID, chosen by the origin.
        stream: StreamId,
        /// The requested target host (name or literal).
        addr: Vec<u8>,
        /// The requested target port.
        port: u16,
    },
    /// (Exit side) The origin asked for a directory stream to us.
    StreamBeginDir {
        /// The circuit the stream belongs to.
        circ: CircuitId,
        /// The stream ID, chosen by the origin.
        stream: StreamId,
    },
    /// Stream data arrived at this edge of the circuit.
    StreamData {
        /// The circuit the stream belongs to.
        circ: CircuitId,
        /// The stream the data is for.
        stream: StreamId,
        /// The data itself.
        data: Vec<u8>,
    },
    /// (Origin side) A stream we began is now open.
    StreamConnected {
        /// The circuit the stream belongs to.
        circ: CircuitId,
        /// The stream that connected.
        stream: StreamId,
    },
    /// A stream was closed by the other side.
    StreamEnd {
        /// The circuit the stream belongs to.
        circ: CircuitId,
        /// The stream that ended.
        stream: StreamId,
        /// The reason given.
        reason: EndReason,
    },
}

/// The relay core: every channel and circuit, and the dispatcher that
/// connects them.
pub struct RelayCore {
    /// Our own identity digest.
    local_identity: RsaIdentity,
    /// Our own declared addresses, for NETINFO cells.
    local_addrs: Vec<IpAddr>,
    /// Configuration knobs.
    config: RelayConfig,
    /// All channels, by handle.
    channels: HashMap<ChannelId, Channel>,
    /// Quick lookup from peer identity to an open channel.
    chan_by_peer: HashMap<RsaIdentity, ChannelId>,
    /// All circuits, by handle.
    circuits: HashMap<CircuitId, Circuit>,
    /// Events waiting for the host.
    events: VecDeque<Event>,
    /// Next channel handle to allocate.
    next_chan: u64,
    /// Next circuit handle to allocate.
    next_circ: u64,
}

impl RelayCore {
    /// Construct a new relay core.
    pub fn new(local_identity: RsaIdentity, local_addrs: Vec<IpAddr>, config: RelayConfig) -> Self {
        RelayCore {
            local_identity,
            local_addrs,
            config,
            channels: HashMap::new(),
            chan_by_peer: HashMap::new(),
            circuits: HashMap::new(),
            events: VecDeque::new(),
            next_chan: 1,
            next_circ: 1,
        }
    }

    /// Return our own identity digest.
    pub fn local_identity(&self) -> &RsaIdentity {
        &self.local_identity
    }

    /// Add a channel to a peer whose identity the TLS layer has
    /// authenticated.  Queues our side of the handshake.
    pub fn add_channel(
        &mut self,
        peer: RsaIdentity,
        peer_addr: Option<IpAddr>,
        now: SystemTime,
    ) -> Result<ChannelId> {
        let id = ChannelId(self.next_chan);
        self.next_chan += 1;
        let channel = Channel::new(
            self.local_identity,
            peer,
            self.local_addrs.clone(),
            peer_addr,
            now,
        )?;
        self.channels.insert(id, channel);
        self.chan_by_peer.insert(peer, id);
        Ok(id)
    }

    /// Return a channel, if it exists.
    pub fn channel(&self, chan: ChannelId) -> Option<&Channel> {
        self.channels.get(&chan)
    }

    /// Return a circuit, if it exists.
    pub fn circuit(&self, circ: CircuitId) -> Option<&Circuit> {
        self.circuits.get(&circ)
    }

    /// Take the queued outbound bytes for a channel, to be written to
    /// its transport.
    pub fn take_outbound(&mut self, chan: ChannelId) -> Option<bytes::Bytes> {
        let channel = self.channels.get_mut(&chan)?;
        if channel.has_outbound() {
            Some(channel.take_outbound())
        } else {
            None
        }
    }

    /// Drain the pending events.
    pub fn take_events(&mut self) -> Vec<Event> {
        self.events.drain(..).collect()
    }

    /// Feed bytes received from a channel's transport into the core,
    /// dispatching every complete cell.
    ///
    /// A cell-framing error closes the channel (and every circuit on
    /// it); errors inside a single circuit close only that circuit.
    pub fn receive_bytes<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        data: &[u8],
        now: SystemTime,
        rng: &mut R,
    ) -> Result<()> {
        {
            let channel = self.channels.get_mut(&chan).ok_or(Error::Closed)?;
            channel.receive_bytes(data);
        }
        loop {
            let cell = {
                let channel = self.channels.get_mut(&chan).ok_or(Error::Closed)?;
                match channel.next_cell() {
                    Ok(Some(cell)) => cell,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("{}: undecodable cell: {}", chan, e);
                        self.close_channel(chan);
                        return Err(e);
                    }
                }
            };
            self.handle_cell(chan, cell, now, rng);
        }
        Ok(())
    }

    /// The host's transport for `chan` failed or closed: tear down the
    /// channel and everything on it.
    pub fn channel_failed(&mut self, chan: ChannelId) {
        self.close_channel(chan);
    }

    /// Enforce the time limits on pending work: channels that never
    /// finished their handshake, and circuits stuck waiting on a
    /// handshake or on the crypto workers.
    ///
    /// The host calls this from its timer; the core keeps no clock of
    /// its own.
    pub fn check_timeouts(&mut self, now: SystemTime) {
        let stale_channels: Vec<ChannelId> = self
            .channels
            .iter()
            .filter(|(_, c)| {
                c.state.is_handshaking()
                    && now
                        .duration_since(c.created_at())
                        .map(|age| age > self.config.handshake_timeout)
                        .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for chan in stale_channels {
            warn!("{}: handshake timed out", chan);
            self.close_channel(chan);
        }

        let stale_circuits: Vec<CircuitId> = self
            .circuits
            .iter()
            .filter(|(_, c)| {
                c.pending_since
                    .and_then(|t| now.duration_since(t).ok())
                    .map(|age| age > self.config.circuit_build_timeout)
                    .unwrap_or(false)
            })
            .map(|(id, _)| *id)
            .collect();
        for circ in stale_circuits {
            debug!("{}: circuit build timed out", circ);
            self.destroy_circuit(circ, ClosedReason::Local(DestroyReason::TIMEOUT));
        }
    }

    /// Dispatch one decoded cell.  Every error here is contained to the
    /// narrowest scope that owns it (cell, circuit, or channel), so
    /// there is nothing to return.
    fn handle_cell<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        cell: ornet_cell::chancell::AnyChanCell,
        now: SystemTime,
        rng: &mut R,
    ) {
        let (circid, msg) = cell.into_circid_and_msg();
        let handshaking = match self.channels.get(&chan) {
            Some(c) => c.state.is_handshaking(),
            None => return,
        };

        if handshaking {
            // In the handshake state only VERSIONS and NETINFO are
            // acted on; everything else is dropped.
            let result = match msg {
                AnyChanMsg::Versions(v) => self
                    .channels
                    .get_mut(&chan)
                    .map(|c| c.handle_versions(&v, now))
                    .unwrap_or(Ok(())),
                AnyChanMsg::Netinfo(n) => {
                    let r = self
                        .channels
                        .get_mut(&chan)
                        .map(|c| c.handle_netinfo(&n, now))
                        .unwrap_or(Ok(()));
                    if r.is_ok() {
                        self.events.push_back(Event::ChannelOpen(chan));
                    }
                    r
                }
                other => {
                    trace!("{}: dropping {} cell during handshake", chan, other.cmd());
                    Ok(())
                }
            };
            if let Err(e) = result {
                warn!("{}: handshake failed: {}", chan, e);
                self.close_channel(chan);
            }
            return;
        }

        match msg {
            AnyChanMsg::Padding(_) => (),
            AnyChanMsg::Versions(_) | AnyChanMsg::Netinfo(_) => {
                warn!("{}: negotiation cell on open channel", chan);
                self.close_channel(chan);
            }
            AnyChanMsg::Create(c) => {
                let Some(circid) = circid else { return };
                self.handle_create(chan, circid, c.into_handshake(), now);
            }
            AnyChanMsg::CreateFast(c) => {
                let Some(circid) = circid else { return };
                self.handle_create_fast(chan, circid, c.into_handshake(), now, rng);
            }
            AnyChanMsg::Created(c) => {
                let Some(circid) = circid else { return };
                self.handle_created(chan, circid, c.into_handshake(), false);
            }
            AnyChanMsg::CreatedFast(c) => {
                let Some(circid) = circid else { return };
                self.handle_created(chan, circid, c.into_handshake(), true);
            }
            AnyChanMsg::Relay(r) => {
                let Some(circid) = circid else { return };
                self.handle_relay(chan, circid, r.into_relay_body(), false, rng);
            }
            AnyChanMsg::RelayEarly(r) => {
                let Some(circid) = circid else { return };
                self.handle_relay(chan, circid, r.into_relay_body(), true, rng);
            }
            AnyChanMsg::Destroy(d) => {
                let Some(circid) = circid else { return };
                self.handle_destroy(chan, circid, d.reason());
            }
            AnyChanMsg::Unrecognized(u) => {
                // Unknown fixed-length commands are dropped; the link
                // survives.
                debug!("{}: dropping cell with unknown command {}", chan, u.cmd());
            }
            _ => {
                // AnyChanMsg is #[non_exhaustive]; all known variants are
                // handled above.
            }
        }
    }

    /// Helper: send a message on a channel, closing the channel if the
    /// send fails structurally.
    fn send_on(&mut self, chan: ChannelId, circid: Option<CircId>, msg: AnyChanMsg) {
        if let Some(channel) = self.channels.get_mut(&chan) {
            if let Err(e) = channel.send_cell(circid, msg) {
                warn!("{}: couldn't encode cell: {}", chan, e);
                self.close_channel(chan);
            }
        }
    }

    /// Allocate a fresh circuit handle.
    fn new_circ_handle(&mut self) -> CircuitId {
        let id = CircuitId(self.next_circ);
        self.next_circ += 1;
        id
    }

    /// Handle an incoming CREATE cell (public-key handshake).
    fn handle_create(&mut self, chan: ChannelId, circid: CircId, skin: Vec<u8>, now: SystemTime) {
        if !self.create_preamble(chan, circid) {
            return;
        }
        if skin.len() != ONION_SKIN_LEN {
            self.send_on(
                chan,
                Some(circid),
                chanmsg::Destroy::new(DestroyReason::PROTOCOL).into(),
            );
            return;
        }
        let circ = self.new_circ_handle();
        let circuit = Circuit::new_transit((chan, circid), self.config.relay_early_budget, now);
        self.circuits.insert(circ, circuit);
        if let Some(channel) = self.channels.get_mut(&chan) {
            if channel.circs.add_open_remote(circid, circ).is_err() {
                // Checked in create_preamble; a race here is a bug.
                self.circuits.remove(&circ);
                return;
            }
        }
        // The expensive part goes to the workers.
        self.events.push_back(Event::OnionskinRequest(OnionskinRequest {
            chan,
            circ_id: circid,
            skin,
        }));
    }

    /// Handle an incoming CREATE_FAST cell: answer it on the spot.
    fn handle_create_fast<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        circid: CircId,
        body: Vec<u8>,
        now: SystemTime,
        rng: &mut R,
    ) {
        if !self.create_preamble(chan, circid) {
            return;
        }
        let (keys, reply) = match CreateFastServer::server(rng, &(), &body) {
            Ok(ok) => ok,
            Err(_) => {
                self.send_on(
                    chan,
                    Some(circid),
                    chanmsg::Destroy::new(DestroyReason::PROTOCOL).into(),
                );
                return;
            }
        };
        let circ = self.new_circ_handle();
        let mut circuit = Circuit::new_transit((chan, circid), self.config.relay_early_budget, now);
        install_transit_keys(&mut circuit, &keys);
        circuit.state = CircState::Open;
        circuit.pending_since = None;
        self.circuits.insert(circ, circuit);
        if let Some(channel) = self.channels.get_mut(&chan) {
            let _ = channel.circs.add_open_remote(circid, circ);
        }
        self.send_on(chan, Some(circid), chanmsg::CreatedFast::new(reply).into());
    }

    /// Shared checks for CREATE and CREATE_FAST.  Returns false if the
    /// cell has been fully dealt with.
    fn create_preamble(&mut self, chan: ChannelId, circid: CircId) -> bool {
        let Some(channel) = self.channels.get_mut(&chan) else {
            return false;
        };
        // The ID must come from the half of the space the *peer* owns.
        if channel.circs.owns(circid) {
            warn!("{}: CREATE with a circuit ID from our own range", chan);
            let _ = channel.send_cell(
                Some(circid),
                chanmsg::Destroy::new(DestroyReason::PROTOCOL),
            );
            return false;
        }
        // A CREATE on an ID already in use is dropped silently.
        if channel.circs.get(circid).is_some() {
            trace!("{}: dropping CREATE on busy circuit ID", chan);
            return false;
        }
        if self.config.hibernating {
            let _ = channel.send_cell(
                Some(circid),
                chanmsg::Destroy::new(DestroyReason::HIBERNATING),
            );
            return false;
        }
        true
    }

    /// Deliver a crypto worker's reply.  If the circuit is gone, the
    /// reply is discarded.
    pub fn onionskin_processed(&mut self, reply: OnionskinReply) {
        let OnionskinReply {
            chan,
            circ_id,
            result,
        } = reply;
        let circ = match self.channels.get(&chan).and_then(|c| c.circs.get(circ_id)) {
            Some(crate::channel::circmap::CircEnt::Open(circ)) => *circ,
            _ => {
                debug!("{}: onion-skin reply for a vanished circuit", chan);
                return;
            }
        };
        let Some(circuit) = self.circuits.get_mut(&circ) else {
            return;
        };
        if circuit.state != CircState::OnionskinPending {
            debug!("{}: onion-skin reply for circuit in wrong state", chan);
            return;
        }
        match result {
            Ok(created) => {
                install_transit_keys(circuit, &created.keys);
                circuit.state = CircState::Open;
                circuit.pending_since = None;
                self.send_on(chan, Some(circ_id), chanmsg::Created::new(created.reply).into());
            }
            Err(_) => {
                circuit.state = CircState::Closed;
                self.circuits.remove(&circ);
                if let Some(channel) = self.channels.get_mut(&chan) {
                    channel.circs.remove(circ_id);
                }
                self.send_on(
                    chan,
                    Some(circ_id),
                    chanmsg::Destroy::new(DestroyReason::PROTOCOL).into(),
                );
            }
        }
    }

    /// Create a one-hop circuit on `chan` with the no-public-key
    /// handshake.
    pub fn create_circuit_fast<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        now: SystemTime,
        rng: &mut R,
    ) -> Result<CircuitId> {
        let (state, body) = CreateFastClient::client1(rng, &())?;
        let circ = self.new_circ_handle();
        let channel = self.channels.get_mut(&chan).ok_or(Error::Closed)?;
        if !channel.is_open() {
            return Err(Error::Closed);
        }
        let peer = *channel.peer_identity();
        let circid = channel.circs.add_ent(rng, circ)?;
        let circuit = Circuit::new_origin(
            chan,
            circid,
            PendingHop::Fast(state, peer),
            self.config.relay_early_budget,
            now,
        );
        self.circuits.insert(circ, circuit);
        self.send_on(chan, Some(circid), chanmsg::CreateFast::new(body).into());
        Ok(circ)
    }

    /// Create a one-hop circuit on `chan` with the public-key
    /// handshake, encrypting to the peer's onion key.
    pub fn create_circuit<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        onion_key: &PublicKey,
        now: SystemTime,
        rng: &mut R,
    ) -> Result<CircuitId> {
        let (state, skin) = TapClient::client1(rng, onion_key)?;
        let circ = self.new_circ_handle();
        let channel = self.channels.get_mut(&chan).ok_or(Error::Closed)?;
        if !channel.is_open() {
            return Err(Error::Closed);
        }
        let peer = *channel.peer_identity();
        let circid = channel.circs.add_ent(rng, circ)?;
        let circuit = Circuit::new_origin(
            chan,
            circid,
            PendingHop::Tap(state, peer),
            self.config.relay_early_budget,
            now,
        );
        self.circuits.insert(circ, circuit);
        self.send_on(chan, Some(circid), chanmsg::Create::new(skin).into());
        Ok(circ)
    }

    /// Handle CREATED or CREATED_FAST: either the completion of one of
    /// our own handshakes, or (at a middle relay) of an extend we are
    /// carrying out for somebody else.
    fn handle_created(&mut self, chan: ChannelId, circid: CircId, body: Vec<u8>, fast: bool) {
        let advanced = self
            .channels
            .get_mut(&chan)
            .and_then(|c| c.circs.advance_from_opening(circid).ok());
        let Some(circ) = advanced else {
            warn!("{}: unexpected CREATED cell", chan);
            self.close_channel(chan);
            return;
        };
        let is_origin = match self.circuits.get(&circ) {
            Some(c) => c.is_origin(),
            None => return,
        };
        if is_origin {
            if let Err(e) = self.origin_complete_hop(circ, body, fast) {
                debug!("{}: circuit handshake failed: {}", chan, e);
                self.destroy_circuit(circ, ClosedReason::Local(DestroyReason::PROTOCOL));
            }
        } else {
            // We are the extending relay: package the reply as an
            // EXTENDED and send it back towards the origin.
            if fast {
                self.destroy_circuit(circ, ClosedReason::Local(DestroyReason::PROTOCOL));
                return;
            }
            let msg = AnyRelayMsgOuter::new(None, relaymsg::Extended::new(body).into());
            if self.originate_backward_on(circ, msg).is_err() {
                self.destroy_circuit(circ, ClosedReason::Local(DestroyReason::INTERNAL));
                return;
            }
            circuit_state_to_open(self.circuits.get_mut(&circ));
            trace!("{} {}: extended circuit for origin", chan, circid);
        }
    }

    /// Complete an origin-side handshake (from CREATED, CREATED_FAST,
    /// or EXTENDED) and install the new hop.
    fn origin_complete_hop(&mut self, circ: CircuitId, body: Vec<u8>, fast: bool) -> Result<()> {
        let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
        let CircuitRole::Origin(st) = &mut circuit.role else {
            return Err(Error::Internal("origin handshake on transit circuit"));
        };
        let (keys, peer) = match (st.pending.take(), fast) {
            (Some(PendingHop::Fast(state, peer)), true) => {
                (CreateFastClient::client2(state, &body)?, peer)
            }
            (Some(PendingHop::Tap(state, peer)), false) => {
                (TapClient::client2(state, &body)?, peer)
            }
            (_, _) => {
                return Err(Error::CircProto(
                    "creation reply did not match a pending handshake".into(),
                ));
            }
        };
        let pair = crate::crypto::cell::CryptStatePair::new(&keys);
        let (outbound, inbound) = pair.split_client_layer();
        st.crypt_out.add_layer(outbound);
        st.crypt_in.add_layer(inbound);
        st.hops.push(CircHop::new(peer));
        circuit.state = CircState::Open;
        circuit.pending_since = None;
        self.events.push_back(Event::CircuitOpen(circ));
        Ok(())
    }

    /// Extend an open origin circuit by one hop.
    pub fn extend_circuit<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        addr: Ipv4Addr,
        port: u16,
        onion_key: &PublicKey,
        peer: RsaIdentity,
        now: SystemTime,
        rng: &mut R,
    ) -> Result<()> {
        let (state, skin) = TapClient::client1(rng, onion_key)?;
        {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Origin(st) = &mut circuit.role else {
                return Err(Error::Internal("cannot extend a transit circuit"));
            };
            // A truncated circuit may grow a replacement hop.
            let extendable =
                circuit.state == CircState::Open || circuit.state == CircState::Truncated;
            if !extendable || st.pending.is_some() || st.hops.is_empty() {
                return Err(Error::CircProto("circuit not ready to extend".into()));
            }
            st.pending = Some(PendingHop::Tap(state, peer));
        }
        let extend = relaymsg::Extend::new(addr, port, skin, peer);
        // EXTEND cells ride in RELAY_EARLY, aimed at the last hop.
        self.send_relay_from_origin(circ, None, extend.into(), true)?;
        // Mark the circuit as building again.
        if let Some(circuit) = self.circuits.get_mut(&circ) {
            circuit.state = CircState::CreateSent;
            circuit.pending_since = Some(now);
        }
        Ok(())
    }

    /// Open a new stream on an origin circuit, to the given target.
    pub fn begin_stream(&mut self, circ: CircuitId, addr: &str, port: u16) -> Result<StreamId> {
        let stream = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Origin(st) = &mut circuit.role else {
                return Err(Error::Internal("cannot begin a stream off-origin"));
            };
            if circuit.state != CircState::Open {
                return Err(Error::CircProto("circuit not open".into()));
            }
            st.streams.add_new()?
        };
        let begin = relaymsg::Begin::new(addr, port)?;
        self.send_relay_from_origin(circ, Some(stream), begin.into(), false)?;
        Ok(stream)
    }

    /// Send stream data from the origin of a circuit.
    pub fn send_stream_data(&mut self, circ: CircuitId, stream: StreamId, data: &[u8]) -> Result<()> {
        let msg = relaymsg::Data::new(data)?;
        {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            match &mut circuit.role {
                CircuitRole::Origin(st) => {
                    let last = st.hops.len().saturating_sub(1);
                    let hop = st.hops.get_mut(last).ok_or(Error::NoSuchHop)?;
                    hop.sendwindow.take()?;
                    let ent = st
                        .streams
                        .get_mut(stream)
                        .ok_or_else(|| Error::CircProto("no such stream".into()))?;
                    if ent.state != crate::circuit::StreamState::Open {
                        return Err(Error::CircProto("stream not open".into()));
                    }
                    ent.sendwindow.take()?;
                }
                CircuitRole::Transit(st) => {
                    st.sendwindow.take()?;
                    let ent = st
                        .streams
                        .get_mut(stream)
                        .ok_or_else(|| Error::CircProto("no such stream".into()))?;
                    if ent.state != crate::circuit::StreamState::Open {
                        return Err(Error::CircProto("stream not open".into()));
                    }
                    ent.sendwindow.take()?;
                }
            }
        }
        if self.circuit_is_origin(circ) {
            self.send_relay_from_origin(circ, Some(stream), msg.into(), false)
        } else {
            self.originate_backward_on(circ, AnyRelayMsgOuter::new(Some(stream), msg.into()))
        }
    }

    /// (Exit side) Report that a begun stream is connected.
    pub fn connect_stream(&mut self, circ: CircuitId, stream: StreamId) -> Result<()> {
        {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("connect_stream on origin circuit"));
            };
            st.streams
                .get_mut(stream)
                .ok_or_else(|| Error::CircProto("no such stream".into()))?
                .state = crate::circuit::StreamState::Open;
        }
        self.originate_backward_on(
            circ,
            AnyRelayMsgOuter::new(Some(stream), relaymsg::Connected::new_empty().into()),
        )
    }

    /// Close a stream with an END message.
    pub fn end_stream(&mut self, circ: CircuitId, stream: StreamId, reason: EndReason) -> Result<()> {
        let msg = AnyRelayMsgOuter::new(Some(stream), relaymsg::End::new_with_reason(reason).into());
        if let Some(circuit) = self.circuits.get_mut(&circ) {
            match &mut circuit.role {
                CircuitRole::Origin(st) => {
                    st.streams.remove(stream);
                }
                CircuitRole::Transit(st) => {
                    st.streams.remove(stream);
                }
            }
        }
        if self.circuit_is_origin(circ) {
            self.send_relay_from_origin_outer(circ, msg, false)
        } else {
            self.originate_backward_on(circ, msg)
        }
    }

    /// Tear down a circuit from this side, sending DESTROY cells.
    pub fn close_circuit(&mut self, circ: CircuitId, reason: DestroyReason) {
        self.destroy_circuit(circ, ClosedReason::Local(reason));
    }

    /// Helper: is this circuit one we originated?
    fn circuit_is_origin(&self, circ: CircuitId) -> bool {
        self.circuits.get(&circ).map(|c| c.is_origin()).unwrap_or(false)
    }

    /// Helper: encode and send a relay message from the origin to the
    /// last hop of a circuit.
    fn send_relay_from_origin(
        &mut self,
        circ: CircuitId,
        stream: Option<StreamId>,
        msg: AnyRelayMsg,
        early: bool,
    ) -> Result<()> {
        self.send_relay_from_origin_outer(circ, AnyRelayMsgOuter::new(stream, msg), early)
    }

    /// As [`send_relay_from_origin`](Self::send_relay_from_origin),
    /// with a prebuilt envelope.
    fn send_relay_from_origin_outer(
        &mut self,
        circ: CircuitId,
        msg: AnyRelayMsgOuter,
        early: bool,
    ) -> Result<()> {
        let (chan, circid, cellmsg) = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Origin(st) = &mut circuit.role else {
                return Err(Error::Internal("origin send on transit circuit"));
            };
            let n_hops = st.hops.len();
            if n_hops == 0 {
                return Err(Error::NoSuchHop);
            }
            let hop = HopNum::from((n_hops - 1) as u8);
            let mut body: RelayCellBody = msg.encode()?.into();
            st.crypt_out.encrypt(&mut body, hop)?;
            let relay = chanmsg::Relay::from_raw(*body.0);
            let cellmsg: AnyChanMsg = if early {
                if st.relay_early_remaining == 0 {
                    return Err(Error::CircProto("too many RELAY_EARLY cells".into()));
                }
                st.relay_early_remaining -= 1;
                relay.into_early()
            } else {
                relay.into()
            };
            (st.chan, st.circ_id, cellmsg)
        };
        self.send_on(chan, Some(circid), cellmsg);
        Ok(())
    }

    /// Helper: originate a relay message from this relay back towards
    /// the origin of a transit circuit.
    fn originate_backward_on(&mut self, circ: CircuitId, msg: AnyRelayMsgOuter) -> Result<()> {
        let (chan, circid, cellmsg) = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("backward send on origin circuit"));
            };
            let back = st.back.as_mut().ok_or(Error::Internal("no backward keys"))?;
            let mut body: RelayCellBody = msg.encode()?.into();
            back.originate(&mut body);
            let relay = chanmsg::Relay::from_raw(*body.0);
            (st.prev.0, st.prev.1, AnyChanMsg::from(relay))
        };
        self.send_on(chan, Some(circid), cellmsg);
        Ok(())
    }

    /// Handle a RELAY or RELAY_EARLY cell.
    fn handle_relay<R: Rng + CryptoRng>(
        &mut self,
        chan: ChannelId,
        circid: CircId,
        body: ornet_cell::chancell::BoxedCellBody,
        early: bool,
        rng: &mut R,
    ) {
        use crate::channel::circmap::CircEnt;
        /// What the circuit-map lookup found.
        enum Found {
            /// No entry: drop with a diagnostic.
            Nothing,
            /// A half-closed circuit absorbed the cell.
            Absorbed,
            /// A half-closed circuit ran out of patience.
            AbsorbedTooMany,
            /// A relay cell before the handshake finished.
            StillOpening(CircuitId),
            /// A live circuit.
            Live(CircuitId),
        }
        let found = {
            let Some(channel) = self.channels.get_mut(&chan) else {
                return;
            };
            match channel.circs.get_mut(circid) {
                None => Found::Nothing,
                Some(CircEnt::DestroySent(half)) => {
                    if half.receive_cell().is_err() {
                        Found::AbsorbedTooMany
                    } else {
                        Found::Absorbed
                    }
                }
                Some(CircEnt::Opening(c)) => Found::StillOpening(*c),
                Some(CircEnt::Open(c)) => Found::Live(*c),
            }
        };
        let circ = match found {
            Found::Nothing => {
                debug!("{} {}: relay cell on unknown circuit", chan, circid);
                return;
            }
            Found::Absorbed => return,
            Found::AbsorbedTooMany => {
                warn!("{}: too many cells on closed circuit", chan);
                self.close_channel(chan);
                return;
            }
            Found::StillOpening(c) => {
                warn!("{} {}: relay cell on opening circuit", chan, circid);
                self.destroy_circuit(c, ClosedReason::Local(DestroyReason::PROTOCOL));
                return;
            }
            Found::Live(c) => c,
        };
        let result = if self.circuit_is_origin(circ) {
            self.origin_receive_relay(circ, body, early)
        } else {
            self.transit_receive_relay(circ, chan, circid, body, early, rng)
        };
        if let Err(e) = result {
            debug!("{} {}: closing circuit: {}", chan, circid, e);
            self.destroy_circuit(circ, ClosedReason::Local(DestroyReason::PROTOCOL));
        }
    }

    /// Process a relay cell arriving at the origin of a circuit.
    fn origin_receive_relay(
        &mut self,
        circ: CircuitId,
        body: ornet_cell::chancell::BoxedCellBody,
        early: bool,
    ) -> Result<()> {
        if early {
            // Only the origin-to-exit direction may carry these.
            return Err(Error::CircProto("RELAY_EARLY towards origin".into()));
        }
        let (hop, outer) = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Origin(st) = &mut circuit.role else {
                return Err(Error::Internal("origin receive on transit circuit"));
            };
            let mut cellbody = RelayCellBody(body);
            let hop = st.crypt_in.decrypt(&mut cellbody)?;
            let outer = AnyRelayMsgOuter::decode(cellbody.into())?;
            (hop, outer)
        };
        let (stream, msg) = outer.into_streamid_and_msg();
        match msg {
            AnyRelayMsg::Extended(e) => {
                self.origin_complete_hop(circ, e.into_body(), false)?;
            }
            AnyRelayMsg::Data(d) => {
                let stream = stream.ok_or_else(|| Error::CircProto("DATA with no stream".into()))?;
                self.origin_note_data(circ, hop, Some(stream))?;
                self.events.push_back(Event::StreamData {
                    circ,
                    stream,
                    data: d.into_body(),
                });
            }
            AnyRelayMsg::Connected(_) => {
                let stream =
                    stream.ok_or_else(|| Error::CircProto("CONNECTED with no stream".into()))?;
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                if let CircuitRole::Origin(st) = &mut circuit.role {
                    if let Some(ent) = st.streams.get_mut(stream) {
                        ent.state = crate::circuit::StreamState::Open;
                    }
                }
                self.events.push_back(Event::StreamConnected { circ, stream });
            }
            AnyRelayMsg::End(e) => {
                let stream = stream.ok_or_else(|| Error::CircProto("END with no stream".into()))?;
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                if let CircuitRole::Origin(st) = &mut circuit.role {
                    st.streams.remove(stream);
                }
                self.events.push_back(Event::StreamEnd {
                    circ,
                    stream,
                    reason: e.reason(),
                });
            }
            AnyRelayMsg::Sendme(_) => {
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                let CircuitRole::Origin(st) = &mut circuit.role else {
                    return Err(Error::Internal("origin sendme on transit circuit"));
                };
                match stream {
                    None => {
                        let hop = st
                            .hops
                            .get_mut(usize::from(hop))
                            .ok_or(Error::NoSuchHop)?;
                        hop.sendwindow.put()?;
                    }
                    Some(stream) => {
                        st.streams
                            .get_mut(stream)
                            .ok_or_else(|| Error::CircProto("SENDME on no such stream".into()))?
                            .sendwindow
                            .put()?;
                    }
                }
            }
            AnyRelayMsg::Truncated(t) => {
                // Drop every hop past the sender; the origin may now
                // extend a replacement.
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                if let CircuitRole::Origin(st) = &mut circuit.role {
                    let keep = usize::from(hop) + 1;
                    st.hops.truncate(keep);
                    st.crypt_out.truncate(keep);
                    st.crypt_in.truncate(keep);
                    st.pending = None;
                }
                circuit.state = CircState::Truncated;
                self.events
                    .push_back(Event::CircuitTruncated(circ, t.reason()));
            }
            AnyRelayMsg::Drop(_) => (),
            other => {
                return Err(Error::CircProto(format!(
                    "unexpected {} cell at origin",
                    other_cmd_name(&other)
                )));
            }
        }
        Ok(())
    }

    /// Update origin-side receive windows for one incoming DATA cell,
    /// sending SENDMEs when due.
    fn origin_note_data(
        &mut self,
        circ: CircuitId,
        hop: HopNum,
        stream: Option<StreamId>,
    ) -> Result<()> {
        let (circ_sendme, stream_sendme) = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Origin(st) = &mut circuit.role else {
                return Err(Error::Internal("window accounting on transit circuit"));
            };
            let hop_ent = st
                .hops
                .get_mut(usize::from(hop))
                .ok_or(Error::NoSuchHop)?;
            let circ_sendme = hop_ent.recvwindow.note_received()?;
            let stream_sendme = match stream {
                Some(s) => {
                    let ent = st
                        .streams
                        .get_mut(s)
                        .ok_or_else(|| Error::CircProto("DATA on no such stream".into()))?;
                    ent.recvwindow.note_received()?
                }
                None => false,
            };
            if circ_sendme {
                hop_ent.recvwindow.note_sendme_sent();
            }
            (circ_sendme, stream_sendme)
        };
        if circ_sendme {
            self.send_relay_from_origin(circ, None, relaymsg::Sendme::new().into(), false)?;
        }
        if stream_sendme {
            if let Some(s) = stream {
                {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    if let CircuitRole::Origin(st) = &mut circuit.role {
                        if let Some(ent) = st.streams.get_mut(s) {
                            ent.recvwindow.note_sendme_sent();
                        }
                    }
                }
                self.send_relay_from_origin(circ, Some(s), relaymsg::Sendme::new().into(), false)?;
            }
        }
        Ok(())
    }

    /// Process a relay cell at a transit hop.
    fn transit_receive_relay<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        chan: ChannelId,
        circid: CircId,
        body: ornet_cell::chancell::BoxedCellBody,
        early: bool,
        rng: &mut R,
    ) -> Result<()> {
        // Work out the direction and peel or add our layer.
        enum Verdict {
            /// Recognized: the decoded message is for us.
            ForUs(AnyRelayMsgOuter),
            /// Not recognized: pass it to this endpoint.
            Forward {
                /// Where the cell goes next.
                to: (ChannelId, CircId),
                /// The re-framed body.
                body: ornet_cell::chancell::BoxedCellBody,
                /// Whether to keep the RELAY_EARLY marking.
                early: bool,
            },
        }
        let verdict = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("transit receive on origin circuit"));
            };
            let from_prev = st.prev == (chan, circid);
            if from_prev {
                if early {
                    st.relay_early_remaining = st
                        .relay_early_remaining
                        .checked_sub(1)
                        .ok_or_else(|| Error::CircProto("too many RELAY_EARLY cells".into()))?;
                }
                let fwd = st
                    .fwd
                    .as_mut()
                    .ok_or_else(|| Error::CircProto("relay cell before handshake done".into()))?;
                let mut cellbody = RelayCellBody(body);
                if fwd.decrypt_outbound(&mut cellbody) {
                    Verdict::ForUs(AnyRelayMsgOuter::decode(cellbody.into())?)
                } else {
                    match st.next {
                        Some(next) => Verdict::Forward {
                            to: next,
                            body: cellbody.into(),
                            early,
                        },
                        None => {
                            return Err(Error::CircProto(
                                "unrecognized cell at the end of a circuit".into(),
                            ));
                        }
                    }
                }
            } else if st.next == Some((chan, circid)) {
                // Towards the origin: add our layer and pass it on.
                // Recognition happens only at the origin.
                let back = st
                    .back
                    .as_mut()
                    .ok_or(Error::Internal("no backward keys on extended circuit"))?;
                let mut cellbody = RelayCellBody(body);
                back.encrypt_inbound(&mut cellbody);
                Verdict::Forward {
                    to: st.prev,
                    body: cellbody.into(),
                    early: false,
                }
            } else {
                return Err(Error::Internal("relay cell from unrelated channel"));
            }
        };

        match verdict {
            Verdict::Forward { to, body, early } => {
                let relay = chanmsg::Relay::from_raw(*body);
                let msg: AnyChanMsg = if early { relay.into_early() } else { relay.into() };
                self.send_on(to.0, Some(to.1), msg);
                Ok(())
            }
            Verdict::ForUs(outer) => self.transit_handle_recognized(circ, outer, early, rng),
        }
    }

    /// Act on a relay message addressed to this hop of a transit
    /// circuit.
    fn transit_handle_recognized<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        outer: AnyRelayMsgOuter,
        early: bool,
        rng: &mut R,
    ) -> Result<()> {
        let (stream, msg) = outer.into_streamid_and_msg();
        match msg {
            AnyRelayMsg::Extend(e) => {
                if !early {
                    return Err(Error::CircProto("EXTEND outside RELAY_EARLY".into()));
                }
                self.transit_handle_extend(circ, e, rng)
            }
            AnyRelayMsg::Truncate(_) => {
                // Drop our next hop (if any) and confirm.
                let next = {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    let CircuitRole::Transit(st) = &mut circuit.role else {
                        return Err(Error::Internal("truncate on origin circuit"));
                    };
                    st.next.take()
                };
                if let Some((nchan, nid)) = next {
                    self.detach_and_destroy(nchan, nid, DestroyReason::REQUESTED);
                }
                self.originate_backward_on(
                    circ,
                    AnyRelayMsgOuter::new(
                        None,
                        relaymsg::Truncated::new(DestroyReason::REQUESTED).into(),
                    ),
                )
            }
            AnyRelayMsg::Sendme(_) => {
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                let CircuitRole::Transit(st) = &mut circuit.role else {
                    return Err(Error::Internal("sendme on origin circuit"));
                };
                match stream {
                    None => st.sendwindow.put(),
                    Some(s) => st
                        .streams
                        .get_mut(s)
                        .ok_or_else(|| Error::CircProto("SENDME on no such stream".into()))?
                        .sendwindow
                        .put(),
                }
            }
            AnyRelayMsg::Begin(b) => {
                let stream =
                    stream.ok_or_else(|| Error::CircProto("BEGIN with no stream".into()))?;
                {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    let CircuitRole::Transit(st) = &mut circuit.role else {
                        return Err(Error::Internal("begin on origin circuit"));
                    };
                    st.streams.add_remote(stream)?;
                }
                self.events.push_back(Event::StreamBegin {
                    circ,
                    stream,
                    addr: b.addr().to_vec(),
                    port: b.port(),
                });
                Ok(())
            }
            AnyRelayMsg::BeginDir(_) => {
                let stream =
                    stream.ok_or_else(|| Error::CircProto("BEGIN_DIR with no stream".into()))?;
                {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    let CircuitRole::Transit(st) = &mut circuit.role else {
                        return Err(Error::Internal("begin on origin circuit"));
                    };
                    st.streams.add_remote(stream)?;
                }
                self.events.push_back(Event::StreamBeginDir { circ, stream });
                Ok(())
            }
            AnyRelayMsg::Data(d) => {
                let stream = stream.ok_or_else(|| Error::CircProto("DATA with no stream".into()))?;
                let (circ_sendme, stream_sendme) = {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    let CircuitRole::Transit(st) = &mut circuit.role else {
                        return Err(Error::Internal("data on origin circuit"));
                    };
                    let circ_due = st.recvwindow.note_received()?;
                    if circ_due {
                        st.recvwindow.note_sendme_sent();
                    }
                    let ent = st
                        .streams
                        .get_mut(stream)
                        .ok_or_else(|| Error::CircProto("DATA on no such stream".into()))?;
                    let stream_due = ent.recvwindow.note_received()?;
                    if stream_due {
                        ent.recvwindow.note_sendme_sent();
                    }
                    (circ_due, stream_due)
                };
                if circ_sendme {
                    self.originate_backward_on(
                        circ,
                        AnyRelayMsgOuter::new(None, relaymsg::Sendme::new().into()),
                    )?;
                }
                if stream_sendme {
                    self.originate_backward_on(
                        circ,
                        AnyRelayMsgOuter::new(Some(stream), relaymsg::Sendme::new().into()),
                    )?;
                }
                self.events.push_back(Event::StreamData {
                    circ,
                    stream,
                    data: d.into_body(),
                });
                Ok(())
            }
            AnyRelayMsg::End(e) => {
                let stream = stream.ok_or_else(|| Error::CircProto("END with no stream".into()))?;
                {
                    let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                    if let CircuitRole::Transit(st) = &mut circuit.role {
                        st.streams.remove(stream);
                    }
                }
                self.events.push_back(Event::StreamEnd {
                    circ,
                    stream,
                    reason: e.reason(),
                });
                Ok(())
            }
            AnyRelayMsg::Drop(_) => Ok(()),
            AnyRelayMsg::Resolve(_) | AnyRelayMsg::Resolved(_) => {
                // Name resolution is the host's business; the core only
                // transports it.  Ignore at this layer.
                Ok(())
            }
            other => Err(Error::CircProto(format!(
                "unexpected {} cell at relay",
                other_cmd_name(&other)
            ))),
        }
    }

    /// Carry out an EXTEND we received as the last hop of a circuit.
    fn transit_handle_extend<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        e: relaymsg::Extend,
        rng: &mut R,
    ) -> Result<()> {
        {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("extend on origin circuit"));
            };
            if st.next.is_some() || st.pending_extend.is_some() {
                return Err(Error::CircProto("circuit is already extended".into()));
            }
        }
        // Do we already have an open channel to the target?
        let existing = self
            .chan_by_peer
            .get(e.rsa_id())
            .copied()
            .filter(|c| self.channels.get(c).map(|c| c.is_open()).unwrap_or(false));
        match existing {
            Some(chan) => self.launch_extend(circ, chan, e.onion_skin().to_vec(), rng),
            None => {
                let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
                let CircuitRole::Transit(st) = &mut circuit.role else {
                    return Err(Error::Internal("extend on origin circuit"));
                };
                st.pending_extend = Some(PendingExtend {
                    onion_skin: e.onion_skin().to_vec(),
                    addr: e.addr(),
                    port: e.port(),
                    rsa_id: *e.rsa_id(),
                });
                self.events.push_back(Event::ChannelNeeded {
                    circ,
                    addr: e.addr(),
                    port: e.port(),
                    rsa_id: *e.rsa_id(),
                });
                Ok(())
            }
        }
    }

    /// Continue a parked EXTEND once the host has a channel open to
    /// the target.
    pub fn continue_extend<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        chan: ChannelId,
        rng: &mut R,
    ) -> Result<()> {
        let pending = {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("extend on origin circuit"));
            };
            st.pending_extend
                .take()
                .ok_or_else(|| Error::CircProto("no extend was pending".into()))?
        };
        let peer_ok = self
            .channels
            .get(&chan)
            .map(|c| c.is_open() && c.peer_identity() == &pending.rsa_id)
            .unwrap_or(false);
        if !peer_ok {
            // The relay we reached is not the one the origin named.
            warn!(
                "extend target at {}:{} did not present identity {}",
                pending.addr, pending.port, pending.rsa_id
            );
            self.originate_backward_on(
                circ,
                AnyRelayMsgOuter::new(
                    None,
                    relaymsg::Truncated::new(DestroyReason::CONNECTFAILED).into(),
                ),
            )?;
            return Ok(());
        }
        self.launch_extend(circ, chan, pending.onion_skin, rng)
    }

    /// Helper: allocate the next-side circuit ID and send the CREATE.
    fn launch_extend<R: Rng + CryptoRng>(
        &mut self,
        circ: CircuitId,
        chan: ChannelId,
        skin: Vec<u8>,
        rng: &mut R,
    ) -> Result<()> {
        let new_id = {
            let channel = self.channels.get_mut(&chan).ok_or(Error::Closed)?;
            channel.circs.add_ent(rng, circ)?
        };
        {
            let circuit = self.circuits.get_mut(&circ).ok_or(Error::Closed)?;
            let CircuitRole::Transit(st) = &mut circuit.role else {
                return Err(Error::Internal("extend on origin circuit"));
            };
            st.next = Some((chan, new_id));
        }
        self.send_on(chan, Some(new_id), chanmsg::Create::new(skin).into());
        Ok(())
    }

    /// Handle an incoming DESTROY cell.
    fn handle_destroy(&mut self, chan: ChannelId, circid: CircId, reason: DestroyReason) {
        use crate::channel::circmap::CircEnt;
        let removed = self
            .channels
            .get_mut(&chan)
            .and_then(|c| c.circs.remove(circid));
        let circ = match removed {
            None => {
                // A DESTROY for a dead circuit is the one cell that is
                // dropped with no diagnostic at all.
                return;
            }
            Some(CircEnt::DestroySent(_)) => return,
            Some(CircEnt::Opening(c)) | Some(CircEnt::Open(c)) => c,
        };
        /// What to do once the circuit borrow is released.
        enum Act {
            /// The origin's circuit is simply gone.
            CloseOrigin,
            /// Drop the circuit and pass the destroy forward.
            ForwardDestroy(Option<(ChannelId, CircId)>),
            /// Keep the near side; report a truncation backwards.
            TruncateBack,
        }
        let act = {
            let Some(circuit) = self.circuits.get_mut(&circ) else {
                return;
            };
            match &mut circuit.role {
                CircuitRole::Origin(_) => {
                    circuit.state = CircState::Closed;
                    Act::CloseOrigin
                }
                CircuitRole::Transit(st) => {
                    if st.prev == (chan, circid) {
                        // From the origin side: pass the destroy
                        // forward and drop the circuit entirely.
                        let next = st.next.take();
                        circuit.state = CircState::Closed;
                        Act::ForwardDestroy(next)
                    } else {
                        // From the next side: the origin can still use
                        // the near part, so report a truncation.
                        st.next = None;
                        circuit.state = CircState::Truncated;
                        Act::TruncateBack
                    }
                }
            }
        };
        match act {
            Act::CloseOrigin => {
                self.circuits.remove(&circ);
                self.events
                    .push_back(Event::CircuitClosed(circ, ClosedReason::Remote(reason)));
            }
            Act::ForwardDestroy(next) => {
                self.circuits.remove(&circ);
                if let Some((nchan, nid)) = next {
                    self.detach_and_destroy(nchan, nid, reason);
                }
            }
            Act::TruncateBack => {
                let _ = self.originate_backward_on(
                    circ,
                    AnyRelayMsgOuter::new(None, relaymsg::Truncated::new(reason).into()),
                );
            }
        }
    }

    /// Helper: remove a circuit ID from a channel's map and send a
    /// DESTROY for it.
    fn detach_and_destroy(&mut self, chan: ChannelId, circid: CircId, reason: DestroyReason) {
        if let Some(channel) = self.channels.get_mut(&chan) {
            channel.circs.remove(circid);
            channel.circs.destroy_sent(circid, HalfCirc::new_default());
        }
        self.send_on(chan, Some(circid), chanmsg::Destroy::new(reason).into());
    }

    /// Tear down a circuit: send DESTROYs on its attached channels,
    /// remove it, and notify the host.
    fn destroy_circuit(&mut self, circ: CircuitId, reason: ClosedReason) {
        let Some(circuit) = self.circuits.remove(&circ) else {
            return;
        };
        let wire_reason = match reason {
            ClosedReason::Local(r) | ClosedReason::Remote(r) => r,
        };
        match circuit.role {
            CircuitRole::Origin(st) => {
                self.detach_and_destroy(st.chan, st.circ_id, wire_reason);
            }
            CircuitRole::Transit(st) => {
                self.detach_and_destroy(st.prev.0, st.prev.1, wire_reason);
                if let Some((nchan, nid)) = st.next {
                    self.detach_and_destroy(nchan, nid, wire_reason);
                }
            }
        }
        self.events.push_back(Event::CircuitClosed(circ, reason));
    }

    /// Close a channel and everything that depends on it.
    ///
    /// Circuits whose *previous* side was on this channel are fully
    /// destroyed; circuits whose *next* side was on it are truncated,
    /// so the origin can extend a replacement hop.
    pub fn close_channel(&mut self, chan: ChannelId) {
        let Some(mut channel) = self.channels.remove(&chan) else {
            return;
        };
        channel.mark_closed();
        self.chan_by_peer.retain(|_, c| *c != chan);
        /// What to do for one attached circuit, once its borrow ends.
        enum Act {
            /// An origin circuit lost its only channel.
            CloseOrigin,
            /// A transit circuit lost its origin side.
            ForwardDestroy(Option<(ChannelId, CircId)>),
            /// A transit circuit lost its next hop.
            TruncateBack,
        }
        let attached = channel.circs.open_circuits();
        for (_, circ) in attached {
            let act = {
                let Some(circuit) = self.circuits.get_mut(&circ) else {
                    continue;
                };
                match &mut circuit.role {
                    CircuitRole::Origin(_) => {
                        circuit.state = CircState::Closed;
                        Act::CloseOrigin
                    }
                    CircuitRole::Transit(st) => {
                        if st.prev.0 == chan {
                            // The side towards the origin is gone; drop
                            // the whole circuit and tell the next hop.
                            let next = st.next.take();
                            circuit.state = CircState::Closed;
                            Act::ForwardDestroy(next)
                        } else {
                            // Our next hop is gone: truncate, keep the
                            // near side alive.
                            st.next = None;
                            circuit.state = CircState::Truncated;
                            Act::TruncateBack
                        }
                    }
                }
            };
            match act {
                Act::CloseOrigin => {
                    self.circuits.remove(&circ);
                    self.events.push_back(Event::CircuitClosed(
                        circ,
                        ClosedReason::Remote(DestroyReason::CHANNEL_CLOSED),
                    ));
                }
                Act::ForwardDestroy(next) => {
                    self.circuits.remove(&circ);
                    if let Some((nchan, nid)) = next {
                        self.detach_and_destroy(nchan, nid, DestroyReason::CHANNEL_CLOSED);
                    }
                }
                Act::TruncateBack => {
                    let _ = self.originate_backward_on(
                        circ,
                        AnyRelayMsgOuter::new(
                            None,
                            relaymsg::Truncated::new(DestroyReason::CHANNEL_CLOSED).into(),
                        ),
                    );
                }
            }
        }
        self.events.push_back(Event::ChannelClosed(chan));
    }
}

/// Helper: install a transit circuit's crypto layers from freshly
/// derived keys.
fn install_transit_keys(circuit: &mut Circuit, keys: &CircuitKeys) {
    if let CircuitRole::Transit(st) = &mut circuit.role {
        let pair = crate::crypto::cell::CryptStatePair::new(keys);
        let (fwd, back) = pair.split_relay_layer();
        st.fwd = Some(fwd);
        st.back = Some(back);
    }
}

/// Helper: set a circuit's state to Open, if it still exists.
fn circuit_state_to_open(circuit: Option<&mut Circuit>) {
    if let Some(c) = circuit {
        c.state = CircState::Open;
        c.pending_since = None;
    }
}

/// Helper: name a relay message's command for an error string.
fn other_cmd_name(msg: &AnyRelayMsg) -> RelayCmd {
    use ornet_cell::relaycell::RelayMsg as _;
    msg.cmd()
}

// (Integration tests for the dispatcher live in tests/relay_core.rs,
// where they can build several cores and wire them together.)
