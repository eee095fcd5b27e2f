//! End-to-end tests for the relay core: several cores wired together
//! with in-memory byte shuttling, driving real handshakes, real relay
//! crypto, and real teardown.

#![allow(clippy::unwrap_used)]

use ornet_cell::chancell::codec::ChannelCodec;
use ornet_cell::chancell::msg::{AnyChanMsg, Create, DestroyReason, TAP_C_HANDSHAKE_LEN};
use ornet_cell::chancell::{AnyChanCell, CircId};
use ornet_llcrypto::pk::rsa::{PrivateKey, RsaIdentity};
use ornet_proto::circuit::{CircState, ClosedReason};
use ornet_proto::onionskin::process_onionskin;
use ornet_proto::relay::{Event, RelayConfig, RelayCore};
use ornet_proto::{ChannelId, CircuitId};

use rand::SeedableRng as _;
use std::sync::OnceLock;
use std::time::{Duration, SystemTime};

type TestRng = rand::rngs::StdRng;

fn rng() -> TestRng {
    TestRng::seed_from_u64(0x6f726e6574636f72)
}

fn now() -> SystemTime {
    SystemTime::UNIX_EPOCH + Duration::from_secs(1_780_000_000)
}

/// The onion key every test relay shares (RSA keygen is slow).
fn onion_key() -> &'static PrivateKey {
    static KEY: OnceLock<PrivateKey> = OnceLock::new();
    KEY.get_or_init(|| {
        let mut rng = TestRng::seed_from_u64(0x6f6e696f6e6b6579);
        PrivateKey::generate(&mut rng).expect("keygen failed")
    })
}

/// A set of cores connected by in-memory links.
struct Net {
    /// The cores themselves.
    cores: Vec<RelayCore>,
    /// Links: ((core, chan), (core, chan)) pairs.
    links: Vec<((usize, ChannelId), (usize, ChannelId))>,
    /// Events drained from each core.
    events: Vec<Vec<Event>>,
    /// The RNG driving everything.
    rng: TestRng,
}

impl Net {
    fn new(n: usize) -> Net {
        let cores = (0..n)
            .map(|i| {
                let id = RsaIdentity::from_bytes(&[(i as u8 + 1) * 0x11; 20]).unwrap();
                RelayCore::new(
                    id,
                    vec![format!("10.0.0.{}", i + 1).parse().unwrap()],
                    RelayConfig::default(),
                )
            })
            .collect::<Vec<_>>();
        let events = (0..n).map(|_| Vec::new()).collect();
        Net {
            cores,
            links: Vec::new(),
            events,
            rng: rng(),
        }
    }

    /// Open a link between core `a` and core `b`, returning the two
    /// channel handles.
    fn link(&mut self, a: usize, b: usize) -> (ChannelId, ChannelId) {
        let id_a = *self.cores[a].local_identity();
        let id_b = *self.cores[b].local_identity();
        let addr_a = format!("10.0.0.{}", a + 1).parse().unwrap();
        let addr_b = format!("10.0.0.{}", b + 1).parse().unwrap();
        let chan_a = self.cores[a]
            .add_channel(id_b, Some(addr_b), now())
            .unwrap();
        let chan_b = self.cores[b]
            .add_channel(id_a, Some(addr_a), now())
            .unwrap();
        self.links.push(((a, chan_a), (b, chan_b)));
        (chan_a, chan_b)
    }

    /// Shuttle bytes between every linked pair of cores, and process
    /// onion-skin requests, until the network goes quiet.
    fn pump(&mut self) {
        for _round in 0..64 {
            let mut progress = false;
            for i in 0..self.links.len() {
                let ((ca, a), (cb, b)) = self.links[i];
                if let Some(bytes) = self.cores[ca].take_outbound(a) {
                    progress = true;
                    let _ = self.cores[cb].receive_bytes(b, &bytes, now(), &mut self.rng);
                }
                if let Some(bytes) = self.cores[cb].take_outbound(b) {
                    progress = true;
                    let _ = self.cores[ca].receive_bytes(a, &bytes, now(), &mut self.rng);
                }
            }
            // Crypto "workers": process onion-skins inline.
            for i in 0..self.cores.len() {
                for event in self.cores[i].take_events() {
                    match event {
                        Event::OnionskinRequest(req) => {
                            progress = true;
                            let reply = process_onionskin(&mut self.rng, onion_key(), req);
                            self.cores[i].onionskin_processed(reply);
                        }
                        other => self.events[i].push(other),
                    }
                }
            }
            if !progress {
                break;
            }
        }
    }

    /// Take the non-onionskin events recorded for one core.
    fn events_for(&mut self, core: usize) -> Vec<Event> {
        std::mem::take(&mut self.events[core])
    }
}

/// Build a network of four linked cores (A-B, B-C, C-D), with every
/// channel handshake completed.
fn four_relays() -> (Net, Vec<(ChannelId, ChannelId)>) {
    let mut net = Net::new(4);
    let ab = net.link(0, 1);
    let bc = net.link(1, 2);
    let cd = net.link(2, 3);
    net.pump();
    for i in 0..4 {
        // Every core saw its channels open.
        let events = net.events_for(i);
        assert!(events
            .iter()
            .any(|e| matches!(e, Event::ChannelOpen(_))));
    }
    (net, vec![ab, bc, cd])
}

#[test]
fn version_negotiation_and_netinfo() {
    let mut net = Net::new(2);
    let (chan_a, chan_b) = net.link(0, 1);
    net.pump();

    let a = net.cores[0].channel(chan_a).unwrap();
    let b = net.cores[1].channel(chan_b).unwrap();
    assert!(a.is_open());
    assert!(b.is_open());
    assert_eq!(a.link_protocol(), 2);
    assert_eq!(b.link_protocol(), 2);
    assert!(a.is_canonical());
    assert!(b.is_canonical());
}

#[test]
fn create_fast_round_trip() {
    let mut net = Net::new(2);
    let (chan_a, _chan_b) = net.link(0, 1);
    net.pump();
    net.events_for(0);

    let circ = net.cores[0].create_circuit_fast(chan_a, now(), &mut rng()).unwrap();
    assert_eq!(net.cores[0].circuit(circ).unwrap().state(), CircState::CreateSent);
    net.pump();

    assert_eq!(net.cores[0].circuit(circ).unwrap().state(), CircState::Open);
    assert_eq!(net.cores[0].circuit(circ).unwrap().n_hops(), Some(1));
    let events = net.events_for(0);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::CircuitOpen(c) if *c == circ)));
}

#[test]
fn create_with_public_key_handshake() {
    let mut net = Net::new(2);
    let (chan_a, _) = net.link(0, 1);
    net.pump();

    let circ = net.cores[0]
        .create_circuit(chan_a, &onion_key().to_public_key(), now(), &mut rng())
        .unwrap();
    net.pump();
    assert_eq!(net.cores[0].circuit(circ).unwrap().state(), CircState::Open);
}

/// Build a three-hop circuit A -> B -> C -> D, asserting progress at
/// each extension, and return its handle at A.
fn build_three_hop(net: &mut Net) -> CircuitId {
    let chan_ab = net.links[0].0 .1;
    let onion_pub = onion_key().to_public_key();

    let circ = net.cores[0]
        .create_circuit(chan_ab, &onion_pub, now(), &mut rng())
        .unwrap();
    net.pump();
    assert_eq!(net.cores[0].circuit(circ).unwrap().n_hops(), Some(1));

    let id_c = *net.cores[2].local_identity();
    net.cores[0]
        .extend_circuit(circ, "10.0.0.3".parse().unwrap(), 9001, &onion_pub, id_c, now(), &mut rng())
        .unwrap();
    net.pump();
    assert_eq!(net.cores[0].circuit(circ).unwrap().n_hops(), Some(2));

    let id_d = *net.cores[3].local_identity();
    net.cores[0]
        .extend_circuit(circ, "10.0.0.4".parse().unwrap(), 9001, &onion_pub, id_d, now(), &mut rng())
        .unwrap();
    net.pump();
    assert_eq!(net.cores[0].circuit(circ).unwrap().n_hops(), Some(3));
    assert_eq!(net.cores[0].circuit(circ).unwrap().state(), CircState::Open);

    // The hop list names B, C, D in order.
    let hops = net.cores[0].circuit(circ).unwrap().hop_identities();
    let expected: Vec<RsaIdentity> = (1..4)
        .map(|i| *net.cores[i].local_identity())
        .collect();
    assert_eq!(hops, expected);
    circ
}

#[test]
fn relay_forwarding_three_hops() {
    let (mut net, _chans) = four_relays();
    let circ = build_three_hop(&mut net);
    for i in 0..4 {
        net.events_for(i);
    }

    // Begin a stream; only D (the exit) may see the request.
    let stream = net.cores[0].begin_stream(circ, "example.com", 80).unwrap();
    net.pump();
    assert!(net.events_for(1).is_empty());
    assert!(net.events_for(2).is_empty());
    let d_events = net.events_for(3);
    let (d_circ, d_stream) = match &d_events[..] {
        [Event::StreamBegin {
            circ,
            stream,
            addr,
            port,
        }] => {
            assert_eq!(addr, b"example.com");
            assert_eq!(*port, 80);
            (*circ, *stream)
        }
        other => panic!("unexpected events at exit: {:?}", other),
    };
    assert_eq!(d_stream, stream);

    // The exit connects; the origin hears about it.
    net.cores[3].connect_stream(d_circ, d_stream).unwrap();
    net.pump();
    let a_events = net.events_for(0);
    assert!(a_events
        .iter()
        .any(|e| matches!(e, Event::StreamConnected { stream: s, .. } if *s == stream)));

    // Data, outbound: three layers peeled one per hop.
    net.cores[0]
        .send_stream_data(circ, stream, b"GET / HTTP/1.0\r\n\r\n")
        .unwrap();
    net.pump();
    let d_events = net.events_for(3);
    match &d_events[..] {
        [Event::StreamData { data, stream: s, .. }] => {
            assert_eq!(data.as_slice(), b"GET / HTTP/1.0\r\n\r\n");
            assert_eq!(*s, d_stream);
        }
        other => panic!("unexpected events at exit: {:?}", other),
    }

    // Data, inbound: originated at the exit, recognized at the origin.
    net.cores[3]
        .send_stream_data(d_circ, d_stream, b"HTTP/1.0 200 OK\r\n")
        .unwrap();
    net.pump();
    let a_events = net.events_for(0);
    match &a_events[..] {
        [Event::StreamData { data, stream: s, .. }] => {
            assert_eq!(data.as_slice(), b"HTTP/1.0 200 OK\r\n");
            assert_eq!(*s, stream);
        }
        other => panic!("unexpected events at origin: {:?}", other),
    }
}

#[test]
fn destroy_propagates_as_truncated() {
    let (mut net, chans) = four_relays();
    let circ = build_three_hop(&mut net);
    for i in 0..4 {
        net.events_for(i);
    }

    // C's link to D dies.
    let (chan_cd_at_c, chan_cd_at_d) = chans[2];
    net.cores[2].channel_failed(chan_cd_at_c);
    net.cores[3].channel_failed(chan_cd_at_d);
    net.pump();

    // D's transit circuit is gone.
    let d_events = net.events_for(3);
    assert!(d_events
        .iter()
        .any(|e| matches!(e, Event::CircuitClosed(_, _))));

    // A sees a TRUNCATED with the channel-closed reason, and keeps the
    // two surviving hops.
    let a_events = net.events_for(0);
    assert!(a_events.iter().any(|e| matches!(
        e,
        Event::CircuitTruncated(c, reason)
            if *c == circ && *reason == DestroyReason::CHANNEL_CLOSED
    )));
    let circuit = net.cores[0].circuit(circ).unwrap();
    assert_eq!(circuit.state(), CircState::Truncated);
    assert_eq!(circuit.n_hops(), Some(2));

    // The origin extends a replacement hop.  C has no channel to D any
    // more, so it parks the extend and asks for one.
    let id_d = *net.cores[3].local_identity();
    net.cores[0]
        .extend_circuit(
            circ,
            "10.0.0.4".parse().unwrap(),
            9001,
            &onion_key().to_public_key(),
            id_d,
            now(),
            &mut rng(),
        )
        .unwrap();
    net.pump();
    let c_events = net.events_for(2);
    let c_circ = match c_events
        .iter()
        .find(|e| matches!(e, Event::ChannelNeeded { .. }))
    {
        Some(Event::ChannelNeeded { circ, rsa_id, .. }) => {
            assert_eq!(rsa_id, &id_d);
            *circ
        }
        other => panic!("expected a ChannelNeeded event, got {:?}", other),
    };

    // The host reconnects C to D and resumes the extend.
    net.link(2, 3);
    net.pump();
    let new_chan_cd = net.links.last().unwrap().0 .1;
    net.cores[2]
        .continue_extend(c_circ, new_chan_cd, &mut rng())
        .unwrap();
    net.pump();
    assert_eq!(net.cores[0].circuit(circ).unwrap().state(), CircState::Open);
    assert_eq!(net.cores[0].circuit(circ).unwrap().n_hops(), Some(3));
}

#[test]
fn local_destroy_notifies_responder() {
    let mut net = Net::new(2);
    let (chan_a, _) = net.link(0, 1);
    net.pump();
    let circ = net.cores[0].create_circuit_fast(chan_a, now(), &mut rng()).unwrap();
    net.pump();
    for i in 0..2 {
        net.events_for(i);
    }

    net.cores[0].close_circuit(circ, DestroyReason::FINISHED);
    net.pump();
    let a_events = net.events_for(0);
    assert!(a_events.iter().any(|e| matches!(
        e,
        Event::CircuitClosed(c, ClosedReason::Local(DestroyReason::FINISHED)) if *c == circ
    )));
}

#[test]
fn create_with_wrong_circid_range_is_refused() {
    let mut net = Net::new(2);
    let (_chan_a, chan_b) = net.link(0, 1);
    net.pump();

    // Core 1 has the greater identity, so it owns the high IDs; a
    // CREATE from core 0 claiming a high ID violates the allocation
    // discipline.  Inject the mis-made cell directly.
    let bad_id = CircId::new(0x8005).unwrap();
    let skin = vec![0_u8; TAP_C_HANDSHAKE_LEN];
    let mut codec = ChannelCodec::new(2);
    let mut buf = bytes::BytesMut::new();
    codec
        .write_cell(
            AnyChanCell::new(Some(bad_id), Create::new(skin).into()),
            &mut buf,
        )
        .unwrap();
    net.cores[1]
        .receive_bytes(chan_b, &buf, now(), &mut rng())
        .unwrap();

    // The answer is a DESTROY with the protocol-violation reason.
    let out = net.cores[1].take_outbound(chan_b).unwrap();
    let mut buf = bytes::BytesMut::from(&out[..]);
    let cell: AnyChanCell = codec.decode_cell(&mut buf).unwrap().unwrap();
    assert_eq!(cell.circid(), Some(bad_id));
    match cell.msg() {
        AnyChanMsg::Destroy(d) => assert_eq!(d.reason(), DestroyReason::PROTOCOL),
        other => panic!("unexpected reply {:?}", other),
    }
}

#[test]
fn hibernating_relay_refuses_creates() {
    let mut net = Net::new(2);
    let (chan_a, _) = net.link(0, 1);
    net.pump();

    // Put core 1 into hibernation after the handshake.
    let id_a = *net.cores[0].local_identity();
    let id_b = *net.cores[1].local_identity();
    let mut sleepy = RelayCore::new(
        id_b,
        vec!["10.0.0.2".parse().unwrap()],
        RelayConfig {
            hibernating: true,
            ..RelayConfig::default()
        },
    );
    let chan_b2 = sleepy.add_channel(id_a, None, now()).unwrap();
    net.cores[1] = sleepy;
    net.links[0].1 = (1, chan_b2);
    // Redo the handshake with the hibernating instance.
    let chan_a2 = net.cores[0].add_channel(id_b, None, now()).unwrap();
    net.links[0].0 = (0, chan_a2);
    net.pump();
    let _ = chan_a;

    let circ = net.cores[0].create_circuit_fast(chan_a2, now(), &mut rng()).unwrap();
    net.pump();
    let a_events = net.events_for(0);
    assert!(a_events.iter().any(|e| matches!(
        e,
        Event::CircuitClosed(c, ClosedReason::Remote(DestroyReason::HIBERNATING)) if *c == circ
    )));
}

#[test]
fn handshake_timeout_closes_channel() {
    let mut net = Net::new(2);
    let (chan_a, _chan_b) = net.link(0, 1);
    // Nothing is pumped: the handshake never completes.
    let late = now() + Duration::from_secs(120);
    net.cores[0].check_timeouts(late);
    assert!(net.cores[0].channel(chan_a).is_none());
    let events = net.events_for(0);
    assert!(events
        .iter()
        .any(|e| matches!(e, Event::ChannelClosed(c) if *c == chan_a)));
}

#[test]
fn pending_circuit_times_out() {
    let mut net = Net::new(2);
    let (chan_a, _chan_b) = net.link(0, 1);
    net.pump();
    net.events_for(0);

    let circ = net.cores[0]
        .create_circuit_fast(chan_a, now(), &mut rng())
        .unwrap();
    // The CREATE_FAST is never delivered; the build must time out.
    let late = now() + Duration::from_secs(120);
    net.cores[0].check_timeouts(late);
    let events = net.events_for(0);
    assert!(events.iter().any(|e| matches!(
        e,
        Event::CircuitClosed(c, ClosedReason::Local(DestroyReason::TIMEOUT)) if *c == circ
    )));
    assert!(net.cores[0].circuit(circ).is_none());

    // An open circuit is not disturbed by the sweep.
    let circ2 = net.cores[0]
        .create_circuit_fast(chan_a, now(), &mut rng())
        .unwrap();
    net.pump();
    net.cores[0].check_timeouts(late);
    assert_eq!(net.cores[0].circuit(circ2).unwrap().state(), CircState::Open);
}
