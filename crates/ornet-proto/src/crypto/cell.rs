//! Relay cell cryptography.
//!
//! The creator of a circuit shares a pair of symmetric keys and digest
//! seeds with each hop: a "forward" set for cells it sends, and a
//! "backward" set for cells it receives.  Every RELAY cell is
//! encrypted with one AES-CTR layer per hop between the sender and the
//! recipient; the recipient recognizes a cell addressed to it by the
//! zero `recognized` field and a four-byte prefix of a running SHA-1
//! digest.  In this module, each such key-plus-digest state is a
//! "layer".

use crate::{Error, Result};
use digest::Digest;
use ornet_cell::chancell::BoxedCellBody;
use ornet_cell::relaycell::{DIGEST_RANGE, RECOGNIZED_RANGE};
use ornet_llcrypto::cipher::aes::{cipher_traits::StreamCipher, new_zero_iv, Aes128Ctr};
use ornet_llcrypto::d::Sha1;

use super::handshake::CircuitKeys;

/// Type for the body of a relay cell, as passed through the crypto
/// layers.
#[derive(Clone)]
pub(crate) struct RelayCellBody(pub(crate) BoxedCellBody);

impl From<BoxedCellBody> for RelayCellBody {
    fn from(body: BoxedCellBody) -> Self {
        RelayCellBody(body)
    }
}
impl From<RelayCellBody> for BoxedCellBody {
    fn from(cell: RelayCellBody) -> Self {
        cell.0
    }
}

impl AsRef<[u8]> for RelayCellBody {
    fn as_ref(&self) -> &[u8] {
        &self.0[..]
    }
}
impl AsMut<[u8]> for RelayCellBody {
    fn as_mut(&mut self) -> &mut [u8] {
        &mut self.0[..]
    }
}

/// Type to store hop indices on a circuit.
///
/// Hop indices are zero-based: 0 is the first hop of the circuit.
#[derive(Copy, Clone, Eq, PartialEq, Debug, PartialOrd, Ord)]
pub struct HopNum(u8);

impl From<HopNum> for u8 {
    fn from(hop: HopNum) -> u8 {
        hop.0
    }
}
impl From<u8> for HopNum {
    fn from(v: u8) -> HopNum {
        HopNum(v)
    }
}
impl From<HopNum> for usize {
    fn from(hop: HopNum) -> usize {
        hop.0 as usize
    }
}
impl std::fmt::Display for HopNum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0 + 1)
    }
}

/// One direction of one hop's cryptographic state: a running AES-CTR
/// cipher and a running digest.
pub(crate) struct CryptState {
    /// Stream cipher for this direction.
    cipher: Aes128Ctr,
    /// Running digest for cells this state originates or receives.
    digest: Sha1,
}

impl CryptState {
    /// Construct a CryptState from a 16-byte key and a 20-byte digest
    /// seed.
    fn new(key: &[u8; 16], digest_seed: &[u8; 20]) -> Self {
        let mut digest = Sha1::new();
        digest.update(&digest_seed[..]);
        CryptState {
            cipher: new_zero_iv(key),
            digest,
        }
    }

    /// Prepare a cell to be sent from this state's endpoint: zero the
    /// recognized field, fill in the running-digest prefix.
    fn set_digest(&mut self, cell: &mut RelayCellBody) {
        let body = cell.as_mut();
        body[RECOGNIZED_RANGE].fill(0);
        body[DIGEST_RANGE].fill(0);
        self.digest.update(&body[..]);
        let d = self.digest.clone().finalize();
        cell.as_mut()[DIGEST_RANGE].copy_from_slice(&d[0..4]);
    }

    /// Check whether a (just-decrypted) cell is addressed to this
    /// state's endpoint.  On a match the running digest is advanced;
    /// on a mismatch the cell is left exactly as it was.
    fn is_recognized(&mut self, cell: &mut RelayCellBody) -> bool {
        let body = cell.as_ref();
        if body[RECOGNIZED_RANGE] != [0, 0][..] {
            return false;
        }
        // Compute the digest as it would have been at the sender, with
        // the digest field zeroed.
        let mut received = [0_u8; 4];
        received.copy_from_slice(&body[DIGEST_RANGE]);

        let mut tentative = self.digest.clone();
        cell.as_mut()[DIGEST_RANGE].fill(0);
        tentative.update(&cell.as_ref()[..]);
        let computed = tentative.clone().finalize();

        if computed[0..4] == received[..] {
            self.digest = tentative;
            cell.as_mut()[DIGEST_RANGE].copy_from_slice(&received);
            true
        } else {
            // Not for us: put the digest bytes back so the next hop
            // sees the cell unmodified.
            cell.as_mut()[DIGEST_RANGE].copy_from_slice(&received);
            false
        }
    }

    /// Apply this state's cipher to a cell body.
    fn crypt(&mut self, cell: &mut RelayCellBody) {
        self.cipher.apply_keystream(cell.as_mut());
    }
}

/// A paired forward and backward state, as derived from one circuit
/// handshake.
pub(crate) struct CryptStatePair {
    /// State for cells travelling away from the circuit's origin.
    fwd: CryptState,
    /// State for cells travelling towards the circuit's origin.
    back: CryptState,
}

impl CryptStatePair {
    /// Build the state pair from a handshake's derived keys.
    pub(crate) fn new(keys: &CircuitKeys) -> Self {
        CryptStatePair {
            fwd: CryptState::new(keys.kf(), keys.df()),
            back: CryptState::new(keys.kb(), keys.db()),
        }
    }

    /// Split this pair into the client's view: an outbound and an
    /// inbound layer.
    pub(crate) fn split_client_layer(self) -> (OutboundClientLayer, InboundClientLayer) {
        (OutboundClientLayer(self.fwd), InboundClientLayer(self.back))
    }

    /// Split this pair into the relay's view.
    pub(crate) fn split_relay_layer(self) -> (OutboundRelayLayer, InboundRelayLayer) {
        (OutboundRelayLayer(self.fwd), InboundRelayLayer(self.back))
    }
}

/// A client's view of the forward crypto state shared with one hop.
pub(crate) struct OutboundClientLayer(CryptState);
impl OutboundClientLayer {
    /// Prepare a cell for this layer's hop and add this layer's
    /// encryption.
    fn originate_for(&mut self, cell: &mut RelayCellBody) {
        self.0.set_digest(cell);
        self.0.crypt(cell);
    }
    /// Add this layer's encryption to a cell destined further out.
    fn encrypt_outbound(&mut self, cell: &mut RelayCellBody) {
        self.0.crypt(cell);
    }
}

/// A client's view of the backward crypto state shared with one hop.
pub(crate) struct InboundClientLayer(CryptState);
impl InboundClientLayer {
    /// Remove one layer of encryption; return true if the cell was
    /// originated by this layer's hop.
    fn decrypt_inbound(&mut self, cell: &mut RelayCellBody) -> bool {
        self.0.crypt(cell);
        self.0.is_recognized(cell)
    }
}

/// A relay's view of the forward crypto state on one circuit.
pub(crate) struct OutboundRelayLayer(CryptState);
impl OutboundRelayLayer {
    /// Remove our layer of encryption from a cell moving away from the
    /// origin; return true if the cell is addressed to us.
    pub(crate) fn decrypt_outbound(&mut self, cell: &mut RelayCellBody) -> bool {
        self.0.crypt(cell);
        self.0.is_recognized(cell)
    }
}

/// A relay's view of the backward crypto state on one circuit.
pub(crate) struct InboundRelayLayer(CryptState);
impl InboundRelayLayer {
    /// Prepare a cell to send towards the origin, and encrypt it.
    pub(crate) fn originate(&mut self, cell: &mut RelayCellBody) {
        self.0.set_digest(cell);
        self.0.crypt(cell);
    }
    /// Add our layer of encryption to a cell moving towards the origin.
    pub(crate) fn encrypt_inbound(&mut self, cell: &mut RelayCellBody) {
        self.0.crypt(cell);
    }
}

/// A client's full view of the outbound crypto state of a circuit: one
/// layer per hop, nearest first.
#[derive(Default)]
pub(crate) struct OutboundClientCrypt {
    /// The layers, from the nearest hop to the farthest.
    layers: Vec<OutboundClientLayer>,
}

impl OutboundClientCrypt {
    /// Return a new (empty) OutboundClientCrypt.
    pub(crate) fn new() -> Self {
        OutboundClientCrypt::default()
    }
    /// Encrypt a cell to be sent to hop `hop`.
    pub(crate) fn encrypt(&mut self, cell: &mut RelayCellBody, hop: HopNum) -> Result<()> {
        let hop: usize = hop.into();
        if hop >= self.layers.len() {
            return Err(Error::NoSuchHop);
        }
        let mut layers = self.layers.iter_mut().take(hop + 1).rev();
        let first_layer = layers.next().ok_or(Error::NoSuchHop)?;
        first_layer.originate_for(cell);
        for layer in layers {
            layer.encrypt_outbound(cell);
        }
        Ok(())
    }
    /// Add a layer for a newly-opened hop.
    pub(crate) fn add_layer(&mut self, layer: OutboundClientLayer) {
        debug_assert!(self.layers.len() < u8::MAX as usize);
        self.layers.push(layer);
    }
    /// Drop every layer beyond the first `n`, after a truncation.
    pub(crate) fn truncate(&mut self, n: usize) {
        self.layers.truncate(n);
    }
    /// Return the number of layers (hops) configured.
    pub(crate) fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

/// A client's full view of the inbound crypto state of a circuit.
#[derive(Default)]
pub(crate) struct InboundClientCrypt {
    /// The layers, from the nearest hop to the farthest.
    layers: Vec<InboundClientLayer>,
}

impl InboundClientCrypt {
    /// Return a new (empty) InboundClientCrypt.
    pub(crate) fn new() -> Self {
        InboundClientCrypt::default()
    }
    /// Decrypt an incoming cell; on success, return the hop that
    /// originated it.
    pub(crate) fn decrypt(&mut self, cell: &mut RelayCellBody) -> Result<HopNum> {
        for (hopnum, layer) in self.layers.iter_mut().enumerate() {
            if layer.decrypt_inbound(cell) {
                let hopnum = u8::try_from(hopnum).map_err(|_| Error::Internal("too many hops"))?;
                return Ok(hopnum.into());
            }
        }
        Err(Error::BadCellAuth)
    }
    /// Add a layer for a newly-opened hop.
    pub(crate) fn add_layer(&mut self, layer: InboundClientLayer) {
        debug_assert!(self.layers.len() < u8::MAX as usize);
        self.layers.push(layer);
    }
    /// Drop every layer beyond the first `n`, after a truncation.
    pub(crate) fn truncate(&mut self, n: usize) {
        self.layers.truncate(n);
    }
    /// Return the number of layers (hops) configured.
    pub(crate) fn n_layers(&self) -> usize {
        self.layers.len()
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::crypto::handshake::CircuitKeys;
    use rand::{RngCore, SeedableRng as _};

    fn keys_from_seed(seed: &[u8]) -> CircuitKeys {
        CircuitKeys::derive(seed)
    }

    fn cell_of(rng: &mut impl RngCore) -> RelayCellBody {
        let mut body = Box::new([0_u8; 509]);
        rng.fill_bytes(&mut body[..]);
        // The crypto layer owns these ranges.
        body[RECOGNIZED_RANGE].fill(0);
        body[DIGEST_RANGE].fill(0);
        RelayCellBody(body)
    }

    #[test]
    fn roundtrip_three_hops() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x746f7231);

        let seeds: Vec<Vec<u8>> = (0..3_u8).map(|i| vec![i; 40]).collect();
        let mut cc_out = OutboundClientCrypt::new();
        let mut cc_in = InboundClientCrypt::new();
        let mut relays_fwd = Vec::new();
        let mut relays_back = Vec::new();
        for seed in &seeds {
            let (out_c, in_c) = CryptStatePair::new(&keys_from_seed(seed)).split_client_layer();
            cc_out.add_layer(out_c);
            cc_in.add_layer(in_c);
            let (out_r, in_r) = CryptStatePair::new(&keys_from_seed(seed)).split_relay_layer();
            relays_fwd.push(out_r);
            relays_back.push(in_r);
        }
        assert_eq!(cc_out.n_layers(), 3);
        assert_eq!(cc_in.n_layers(), 3);

        for _ in 0..16 {
            // Outbound: cell for the last hop passes unrecognized
            // through the first two.
            let mut cell = cell_of(&mut rng);
            let reference = cell.clone();
            cc_out.encrypt(&mut cell, 2.into()).unwrap();
            assert_ne!(cell.as_ref()[16..], reference.as_ref()[16..]);
            assert!(!relays_fwd[0].decrypt_outbound(&mut cell));
            assert!(!relays_fwd[1].decrypt_outbound(&mut cell));
            assert!(relays_fwd[2].decrypt_outbound(&mut cell));
            assert_eq!(cell.as_ref()[16..], reference.as_ref()[16..]);

            // Inbound: the middle hop originates; the client sees hop 1.
            let mut cell = cell_of(&mut rng);
            let reference = cell.clone();
            relays_back[1].originate(&mut cell);
            relays_back[0].encrypt_inbound(&mut cell);
            let hop = cc_in.decrypt(&mut cell).unwrap();
            assert_eq!(hop, 1.into());
            assert_eq!(cell.as_ref()[16..], reference.as_ref()[16..]);
        }

        // A cell for a hop that doesn't exist.
        let mut cell = cell_of(&mut rng);
        assert!(matches!(
            cc_out.encrypt(&mut cell, 7.into()),
            Err(Error::NoSuchHop)
        ));

        // A junk cell recognized by nobody.
        let mut cell = cell_of(&mut rng);
        assert!(matches!(cc_in.decrypt(&mut cell), Err(Error::BadCellAuth)));
    }

    #[test]
    fn recognition_is_stateful() {
        // Two cells in a row must both be recognized: the running
        // digest has to advance exactly once per accepted cell.
        let keys = keys_from_seed(b"0123456789012345678901234567890123456789");
        let (mut out_c, _) = CryptStatePair::new(&keys).split_client_layer();
        let (mut out_r, _) = CryptStatePair::new(&keys).split_relay_layer();

        let mut rng = rand::rngs::StdRng::seed_from_u64(99);
        for _ in 0..5 {
            let mut cell = cell_of(&mut rng);
            out_c.originate_for(&mut cell);
            assert!(out_r.decrypt_outbound(&mut cell));
        }
    }
}
