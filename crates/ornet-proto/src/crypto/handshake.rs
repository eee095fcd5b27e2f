//! Circuit-extension handshakes.
//!
//! A handshake takes place between the party creating a circuit (or
//! extending it by one hop) and the relay being added.  Its product is
//! a [`CircuitKeys`]: the forward and backward AES keys and digest
//! seeds for the new hop, plus a key-hash that proves both sides
//! derived the same material.

pub(crate) mod fast;
pub(crate) mod tap;

use crate::Result;
use digest::Digest;
use ornet_llcrypto::d::Sha1;
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

/// A client's (or relay's) handshake, as used when creating or
/// extending a circuit.
pub(crate) trait ClientHandshake {
    /// The type of a key that a client needs to begin the handshake.
    type KeyType;
    /// The state a client holds while waiting for the reply.
    type StateType;

    /// Generate a new client onion-skin for a relay with the given key.
    fn client1<R: rand::Rng + rand::CryptoRng>(
        rng: &mut R,
        key: &Self::KeyType,
    ) -> Result<(Self::StateType, Vec<u8>)>;
    /// Handle an onion-skin reply, deriving the circuit keys.
    fn client2<T: AsRef<[u8]>>(state: Self::StateType, msg: T) -> Result<CircuitKeys>;
}

/// A relay's view of a circuit-extension handshake.
pub(crate) trait ServerHandshake {
    /// The type of the secret key the relay needs to answer.
    type KeyType;

    /// Process an onion-skin from a client: derive the circuit keys
    /// and produce a reply.
    fn server<R: rand::Rng + rand::CryptoRng, T: AsRef<[u8]>>(
        rng: &mut R,
        key: &Self::KeyType,
        msg: T,
    ) -> Result<(CircuitKeys, Vec<u8>)>;
}

/// Length of the key-hash that both sides derive and compare.
pub(crate) const KH_LEN: usize = 20;
/// Bytes of key material a circuit hop needs:
/// KH, Df, Db (20 each), Kf, Kb (16 each).
const KEY_MATERIAL_LEN: usize = 20 + 20 + 20 + 16 + 16;

/// The symmetric key material shared with one circuit hop.
///
/// Derived from a handshake's shared secret with the KDF: the first 20
/// bytes are the key-hash `KH` (sent in the clear to prove the
/// derivation), then the forward and backward digest seeds, then the
/// forward and backward AES keys.
pub struct CircuitKeys {
    /// The derived material, in KDF output order.
    material: Zeroizing<[u8; KEY_MATERIAL_LEN]>,
}

impl CircuitKeys {
    /// Derive circuit keys from a handshake's shared secret.
    pub(crate) fn derive(seed: &[u8]) -> CircuitKeys {
        let expanded = kdf(seed, KEY_MATERIAL_LEN);
        let mut material = Zeroizing::new([0_u8; KEY_MATERIAL_LEN]);
        material.copy_from_slice(&expanded);
        CircuitKeys { material }
    }
    /// Return the key-hash for this key material.
    pub(crate) fn kh(&self) -> &[u8; 20] {
        self.material[0..20].try_into().expect("bad slice math")
    }
    /// Return the forward digest seed.
    pub(crate) fn df(&self) -> &[u8; 20] {
        self.material[20..40].try_into().expect("bad slice math")
    }
    /// Return the backward digest seed.
    pub(crate) fn db(&self) -> &[u8; 20] {
        self.material[40..60].try_into().expect("bad slice math")
    }
    /// Return the forward cipher key.
    pub(crate) fn kf(&self) -> &[u8; 16] {
        self.material[60..76].try_into().expect("bad slice math")
    }
    /// Return the backward cipher key.
    pub(crate) fn kb(&self) -> &[u8; 16] {
        self.material[76..92].try_into().expect("bad slice math")
    }
    /// Compare a received key-hash against ours, in constant time.
    pub(crate) fn kh_matches(&self, their_kh: &[u8]) -> bool {
        if their_kh.len() != KH_LEN {
            return false;
        }
        self.kh()[..].ct_eq(their_kh).into()
    }
}

impl std::fmt::Debug for CircuitKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Key material stays out of the logs.
        write!(f, "CircuitKeys {{ … }}")
    }
}

/// The legacy KDF: expand `seed` to `n_bytes` of material as
/// `H(seed | [0]) | H(seed | [1]) | ...`.
///
/// This KDF is only as strong as its inputs; it is what this protocol
/// generation uses, and nothing newer should copy it.
pub(crate) fn kdf(seed: &[u8], n_bytes: usize) -> Zeroizing<Vec<u8>> {
    let mut result = Zeroizing::new(Vec::with_capacity(n_bytes + 20));
    let mut counter: u8 = 0;
    while result.len() < n_bytes {
        let mut d = Sha1::new();
        d.update(seed);
        d.update([counter]);
        result.extend_from_slice(&d.finalize());
        counter = counter.wrapping_add(1);
    }
    result.truncate(n_bytes);
    result
}
