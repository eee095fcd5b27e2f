//! Diffie-Hellman over the 1024-bit "second Oakley group".
//!
//! The circuit-extension handshake exchanges classic DH halves inside
//! onion-skins.  Each half is exactly 128 bytes, big-endian, zero-padded
//! on the left.

use num_bigint_dig::BigUint;
use std::sync::OnceLock;
use thiserror::Error;
use zeroize::Zeroizing;

/// Length of a DH group element (and of each public key), in bytes.
pub const DH_LEN: usize = 128;
/// Length of the private exponents we generate, in bytes (320 bits).
pub const DH_SEC_LEN: usize = 40;

/// The RFC 2409 "second Oakley group" prime, used by every implementation
/// of this protocol.
const DH_PRIME_HEX: &str = concat!(
    "FFFFFFFFFFFFFFFFC90FDAA22168C234C4C6628B80DC1CD129024E088A67CC74",
    "020BBEA63B139B22514A08798E3404DDEF9519B3CD3A431B302B0A6DF25F1437",
    "4FE1356D6D51C245E485B576625E7EC6F44C42E9A637ED6B0BFF5CB6F406B7ED",
    "EE386BFB5A899FA5AE9F24117C4B1FE649286651ECE65381FFFFFFFFFFFFFFFF",
);

/// Return the group modulus.
fn modulus() -> &'static BigUint {
    /// Cached parsed modulus.
    static P: OnceLock<BigUint> = OnceLock::new();
    P.get_or_init(|| {
        BigUint::parse_bytes(DH_PRIME_HEX.as_bytes(), 16).expect("built-in prime did not parse")
    })
}

/// An error from a DH operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DhError {
    /// The peer's public key was not a safe group element.
    ///
    /// Degenerate keys (0, 1, and p-1) would let an observer learn the
    /// shared secret, so they are rejected outright.
    #[error("degenerate or out-of-range DH public key")]
    InvalidPublicKey,
}

/// A DH keypair: a random 320-bit exponent and the corresponding
/// public group element.
pub struct DhKeypair {
    /// Our secret exponent.
    x: Zeroizing<BigUint>,
    /// g^x mod p, as a left-padded 128-byte array.
    public: [u8; DH_LEN],
}

impl DhKeypair {
    /// Generate a fresh keypair.
    pub fn generate<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Self {
        let mut secret = Zeroizing::new([0_u8; DH_SEC_LEN]);
        rng.fill_bytes(&mut secret[..]);
        let x = Zeroizing::new(BigUint::from_bytes_be(&secret[..]));
        let g = BigUint::from(2_u32);
        let public = to_dh_bytes(&g.modpow(&x, modulus()));
        DhKeypair { x, public }
    }

    /// Return our public key, as sent on the wire.
    pub fn public_key(&self) -> &[u8; DH_LEN] {
        &self.public
    }

    /// Compute the shared secret with a peer's public key.
    ///
    /// Fails if the peer's key is degenerate.
    pub fn shared_secret(&self, peer_public: &[u8; DH_LEN]) -> Result<Zeroizing<[u8; DH_LEN]>, DhError> {
        let y = BigUint::from_bytes_be(&peer_public[..]);
        check_element(&y)?;
        let secret = y.modpow(&self.x, modulus());
        Ok(Zeroizing::new(to_dh_bytes(&secret)))
    }
}

/// Reject group elements an attacker could use to force a known secret.
fn check_element(y: &BigUint) -> Result<(), DhError> {
    let one = BigUint::from(1_u32);
    let p_minus_1 = modulus() - &one;
    if y <= &one || y >= &p_minus_1 {
        return Err(DhError::InvalidPublicKey);
    }
    Ok(())
}

/// Serialize a group element as a left-zero-padded 128-byte array.
fn to_dh_bytes(n: &BigUint) -> [u8; DH_LEN] {
    let bytes = n.to_bytes_be();
    let mut out = [0_u8; DH_LEN];
    // A group element is always < p and hence fits.
    out[DH_LEN - bytes.len()..].copy_from_slice(&bytes);
    out
}
