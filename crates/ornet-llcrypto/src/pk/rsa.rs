//! RSA keys, identities, and signatures.
//!
//! Every relay is named by the SHA-1 digest of its RSA identity key
//! ([`RsaIdentity`]); directory documents are signed with SHA-1 PKCS#1
//! v1.5 signatures in the legacy "no DigestInfo prefix" form; and onion
//! keys encrypt onion-skins with OAEP.

use crate::d;
use crate::rng::RngCompat;
use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey, EncodeRsaPublicKey};
use rsa::traits::PublicKeyParts;
use rsa::Pkcs1v15Sign;
use std::fmt;
use subtle::ConstantTimeEq;
use thiserror::Error;

/// Length of the modulus, in bytes, that we require of every key we use.
pub const RSA_KEY_LEN: usize = 128;
/// Number of bytes OAEP-SHA1 padding consumes in each encrypted block.
pub const OAEP_PADDING_LEN: usize = 42;

/// An identity for a relay: the SHA-1 digest of the DER encoding of its
/// public identity key.
///
/// This is the stable 20-byte name by which relays refer to one another
/// on the wire and in directory documents.
#[derive(Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct RsaIdentity {
    /// SHA-1 digest of a DER-encoded public key.
    id: [u8; 20],
}

impl RsaIdentity {
    /// Build an RsaIdentity from a 20-byte slice.
    ///
    /// Returns None if the slice has the wrong length.
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let id: [u8; 20] = bytes.try_into().ok()?;
        Some(RsaIdentity { id })
    }
    /// Build an RsaIdentity from a hex string, with or without a leading
    /// `$` (the form used in family lines and fingerprints).
    pub fn from_hex(s: &str) -> Option<Self> {
        let s = s.strip_prefix('$').unwrap_or(s);
        let bytes = hex::decode(s).ok()?;
        Self::from_bytes(&bytes)
    }
    /// Return the bytes of this identity.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.id
    }
    /// Compare two identities in constant time.
    pub fn ct_eq(&self, other: &RsaIdentity) -> bool {
        self.id[..].ct_eq(&other.id[..]).into()
    }
    /// Return true if this identity sorts after `other`.
    ///
    /// The link protocol uses this ordering to decide which side of a
    /// connection owns the high half of the circuit-ID space.
    pub fn outranks(&self, other: &RsaIdentity) -> bool {
        self.id > other.id
    }
}

impl From<[u8; 20]> for RsaIdentity {
    fn from(id: [u8; 20]) -> Self {
        RsaIdentity { id }
    }
}

impl fmt::Display for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}", hex::encode(self.id))
    }
}

impl fmt::Debug for RsaIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RsaIdentity {{ {} }}", self)
    }
}

/// An error from RSA key handling or signature checking.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RsaError {
    /// The DER bytes did not parse as a PKCS#1 key.
    #[error("couldn't parse DER-encoded key")]
    BadDer,
    /// The key's modulus had an unexpected length.
    #[error("key had wrong length (wanted {want} bytes, got {got})")]
    BadKeyLength {
        /// Required modulus length, in bytes.
        want: usize,
        /// Observed modulus length, in bytes.
        got: usize,
    },
    /// A signature did not verify.
    #[error("signature verification failed")]
    BadSignature,
    /// Encryption or decryption failed.
    #[error("RSA operation failed")]
    CryptoFailure,
}

/// A public RSA key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey(rsa::RsaPublicKey);

impl PublicKey {
    /// Decode a PKCS#1 DER-encoded public key.
    pub fn from_der(der: &[u8]) -> Result<Self, RsaError> {
        let k = rsa::RsaPublicKey::from_pkcs1_der(der).map_err(|_| RsaError::BadDer)?;
        Ok(PublicKey(k))
    }
    /// Encode this key in its PKCS#1 DER form.
    pub fn to_der(&self) -> Vec<u8> {
        // Encoding a valid key can't fail.
        let der = self.0.to_pkcs1_der().expect("DER encoding failed");
        der.as_bytes().to_vec()
    }
    /// Return the length of this key's modulus, in bytes.
    pub fn modulus_len(&self) -> usize {
        self.0.size()
    }
    /// Return this key's public exponent as a u64, if it fits in one.
    pub fn exponent_u64(&self) -> Option<u64> {
        let e = self.0.e().to_bytes_be();
        if e.len() > 8 {
            return None;
        }
        let mut buf = [0_u8; 8];
        buf[8 - e.len()..].copy_from_slice(&e);
        Some(u64::from_be_bytes(buf))
    }
    /// Return the identity digest of this key: SHA-1 over its DER encoding.
    pub fn to_rsa_identity(&self) -> RsaIdentity {
        d::sha1(&self.to_der()).into()
    }
    /// Check a legacy signature: PKCS#1 v1.5 over a raw SHA-1 digest,
    /// with no DigestInfo prefix.
    pub fn verify(&self, digest: &[u8; 20], signature: &[u8]) -> Result<(), RsaError> {
        self.0
            .verify(Pkcs1v15Sign::new_unprefixed(), digest, signature)
            .map_err(|_| RsaError::BadSignature)
    }
    /// Encrypt a short message with OAEP-SHA1.
    ///
    /// The message must fit in one block: `modulus_len - 42` bytes.
    pub fn encrypt_oaep<R: rand::Rng + rand::CryptoRng>(
        &self,
        rng: &mut R,
        msg: &[u8],
    ) -> Result<Vec<u8>, RsaError> {
        let mut rng = RngCompat::new(rng);
        self.0
            .encrypt(&mut rng, rsa::Oaep::new::<sha1::Sha1>(), msg)
            .map_err(|_| RsaError::CryptoFailure)
    }
}

/// A private RSA key.
///
/// Relays hold two of these: a long-term identity key and a
/// medium-term onion key.
pub struct PrivateKey(rsa::RsaPrivateKey);

impl PrivateKey {
    /// Generate a new 1024-bit private key.
    pub fn generate<R: rand::Rng + rand::CryptoRng>(rng: &mut R) -> Result<Self, RsaError> {
        let mut rng = RngCompat::new(rng);
        let k =
            rsa::RsaPrivateKey::new(&mut rng, RSA_KEY_LEN * 8).map_err(|_| RsaError::CryptoFailure)?;
        Ok(PrivateKey(k))
    }
    /// Decode a PKCS#1 DER-encoded private key.
    pub fn from_der(der: &[u8]) -> Result<Self, RsaError> {
        let k = rsa::RsaPrivateKey::from_pkcs1_der(der).map_err(|_| RsaError::BadDer)?;
        Ok(PrivateKey(k))
    }
    /// Return the public half of this key.
    pub fn to_public_key(&self) -> PublicKey {
        PublicKey(self.0.to_public_key())
    }
    /// Sign a SHA-1 digest in the legacy unprefixed PKCS#1 v1.5 form.
    pub fn sign(&self, digest: &[u8; 20]) -> Result<Vec<u8>, RsaError> {
        self.0
            .sign(Pkcs1v15Sign::new_unprefixed(), digest)
            .map_err(|_| RsaError::CryptoFailure)
    }
    /// Decrypt a single OAEP-SHA1 block.
    pub fn decrypt_oaep(&self, ciphertext: &[u8]) -> Result<Vec<u8>, RsaError> {
        self.0
            .decrypt(rsa::Oaep::new::<sha1::Sha1>(), ciphertext)
            .map_err(|_| RsaError::CryptoFailure)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never log private key material.
        write!(f, "PrivateKey {{ … }}")
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::SeedableRng as _;

    fn testing_rng() -> rand::rngs::StdRng {
        rand::rngs::StdRng::seed_from_u64(0x6f726e6574)
    }

    #[test]
    fn identity_hex_forms() {
        let id = RsaIdentity::from_hex("56927e61b51e6f363fb55498150a6ddfcf7077f2").unwrap();
        let id2 = RsaIdentity::from_hex("$56927e61b51e6f363fb55498150a6ddfcf7077f2").unwrap();
        assert_eq!(id, id2);
        assert_eq!(id.to_string(), "$56927e61b51e6f363fb55498150a6ddfcf7077f2");
        assert!(RsaIdentity::from_hex("56927e").is_none());
        assert!(RsaIdentity::from_hex("not hex at all, sorry").is_none());
    }

    #[test]
    fn sign_and_verify() {
        let mut rng = testing_rng();
        let sk = PrivateKey::generate(&mut rng).unwrap();
        let pk = sk.to_public_key();
        assert_eq!(pk.modulus_len(), RSA_KEY_LEN);
        assert_eq!(pk.exponent_u64(), Some(65537));

        let digest = crate::d::sha1(b"router stanza");
        let sig = sk.sign(&digest).unwrap();
        assert!(pk.verify(&digest, &sig).is_ok());

        let other = crate::d::sha1(b"some other stanza");
        assert!(pk.verify(&other, &sig).is_err());
    }

    #[test]
    fn der_round_trip_stable_identity() {
        let mut rng = testing_rng();
        let sk = PrivateKey::generate(&mut rng).unwrap();
        let pk = sk.to_public_key();
        let der = pk.to_der();
        let pk2 = PublicKey::from_der(&der).unwrap();
        assert_eq!(pk.to_rsa_identity(), pk2.to_rsa_identity());
    }

    #[test]
    fn oaep_round_trip() {
        let mut rng = testing_rng();
        let sk = PrivateKey::generate(&mut rng).unwrap();
        let pk = sk.to_public_key();
        let msg = b"a short enough message";
        let enc = pk.encrypt_oaep(&mut rng, msg).unwrap();
        assert_eq!(enc.len(), RSA_KEY_LEN);
        assert_eq!(sk.decrypt_oaep(&enc).unwrap(), msg.to_vec());
    }
}
