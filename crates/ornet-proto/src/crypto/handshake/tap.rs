//! The public-key circuit-extension handshake.
//!
//! The client sends an "onion-skin": its DH-1024 half, hybrid-encrypted
//! to the target relay's onion key.  The relay answers with its own DH
//! half and a key-hash.  Forward secrecy against the relay's later
//! compromise comes from the ephemeral DH exchange; the RSA layer binds
//! the handshake to the intended relay.

use super::{CircuitKeys, ClientHandshake, ServerHandshake, KH_LEN};
use crate::{Error, Result};
use ornet_llcrypto::cipher::aes::{cipher_traits::StreamCipher, new_zero_iv};
use ornet_llcrypto::pk::dh::{DhKeypair, DH_LEN};
use ornet_llcrypto::pk::rsa::{PrivateKey, PublicKey, OAEP_PADDING_LEN, RSA_KEY_LEN};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

/// Length of a client onion-skin: one RSA block plus the symmetrically
/// encrypted overflow of the 128-byte DH half.
pub(crate) const ONION_SKIN_LEN: usize = RSA_KEY_LEN + DH_LEN - HYBRID_PLAIN_LEN;
/// Length of the relay's reply: its DH half plus the key hash.
pub(crate) const ONION_REPLY_LEN: usize = DH_LEN + KH_LEN;

/// Bytes of symmetric key carried inside the RSA block of a hybrid
/// encryption.
const HYBRID_KEY_LEN: usize = 16;
/// Plaintext bytes that fit in the RSA block alongside the key.
const HYBRID_PLAIN_LEN: usize = RSA_KEY_LEN - OAEP_PADDING_LEN - HYBRID_KEY_LEN;

/// Hybrid-encrypt `msg` to a public key: a single OAEP block if it
/// fits, otherwise an OAEP block carrying a fresh AES key and the
/// message head, followed by the AES-CTR-encrypted tail.
fn hybrid_encrypt<R: Rng + CryptoRng>(
    rng: &mut R,
    key: &PublicKey,
    msg: &[u8],
) -> Result<Vec<u8>> {
    if msg.len() <= RSA_KEY_LEN - OAEP_PADDING_LEN {
        return key.encrypt_oaep(rng, msg).map_err(|_| Error::BadHandshake);
    }
    let mut sym_key = Zeroizing::new([0_u8; HYBRID_KEY_LEN]);
    rng.fill_bytes(&mut sym_key[..]);

    let (head, tail) = msg.split_at(HYBRID_PLAIN_LEN);
    let mut block = Zeroizing::new(Vec::with_capacity(HYBRID_KEY_LEN + HYBRID_PLAIN_LEN));
    block.extend_from_slice(&sym_key[..]);
    block.extend_from_slice(head);

    let mut out = key
        .encrypt_oaep(rng, &block)
        .map_err(|_| Error::BadHandshake)?;
    let mut enc_tail = tail.to_vec();
    new_zero_iv(&sym_key).apply_keystream(&mut enc_tail);
    out.extend_from_slice(&enc_tail);
    Ok(out)
}

/// Invert [`hybrid_encrypt`] with the private key.
fn hybrid_decrypt(key: &PrivateKey, body: &[u8]) -> Result<Zeroizing<Vec<u8>>> {
    if body.len() < RSA_KEY_LEN {
        return Err(Error::BadHandshake);
    }
    let (rsa_part, tail) = body.split_at(RSA_KEY_LEN);
    let block = Zeroizing::new(key.decrypt_oaep(rsa_part).map_err(|_| Error::BadHandshake)?);
    if tail.is_empty() {
        return Ok(block);
    }
    if block.len() < HYBRID_KEY_LEN {
        return Err(Error::BadHandshake);
    }
    let (sym_key, head) = block.split_at(HYBRID_KEY_LEN);
    let sym_key: [u8; HYBRID_KEY_LEN] =
        sym_key.try_into().map_err(|_| Error::BadHandshake)?;
    let mut msg = Zeroizing::new(Vec::with_capacity(head.len() + tail.len()));
    msg.extend_from_slice(head);
    let mut dec_tail = tail.to_vec();
    new_zero_iv(&sym_key).apply_keystream(&mut dec_tail);
    msg.extend_from_slice(&dec_tail);
    Ok(msg)
}

/// State a client holds between sending CREATE and receiving CREATED.
pub(crate) struct TapClientState {
    /// Our ephemeral DH keypair.
    dh: DhKeypair,
}

/// Client side of the public-key handshake.
pub(crate) struct TapClient;

impl ClientHandshake for TapClient {
    type KeyType = PublicKey;
    type StateType = TapClientState;

    fn client1<R: Rng + CryptoRng>(
        rng: &mut R,
        key: &Self::KeyType,
    ) -> Result<(Self::StateType, Vec<u8>)> {
        let dh = DhKeypair::generate(rng);
        let skin = hybrid_encrypt(rng, key, &dh.public_key()[..])?;
        debug_assert_eq!(skin.len(), ONION_SKIN_LEN);
        Ok((TapClientState { dh }, skin))
    }

    fn client2<T: AsRef<[u8]>>(state: Self::StateType, msg: T) -> Result<CircuitKeys> {
        let msg = msg.as_ref();
        if msg.len() != ONION_REPLY_LEN {
            return Err(Error::BadHandshake);
        }
        let (y, their_kh) = msg.split_at(DH_LEN);
        let y: [u8; DH_LEN] = y.try_into().map_err(|_| Error::BadHandshake)?;
        let secret = state
            .dh
            .shared_secret(&y)
            .map_err(|_| Error::BadHandshake)?;
        let keys = CircuitKeys::derive(&secret[..]);
        if !keys.kh_matches(their_kh) {
            return Err(Error::BadHandshake);
        }
        Ok(keys)
    }
}

/// Server side of the public-key handshake.
pub(crate) struct TapServer;

impl ServerHandshake for TapServer {
    type KeyType = PrivateKey;

    fn server<R: Rng + CryptoRng, T: AsRef<[u8]>>(
        rng: &mut R,
        key: &Self::KeyType,
        msg: T,
    ) -> Result<(CircuitKeys, Vec<u8>)> {
        let msg = msg.as_ref();
        if msg.len() != ONION_SKIN_LEN {
            return Err(Error::BadHandshake);
        }
        let x = hybrid_decrypt(key, msg)?;
        let x: [u8; DH_LEN] = x[..].try_into().map_err(|_| Error::BadHandshake)?;

        let dh = DhKeypair::generate(rng);
        let secret = dh.shared_secret(&x).map_err(|_| Error::BadHandshake)?;
        let keys = CircuitKeys::derive(&secret[..]);

        let mut reply = Vec::with_capacity(ONION_REPLY_LEN);
        reply.extend_from_slice(&dh.public_key()[..]);
        reply.extend_from_slice(keys.kh());
        Ok((keys, reply))
    }
}

#[cfg(test)]
pub(crate) mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::SeedableRng as _;
    use std::sync::OnceLock;

    /// A shared onion key for the tests in this crate; RSA generation
    /// is slow enough to do only once.
    pub(crate) fn test_onion_key() -> &'static PrivateKey {
        static KEY: OnceLock<PrivateKey> = OnceLock::new();
        KEY.get_or_init(|| {
            let mut rng = rand::rngs::StdRng::seed_from_u64(0x746170);
            PrivateKey::generate(&mut rng).expect("keygen failed")
        })
    }

    #[test]
    fn onion_skin_lengths() {
        // These two constants are fixed by the cell format.
        assert_eq!(ONION_SKIN_LEN, 186);
        assert_eq!(ONION_REPLY_LEN, 148);
    }

    #[test]
    fn round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x746170_2);
        let sk = test_onion_key();
        let pk = sk.to_public_key();

        let (state, skin) = TapClient::client1(&mut rng, &pk).unwrap();
        assert_eq!(skin.len(), ONION_SKIN_LEN);

        let (server_keys, reply) = TapServer::server(&mut rng, sk, &skin).unwrap();
        assert_eq!(reply.len(), ONION_REPLY_LEN);

        let client_keys = TapClient::client2(state, &reply).unwrap();
        assert_eq!(client_keys.kf(), server_keys.kf());
        assert_eq!(client_keys.kb(), server_keys.kb());
        assert_eq!(client_keys.df(), server_keys.df());
        assert_eq!(client_keys.db(), server_keys.db());
    }

    #[test]
    fn corrupted_skin_fails() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x746170_3);
        let sk = test_onion_key();
        let pk = sk.to_public_key();

        let (_state, mut skin) = TapClient::client1(&mut rng, &pk).unwrap();
        skin[3] ^= 0x40;
        assert!(TapServer::server(&mut rng, sk, &skin).is_err());
        assert!(TapServer::server(&mut rng, sk, b"far too short").is_err());
    }

    #[test]
    fn corrupted_reply_fails() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x746170_4);
        let sk = test_onion_key();
        let pk = sk.to_public_key();

        let (state, skin) = TapClient::client1(&mut rng, &pk).unwrap();
        let (_, mut reply) = TapServer::server(&mut rng, sk, &skin).unwrap();
        reply[140] ^= 1; // corrupt the key hash
        assert!(matches!(
            TapClient::client2(state, &reply),
            Err(Error::BadHandshake)
        ));
    }

    #[test]
    fn hybrid_handles_short_messages() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x746170_5);
        let sk = test_onion_key();
        let pk = sk.to_public_key();
        let enc = hybrid_encrypt(&mut rng, &pk, b"a short message").unwrap();
        assert_eq!(enc.len(), RSA_KEY_LEN);
        let dec = hybrid_decrypt(sk, &enc).unwrap();
        assert_eq!(&dec[..], b"a short message");
    }
}
