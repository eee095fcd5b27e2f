//! The CREATE_FAST handshake: secure only against a passive observer
//! who is not the first hop.
//!
//! Both sides contribute twenty random bytes; the circuit keys are
//! derived from the concatenation.  The first hop of a circuit sees
//! the client's key material in the clear over TLS no matter what, so
//! a client that prefers speed may skip the public-key step there.

use super::{CircuitKeys, ClientHandshake, ServerHandshake, KH_LEN};
use crate::{Error, Result};
use rand::{CryptoRng, Rng};
use zeroize::Zeroizing;

/// Number of random bytes each side contributes.
pub(crate) const FAST_SECRET_LEN: usize = 20;

/// State held by a client between sending CREATE_FAST and receiving
/// CREATED_FAST.
pub(crate) struct CreateFastClientState {
    /// The random bytes we sent.
    x: Zeroizing<[u8; FAST_SECRET_LEN]>,
}

/// Client side of the CREATE_FAST handshake.
pub(crate) struct CreateFastClient;

impl ClientHandshake for CreateFastClient {
    type KeyType = ();
    type StateType = CreateFastClientState;

    fn client1<R: Rng + CryptoRng>(
        rng: &mut R,
        _key: &Self::KeyType,
    ) -> Result<(Self::StateType, Vec<u8>)> {
        let mut x = Zeroizing::new([0_u8; FAST_SECRET_LEN]);
        rng.fill_bytes(&mut x[..]);
        let msg = x.to_vec();
        Ok((CreateFastClientState { x }, msg))
    }

    fn client2<T: AsRef<[u8]>>(state: Self::StateType, msg: T) -> Result<CircuitKeys> {
        let msg = msg.as_ref();
        if msg.len() != FAST_SECRET_LEN + KH_LEN {
            return Err(Error::BadHandshake);
        }
        let (y, their_kh) = msg.split_at(FAST_SECRET_LEN);
        let mut seed = Zeroizing::new(Vec::with_capacity(FAST_SECRET_LEN * 2));
        seed.extend_from_slice(&state.x[..]);
        seed.extend_from_slice(y);
        let keys = CircuitKeys::derive(&seed);
        if !keys.kh_matches(their_kh) {
            return Err(Error::BadHandshake);
        }
        Ok(keys)
    }
}

/// Server side of the CREATE_FAST handshake.
pub(crate) struct CreateFastServer;

impl ServerHandshake for CreateFastServer {
    type KeyType = ();

    fn server<R: Rng + CryptoRng, T: AsRef<[u8]>>(
        rng: &mut R,
        _key: &Self::KeyType,
        msg: T,
    ) -> Result<(CircuitKeys, Vec<u8>)> {
        let msg = msg.as_ref();
        if msg.len() != FAST_SECRET_LEN {
            return Err(Error::BadHandshake);
        }
        let mut y = [0_u8; FAST_SECRET_LEN];
        rng.fill_bytes(&mut y);
        let mut seed = Zeroizing::new(Vec::with_capacity(FAST_SECRET_LEN * 2));
        seed.extend_from_slice(msg);
        seed.extend_from_slice(&y);
        let keys = CircuitKeys::derive(&seed);

        let mut reply = Vec::with_capacity(FAST_SECRET_LEN + KH_LEN);
        reply.extend_from_slice(&y);
        reply.extend_from_slice(keys.kh());
        Ok((keys, reply))
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use rand::SeedableRng as _;

    #[test]
    fn round_trip() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(0x66617374);
        let (state, create_msg) = CreateFastClient::client1(&mut rng, &()).unwrap();
        assert_eq!(create_msg.len(), FAST_SECRET_LEN);

        let (server_keys, reply) = CreateFastServer::server(&mut rng, &(), &create_msg).unwrap();
        assert_eq!(reply.len(), FAST_SECRET_LEN + KH_LEN);

        let client_keys = CreateFastClient::client2(state, &reply).unwrap();
        assert_eq!(client_keys.kf(), server_keys.kf());
        assert_eq!(client_keys.kb(), server_keys.kb());
        assert_eq!(client_keys.df(), server_keys.df());
    }

    #[test]
    fn fixed_vector() {
        // The scenario from the protocol description: X is all zeros,
        // Y is twenty 'B's; the derived keys come from KDF(X || Y).
        let x = [0_u8; 20];
        let y = [b'B'; 20];
        let state = CreateFastClientState {
            x: Zeroizing::new(x),
        };
        let mut seed = Vec::new();
        seed.extend_from_slice(&x);
        seed.extend_from_slice(&y);
        let expected = CircuitKeys::derive(&seed);

        let mut reply = Vec::new();
        reply.extend_from_slice(&y);
        reply.extend_from_slice(expected.kh());
        let derived = CreateFastClient::client2(state, &reply).unwrap();
        assert_eq!(derived.kf(), expected.kf());
        assert_eq!(derived.kb(), expected.kb());
    }

    #[test]
    fn bad_reply_rejected() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(1);
        let (state, create_msg) = CreateFastClient::client1(&mut rng, &()).unwrap();
        let (_, mut reply) = CreateFastServer::server(&mut rng, &(), &create_msg).unwrap();
        reply[25] ^= 1; // corrupt the key hash
        assert!(matches!(
            CreateFastClient::client2(state, &reply),
            Err(Error::BadHandshake)
        ));

        // Wrong-size onion-skins are rejected outright.
        assert!(CreateFastServer::server(&mut rng, &(), b"short").is_err());
    }
}
