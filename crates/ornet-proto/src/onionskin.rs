//! The crypto-worker interface for onion-skin processing.
//!
//! Answering a CREATE cell takes an RSA decryption and a DH exchange:
//! far too slow for the main loop.  The core therefore emits
//! [`OnionskinRequest`]s for a worker pool to process, and accepts
//! [`OnionskinReply`]s whenever they are ready.  Requests and replies
//! carry a (channel, circuit-ID) pair rather than any pointer, so a
//! reply whose circuit has been torn down in the meantime is simply
//! discarded.

use crate::crypto::handshake::tap::TapServer;
use crate::crypto::handshake::{CircuitKeys, ServerHandshake};
use crate::{ChannelId, Result};
use ornet_cell::chancell::CircId;
use ornet_llcrypto::pk::rsa::PrivateKey;

/// A request to process one onion-skin.
#[derive(Debug)]
pub struct OnionskinRequest {
    /// The channel the CREATE cell arrived on.
    pub chan: ChannelId,
    /// The circuit ID it named.
    pub circ_id: CircId,
    /// The onion-skin itself.
    pub skin: Vec<u8>,
}

/// The product of a successfully processed onion-skin.
pub struct CreatedReply {
    /// The body of the CREATED cell to send back.
    pub reply: Vec<u8>,
    /// The keys now shared with the circuit's origin.
    pub keys: CircuitKeys,
}

impl std::fmt::Debug for CreatedReply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "CreatedReply {{ [{} bytes] }}", self.reply.len())
    }
}

/// A worker's answer to an [`OnionskinRequest`].
#[derive(Debug)]
pub struct OnionskinReply {
    /// The channel the request named.
    pub chan: ChannelId,
    /// The circuit ID the request named.
    pub circ_id: CircId,
    /// The outcome: keys and a reply, or a failure.
    pub result: Result<CreatedReply>,
}

/// Process one onion-skin immediately, on the calling thread.
///
/// Worker pools call this from their worker threads; tests and very
/// small hosts may simply call it inline.
pub fn process_onionskin<R: rand::Rng + rand::CryptoRng>(
    rng: &mut R,
    onion_key: &PrivateKey,
    request: OnionskinRequest,
) -> OnionskinReply {
    let result = TapServer::server(rng, onion_key, &request.skin)
        .map(|(keys, reply)| CreatedReply { reply, keys });
    OnionskinReply {
        chan: request.chan,
        circ_id: request.circ_id,
        result,
    }
}
