//! Low-level cryptographic implementations for ornet.
//!
//! Nothing in this crate implements onion routing itself: these are the
//! primitives (SHA-1 digests, AES-CTR, RSA-1024 keys and signatures,
//! DH-1024) that the rest of the workspace consumes through a narrow,
//! swappable interface.  The protocol this workspace implements predates
//! the curve25519/ed25519 era, so everything here is deliberately
//! old-fashioned: new protocols should not borrow from it.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod cipher;
pub mod d;
pub mod pk;
pub mod rng;
pub mod util;

/// Length of a SHA-1 digest, and hence of every identity fingerprint.
pub const DIGEST_LEN: usize = 20;
