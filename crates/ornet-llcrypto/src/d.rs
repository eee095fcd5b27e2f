//! Digests used by the protocol.
//!
//! The legacy link and directory formats use SHA-1 everywhere: relay-cell
//! running digests, identity fingerprints, descriptor digests, and
//! document signatures.  We re-export the RustCrypto implementation so
//! that callers name digests through this module rather than picking
//! their own.

pub use sha1::Sha1;

use digest::Digest;

/// Compute the SHA-1 digest of `bytes`, as a fixed-size array.
pub fn sha1(bytes: &[u8]) -> [u8; 20] {
    let d = Sha1::digest(bytes);
    d.into()
}
