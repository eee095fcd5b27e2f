//! Implementation for the various document types.

pub mod authcert;
pub mod detached;
pub mod extrainfo;
pub mod netstatus;
pub mod routerdesc;

use crate::{NetdocErrorKind as EK, Result};
use ornet_llcrypto::d;
use ornet_llcrypto::pk::rsa::PublicKey;

/// Compute the SHA-1 digest of the signed byte range of a document:
/// from `start_offset` through the end of `sig_line` (which begins at
/// `sig_line_offset`).
///
/// Every signed document kind signs a digest of this form: the byte
/// range from its first keyword through its signature keyword line.
pub(crate) fn digest_from_kwds(s: &str, start_offset: usize, sig_line_offset: usize, sig_line: &str) -> [u8; 20] {
    let end = sig_line_offset + sig_line.len();
    d::sha1(&s.as_bytes()[start_offset..end])
}

/// Check a legacy RSA signature over a document digest.
pub(crate) fn check_signature(key: &PublicKey, digest: &[u8; 20], sig: &[u8]) -> Result<()> {
    key.verify(digest, sig)
        .map_err(|_| EK::BadSignature.err())?;
    Ok(())
}
