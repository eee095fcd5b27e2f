//! The contract between this crate and the TLS wrapper that carries
//! its bytes.
//!
//! The wrapper itself lives in the host: it owns the sockets, the TLS
//! library, and the poller.  What the core needs from it is narrow:
//! non-blocking reads and writes with explicit would-block results, a
//! renegotiation trigger (used to rotate link certificates), access to
//! the peer's certificate chain, and raw byte counters so TLS overhead
//! can be accounted separately from payload.

use ornet_llcrypto::pk::rsa::RsaIdentity;
use ornet_llcrypto::util::x509_extract_rsa_subject;

/// The class of a transport error, as reported by the TLS wrapper.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum IoErrorKind {
    /// The connection was reset by the peer.
    ConnReset,
    /// The operation timed out.
    Timeout,
    /// No route to the peer.
    NoRoute,
    /// The peer refused the connection.
    ConnRefused,
    /// Some other I/O error.
    Io,
    /// Anything else.
    Misc,
}

/// The result of a non-blocking transport operation.
///
/// `WantRead`/`WantWrite` are not errors: they mean the operation
/// should be retried when the underlying socket is readable (or
/// writable; TLS renegotiation can make a read want a write).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
#[allow(clippy::exhaustive_enums)]
pub enum IoStatus<T> {
    /// The operation completed.
    Done(T),
    /// Retry when the transport is readable.
    WantRead,
    /// Retry when the transport is writable.
    WantWrite,
    /// The peer closed the stream cleanly.
    Closed,
    /// The operation failed.
    Error(IoErrorKind),
}

/// The interface the core assumes of a TLS link.
pub trait LinkTransport {
    /// Try to read some bytes into `buf`.
    fn read(&mut self, buf: &mut [u8]) -> IoStatus<usize>;
    /// Try to write some bytes from `buf`.
    fn write(&mut self, buf: &[u8]) -> IoStatus<usize>;
    /// Try to flush buffered output.
    fn flush(&mut self) -> IoStatus<()>;
    /// Begin a client-initiated renegotiation.
    fn renegotiate(&mut self) -> IoStatus<()>;
    /// Begin an orderly shutdown.
    fn shutdown(&mut self) -> IoStatus<()>;
    /// Return the peer's leaf certificate, DER-encoded, if the
    /// handshake has presented one.
    fn peer_certificate(&self) -> Option<Vec<u8>>;
    /// Return the peer's full certificate chain, leaf first.
    fn peer_cert_chain(&self) -> Vec<Vec<u8>>;
    /// Total raw bytes read from the network, TLS overhead included.
    fn n_bytes_read(&self) -> u64;
    /// Total raw bytes written to the network, TLS overhead included.
    fn n_bytes_written(&self) -> u64;
}

/// Extract the peer's identity digest from its certificate chain.
///
/// In this link protocol the peer presents a connection certificate
/// signed by a self-signed identity certificate; the identity digest
/// is the SHA-1 of the RSA key in the latter.  The chain is presented
/// leaf first, so the identity certificate is the last one.
pub fn peer_identity_from_chain(chain: &[Vec<u8>]) -> Option<RsaIdentity> {
    let identity_cert = chain.last()?;
    let key = x509_extract_rsa_subject(identity_cert)?;
    Some(key.to_rsa_identity())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn no_chain_no_identity() {
        assert_eq!(peer_identity_from_chain(&[]), None);
        assert_eq!(peer_identity_from_chain(&[b"junk".to_vec()]), None);
    }
}
