//! Coding and decoding for the cell types that make up the onion-routing
//! link protocol.
//!
//! # Overview
//!
//! Onion relays speak to one another over TLS links; everything sent over
//! such a link is framed into *cells*.  Most cells are exactly 512 bytes
//! long; a handful (currently only VERSIONS) carry an explicit length.
//! This crate implements the cell frames themselves ([`chancell`]), and
//! the inner message framing carried inside RELAY cells ([`relaycell`]).
//!
//! This crate does no cryptography and holds no state: the link and
//! circuit state machines live elsewhere and call into this one.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

pub mod chancell;
pub mod relaycell;

use thiserror::Error;

/// An error type for the ornet-cell crate.
#[derive(Clone, Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// We were given a cell body whose bytes do not form a valid message.
    #[error("error while parsing {parsed}")]
    BytesErr {
        /// The underlying decode error.
        #[source]
        err: ornet_bytes::Error,
        /// What we were trying to parse.
        parsed: &'static str,
    },
    /// A cell violated the link protocol.
    #[error("channel protocol violation: {0}")]
    ChanProto(String),
    /// A message could not be encoded as requested.
    #[error("can't encode: {0}")]
    CantEncode(&'static str),
    /// An internal invariant did not hold.  This is always a bug.
    #[error("internal error: {0}")]
    Internal(&'static str),
}

impl From<ornet_bytes::EncodeError> for Error {
    fn from(_: ornet_bytes::EncodeError) -> Self {
        Error::CantEncode("object too long for its length field")
    }
}

/// A Result whose error type is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;
