//! Internal: error types for ornet-bytes.

use std::borrow::Cow;
use thiserror::Error;

/// Error type for decoding objects from bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// Tried to read something, but the input ended too soon.
    ///
    /// When decoding from a stream this can simply mean that the rest of
    /// the object has not arrived yet; callers in that position should
    /// treat it as "read more", not as a protocol violation.
    #[error("object truncated, at least {deficit} more bytes needed")]
    Truncated {
        /// Lower bound on the number of additional bytes needed.
        deficit: usize,
    },
    /// Called [`Reader::should_be_exhausted`](crate::Reader::should_be_exhausted),
    /// but bytes remained.
    #[error("extra bytes at end of object")]
    ExtraneousBytes,
    /// A length field does not fit in a usize, or exceeds a protocol bound.
    #[error("object length out of range")]
    BadLengthValue,
    /// The bytes were present, but their contents were not a valid message.
    #[error("bad object: {0}")]
    InvalidMessage(Cow<'static, str>),
}

impl Error {
    /// Return a `Truncated` error with a deficit of `n` bytes.
    pub(crate) fn truncated(deficit: usize) -> Self {
        Error::Truncated { deficit }
    }
}

/// Error type for encoding objects to bytes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum EncodeError {
    /// We tried to encode a length-counted object, but its length was too
    /// large for the length field.
    #[error("object length too large to encode")]
    BadLengthValue,
}
