//! Utilities for encoding and decoding the binary formats used on an
//! onion-routing link.
//!
//! Everything on the wire is big-endian.  Decoding works over borrowed
//! byte slices through [`Reader`]; encoding appends to any [`Writer`],
//! which is implemented for `Vec<u8>` and [`bytes::BytesMut`].

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::missing_docs_in_private_items)]

mod err;
mod impls;
mod reader;
mod writer;

pub use err::{EncodeError, Error};
pub use reader::Reader;
pub use writer::Writer;

/// Result type returned by this crate for [`Reader`]-related methods.
pub type Result<T> = std::result::Result<T, Error>;
/// Result type returned by this crate for [`Writer`]-related methods.
pub type EncodeResult<T> = std::result::Result<T, EncodeError>;

/// Trait for an object that can be encoded onto a Writer by reference.
///
/// Most code won't call this directly, but will instead use it
/// implicitly via [`Writer::write`].
///
/// # Example
///
/// ```
/// use ornet_bytes::{Writeable, Writer, EncodeResult};
/// struct Header { circ: u16, cmd: u8 }
///
/// impl Writeable for Header {
///     fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
///         b.write_u16(self.circ);
///         b.write_u8(self.cmd);
///         Ok(())
///     }
/// }
///
/// let mut v: Vec<u8> = Vec::new();
/// v.write(&Header { circ: 0x8001, cmd: 3 });
/// assert_eq!(v, &[0x80, 0x01, 0x03]);
/// ```
pub trait Writeable {
    /// Encode this object into the writer `b`.
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()>;
}

impl<W: Writeable + ?Sized> Writeable for &W {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        (*self).write_onto(b)
    }
}

/// Trait for an object that can be extracted from a Reader.
///
/// Most code won't call this directly, but will instead use it
/// implicitly via [`Reader::extract`].
///
/// # Example
///
/// ```
/// use ornet_bytes::{Readable, Reader, Result};
/// struct Header { circ: u16, cmd: u8 }
///
/// impl Readable for Header {
///     fn take_from(r: &mut Reader<'_>) -> Result<Self> {
///         Ok(Header { circ: r.take_u16()?, cmd: r.take_u8()? })
///     }
/// }
///
/// let mut r = Reader::from_slice(&[0x80, 0x01, 0x03]);
/// let h: Header = r.extract()?;
/// r.should_be_exhausted()?;
/// assert_eq!((h.circ, h.cmd), (0x8001, 3));
/// # Result::Ok(())
/// ```
pub trait Readable: Sized {
    /// Try to extract an object of this type from a Reader.
    ///
    /// Implementations should be cheap: this is not the place to verify
    /// signatures or perform expensive computation.
    fn take_from(b: &mut Reader<'_>) -> Result<Self>;
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn writer_basics() {
        let mut v: Vec<u8> = Vec::new();
        v.write_u8(0x57);
        v.write_u16(0x6520);
        v.write_u32(0x68617665);
        v.write_all(b" a cell");
        v.write_zeros(2);
        assert_eq!(&v[..], &b"We have a cell\0\0"[..]);
    }
}
