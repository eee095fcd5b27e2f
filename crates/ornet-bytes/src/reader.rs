//! Internal: declare the Reader type for ornet-bytes.

use crate::{Error, Readable, Result};

/// A cursor for decoding messages from a slice of bytes.
///
/// Unlike `io::Read`, this type has a simple error type and is designed
/// for in-memory parsing only.  None of its methods panic.
///
/// # Example
///
/// ```
/// use ornet_bytes::{Reader, Result};
/// let msg = [0x00, 0x01, 0x23, 0x45, 0x22];
/// let mut r = Reader::from_slice(&msg[..]);
/// assert_eq!(r.take_u32()?, 0x12345);
/// assert_eq!(r.take_u8()?, 0x22);
/// r.should_be_exhausted()?;
/// # Result::Ok(())
/// ```
pub struct Reader<'a> {
    /// The underlying slice that we're reading from.
    b: &'a [u8],
    /// The next position in the slice that we intend to read from.
    off: usize,
}

impl<'a> Reader<'a> {
    /// Construct a new Reader from a slice of bytes.
    pub fn from_slice(slice: &'a [u8]) -> Self {
        Reader { b: slice, off: 0 }
    }
    /// Construct a new Reader from a [`bytes::Bytes`] object.
    pub fn from_bytes(b: &'a bytes::Bytes) -> Self {
        Self::from_slice(b.as_ref())
    }
    /// Return the total length of the underlying slice, consumed bytes
    /// included.
    pub fn total_len(&self) -> usize {
        self.b.len()
    }
    /// Return the number of bytes that have not yet been read.
    pub fn remaining(&self) -> usize {
        self.b.len() - self.off
    }
    /// Return the number of bytes that have already been read.
    pub fn consumed(&self) -> usize {
        self.off
    }
    /// Consume this reader and return the unread remainder of its slice.
    pub fn into_rest(self) -> &'a [u8] {
        &self.b[self.off..]
    }
    /// Skip `n` bytes, or fail with [`Error::Truncated`] if there are
    /// fewer than `n` left.
    pub fn advance(&mut self, n: usize) -> Result<()> {
        let _ = self.peek(n)?;
        self.off += n;
        Ok(())
    }
    /// Check whether this reader is out of bytes.
    ///
    /// Returns [`Error::ExtraneousBytes`] if any remain.
    pub fn should_be_exhausted(&self) -> Result<()> {
        if self.remaining() != 0 {
            return Err(Error::ExtraneousBytes);
        }
        Ok(())
    }
    /// Truncate this reader so that no more than `n` bytes remain.
    ///
    /// Fewer than `n` may remain if fewer were present to begin with.
    pub fn truncate(&mut self, n: usize) {
        if n < self.remaining() {
            self.b = &self.b[..self.off + n];
        }
    }
    /// Return a slice of the next `n` bytes without consuming them.
    pub fn peek(&self, n: usize) -> Result<&'a [u8]> {
        if let Some(deficit) = n.checked_sub(self.remaining()).filter(|d| *d > 0) {
            return Err(Error::truncated(deficit));
        }
        Ok(&self.b[self.off..(self.off + n)])
    }
    /// Consume and return a slice of the next `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let b = self.peek(n)?;
        self.advance(n)?;
        Ok(b)
    }
    /// Fill `buf` with consumed bytes, advancing by `buf.len()`.
    ///
    /// On failure the buffer is unchanged.
    pub fn take_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let b = self.take(buf.len())?;
        buf.copy_from_slice(b);
        Ok(())
    }
    /// Consume and return all remaining bytes, leaving the reader empty.
    pub fn take_rest(&mut self) -> &'a [u8] {
        let rest = &self.b[self.off..];
        self.off = self.b.len();
        rest
    }
    /// Consume and return a u8.
    pub fn take_u8(&mut self) -> Result<u8> {
        let b = self.take(1)?;
        Ok(b[0])
    }
    /// Consume and return a big-endian u16.
    pub fn take_u16(&mut self) -> Result<u16> {
        let b: [u8; 2] = self.extract()?;
        Ok(u16::from_be_bytes(b))
    }
    /// Consume and return a big-endian u32.
    pub fn take_u32(&mut self) -> Result<u32> {
        let b: [u8; 4] = self.extract()?;
        Ok(u32::from_be_bytes(b))
    }
    /// Decode and remove a [`Readable`] from this reader.
    ///
    /// On failure, consumes nothing.
    pub fn extract<E: Readable>(&mut self) -> Result<E> {
        let off_orig = self.off;
        let result = E::take_from(self);
        if result.is_err() {
            self.off = off_orig;
        }
        result
    }
    /// Decode and remove `n` [`Readable`]s from this reader.
    ///
    /// On failure, consumes nothing.
    pub fn extract_n<E: Readable>(&mut self, n: usize) -> Result<Vec<E>> {
        // Cap the initial allocation: `n` comes off the wire, and must not
        // be trusted to size a buffer on its own.
        let mut result = Vec::with_capacity(std::cmp::min(n, self.remaining()));
        let off_orig = self.off;
        for _ in 0..n {
            match E::take_from(self) {
                Ok(item) => result.push(item),
                Err(e) => {
                    self.off = off_orig;
                    return Err(e);
                }
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn read_ok() {
        let bytes = b"splitting the onion into rings";
        let mut r = Reader::from_slice(&bytes[..]);

        assert_eq!(r.total_len(), 30);
        assert_eq!(r.take(9).unwrap(), &b"splitting"[..]);
        assert_eq!(r.consumed(), 9);
        assert_eq!(r.take_u8().unwrap(), b' ');
        assert_eq!(r.take_u16().unwrap(), 0x7468);
        assert_eq!(r.take_u32().unwrap(), 0x65206f6e);
        assert_eq!(r.remaining(), 14);

        assert_eq!(r.peek(3).unwrap(), &b"ion"[..]);
        assert_eq!(r.remaining(), 14); // peek consumed nothing.

        r.advance(5).unwrap();
        assert_eq!(r.into_rest(), &b"o rings"[..]);
    }

    #[test]
    fn read_missing() {
        let bytes = b"1234567";
        let mut r = Reader::from_slice(&bytes[..]);

        assert_eq!(r.take(8), Err(Error::truncated(1)));
        assert_eq!(r.peek(10), Err(Error::truncated(3)));
        assert_eq!(r.remaining(), 7); // failures consume nothing.

        assert_eq!(r.take_u32().unwrap(), 0x31323334);
        assert_eq!(r.take_u32(), Err(Error::truncated(1)));
        assert_eq!(r.take_u16().unwrap(), 0x3536);
        assert_eq!(r.take_u8().unwrap(), 0x37);
        assert_eq!(r.take_u8(), Err(Error::truncated(1)));
    }

    #[test]
    fn truncate() {
        let mut r = Reader::from_slice(&b"Hello universe"[..]);
        assert_eq!(r.take(5).unwrap(), &b"Hello"[..]);
        r.truncate(9);
        assert_eq!(r.remaining(), 9);
        r.truncate(1000);
        assert_eq!(r.remaining(), 9);
        assert_eq!(r.take_u8().unwrap(), b' ');
        assert_eq!(r.into_rest(), &b"universe"[..]);
    }

    #[test]
    fn exhaust_and_rest() {
        let mut r = Reader::from_slice(&b"si vales valeo"[..]);
        assert_eq!(r.should_be_exhausted(), Err(Error::ExtraneousBytes));
        assert_eq!(r.take(3).unwrap(), b"si ");
        assert_eq!(r.take_rest(), b"vales valeo");
        assert_eq!(r.take_rest(), b"");
        assert_eq!(r.should_be_exhausted(), Ok(()));
    }

    #[test]
    fn extract_rewinds() {
        struct LenEnc(Vec<u8>);
        impl Readable for LenEnc {
            fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                let length = b.take_u8()?;
                Ok(LenEnc(b.take(length as usize)?.into()))
            }
        }

        let bytes = b"\x04this\x02is\x01a\x07mess";
        let mut r = Reader::from_slice(&bytes[..]);
        let les: Vec<LenEnc> = r.extract_n(3).unwrap();
        assert_eq!(&les[2].0[..], b"a");

        let remaining = r.remaining();
        let bad: Result<LenEnc> = r.extract();
        assert!(bad.is_err());
        assert_eq!(r.remaining(), remaining);
    }
}
