//! Implementations of Writeable and Readable for common types.

use crate::{EncodeResult, Error, Readable, Reader, Result, Writeable, Writer};
use std::net::{Ipv4Addr, Ipv6Addr};

// Vec<u8> and slices are encoded exactly as their bytes, with no length
// prefix; any framing is the caller's business.
impl Writeable for [u8] {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(self);
        Ok(())
    }
}

impl Writeable for Vec<u8> {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(&self[..]);
        Ok(())
    }
}

impl<const N: usize> Writeable for [u8; N] {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(&self[..]);
        Ok(())
    }
}

impl<const N: usize> Readable for [u8; N] {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let mut array = [0_u8; N];
        r.take_into(&mut array)?;
        Ok(array)
    }
}

/// Implement Readable and Writeable for a fixed-width integer.
macro_rules! impl_u {
    ( $t:ty, $wrfn:ident, $rdfn:ident ) => {
        impl Writeable for $t {
            fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
                b.$wrfn(*self);
                Ok(())
            }
        }
        impl Readable for $t {
            fn take_from(b: &mut Reader<'_>) -> Result<Self> {
                b.$rdfn()
            }
        }
    };
}

impl_u!(u8, write_u8, take_u8);
impl_u!(u16, write_u16, take_u16);
impl_u!(u32, write_u32, take_u32);

impl Writeable for Ipv4Addr {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(&self.octets()[..]);
        Ok(())
    }
}

impl Readable for Ipv4Addr {
    fn take_from(b: &mut Reader<'_>) -> Result<Self> {
        Ok(b.take_u32()?.into())
    }
}

impl Writeable for Ipv6Addr {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(&self.octets()[..]);
        Ok(())
    }
}

impl Readable for Ipv6Addr {
    fn take_from(b: &mut Reader<'_>) -> Result<Self> {
        let octets: [u8; 16] = b.extract()?;
        Ok(octets.into())
    }
}

impl Readable for Vec<u8> {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        Ok(r.take_rest().into())
    }
}

impl Writeable for str {
    fn write_onto<B: Writer + ?Sized>(&self, b: &mut B) -> EncodeResult<()> {
        b.write_all(self.as_bytes());
        Ok(())
    }
}

impl Readable for String {
    fn take_from(r: &mut Reader<'_>) -> Result<Self> {
        let bytes = r.take_rest();
        String::from_utf8(bytes.into())
            .map_err(|_| Error::InvalidMessage("Bytes were not utf-8.".into()))
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use crate::{Reader, Writer};
    use std::net::{Ipv4Addr, Ipv6Addr};

    #[test]
    fn ip_round_trip() {
        let ip4: Ipv4Addr = "127.0.0.1".parse().unwrap();
        let ip6: Ipv6Addr = "::2".parse().unwrap();
        let mut v: Vec<u8> = Vec::new();
        v.write(&ip4).unwrap();
        v.write(&ip6).unwrap();
        assert_eq!(v.len(), 20);

        let mut r = Reader::from_slice(&v[..]);
        assert_eq!(r.extract::<Ipv4Addr>().unwrap(), ip4);
        assert_eq!(r.extract::<Ipv6Addr>().unwrap(), ip6);
        r.should_be_exhausted().unwrap();
    }

    #[test]
    fn array_round_trip() {
        let a = [9_u8; 20];
        let mut v: Vec<u8> = Vec::new();
        v.write(&a).unwrap();
        let mut r = Reader::from_slice(&v[..]);
        let b: [u8; 20] = r.extract().unwrap();
        assert_eq!(a, b);
    }
}
