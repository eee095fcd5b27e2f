//! Types used to parse arguments of entries in a directory document.
//!
//! There are some types that are pretty common here, like base64 data,
//! hex-encoded fingerprints, and sloppy timestamps.  Each one gets a
//! little wrapper with a FromStr implementation, so the document
//! parsers can use `item.parse_arg::<B64>(0)` and the like.

use crate::{Error, NetdocErrorKind as EK, Pos, Result};
use base64ct::{Base64, Encoding};
use ornet_llcrypto::pk::rsa::{PublicKey, RsaIdentity};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;

/// A trait for decoding an object from the byte contents of a
/// base64-encoded document object.
pub(crate) trait FromBytes: Sized {
    /// Try to parse this object from a byte slice.
    fn from_bytes(b: &[u8], p: Pos) -> Result<Self>;
    /// Try to parse this object from a vector, consuming it.
    fn from_vec(v: Vec<u8>, p: Pos) -> Result<Self> {
        Self::from_bytes(&v[..], p)
    }
}

/// A piece of base64 data, as an argument.
///
/// Directory documents often omit the trailing padding, so this type
/// restores it before decoding.
#[derive(Clone, Debug)]
pub struct B64(Vec<u8>);

impl FromStr for B64 {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let mut padded = s.to_string();
        while padded.len() % 4 != 0 {
            padded.push('=');
        }
        let bytes = Base64::decode_vec(&padded)
            .map_err(|_| EK::BadArgument.at_pos(Pos::at(s)).with_msg("invalid base64"))?;
        Ok(B64(bytes))
    }
}

impl B64 {
    /// Return the byte contents of this B64.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
    /// Return this B64 as an array of exactly N bytes.
    pub fn into_array<const N: usize>(self) -> Result<[u8; N]> {
        self.0
            .try_into()
            .map_err(|_| EK::BadArgument.err().with_msg("wrong length for base64 data"))
    }
}

impl From<B64> for Vec<u8> {
    fn from(w: B64) -> Vec<u8> {
        w.0
    }
}

/// A hex-encoded 20-byte fingerprint with no spaces.
pub struct Fingerprint(pub RsaIdentity);

impl FromStr for Fingerprint {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 40 {
            return Err(EK::BadArgument
                .at_pos(Pos::at(s))
                .with_msg("wrong length on fingerprint"));
        }
        let bytes = hex::decode(s)
            .map_err(|_| EK::BadArgument.at_pos(Pos::at(s)).with_msg("invalid hex"))?;
        let id = RsaIdentity::from_bytes(&bytes)
            .ok_or_else(|| EK::Internal.at_pos(Pos::at(s)))?;
        Ok(Fingerprint(id))
    }
}

impl From<Fingerprint> for RsaIdentity {
    fn from(f: Fingerprint) -> RsaIdentity {
        f.0
    }
}

/// A hex-encoded fingerprint, with possible spaces between the groups
/// of digits (the "fingerprint" line form).
pub struct SpFingerprint(pub RsaIdentity);

impl FromStr for SpFingerprint {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let joined: String = s.split(' ').filter(|s| !s.is_empty()).collect();
        let fp = joined.parse::<Fingerprint>().map_err(|e| e.at_pos(Pos::at(s)))?;
        Ok(SpFingerprint(fp.0))
    }
}

impl From<SpFingerprint> for RsaIdentity {
    fn from(f: SpFingerprint) -> RsaIdentity {
        f.0
    }
}

/// A nickname for a relay: 1 to 19 alphanumeric ASCII characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Nickname(String);

/// Longest allowed relay nickname.
const MAX_NICKNAME_LEN: usize = 19;

impl Nickname {
    /// Return a view of this nickname as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Nickname {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for Nickname {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        if s.is_empty() || s.len() > MAX_NICKNAME_LEN {
            return Err(EK::BadArgument
                .at_pos(Pos::at(s))
                .with_msg("wrong length on nickname"));
        }
        if !s.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return Err(EK::BadArgument
                .at_pos(Pos::at(s))
                .with_msg("bad character in nickname"));
        }
        Ok(Nickname(s.to_string()))
    }
}

/// A wallclock time, as represented in a directory document: two
/// space-separated fields, `YYYY-MM-DD HH:MM:SS`, always UTC.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Iso8601TimeSp(pub SystemTime);

/// The format description for an Iso8601TimeSp.
static ISO_8601SP_FMT: &[time::format_description::FormatItem<'static>] = time::macros::format_description!(
    "[year]-[month]-[day] [hour]:[minute]:[second]"
);

impl FromStr for Iso8601TimeSp {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        let d = time::PrimitiveDateTime::parse(s, ISO_8601SP_FMT).map_err(|e| {
            EK::BadTimeBound
                .at_pos(Pos::at(s))
                .with_msg(format!("invalid time: {}", e))
        })?;
        Ok(Iso8601TimeSp(d.assume_utc().into()))
    }
}

impl From<Iso8601TimeSp> for SystemTime {
    fn from(t: Iso8601TimeSp) -> SystemTime {
        t.0
    }
}

impl fmt::Display for Iso8601TimeSp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let odt: time::OffsetDateTime = self.0.into();
        match odt.format(ISO_8601SP_FMT) {
            Ok(s) => write!(f, "{}", s),
            Err(_) => write!(f, "[time out of range]"),
        }
    }
}

/// An RSA public key as it appears in a document object.
pub(crate) struct RsaPublic(PublicKey, Pos);

impl FromBytes for RsaPublic {
    fn from_bytes(b: &[u8], pos: Pos) -> Result<Self> {
        let key = PublicKey::from_der(b)
            .map_err(|_| EK::BadObjectVal.err().with_msg("unable to decode RSA public key"))?;
        Ok(RsaPublic(key, pos))
    }
}

impl From<RsaPublic> for PublicKey {
    fn from(k: RsaPublic) -> PublicKey {
        k.0
    }
}

impl RsaPublic {
    /// Give an error unless the modulus of this key is exactly
    /// `n` bits long.
    pub(crate) fn check_len_eq(self, n: usize) -> Result<Self> {
        if self.0.modulus_len() * 8 == n {
            Ok(self)
        } else {
            Err(EK::BadObjectVal.at_pos(self.1).with_msg("invalid key length"))
        }
    }
    /// Give an error unless the exponent of this key is `e`.
    pub(crate) fn check_exponent(self, e: u64) -> Result<Self> {
        if self.0.exponent_u64() == Some(e) {
            Ok(self)
        } else {
            Err(EK::BadObjectVal.at_pos(self.1).with_msg("invalid exponent"))
        }
    }
}

#[cfg(test)]
mod test {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn b64_with_and_without_padding() {
        let with: B64 = "aGVsbG8gd29ybGQ=".parse().unwrap();
        let without: B64 = "aGVsbG8gd29ybGQ".parse().unwrap();
        assert_eq!(with.as_bytes(), b"hello world");
        assert_eq!(without.as_bytes(), b"hello world");
        assert!("not%valid".parse::<B64>().is_err());

        let arr: [u8; 11] = "aGVsbG8gd29ybGQ".parse::<B64>().unwrap().into_array().unwrap();
        assert_eq!(&arr, b"hello world");
        assert!("aGVsbG8gd29ybGQ"
            .parse::<B64>()
            .unwrap()
            .into_array::<5>()
            .is_err());
    }

    #[test]
    fn fingerprints() {
        let fp: Fingerprint = "56927e61b51e6f363fb55498150a6ddfcf7077f2".parse().unwrap();
        let sp: SpFingerprint = "5692 7e61 b51e 6f36 3fb5 5498 150a 6ddf cf70 77f2"
            .parse()
            .unwrap();
        assert_eq!(RsaIdentity::from(fp), RsaIdentity::from(sp));
        assert!("5692".parse::<Fingerprint>().is_err());
        assert!("zz927e61b51e6f363fb55498150a6ddfcf7077f2"
            .parse::<Fingerprint>()
            .is_err());
    }

    #[test]
    fn nicknames() {
        assert_eq!("Akka".parse::<Nickname>().unwrap().as_str(), "Akka");
        assert!("".parse::<Nickname>().is_err());
        assert!("abcdefghijklmnopqrstuvwxyz".parse::<Nickname>().is_err());
        assert!("not valid".parse::<Nickname>().is_err());
        assert!("ünteressant".parse::<Nickname>().is_err());
    }

    #[test]
    fn times() {
        let t: Iso8601TimeSp = "2020-09-29 13:36:33".parse().unwrap();
        let t: SystemTime = t.into();
        assert_eq!(t, humantime::parse_rfc3339("2020-09-29T13:36:33Z").unwrap());

        assert!("2020-FF-29 13:36:33".parse::<Iso8601TimeSp>().is_err());
        assert!("2020-09-29".parse::<Iso8601TimeSp>().is_err());

        let t: Iso8601TimeSp = "1970-01-01 00:00:00".parse().unwrap();
        assert_eq!(t.to_string(), "1970-01-01 00:00:00");
    }
}
