//! Ciphers used by the protocol.

/// The block ciphers we use, in counter mode.
pub mod aes {
    use ::aes::Aes128;
    use ::ctr::Ctr128BE;

    /// AES-128 in counter mode, big-endian counter.
    ///
    /// This is the stream cipher applied to every relay-cell layer; the
    /// counter starts at zero for each circuit hop key.
    pub type Aes128Ctr = Ctr128BE<Aes128>;

    pub use ctr::cipher as cipher_traits;
    use ::ctr::cipher::KeyIvInit;

    /// Construct an [`Aes128Ctr`] with the given key and an all-zero IV.
    ///
    /// Circuit-hop ciphers always start from a zero counter; the key is
    /// never reused across circuits.
    pub fn new_zero_iv(key: &[u8; 16]) -> Aes128Ctr {
        Aes128Ctr::new(key.into(), &[0_u8; 16].into())
    }
}

#[cfg(test)]
mod test {
    use super::aes::{cipher_traits::StreamCipher, new_zero_iv};

    #[test]
    fn distinct_keys_distinct_streams() {
        let mut a = [0_u8; 32];
        let mut b = [0_u8; 32];
        new_zero_iv(&[1_u8; 16]).apply_keystream(&mut a);
        new_zero_iv(&[2_u8; 16]).apply_keystream(&mut b);
        assert_ne!(a, b);
        assert_ne!(a, [0_u8; 32]);
    }

    #[test]
    fn aes_ctr_inverts() {
        let key = [7_u8; 16];
        let mut buf = *b"please pass the onions, thanks!!";
        let mut enc = new_zero_iv(&key);
        enc.apply_keystream(&mut buf);
        assert_ne!(&buf[..], b"please pass the onions, thanks!!");
        let mut dec = new_zero_iv(&key);
        dec.apply_keystream(&mut buf);
        assert_eq!(&buf[..], b"please pass the onions, thanks!!");
    }
}
