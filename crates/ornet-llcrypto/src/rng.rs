//! Random-number-generator compatibility.
//!
//! The `rsa` crate still consumes the older `rand_core` 0.6 traits, while
//! the rest of this workspace uses `rand` 0.9.  [`RngCompat`] bridges the
//! two so callers can pass a single RNG everywhere.

/// Adapter presenting a modern RNG through the `rand_core` 0.6 traits.
pub struct RngCompat<R>(R);

impl<R: rand::RngCore> RngCompat<R> {
    /// Wrap `rng` for use with rand_core-0.6 consumers.
    pub fn new(rng: R) -> Self {
        RngCompat(rng)
    }
}

impl<R: rand::RngCore> rand_core_06::RngCore for RngCompat<R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }
    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }
    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_06::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: rand::CryptoRng + rand::RngCore> rand_core_06::CryptoRng for RngCompat<R> {}

#[cfg(test)]
mod test {
    use super::*;
    use rand_core_06::RngCore as _;

    #[test]
    fn bridges() {
        use rand::SeedableRng as _;
        let mut r = RngCompat::new(rand::rngs::StdRng::seed_from_u64(17));
        let _ = r.next_u64();
        let mut buf = [0_u8; 4];
        r.try_fill_bytes(&mut buf).expect("infallible");
        let mut buf2 = [0_u8; 4];
        r.fill_bytes(&mut buf2);
        assert_ne!((buf, buf2), ([0; 4], [0; 4]));
    }
}
