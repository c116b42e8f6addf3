//! Small helpers shared across modules.

use rand::{CryptoRng, RngCore};

/// Lets a `rand` 0.9 RNG stand in where `curve25519-dalek` expects `rand_core` 0.6 traits.
pub(crate) struct RngCompat<'a, R>(pub(crate) &'a mut R);

impl<R: RngCore> rand_core_0_6::RngCore for RngCompat<'_, R> {
    fn next_u32(&mut self) -> u32 {
        self.0.next_u32()
    }

    fn next_u64(&mut self) -> u64 {
        self.0.next_u64()
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.fill_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core_0_6::Error> {
        self.0.fill_bytes(dest);
        Ok(())
    }
}

impl<R: CryptoRng> rand_core_0_6::CryptoRng for RngCompat<'_, R> {}
