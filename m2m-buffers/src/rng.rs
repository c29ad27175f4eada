use rand_core::{impls, Error, RngCore, SeedableRng};

const PCG_MULT: u64 = 6364136223846793005;

/// A PCG-XSH-RR 32-bit generator.
///
/// This is the bundled fallback for targets with no OS entropy source: small
/// state, fast, and statistically adequate for protocol jitter and message-id
/// assignment. It is not a cryptographic generator. Implementing [`RngCore`]
/// and [`SeedableRng`] lets it slot in anywhere the stack takes
/// `&mut dyn RngCore`.
#[derive(Debug, Clone)]
pub struct Pcg32 {
    state: u64,
    inc: u64,
}

impl Pcg32 {
    /// Seeds the generator from a 64-bit value and a stream selector.
    pub fn new(seed: u64, stream: u64) -> Self {
        let mut rng = Self {
            state: 0,
            inc: (stream << 1) | 1,
        };
        let _ = rng.next_u32();
        rng.state = rng.state.wrapping_add(seed);
        let _ = rng.next_u32();
        rng
    }
}

impl RngCore for Pcg32 {
    fn next_u32(&mut self) -> u32 {
        let old = self.state;
        self.state = old.wrapping_mul(PCG_MULT).wrapping_add(self.inc);
        let xorshifted = (((old >> 18) ^ old) >> 27) as u32;
        let rot = (old >> 59) as u32;
        xorshifted.rotate_right(rot)
    }

    fn next_u64(&mut self) -> u64 {
        ((self.next_u32() as u64) << 32) | self.next_u32() as u64
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        impls::fill_bytes_via_next(self, dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for Pcg32 {
    type Seed = [u8; 16];

    fn from_seed(seed: Self::Seed) -> Self {
        let state = u64::from_le_bytes(seed[..8].try_into().unwrap());
        let stream = u64::from_le_bytes(seed[8..].try_into().unwrap());
        Self::new(state, stream)
    }

    fn seed_from_u64(state: u64) -> Self {
        Self::new(state, 0xda3e_39cb_94b9_5bdb)
    }
}
