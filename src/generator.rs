//! Reseeding deterministic generators built on the sponge and stream sessions.
//!
//! A [`SpongeGenerator`] squeezes output from a sponge and ratchets it after every request; a
//! [`StreamGenerator`] hands out keystream and rekeys itself periodically. Both pull fresh seed
//! material from a [`SeedSource`], and both are themselves `RngCore + CryptoRng`, so generators
//! can be chained (e.g. a stream generator seeded by a sponge generator seeded by the OS).
use rand_core::{CryptoRng, RngCore};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::sponge::STATE_BYTES;
use crate::stream::KEY_LEN;
use crate::{Permutation, Sponge, StreamCore, StreamSession};

/// The smallest reseed interval either generator accepts, in bytes.
pub const MIN_RESEED_INTERVAL: usize = 256;

/// The smallest sponge capacity a [`SpongeGenerator`] accepts, in bits.
pub const MIN_GENERATOR_CAPACITY: usize = 2 * 128;

/// A source of seed material.
pub trait SeedSource {
    /// Fills as much of `seed` as possible and returns the number of bytes written.
    fn fill_seed(&mut self, seed: &mut [u8]) -> usize;
}

impl<R> SeedSource for R
where
    R: RngCore + CryptoRng,
{
    fn fill_seed(&mut self, seed: &mut [u8]) -> usize {
        match self.try_fill_bytes(seed) {
            Ok(()) => seed.len(),
            Err(_) => 0,
        }
    }
}

/// A sponge-based generator which reseeds itself from a [`SeedSource`].
///
/// The generator reseeds before its first output and then after every `reseed_interval` bytes.
/// Each request ends with a [`Sponge::ratchet`], so the state left behind cannot be rewound to
/// recover what was handed out.
pub struct SpongeGenerator<P, S>
where
    P: Permutation<STATE_BYTES>,
    S: SeedSource,
{
    sponge: Sponge<P>,
    source: S,
    seed: Zeroizing<Vec<u8>>,
    reseed_interval: usize,
    remaining: usize,
}

impl<P, S> SpongeGenerator<P, S>
where
    P: Permutation<STATE_BYTES>,
    S: SeedSource,
{
    /// The default number of bytes generated between reseeds.
    pub const DEFAULT_RESEED_INTERVAL: usize = 32 * 1024;

    /// Creates a generator over a sponge with the given capacity in bits.
    ///
    /// The capacity also sets the seed length, so it must be at least
    /// [`MIN_GENERATOR_CAPACITY`].
    pub fn new(source: S, capacity_bits: usize) -> Result<Self> {
        if capacity_bits < MIN_GENERATOR_CAPACITY {
            return Err(Error::InvalidParameter("capacity"));
        }
        let sponge = Sponge::new(capacity_bits)?;
        let seed = Zeroizing::new(vec![0u8; capacity_bits / 8]);
        Ok(SpongeGenerator {
            sponge,
            source,
            seed,
            reseed_interval: Self::DEFAULT_RESEED_INTERVAL,
            remaining: 0,
        })
    }

    /// Sets the number of bytes generated between reseeds (at least [`MIN_RESEED_INTERVAL`]).
    pub fn with_reseed_interval(mut self, reseed_interval: usize) -> Self {
        self.reseed_interval = reseed_interval.max(MIN_RESEED_INTERVAL);
        self
    }

    /// Fills `out` with generated bytes, reseeding as needed.
    ///
    /// The sponge is ratcheted afterwards even if a reseed failed part way through.
    pub fn generate(&mut self, out: &mut [u8]) -> Result<()> {
        if out.is_empty() {
            return Ok(());
        }

        let result = self.squeeze_reseeding(out);
        self.sponge.ratchet();
        result
    }

    /// Mixes fresh seed material into the sponge and restarts the reseed interval.
    pub fn reseed(&mut self) -> Result<()> {
        self.sponge.reabsorb();

        let n = self.source.fill_seed(&mut self.seed);
        if n < self.seed.len() && 2 * 8 * n < self.sponge.capacity() {
            return Err(Error::SeedUnavailable);
        }

        self.sponge.absorb(&self.seed[..n]);
        self.remaining = self.reseed_interval;

        debug!(seed_len = n, reseed_interval = self.reseed_interval, "reseeded sponge generator");
        Ok(())
    }

    fn squeeze_reseeding(&mut self, mut out: &mut [u8]) -> Result<()> {
        while !out.is_empty() {
            if self.remaining == 0 {
                self.reseed()?;
            }
            let n = self.remaining.min(out.len());
            let (block, rest) = core::mem::take(&mut out).split_at_mut(n);
            self.sponge.squeeze_mut(block);
            self.remaining -= n;
            out = rest;
        }
        Ok(())
    }
}

impl<P, S> RngCore for SpongeGenerator<P, S>
where
    P: Permutation<STATE_BYTES>,
    S: SeedSource,
{
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = self.generate(dest) {
            panic!("sponge generator failed: {e}");
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
        self.generate(dest).map_err(rand_core::Error::new)
    }
}

impl<P, S> CryptoRng for SpongeGenerator<P, S>
where
    P: Permutation<STATE_BYTES>,
    S: SeedSource,
{
}

/// A ChaCha20 generator which rekeys itself from a [`SeedSource`].
#[cfg(feature = "chacha20")]
pub type ChaCha20Generator<S> = StreamGenerator<crate::ChaCha20Core, S>;

/// A stream-cipher generator which rekeys itself from a [`SeedSource`].
///
/// The generator keys itself with a fresh 256-bit seed before its first output and then after
/// every `reseed_interval` bytes of keystream.
pub struct StreamGenerator<C, S>
where
    C: StreamCore,
    S: SeedSource,
{
    session: StreamSession<C>,
    source: S,
    reseed_interval: usize,
    remaining: usize,
}

impl<C, S> StreamGenerator<C, S>
where
    C: StreamCore,
    S: SeedSource,
{
    /// The default number of bytes generated between reseeds.
    pub const DEFAULT_RESEED_INTERVAL: usize = 4 * 1024 * 1024;

    /// Creates an unseeded generator; it seeds itself on first use.
    pub fn new(source: S) -> Result<Self> {
        Ok(StreamGenerator {
            session: StreamSession::new()?,
            source,
            reseed_interval: Self::DEFAULT_RESEED_INTERVAL,
            remaining: 0,
        })
    }

    /// Sets the number of bytes generated between reseeds (at least [`MIN_RESEED_INTERVAL`]).
    pub fn with_reseed_interval(mut self, reseed_interval: usize) -> Self {
        self.reseed_interval = reseed_interval.max(MIN_RESEED_INTERVAL);
        self
    }

    /// Fills `out` with keystream, rekeying as needed.
    pub fn generate(&mut self, mut out: &mut [u8]) -> Result<()> {
        while !out.is_empty() {
            if self.remaining == 0 {
                self.reseed()?;
            }
            let n = self.remaining.min(out.len());
            let (block, rest) = core::mem::take(&mut out).split_at_mut(n);
            self.session.keystream_mut(block)?;
            self.remaining -= n;
            out = rest;
        }
        Ok(())
    }

    /// Rekeys the session with a fresh seed and restarts the reseed interval.
    pub fn reseed(&mut self) -> Result<()> {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        if self.source.fill_seed(&mut seed[..]) != KEY_LEN {
            return Err(Error::SeedUnavailable);
        }

        self.session.initialize(&seed[..])?;
        self.remaining = self.reseed_interval;

        debug!(reseed_interval = self.reseed_interval, "reseeded stream generator");
        Ok(())
    }
}

impl<C, S> RngCore for StreamGenerator<C, S>
where
    C: StreamCore,
    S: SeedSource,
{
    fn next_u32(&mut self) -> u32 {
        rand_core::impls::next_u32_via_fill(self)
    }

    fn next_u64(&mut self) -> u64 {
        rand_core::impls::next_u64_via_fill(self)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        if let Err(e) = self.generate(dest) {
            panic!("stream generator failed: {e}");
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> core::result::Result<(), rand_core::Error> {
        self.generate(dest).map_err(rand_core::Error::new)
    }
}

impl<C, S> CryptoRng for StreamGenerator<C, S>
where
    C: StreamCore,
    S: SeedSource,
{
}

#[cfg(all(test, feature = "keccak", feature = "chacha20"))]
mod tests {
    use super::*;
    use crate::{KeccakF1600, SecurityLevel};

    /// A deterministic "entropy" source which hands out an incrementing byte stream, optionally
    /// running dry after a fixed number of bytes.
    #[derive(Clone)]
    struct FixedSource {
        next: u8,
        budget: usize,
        calls: usize,
    }

    impl FixedSource {
        fn new(budget: usize) -> Self {
            FixedSource { next: 0, budget, calls: 0 }
        }
    }

    impl SeedSource for FixedSource {
        fn fill_seed(&mut self, seed: &mut [u8]) -> usize {
            self.calls += 1;
            let n = seed.len().min(self.budget);
            for b in &mut seed[..n] {
                *b = self.next;
                self.next = self.next.wrapping_add(1);
            }
            self.budget -= n;
            n
        }
    }

    type Generator = SpongeGenerator<KeccakF1600, FixedSource>;

    const CAPACITY: usize = SecurityLevel::Security256.bits();

    #[test]
    fn deterministic() {
        let mut a = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();
        let mut b = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();

        let mut out_a = [0u8; 1000];
        let mut out_b = [0u8; 1000];
        a.fill_bytes(&mut out_a);
        b.fill_bytes(&mut out_b);

        assert_eq!(out_a, out_b);
        assert_ne!([0u8; 1000], out_a);
    }

    #[test]
    fn seeds_lazily_and_on_interval() {
        let mut generator = Generator::new(FixedSource::new(usize::MAX), CAPACITY)
            .unwrap()
            .with_reseed_interval(300);
        assert_eq!(0, generator.source.calls);

        generator.generate(&mut [0u8; 100]).unwrap();
        assert_eq!(1, generator.source.calls);

        generator.generate(&mut [0u8; 200]).unwrap();
        assert_eq!(1, generator.source.calls);

        generator.generate(&mut [0u8; 1]).unwrap();
        assert_eq!(2, generator.source.calls);

        generator.generate(&mut [0u8; 700]).unwrap();
        assert_eq!(4, generator.source.calls);
    }

    /// Hands out a single repeated byte, forever.
    struct ConstantSource(u8);

    impl SeedSource for ConstantSource {
        fn fill_seed(&mut self, seed: &mut [u8]) -> usize {
            seed.fill(self.0);
            seed.len()
        }
    }

    #[test]
    fn seed_determines_output() {
        let mut a = SpongeGenerator::<KeccakF1600, _>::new(ConstantSource(0x11), CAPACITY).unwrap();
        let mut b = SpongeGenerator::<KeccakF1600, _>::new(ConstantSource(0xee), CAPACITY).unwrap();

        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn capacity_has_a_floor() {
        for capacity in [0, 8, 128, MIN_GENERATOR_CAPACITY - 8] {
            assert_eq!(
                Err(Error::InvalidParameter("capacity")),
                SpongeGenerator::<KeccakF1600, _>::new(ConstantSource(0x11), capacity).map(|_| ())
            );
        }
        assert!(
            SpongeGenerator::<KeccakF1600, _>::new(ConstantSource(0x11), MIN_GENERATOR_CAPACITY)
                .is_ok()
        );
    }

    #[test]
    fn interval_has_a_floor() {
        let generator = Generator::new(FixedSource::new(usize::MAX), CAPACITY)
            .unwrap()
            .with_reseed_interval(1);
        assert_eq!(MIN_RESEED_INTERVAL, generator.reseed_interval);
    }

    #[test]
    fn requests_are_ratcheted() {
        let mut split = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();
        let mut whole = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();

        let mut a = [0u8; 64];
        split.generate(&mut a[..32]).unwrap();
        split.generate(&mut a[32..]).unwrap();
        let mut b = [0u8; 64];
        whole.generate(&mut b).unwrap();

        assert_eq!(a[..32], b[..32]);
        assert_ne!(a[32..], b[32..]);
    }

    #[test]
    fn short_seed() {
        // Half a seed still carries the full security level.
        let mut generator = Generator::new(FixedSource::new(32), CAPACITY).unwrap();
        generator.generate(&mut [0u8; 16]).unwrap();

        let mut generator = Generator::new(FixedSource::new(31), CAPACITY).unwrap();
        assert_eq!(Err(Error::SeedUnavailable), generator.generate(&mut [0u8; 16]));
        assert!(generator.try_fill_bytes(&mut [0u8; 16]).is_err());
    }

    #[test]
    fn stream_generator_rekeys() {
        let mut generator = ChaCha20Generator::new(FixedSource::new(usize::MAX))
            .unwrap()
            .with_reseed_interval(256);

        let mut out = [0u8; 600];
        generator.generate(&mut out).unwrap();
        assert_eq!(3, generator.source.calls);

        let mut expected = crate::ChaCha20::new().unwrap();
        let key: Vec<u8> = (0u8..32).collect();
        expected.initialize(&key).unwrap();
        assert_eq!(expected.keystream(256).unwrap(), out[..256]);

        let key: Vec<u8> = (32u8..64).collect();
        expected.initialize(&key).unwrap();
        assert_eq!(expected.keystream(256).unwrap(), out[256..512]);
    }

    #[test]
    fn stream_generator_needs_a_full_key() {
        let mut generator = ChaCha20Generator::new(FixedSource::new(31)).unwrap();
        assert_eq!(Err(Error::SeedUnavailable), generator.generate(&mut [0u8; 1]));
    }

    #[test]
    fn chained() {
        let sponge = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();
        let mut a = ChaCha20Generator::new(sponge).unwrap();

        let sponge = Generator::new(FixedSource::new(usize::MAX), CAPACITY).unwrap();
        let mut b = ChaCha20Generator::new(sponge).unwrap();

        assert_eq!(a.next_u64(), b.next_u64());
        assert_eq!(a.next_u32(), b.next_u32());
    }
}
