//! A Fortuna-style entropy accumulator built from sponges.
//!
//! Incoming entropy is spread across a fixed number of pools, each an [`EntropyExtractor`]. Pools
//! are fed in an order reshuffled after every pass, drawn from a keystream the accumulator keys
//! from its own sponge. Every read stirs pool `i` into the main sponge only on every `2^i`-th read,
//! so deeper pools collect entropy for longer before they are drawn on.
use byteorder::{ByteOrder, LittleEndian};
use tracing::debug;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::generator::SeedSource;
use crate::sponge::{SecurityLevel, STATE_BYTES};
use crate::stream::KEY_LEN;
use crate::{Permutation, Sponge, SpongeGenerator, StreamCore, StreamGenerator, StreamSession};

/// The number of pools a [`SpongePrng`] spreads its entropy across.
pub const DEFAULT_POOLS: usize = 27;

/// The most bytes a single accumulator read returns.
pub const MAX_ACCUMULATOR_READ: usize = 2 * ACCUMULATOR_CAPACITY / 8;

const ACCUMULATOR_CAPACITY: usize = SecurityLevel::Security512.bits();
const EXTRACTOR_CAPACITY: usize = SecurityLevel::Security256.bits();

/// Schedule keystream drawn before the accumulator rekeys its scheduler on the next read.
const SCHEDULE_RESEED_BYTES: usize = 16 * 1024 * 1024;
const SCHEDULE_BLOCK: usize = 512;

/// An entropy pool.
pub trait EntropyExtractor: Sized {
    /// Creates a pool keyed with `key`, which may be empty.
    fn new(key: &[u8]) -> Result<Self>;

    /// The number of bytes one read of the pool is worth.
    fn byte_capacity(&self) -> usize;

    /// Mixes `entropy` into the pool.
    fn add_entropy(&mut self, entropy: &[u8]);

    /// Condenses the pool into `out`.
    fn read(&mut self, out: &mut [u8]);
}

/// An entropy pool over a 256-bit-capacity sponge.
///
/// Each read stirs in a running read counter, squeezes, and ratchets, so successive reads differ
/// even when no entropy arrived in between.
pub struct SpongeExtractor<P: Permutation<STATE_BYTES>> {
    sponge: Sponge<P>,
    add_count: u64,
    read_count: u64,
}

impl<P: Permutation<STATE_BYTES>> SpongeExtractor<P> {
    /// Rekeys the pool, discarding everything it held.
    pub fn reset(&mut self, key: &[u8]) -> Result<()> {
        self.sponge.reinitialize(EXTRACTOR_CAPACITY)?;
        self.sponge.absorb(key);
        self.sponge.ratchet();
        self.add_count = 0;
        self.read_count = 0;
        Ok(())
    }

    /// The number of entropy additions since the last reset.
    pub fn add_count(&self) -> u64 {
        self.add_count
    }

    /// The number of reads since the last reset.
    pub fn read_count(&self) -> u64 {
        self.read_count
    }
}

impl<P: Permutation<STATE_BYTES>> EntropyExtractor for SpongeExtractor<P> {
    fn new(key: &[u8]) -> Result<Self> {
        let sponge = Sponge::new(EXTRACTOR_CAPACITY)?;
        let mut extractor = SpongeExtractor { sponge, add_count: 0, read_count: 0 };
        extractor.reset(key)?;
        Ok(extractor)
    }

    fn byte_capacity(&self) -> usize {
        EXTRACTOR_CAPACITY / 8
    }

    fn add_entropy(&mut self, entropy: &[u8]) {
        self.add_count += 1;
        self.sponge.absorb(entropy);
    }

    fn read(&mut self, out: &mut [u8]) {
        self.read_count += 1;

        let mut count = [0u8; 8];
        LittleEndian::write_u64(&mut count, self.read_count);
        self.sponge.reabsorb();
        self.sponge.absorb(&count);

        self.sponge.squeeze_mut(out);
        self.sponge.ratchet();
    }
}

/// Pools of entropy feeding a 512-bit-capacity sponge.
pub struct SpongeAccumulator<P, C, E = SpongeExtractor<P>>
where
    P: Permutation<STATE_BYTES>,
    C: StreamCore,
    E: EntropyExtractor,
{
    sponge: Sponge<P>,
    extractors: Vec<E>,
    schedule: StreamSession<C>,
    schedule_bytes: usize,
    order: Vec<u8>,
    next: usize,
    stir_count: u64,
}

impl<P, C, E> SpongeAccumulator<P, C, E>
where
    P: Permutation<STATE_BYTES>,
    C: StreamCore,
    E: EntropyExtractor,
{
    /// Creates an accumulator with `pools` pools (1 to 254), each keyed from `key`.
    ///
    /// With an empty key every pool starts out identical and the accumulator is only as good as
    /// the entropy later added to it.
    pub fn new(key: &[u8], pools: usize) -> Result<Self> {
        if pools == 0 || pools >= usize::from(u8::MAX) {
            return Err(Error::InvalidParameter("pools"));
        }

        let mut sponge = Sponge::new(ACCUMULATOR_CAPACITY)?;
        let mut state = Zeroizing::new([0u8; ACCUMULATOR_CAPACITY / 8]);
        let pool_key_len = if key.is_empty() { 0 } else { state.len() };

        sponge.absorb(key);
        let mut extractors = Vec::with_capacity(pools);
        for _ in 0..pools {
            if !key.is_empty() {
                sponge.squeeze_mut(&mut state[..]);
            }
            extractors.push(E::new(&state[..pool_key_len])?);
        }
        if !key.is_empty() {
            sponge.ratchet();
        }

        let mut accumulator = SpongeAccumulator {
            sponge,
            extractors,
            schedule: StreamSession::new()?,
            schedule_bytes: 0,
            order: (0..pools as u8).collect(),
            next: pools,
            stir_count: 0,
        };
        accumulator.rekey_schedule()?;
        // Rekey again on the first read, once the pools have been stirred in.
        accumulator.schedule_bytes = SCHEDULE_RESEED_BYTES;

        debug!(pools, "created sponge accumulator");
        Ok(accumulator)
    }

    /// The number of pools.
    pub fn pools(&self) -> usize {
        self.extractors.len()
    }

    /// Adds `entropy` to the next pool in the schedule.
    pub fn add_entropy(&mut self, entropy: &[u8]) -> Result<()> {
        let pool = self.next_pool()?;
        self.extractors[pool].add_entropy(entropy);
        Ok(())
    }

    /// Stirs the due pools into the sponge and fills up to [`MAX_ACCUMULATOR_READ`] bytes of
    /// `out`, returning the number of bytes written.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }

        let n = out.len().min(MAX_ACCUMULATOR_READ);
        self.stir()?;
        self.sponge.squeeze_mut(&mut out[..n]);
        self.sponge.ratchet();
        Ok(n)
    }

    fn stir(&mut self) -> Result<()> {
        self.stir_count += 1;
        let n = self.stir_count;

        let mut state = Zeroizing::new([0u8; ACCUMULATOR_CAPACITY / 8]);
        let mut mask = 0u64;
        let mut stirred = 0;
        for extractor in &mut self.extractors {
            let len = extractor.byte_capacity().min(state.len());
            extractor.read(&mut state[..len]);
            self.sponge.absorb(&state[..len]);
            stirred += 1;

            mask = (mask << 1) | 1;
            if n & mask != 0 {
                break;
            }
        }
        debug!(stir = n, pools = stirred, "stirred accumulator");

        if self.schedule_bytes >= SCHEDULE_RESEED_BYTES {
            self.rekey_schedule()?;
        }
        Ok(())
    }

    fn rekey_schedule(&mut self) -> Result<()> {
        let mut seed = Zeroizing::new([0u8; KEY_LEN]);
        self.sponge.squeeze_mut(&mut seed[..]);
        self.schedule.initialize(&seed[..])?;
        self.schedule_bytes = 0;
        Ok(())
    }

    fn next_pool(&mut self) -> Result<usize> {
        if self.next == self.order.len() {
            self.shuffle()?;
            self.next = 0;
        }
        let pool = self.order[self.next];
        self.next += 1;
        Ok(usize::from(pool))
    }

    /// Fisher-Yates shuffles the pool order with rejection-sampled schedule bytes.
    fn shuffle(&mut self) -> Result<()> {
        let mut block = Zeroizing::new([0u8; SCHEDULE_BLOCK]);
        let mut i = self.order.len() - 1;
        while i > 0 {
            self.schedule.keystream_mut(&mut block[..])?;
            if self.schedule_bytes < SCHEDULE_RESEED_BYTES {
                self.schedule_bytes += SCHEDULE_BLOCK;
            }

            for &b in block.iter() {
                let b = usize::from(b);
                if b > i {
                    continue;
                }
                self.order.swap(b, i);
                i -= 1;
                if i == 0 {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// An accumulator-backed PRNG with [`DEFAULT_POOLS`] pools.
///
/// Reads are capped at [`MAX_ACCUMULATOR_READ`] bytes, which makes it a seed source rather than a
/// bulk generator; put a [`SpongeGenerator`] or a [`StreamGenerator`] in front of it for that.
pub struct SpongePrng<P, C>
where
    P: Permutation<STATE_BYTES>,
    C: StreamCore,
{
    accumulator: SpongeAccumulator<P, C>,
}

impl<P, C> SpongePrng<P, C>
where
    P: Permutation<STATE_BYTES>,
    C: StreamCore,
{
    /// Creates a PRNG keyed with `key`.
    pub fn new(key: &[u8]) -> Result<Self> {
        Ok(SpongePrng { accumulator: SpongeAccumulator::new(key, DEFAULT_POOLS)? })
    }

    /// Fills up to [`MAX_ACCUMULATOR_READ`] bytes of `out`, returning the number written.
    pub fn read(&mut self, out: &mut [u8]) -> Result<usize> {
        self.accumulator.read(out)
    }

    /// Adds `entropy` to the next pool.
    pub fn add_entropy(&mut self, entropy: &[u8]) -> Result<()> {
        self.accumulator.add_entropy(entropy)
    }

    /// Wraps the PRNG in a sponge generator with the given capacity.
    pub fn into_slow_generator(self, capacity_bits: usize) -> Result<SpongeGenerator<P, Self>> {
        SpongeGenerator::new(self, capacity_bits)
    }

    /// Wraps the PRNG in a stream generator.
    pub fn into_fast_generator(self) -> Result<StreamGenerator<C, Self>> {
        StreamGenerator::new(self)
    }
}

impl<P, C> SeedSource for SpongePrng<P, C>
where
    P: Permutation<STATE_BYTES>,
    C: StreamCore,
{
    fn fill_seed(&mut self, seed: &mut [u8]) -> usize {
        match self.read(seed) {
            Ok(n) => n,
            Err(e) => {
                debug!(%e, "accumulator read failed");
                0
            }
        }
    }
}

/// An entropy pool over Keccak-f\[1600\].
#[cfg(feature = "keccak")]
pub type KeccakExtractor = SpongeExtractor<crate::KeccakF1600>;

/// An accumulator over Keccak-f\[1600\] with a ChaCha20 pool schedule.
#[cfg(all(feature = "keccak", feature = "chacha20"))]
pub type KeccakAccumulator = SpongeAccumulator<crate::KeccakF1600, crate::ChaCha20Core>;

/// An accumulator-backed PRNG over Keccak-f\[1600\] and ChaCha20.
#[cfg(all(feature = "keccak", feature = "chacha20"))]
pub type KeccakPrng = SpongePrng<crate::KeccakF1600, crate::ChaCha20Core>;
