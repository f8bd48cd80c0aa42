use tracing::debug;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::bounds::checked_range;
use crate::error::{Error, Result};
use crate::{init, Permutation};

/// The width of the sponge state, in bits.
pub const WIDTH_BITS: usize = 1600;

/// The width of the sponge state, in bytes.
pub const STATE_BYTES: usize = WIDTH_BITS / 8;

/// Named sponge capacities, each twice the output strength it targets.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SecurityLevel {
    Security224,
    Security256,
    Security384,
    Security512,
}

impl SecurityLevel {
    /// The sponge capacity for this security level, in bits.
    pub const fn bits(self) -> usize {
        match self {
            SecurityLevel::Security224 => 2 * 224,
            SecurityLevel::Security256 => 2 * 256,
            SecurityLevel::Security384 => 2 * 384,
            SecurityLevel::Security512 => 2 * 512,
        }
    }
}

impl From<SecurityLevel> for usize {
    fn from(level: SecurityLevel) -> Self {
        level.bits()
    }
}

/// A duplex sponge over a 1600-bit permutation.
///
/// Input is XORed into the first `rate` bits of the state, one rate block per permutation call.
/// The first squeeze after absorbing pads the input (`pad10*1` with a `0x01` delimiter) and
/// permutes; output is then read out of the rate, permuting at every block boundary. Absorbing
/// again after squeezing goes through [`Sponge::reabsorb`] first, so unread output never leaks
/// into the next absorbed block.
///
/// The state is wiped when the sponge is dropped.
pub struct Sponge<P>
where
    P: Permutation<STATE_BYTES>,
{
    state: Box<[u8; STATE_BYTES]>,
    permutation: P,
    rate: usize,
    byte_io_index: usize,
    squeezing: bool,
}

impl<P> Sponge<P>
where
    P: Permutation<STATE_BYTES>,
{
    /// Creates a sponge with the given capacity in bits.
    ///
    /// The capacity must be a multiple of 8 and less than [`WIDTH_BITS`].
    pub fn new(capacity_bits: usize) -> Result<Self> {
        init::static_init()?;
        let rate = rate_bytes(capacity_bits)?;
        let state = alloc_state()?;

        debug!(capacity_bits, rate_bits = rate * 8, "created sponge");
        Ok(Sponge { state, permutation: P::default(), rate, byte_io_index: 0, squeezing: false })
    }

    /// Creates a sponge with the capacity for the given security level.
    pub fn with_security(level: SecurityLevel) -> Result<Self> {
        Self::new(level.bits())
    }

    /// Resets the sponge in place to an empty state with the given capacity.
    ///
    /// On error the sponge is left untouched.
    pub fn reinitialize(&mut self, capacity_bits: usize) -> Result<()> {
        let rate = rate_bytes(capacity_bits)?;
        self.state[..].zeroize();
        self.rate = rate;
        self.byte_io_index = 0;
        self.squeezing = false;

        debug!(capacity_bits, rate_bits = rate * 8, "reinitialized sponge");
        Ok(())
    }

    /// The number of bits absorbed or squeezed per permutation call.
    pub fn rate(&self) -> usize {
        self.rate * 8
    }

    /// The number of bits of state never directly exposed to input or output.
    pub fn capacity(&self) -> usize {
        WIDTH_BITS - self.rate * 8
    }

    /// Absorbs the given bytes, switching back to absorbing if the sponge was squeezing.
    pub fn absorb(&mut self, mut bin: &[u8]) {
        if bin.is_empty() {
            return;
        }

        self.reabsorb();

        while !bin.is_empty() {
            let n = (self.rate - self.byte_io_index).min(bin.len());
            let (block, rest) = bin.split_at(n);
            for (st_byte, byte) in self.state[self.byte_io_index..].iter_mut().zip(block) {
                *st_byte ^= byte;
            }
            self.advance(n);
            bin = rest;
        }
    }

    /// Fills the given slice with output, padding the absorbed input first if needed.
    pub fn squeeze_mut(&mut self, mut out: &mut [u8]) {
        if out.is_empty() {
            return;
        }

        if !self.squeezing {
            self.pad();
        }

        while !out.is_empty() {
            let n = (self.rate - self.byte_io_index).min(out.len());
            let (block, rest) = core::mem::take(&mut out).split_at_mut(n);
            block.copy_from_slice(&self.state[self.byte_io_index..self.byte_io_index + n]);
            self.advance(n);
            out = rest;
        }
    }

    /// Squeezes `n` bytes of output.
    pub fn squeeze(&mut self, n: usize) -> Vec<u8> {
        let mut b = vec![0u8; n];
        self.squeeze_mut(&mut b);
        b
    }

    /// Leaves the squeezing phase, discarding any output left in the current rate block.
    ///
    /// Does nothing while absorbing.
    pub fn reabsorb(&mut self) {
        if !self.squeezing {
            return;
        }

        if self.byte_io_index != 0 {
            self.permutation.permute(&mut self.state);
            self.byte_io_index = 0;
        }

        self.squeezing = false;
    }

    /// Irreversibly reabsorbs the sponge's own output.
    ///
    /// Squeezes `capacity / 8` bytes, reabsorbs, and absorbs them back, so that a later compromise
    /// of the state does not reveal earlier output.
    pub fn ratchet(&mut self) {
        let mut scratch = [0u8; STATE_BYTES];
        let scratch = &mut scratch[..self.capacity() / 8];
        self.squeeze_mut(scratch);
        self.reabsorb();
        self.absorb(scratch);
        scratch.zeroize();
    }

    /// Absorbs `length` bytes of `data` starting at `offset`.
    ///
    /// All arguments are validated before any state changes; a zero `length` is a no-op.
    pub fn absorb_at(&mut self, data: Option<&[u8]>, offset: isize, length: isize) -> Result<()> {
        let data = data.ok_or(Error::MissingBuffer("data"))?;
        let range = checked_range(data.len(), offset, length)?;
        self.absorb(&data[range]);
        Ok(())
    }

    /// Squeezes `length` bytes into `data` starting at `offset`.
    ///
    /// All arguments are validated before any state changes; a zero `length` is a no-op.
    pub fn squeeze_at(
        &mut self,
        data: Option<&mut [u8]>,
        offset: isize,
        length: isize,
    ) -> Result<()> {
        let data = data.ok_or(Error::MissingBuffer("data"))?;
        let range = checked_range(data.len(), offset, length)?;
        self.squeeze_mut(&mut data[range]);
        Ok(())
    }

    #[inline(always)]
    fn advance(&mut self, n: usize) {
        self.byte_io_index += n;
        if self.byte_io_index == self.rate {
            self.permutation.permute(&mut self.state);
            self.byte_io_index = 0;
        }
    }

    fn pad(&mut self) {
        self.state[self.byte_io_index] ^= 0x01;
        self.state[self.rate - 1] ^= 0x80;
        self.permutation.permute(&mut self.state);
        self.byte_io_index = 0;
        self.squeezing = true;
    }
}

impl<P> Zeroize for Sponge<P>
where
    P: Permutation<STATE_BYTES>,
{
    fn zeroize(&mut self) {
        self.state[..].zeroize();
        self.byte_io_index.zeroize();
    }
}

impl<P> Drop for Sponge<P>
where
    P: Permutation<STATE_BYTES>,
{
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl<P> ZeroizeOnDrop for Sponge<P> where P: Permutation<STATE_BYTES> {}

impl<P> core::fmt::Debug for Sponge<P>
where
    P: Permutation<STATE_BYTES>,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Sponge")
            .field("rate", &self.rate())
            .field("capacity", &self.capacity())
            .field("squeezing", &self.squeezing)
            .finish_non_exhaustive()
    }
}

fn rate_bytes(capacity_bits: usize) -> Result<usize> {
    if capacity_bits >= WIDTH_BITS || capacity_bits % 8 != 0 {
        return Err(Error::InvalidParameter("capacity"));
    }
    Ok((WIDTH_BITS - capacity_bits) / 8)
}

fn alloc_state() -> Result<Box<[u8; STATE_BYTES]>> {
    let mut buf = Vec::new();
    buf.try_reserve_exact(STATE_BYTES).map_err(|_| Error::AllocationFailure)?;
    buf.resize(STATE_BYTES, 0u8);
    buf.into_boxed_slice().try_into().map_err(|_| Error::AllocationFailure)
}
